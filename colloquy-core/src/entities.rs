//! Entity types for runs, insights, workflows, and persistence.

use crate::enums::{
    AgentRole, ConflictType, InsightType, MessageRole, PipelineMode, ResolutionStatus, RunStatus,
    StepStatus, TaskStatus, TaskType,
};
use crate::intent::IntentType;
use crate::{compute_content_hash, new_entity_id, short_hash_hex, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// ============================================================================
// PIPELINE OUTPUT TYPES
// ============================================================================

/// Output of one pipeline stage, appended to the run's ordered list.
/// Read-only after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Stage role in the chain
    pub role: AgentRole,
    /// Provider that served the call
    pub provider: String,
    /// Model that served the call
    pub model: String,
    /// The stage's text output
    pub content: String,
    /// Extracted thinking process, when the stage emitted one
    pub thinking: Option<String>,
    /// Key insights extracted from the output
    pub key_insights: Vec<String>,
    /// When this stage finished
    pub timestamp: Timestamp,
    /// The turn this output belongs to
    pub turn_id: EntityId,
}

/// Error payload captured on a failed pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub message: String,
    pub error_type: String,
    pub provider: String,
}

// ============================================================================
// MEMORY LATTICE TYPES
// ============================================================================

/// A single extracted fact/claim/warning held in the memory lattice.
///
/// The id is derived from a content hash, so identical content always maps
/// to the same id. Only `confidence` and `validation_count` mutate after
/// creation (on duplicate merge); insights leave the lattice only through
/// capacity-triggered eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub content: String,
    pub insight_type: InsightType,
    pub source_model: String,
    pub confidence: f32,
    pub intent_types: Vec<IntentType>,
    pub created_at: Timestamp,
    /// Bidirectional relationship edges to other insight ids
    pub related_insights: BTreeSet<String>,
    /// Insight ids this one contradicts
    pub contradicts: BTreeSet<String>,
    /// How many times a duplicate of this insight was re-observed
    pub validation_count: u32,
}

impl Insight {
    /// Create a new insight. The id is the hex prefix of a SHA-256 hash
    /// over the insight type and content, stable across sessions for
    /// identical content of the same type.
    pub fn new(
        content: impl Into<String>,
        insight_type: InsightType,
        source_model: impl Into<String>,
        confidence: f32,
        intent_types: Vec<IntentType>,
    ) -> Self {
        let content = content.into();
        let hash = compute_content_hash(format!("{:?}|{}", insight_type, content).as_bytes());
        Self {
            id: short_hash_hex(&hash, 12),
            content,
            insight_type,
            source_model: source_model.into(),
            confidence: confidence.clamp(0.0, 1.0),
            intent_types,
            created_at: Utc::now(),
            related_insights: BTreeSet::new(),
            contradicts: BTreeSet::new(),
            validation_count: 0,
        }
    }
}

/// A detected conflict between two insights. Created by the lattice's
/// contradiction heuristic; mutated only via explicit resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub id: EntityId,
    pub insight_a: String,
    pub insight_b: String,
    pub conflict_type: ConflictType,
    pub severity: f32,
    pub resolution_status: ResolutionStatus,
    pub resolution: Option<String>,
    pub detected_by: String,
    pub detected_at: Timestamp,
}

impl Contradiction {
    pub fn new(
        insight_a: impl Into<String>,
        insight_b: impl Into<String>,
        conflict_type: ConflictType,
        severity: f32,
        detected_by: impl Into<String>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            insight_a: insight_a.into(),
            insight_b: insight_b.into(),
            conflict_type,
            severity: severity.clamp(0.0, 1.0),
            resolution_status: ResolutionStatus::Unresolved,
            resolution: None,
            detected_by: detected_by.into(),
            detected_at: Utc::now(),
        }
    }
}

// ============================================================================
// WORKFLOW DAG TYPES
// ============================================================================

/// One node in a workflow DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub task_type: TaskType,
    pub description: String,
    pub assigned_model: Option<String>,
    pub dependencies: BTreeSet<String>,
    pub priority: i32,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type,
            description: description.into(),
            assigned_model: None,
            dependencies: BTreeSet::new(),
            priority: 0,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A dependency graph of tasks plus its batched execution order.
///
/// Invariant: `execution_order` is a valid topological batching - a node
/// appears in exactly one batch, and all of its dependencies appear in
/// strictly earlier batches. Construction fails with `CycleDetected` when
/// no such batching exists; there is no degraded single-batch fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDag {
    pub nodes: HashMap<String, TaskNode>,
    pub execution_order: Vec<Vec<String>>,
}

// ============================================================================
// COREFERENCE TYPES
// ============================================================================

/// A named entity mentioned in conversation, tracked for coreference
/// resolution. Session-scoped; merged on re-mention, never deleted within
/// a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub name: String,
    pub entity_type: String,
    pub first_mentioned: Timestamp,
    pub last_mentioned: Timestamp,
    pub mention_count: u32,
    /// Text surrounding the most recent mention
    pub context: String,
    pub aliases: Vec<String>,
}

impl TrackedEntity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>, context: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            first_mentioned: now,
            last_mentioned: now,
            mention_count: 1,
            context: context.into(),
            aliases: Vec::new(),
        }
    }

    /// Record a fresh mention of this entity.
    pub fn touch(&mut self, context: impl Into<String>) {
        self.last_mentioned = Utc::now();
        self.mention_count += 1;
        self.context = context.into();
    }

    /// Whether `candidate` names this entity, directly or via alias.
    /// Matching is case-insensitive and accepts substring containment in
    /// either direction ("Purdue" vs "Purdue University").
    pub fn matches_name(&self, candidate: &str) -> bool {
        let candidate = candidate.to_lowercase();
        let name = self.name.to_lowercase();
        if name.contains(&candidate) || candidate.contains(&name) {
            return true;
        }
        self.aliases.iter().any(|a| {
            let a = a.to_lowercase();
            a.contains(&candidate) || candidate.contains(&a)
        })
    }
}

// ============================================================================
// PERSISTENCE ENTITIES
// ============================================================================

/// A conversation thread. Owns its messages and runs; deleting a
/// conversation cascades downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: EntityId,
    pub title: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Conversation {
    pub fn new(title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_entity_id(),
            title,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One stored message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollabMessage {
    pub id: EntityId,
    pub conversation_id: EntityId,
    pub role: MessageRole,
    /// Stage role, for messages produced by a pipeline step
    pub agent_role: Option<AgentRole>,
    pub content: String,
    pub created_at: Timestamp,
}

impl CollabMessage {
    pub fn new(conversation_id: EntityId, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            conversation_id,
            role,
            agent_role: None,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_agent_role(mut self, agent_role: AgentRole) -> Self {
        self.agent_role = Some(agent_role);
        self
    }
}

/// One collaboration run: a full pipeline execution against a conversation.
/// Owns its ordered steps and references the triggering message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollabRun {
    pub id: EntityId,
    pub conversation_id: EntityId,
    /// The user message that triggered this run
    pub trigger_message_id: EntityId,
    pub mode: PipelineMode,
    pub status: RunStatus,
    pub final_output: Option<String>,
    pub error: Option<StepFailure>,
    pub total_time_ms: Option<f64>,
    pub created_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl CollabRun {
    pub fn new(conversation_id: EntityId, trigger_message_id: EntityId, mode: PipelineMode) -> Self {
        Self {
            id: new_entity_id(),
            conversation_id,
            trigger_message_id,
            mode,
            status: RunStatus::Pending,
            final_output: None,
            error: None,
            total_time_ms: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// One pipeline stage within a run. Optionally produces one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollabStep {
    pub id: EntityId,
    pub run_id: EntityId,
    /// Zero-based position within the run
    pub position: i32,
    pub role: AgentRole,
    pub provider: String,
    pub model: String,
    pub status: StepStatus,
    /// Output content, truncated to the configured persistence budget
    pub content: Option<String>,
    pub error: Option<StepFailure>,
    pub latency_ms: Option<f64>,
    /// Message produced by this step, when one was stored
    pub message_id: Option<EntityId>,
    pub created_at: Timestamp,
}

impl CollabStep {
    pub fn new(
        run_id: EntityId,
        position: i32,
        role: AgentRole,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            run_id,
            position,
            role,
            provider: provider.into(),
            model: model.into(),
            status: StepStatus::Pending,
            content: None,
            error: None,
            latency_ms: None,
            message_id: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_id_stable_for_identical_content() {
        let a = Insight::new("Rust has no GC", InsightType::Fact, "gpt-4o", 0.9, vec![]);
        let b = Insight::new("Rust has no GC", InsightType::Fact, "sonar-pro", 0.5, vec![]);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_insight_id_differs_for_different_content() {
        let a = Insight::new("Rust has no GC", InsightType::Fact, "gpt-4o", 0.9, vec![]);
        let b = Insight::new("Go has a GC", InsightType::Fact, "gpt-4o", 0.9, vec![]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_insight_id_differs_for_different_type() {
        let fact = Insight::new("disk is nearly full", InsightType::Fact, "m", 0.9, vec![]);
        let warning = Insight::new("disk is nearly full", InsightType::Warning, "m", 0.9, vec![]);
        assert_ne!(fact.id, warning.id);
    }

    #[test]
    fn test_insight_confidence_clamped() {
        let hot = Insight::new("x", InsightType::Fact, "m", 3.0, vec![]);
        assert_eq!(hot.confidence, 1.0);
        let cold = Insight::new("y", InsightType::Fact, "m", -1.0, vec![]);
        assert_eq!(cold.confidence, 0.0);
    }

    #[test]
    fn test_contradiction_severity_clamped() {
        let c = Contradiction::new("a", "b", ConflictType::Negation, 1.7, "lattice");
        assert_eq!(c.severity, 1.0);
        assert_eq!(c.resolution_status, ResolutionStatus::Unresolved);
    }

    #[test]
    fn test_entity_touch_increments_mentions() {
        let mut e = TrackedEntity::new("Purdue University", "university", "rankings talk");
        let first = e.last_mentioned;
        e.touch("tuition talk");
        assert_eq!(e.mention_count, 2);
        assert!(e.last_mentioned >= first);
        assert_eq!(e.context, "tuition talk");
    }

    #[test]
    fn test_entity_name_matching() {
        let mut e = TrackedEntity::new("Purdue University", "university", "");
        assert!(e.matches_name("purdue university"));
        assert!(e.matches_name("Purdue"));
        assert!(!e.matches_name("MIT"));
        e.aliases.push("Boilermakers".to_string());
        assert!(e.matches_name("boilermakers"));
    }

    #[test]
    fn test_task_node_builder() {
        let node = TaskNode::new("t1", TaskType::Research, "gather material")
            .with_dependency("t0")
            .with_priority(5);
        assert!(node.dependencies.contains("t0"));
        assert_eq!(node.priority, 5);
        assert_eq!(node.status, TaskStatus::Pending);
    }

    #[test]
    fn test_run_starts_pending() {
        let convo = Conversation::new(Some("thread".to_string()));
        let msg = CollabMessage::new(convo.id, MessageRole::User, "hello");
        let run = CollabRun::new(convo.id, msg.id, PipelineMode::Sequential);
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.final_output.is_none());
        assert!(run.finished_at.is_none());
    }
}
