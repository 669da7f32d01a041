//! Enum types for COLLOQUY entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PIPELINE ENUMS
// ============================================================================

/// Role of a pipeline stage in the agent chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    /// Breaks the query down and frames the problem
    Analyst,
    /// Gathers facts and supporting material
    Researcher,
    /// Produces the candidate answer or artifact
    Creator,
    /// Challenges the candidate and flags weaknesses
    Critic,
    /// Merges everything into the final output
    Synthesizer,
}

impl AgentRole {
    /// The canonical five-stage chain, in execution order.
    pub fn chain() -> [AgentRole; 5] {
        [
            AgentRole::Analyst,
            AgentRole::Researcher,
            AgentRole::Creator,
            AgentRole::Critic,
            AgentRole::Synthesizer,
        ]
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Analyst => "analyst",
            Self::Researcher => "researcher",
            Self::Creator => "creator",
            Self::Critic => "critic",
            Self::Synthesizer => "synthesizer",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "analyst" => Ok(Self::Analyst),
            "researcher" => Ok(Self::Researcher),
            "creator" => Ok(Self::Creator),
            "critic" => Ok(Self::Critic),
            "synthesizer" => Ok(Self::Synthesizer),
            _ => Err(EnumParseError::new("AgentRole", s)),
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for AgentRole {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Pipeline execution mode. One configurable engine covers all of them;
/// the mode selects stage layout, candidate counts, and label anonymization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PipelineMode {
    /// Fixed five-stage sequential chain
    #[default]
    Sequential,
    /// Sequential chain with explicit thinking-process extraction
    Enhanced,
    /// Parallel synthesis candidates, model identity hidden behind labels
    Anonymous,
    /// Fan-out/fan-in across several models per phase
    Swarm,
}

impl PipelineMode {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Enhanced => "enhanced",
            Self::Anonymous => "anonymous",
            Self::Swarm => "swarm",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "enhanced" => Ok(Self::Enhanced),
            "anonymous" => Ok(Self::Anonymous),
            "swarm" => Ok(Self::Swarm),
            _ => Err(EnumParseError::new("PipelineMode", s)),
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ============================================================================
// RUN / STEP STATE MACHINES
// ============================================================================

/// Lifecycle status of a collaboration run.
/// Transitions: pending -> running -> {done, error, cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Error,
    Cancelled,
}

impl RunStatus {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Done)
                | (RunStatus::Running, RunStatus::Error)
                | (RunStatus::Running, RunStatus::Cancelled)
        )
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Error | RunStatus::Cancelled)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(EnumParseError::new("RunStatus", s)),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Lifecycle status of a single pipeline step.
/// Transitions: pending -> running -> {done, error}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl StepStatus {
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Running, StepStatus::Done)
                | (StepStatus::Running, StepStatus::Error)
        )
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            _ => Err(EnumParseError::new("StepStatus", s)),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Role of a stored conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageRole {
    User,
    Assistant,
    Agent,
}

impl MessageRole {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Agent => "agent",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "agent" => Ok(Self::Agent),
            _ => Err(EnumParseError::new("MessageRole", s)),
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ============================================================================
// MEMORY LATTICE ENUMS
// ============================================================================

/// Kind of insight held in the memory lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsightType {
    Fact,
    Hypothesis,
    Task,
    Contradiction,
    Warning,
    Pattern,
    Dependency,
    Metric,
}

/// How two insights conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictType {
    /// Direct negation ("X is" vs "X is not")
    Negation,
    /// Opposing capability claims ("can" vs "cannot")
    Capability,
    /// Incompatible factual claims
    Factual,
}

/// Resolution lifecycle of a detected contradiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResolutionStatus {
    #[default]
    Unresolved,
    Investigating,
    Resolved,
}

// ============================================================================
// TASK ORCHESTRATOR ENUMS
// ============================================================================

/// Status of a task node in a workflow DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// A dependency failed; this task never ran
    Blocked,
}

/// Kind of work a task node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    Research,
    Design,
    Implementation,
    Review,
    Testing,
    Documentation,
    Debugging,
    Analysis,
    Synthesis,
}

impl TaskType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Design => "design",
            Self::Implementation => "implementation",
            Self::Review => "review",
            Self::Testing => "testing",
            Self::Documentation => "documentation",
            Self::Debugging => "debugging",
            Self::Analysis => "analysis",
            Self::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ============================================================================
// PARSE ERROR
// ============================================================================

/// Error parsing an enum from its database string representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub type_name: &'static str,
    pub value: String,
}

impl EnumParseError {
    fn new(type_name: &'static str, value: &str) -> Self {
        Self {
            type_name,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.type_name, self.value)
    }
}

impl std::error::Error for EnumParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_role_db_roundtrip() {
        for role in AgentRole::chain() {
            assert_eq!(AgentRole::from_db_str(role.as_db_str()), Ok(role));
        }
        assert!(AgentRole::from_db_str("philosopher").is_err());
    }

    #[test]
    fn test_run_status_transitions() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Done));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Error));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Cancelled));
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Done));
        assert!(!RunStatus::Done.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Cancelled.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn test_step_status_transitions() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::Running));
        assert!(StepStatus::Running.can_transition_to(StepStatus::Done));
        assert!(StepStatus::Running.can_transition_to(StepStatus::Error));
        assert!(!StepStatus::Done.can_transition_to(StepStatus::Running));
        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Done));
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::Error.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_pipeline_mode_roundtrip() {
        for mode in [
            PipelineMode::Sequential,
            PipelineMode::Enhanced,
            PipelineMode::Anonymous,
            PipelineMode::Swarm,
        ] {
            assert_eq!(PipelineMode::from_db_str(mode.as_db_str()), Ok(mode));
        }
    }

    #[test]
    fn test_chain_order() {
        let chain = AgentRole::chain();
        assert_eq!(chain[0], AgentRole::Analyst);
        assert_eq!(chain[4], AgentRole::Synthesizer);
    }
}
