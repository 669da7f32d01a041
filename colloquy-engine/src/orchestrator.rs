//! Task orchestration: workflow templates, dependency batching, and
//! batch-parallel execution.
//!
//! A query either matches one of a handful of canned workflow templates or
//! has its tasks synthesized straight from the intent vector. The resulting
//! DAG's `execution_order` is a topological batching; a dependency cycle is
//! an explicit error, never a silently flattened batch.

use crate::router::{ModelProfile, SkillMatrix};
use colloquy_core::{
    ChatMessage, ChatRequest, ColloquyResult, EngineConfig, IntentType, IntentVector,
    OrchestratorError, TaskNode, TaskStatus, TaskType, WorkflowDag,
};
use colloquy_llm::ProviderRegistry;
use futures_util::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Minimum confidence for an intent to spawn a task when no template matches.
const TASK_CONFIDENCE_GATE: f32 = 0.3;

// ============================================================================
// WORKFLOW TEMPLATES
// ============================================================================

struct WorkflowTemplate {
    name: &'static str,
    pattern: Regex,
    tasks: &'static [(TaskType, &'static str)],
    /// (prerequisite, dependent) pairs
    deps: &'static [(TaskType, TaskType)],
}

static WORKFLOW_TEMPLATES: Lazy<Vec<WorkflowTemplate>> = Lazy::new(|| {
    use TaskType::*;
    vec![
        WorkflowTemplate {
            name: "api_development",
            pattern: Regex::new(r"\b(build|create|design|develop)\b.*\bapi\b|\bapi\b.*\b(endpoint|service|backend)\b")
                .expect("static workflow pattern"),
            tasks: &[
                (Design, "Design the API surface: resources, routes, request and response shapes"),
                (Implementation, "Implement the designed endpoints"),
                (Testing, "Write tests covering the happy paths and the error responses"),
                (Documentation, "Document the endpoints, parameters, and error codes"),
            ],
            deps: &[
                (Design, Implementation),
                (Implementation, Testing),
                (Implementation, Documentation),
            ],
        },
        WorkflowTemplate {
            name: "bug_fixing",
            pattern: Regex::new(r"\b(fix|debug|broken|crash(es|ing)?|bug)\b")
                .expect("static workflow pattern"),
            tasks: &[
                (Analysis, "Reproduce the failure and isolate the responsible component"),
                (Debugging, "Identify the root cause and propose the fix"),
                (Testing, "Write a regression test that fails before the fix and passes after"),
                (Review, "Review the fix for side effects and missed cases"),
            ],
            deps: &[(Analysis, Debugging), (Debugging, Testing), (Testing, Review)],
        },
        WorkflowTemplate {
            name: "research_report",
            pattern: Regex::new(r"\b(research|investigate|survey|report on|state of the art)\b")
                .expect("static workflow pattern"),
            tasks: &[
                (Research, "Gather sources, data, and prior art on the topic"),
                (Analysis, "Analyze the gathered material for patterns and disagreements"),
                (Synthesis, "Synthesize the findings into a structured report"),
            ],
            deps: &[(Research, Analysis), (Analysis, Synthesis)],
        },
        WorkflowTemplate {
            name: "code_review",
            pattern: Regex::new(r"\breview\b.*\b(code|pr|pull request|diff)\b|\bcode review\b")
                .expect("static workflow pattern"),
            tasks: &[
                (Review, "Review the code for correctness, clarity, and hidden failure modes"),
                (Synthesis, "Summarize the findings ordered by severity"),
            ],
            deps: &[(Review, Synthesis)],
        },
    ]
});

/// Intent category used to look up model skill for a task type.
fn skill_intent_for(task_type: TaskType) -> IntentType {
    match task_type {
        TaskType::Research => IntentType::Research,
        TaskType::Design => IntentType::Plan,
        TaskType::Implementation => IntentType::Generate,
        TaskType::Review => IntentType::Review,
        TaskType::Testing => IntentType::Debug,
        TaskType::Documentation => IntentType::Explain,
        TaskType::Debugging => IntentType::Debug,
        TaskType::Analysis => IntentType::Research,
        TaskType::Synthesis => IntentType::Summarize,
    }
}

/// Task type spawned for an intent when no template matches.
fn task_for_intent(intent: IntentType) -> TaskType {
    match intent {
        IntentType::Research => TaskType::Research,
        IntentType::Generate => TaskType::Implementation,
        IntentType::Debug => TaskType::Debugging,
        IntentType::Refactor => TaskType::Implementation,
        IntentType::Explain => TaskType::Documentation,
        IntentType::Summarize => TaskType::Documentation,
        IntentType::Translate => TaskType::Documentation,
        IntentType::Brainstorm => TaskType::Design,
        IntentType::Plan => TaskType::Design,
        IntentType::Review => TaskType::Review,
    }
}

// ============================================================================
// TOPOLOGICAL BATCHING
// ============================================================================

/// Batch nodes so every node's dependencies land in strictly earlier
/// batches. A cycle is a hard error listing the unschedulable nodes.
fn topological_batches(
    nodes: &HashMap<String, TaskNode>,
) -> Result<Vec<Vec<String>>, OrchestratorError> {
    for node in nodes.values() {
        for dep in &node.dependencies {
            if !nodes.contains_key(dep) {
                return Err(OrchestratorError::UnknownDependency {
                    task_id: node.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut scheduled: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    let mut batches = Vec::new();

    while scheduled.len() < nodes.len() {
        let mut batch: Vec<String> = nodes
            .values()
            .filter(|node| !scheduled.contains(&node.id))
            .filter(|node| node.dependencies.iter().all(|dep| scheduled.contains(dep)))
            .map(|node| node.id.clone())
            .collect();

        if batch.is_empty() {
            let mut remaining: Vec<String> = nodes
                .keys()
                .filter(|id| !scheduled.contains(*id))
                .cloned()
                .collect();
            remaining.sort();
            return Err(OrchestratorError::CycleDetected { remaining });
        }

        batch.sort();
        scheduled.extend(batch.iter().cloned());
        batches.push(batch);
    }

    Ok(batches)
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Execution summary for one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskOutcome {
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
}

/// Builds workflow DAGs from queries and executes them batch by batch.
pub struct TaskOrchestrator {
    registry: Arc<ProviderRegistry>,
    matrix: SkillMatrix,
    config: EngineConfig,
}

impl TaskOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, matrix: SkillMatrix, config: EngineConfig) -> Self {
        Self {
            registry,
            matrix,
            config,
        }
    }

    /// Build a workflow for the query: a matching template if any, else
    /// tasks synthesized from the intent vector's active categories.
    pub fn build_workflow(
        &self,
        query: &str,
        intent: &IntentVector,
        available: &[ModelProfile],
    ) -> ColloquyResult<WorkflowDag> {
        let lowered = query.to_lowercase();
        let template = WORKFLOW_TEMPLATES.iter().find(|t| t.pattern.is_match(&lowered));

        let mut nodes = match template {
            Some(template) => {
                tracing::debug!(template = template.name, "workflow template matched");
                self.nodes_from_template(template)
            }
            None => self.nodes_from_intent(intent),
        };

        for (priority, node) in nodes.values_mut().enumerate() {
            node.priority = priority as i32;
            node.assigned_model = self.assign_model(node.task_type, available);
        }

        let execution_order = topological_batches(&nodes)?;
        Ok(WorkflowDag {
            nodes,
            execution_order,
        })
    }

    fn nodes_from_template(&self, template: &WorkflowTemplate) -> HashMap<String, TaskNode> {
        let mut nodes: HashMap<String, TaskNode> = template
            .tasks
            .iter()
            .map(|(task_type, description)| {
                let id = task_type.as_db_str().to_string();
                (id.clone(), TaskNode::new(id, *task_type, *description))
            })
            .collect();

        for (prerequisite, dependent) in template.deps {
            if let Some(node) = nodes.get_mut(dependent.as_db_str()) {
                node.dependencies.insert(prerequisite.as_db_str().to_string());
            }
        }
        nodes
    }

    /// One task per active intent (deduplicated by task type, strongest
    /// first), plus a trailing synthesis task when more than one.
    fn nodes_from_intent(&self, intent: &IntentVector) -> HashMap<String, TaskNode> {
        let mut nodes: HashMap<String, TaskNode> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for (need, confidence) in intent.active_needs(TASK_CONFIDENCE_GATE) {
            let task_type = task_for_intent(need);
            let id = task_type.as_db_str().to_string();
            if nodes.contains_key(&id) {
                continue;
            }
            order.push(id.clone());
            nodes.insert(
                id.clone(),
                TaskNode::new(
                    id,
                    task_type,
                    format!("Address the {} need (confidence {:.2})", need, confidence),
                ),
            );
        }

        if nodes.len() > 1 {
            let mut synthesis = TaskNode::new(
                TaskType::Synthesis.as_db_str(),
                TaskType::Synthesis,
                "Combine every task's result into one coherent answer",
            );
            for id in &order {
                synthesis.dependencies.insert(id.clone());
            }
            nodes.insert(synthesis.id.clone(), synthesis);
        }
        nodes
    }

    /// Best static skill for the task type; ties keep the earlier model in
    /// `available`.
    fn assign_model(&self, task_type: TaskType, available: &[ModelProfile]) -> Option<String> {
        let intent = skill_intent_for(task_type);
        let mut best: Option<(&ModelProfile, f32)> = None;
        for profile in available {
            let skill = self.matrix.skill(&profile.id, intent);
            if best.map(|(_, s)| skill > s).unwrap_or(true) {
                best = Some((profile, skill));
            }
        }
        best.map(|(profile, _)| profile.id.clone())
    }

    /// Execute the workflow batch by batch with intra-batch parallelism.
    ///
    /// A task runs only when every dependency completed; a failed
    /// dependency leaves its dependents `Blocked`, not failed. Task results
    /// and errors land on the nodes in place.
    pub async fn execute(
        &self,
        workflow: &mut WorkflowDag,
        query: &str,
        available: &[ModelProfile],
    ) -> ColloquyResult<TaskOutcome> {
        let provider_of: HashMap<&str, &str> = available
            .iter()
            .map(|p| (p.id.as_str(), p.provider.as_str()))
            .collect();
        let mut outcome = TaskOutcome::default();

        for batch in workflow.execution_order.clone() {
            let mut runnable = Vec::new();

            for id in &batch {
                let deps_ok = {
                    let node = workflow
                        .nodes
                        .get(id)
                        .ok_or_else(|| OrchestratorError::TaskNotFound { task_id: id.clone() })?;
                    node.dependencies.iter().all(|dep| {
                        workflow
                            .nodes
                            .get(dep)
                            .map(|d| d.status == TaskStatus::Completed)
                            .unwrap_or(false)
                    })
                };

                let prompt = deps_ok.then(|| self.task_prompt(workflow, id, query));
                let node = workflow.nodes.get_mut(id).expect("checked above");
                match prompt {
                    Some(prompt) => {
                        node.status = TaskStatus::Running;
                        let model = node.assigned_model.clone().unwrap_or_default();
                        let provider = provider_of.get(model.as_str()).copied().unwrap_or("openai");
                        runnable.push((id.clone(), provider.to_string(), model, prompt));
                    }
                    None => {
                        node.status = TaskStatus::Blocked;
                        outcome.blocked += 1;
                        tracing::debug!(task = %id, "task blocked by failed dependency");
                    }
                }
            }

            let calls = runnable.iter().map(|(id, provider, model, prompt)| {
                let registry = self.registry.clone();
                async move {
                    let result = async {
                        let adapter = registry.get(provider)?;
                        let request = ChatRequest::new(
                            model.clone(),
                            vec![ChatMessage::user(prompt.clone())],
                        );
                        adapter.chat(&request).await
                    }
                    .await;
                    (id.clone(), result)
                }
            });

            for (id, result) in join_all(calls).await {
                let node = workflow.nodes.get_mut(&id).expect("runnable node");
                match result {
                    Ok(response) => {
                        node.status = TaskStatus::Completed;
                        node.result = Some(response.content);
                        outcome.completed += 1;
                    }
                    Err(err) => {
                        tracing::warn!(task = %id, %err, "task failed");
                        node.status = TaskStatus::Failed;
                        node.error = Some(err.to_string());
                        outcome.failed += 1;
                    }
                }
            }
        }

        Ok(outcome)
    }

    fn task_prompt(&self, workflow: &WorkflowDag, id: &str, query: &str) -> String {
        let node = &workflow.nodes[id];
        let mut prompt = format!("Task: {}\n\nOverall goal: {}", node.description, query);

        let mut dep_sections = Vec::new();
        for dep in &node.dependencies {
            if let Some(dep_node) = workflow.nodes.get(dep) {
                if let Some(result) = &dep_node.result {
                    let budget = self.config.stage_context_budget_chars;
                    let body: String = result.chars().take(budget).collect();
                    dep_sections.push(format!("Result of {}:\n{}", dep_node.task_type, body));
                }
            }
        }
        if !dep_sections.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&dep_sections.join("\n\n"));
        }
        prompt
    }
}
