//! Request and response bodies for the HTTP API.

use colloquy_core::{
    CollabMessage, CollabRun, CollabStep, EntityId, StepFailure, Timestamp,
};
use colloquy_storage::{GlobalStats, ThreadStats, TurnRecord};
use serde::{Deserialize, Serialize};

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CollaborateRequest {
    pub message: String,
    /// Continue an existing thread; omitted starts a new one
    pub conversation_id: Option<EntityId>,
    /// Pipeline mode ("sequential", "enhanced", "anonymous", "swarm");
    /// defaults to the server's configured mode
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpRequest {
    pub conversation_id: EntityId,
    pub message: String,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaQuestionRequest {
    pub conversation_id: EntityId,
    pub question: String,
}

// ============================================================================
// RESPONSES
// ============================================================================

/// One pipeline step as exposed to API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutputResponse {
    pub run_id: EntityId,
    pub role: String,
    pub provider: String,
    pub model: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    pub created_at: Timestamp,
}

impl From<&CollabStep> for AgentOutputResponse {
    fn from(step: &CollabStep) -> Self {
        Self {
            run_id: step.run_id,
            role: step.role.to_string(),
            provider: step.provider.clone(),
            model: step.model.clone(),
            status: step.status.to_string(),
            content: step.content.clone(),
            error: step.error.clone(),
            latency_ms: step.latency_ms,
            created_at: step.created_at,
        }
    }
}

/// A reference the rewriter could not resolve on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationResponse {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborateResponse {
    pub conversation_id: EntityId,
    /// Absent when the request needs clarification first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<String>,
    pub steps: Vec<AgentOutputResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time_ms: Option<f64>,
    /// The message after coreference rewriting, when it changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ClarificationResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: EntityId,
    pub conversation_id: EntityId,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
    pub content: String,
    pub created_at: Timestamp,
}

impl From<&CollabMessage> for MessageResponse {
    fn from(message: &CollabMessage) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            role: message.role.to_string(),
            agent_role: message.agent_role.map(|r| r.to_string()),
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: EntityId,
    pub conversation_id: EntityId,
    pub mode: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time_ms: Option<f64>,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

impl From<&CollabRun> for RunResponse {
    fn from(run: &CollabRun) -> Self {
        Self {
            id: run.id,
            conversation_id: run.conversation_id,
            mode: run.mode.to_string(),
            status: run.status.to_string(),
            final_output: run.final_output.clone(),
            error: run.error.clone(),
            total_time_ms: run.total_time_ms,
            created_at: run.created_at,
            finished_at: run.finished_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub message: MessageResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunResponse>,
    pub steps: Vec<AgentOutputResponse>,
}

impl From<&TurnRecord> for TurnResponse {
    fn from(turn: &TurnRecord) -> Self {
        Self {
            message: MessageResponse::from(&turn.message),
            run: turn.run.as_ref().map(RunResponse::from),
            steps: turn.steps.iter().map(AgentOutputResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadStatsResponse {
    pub conversation_id: EntityId,
    pub message_count: i64,
    pub run_count: i64,
    pub completed_runs: i64,
    pub error_runs: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_run_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<Timestamp>,
}

impl From<&ThreadStats> for ThreadStatsResponse {
    fn from(stats: &ThreadStats) -> Self {
        Self {
            conversation_id: stats.conversation_id,
            message_count: stats.message_count,
            run_count: stats.run_count,
            completed_runs: stats.completed_runs,
            error_runs: stats.error_runs,
            avg_run_time_ms: stats.avg_run_time_ms,
            last_activity: stats.last_activity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStatsResponse {
    pub conversations: i64,
    pub messages: i64,
    pub runs: i64,
    pub steps: i64,
    pub completed_runs: i64,
    pub error_runs: i64,
}

impl From<GlobalStats> for GlobalStatsResponse {
    fn from(stats: GlobalStats) -> Self {
        Self {
            conversations: stats.conversations,
            messages: stats.messages,
            runs: stats.runs,
            steps: stats.steps,
            completed_runs: stats.completed_runs,
            error_runs: stats.error_runs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaQuestionResponse {
    pub answer: String,
    pub stats: ThreadStatsResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub providers: Vec<String>,
}
