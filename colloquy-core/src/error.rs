//! Error types for COLLOQUY operations

use thiserror::Error;
use uuid::Uuid;

/// LLM provider errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Provider not registered: {provider}")]
    NotRegistered { provider: String },

    #[error("No API key configured for provider {provider}")]
    MissingApiKey { provider: String },

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Stream from {provider} ended unexpectedly: {reason}")]
    StreamInterrupted { provider: String, reason: String },

    #[error("Call to {provider}/{model} timed out after {timeout_ms}ms")]
    Timeout {
        provider: String,
        model: String,
        timeout_ms: u64,
    },

    #[error("Fallback ladder exhausted after {attempts} attempts: {last_error}")]
    LadderExhausted { attempts: usize, last_error: String },
}

/// Model routing errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RoutingError {
    #[error("No model cleared the assignment threshold for any active intent")]
    NoCandidates,

    #[error("Unknown model in skill matrix: {model_id}")]
    UnknownModel { model_id: String },
}

/// Pipeline execution errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Stage {stage} ({role}) failed on {provider}: {message}")]
    StageFailed {
        stage: usize,
        role: String,
        provider: String,
        /// Short machine-readable kind ("request_failed", "timeout", ...)
        error_type: String,
        message: String,
    },

    #[error("Pipeline has no stages configured")]
    EmptyPipeline,

    #[error("All {count} candidates failed for stage {stage}")]
    AllCandidatesFailed { stage: usize, count: usize },
}

/// Memory lattice errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LatticeError {
    #[error("Insight not found: {id}")]
    InsightNotFound { id: String },

    #[error("Contradiction not found: {id}")]
    ContradictionNotFound { id: String },

    #[error("Contradiction {id} is already resolved")]
    AlreadyResolved { id: String },
}

/// Task orchestration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrchestratorError {
    #[error("Dependency cycle detected among tasks: {remaining:?}")]
    CycleDetected { remaining: Vec<String> },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Task {task_id} depends on unknown task {dependency}")]
    UnknownDependency { task_id: String, dependency: String },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: Uuid },

    #[error("Run not found: {id}")]
    RunNotFound { id: Uuid },

    #[error("Step not found: {id}")]
    StepNotFound { id: Uuid },

    #[error("Message not found: {id}")]
    MessageNotFound { id: Uuid },

    #[error("Insert failed for {entity}: {reason}")]
    InsertFailed { entity: String, reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level error type unifying all COLLOQUY error domains.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ColloquyError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Lattice(#[from] LatticeError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias used throughout COLLOQUY.
pub type ColloquyResult<T> = Result<T, ColloquyError>;
