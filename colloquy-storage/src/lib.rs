//! COLLOQUY Storage - Persistence Layer
//!
//! Defines the storage abstraction for conversations, runs, steps, and
//! messages. [`MockStorage`] backs tests and keyless local runs;
//! [`PgStorage`] is the PostgreSQL implementation (schema in
//! `schema.sql`, cascade deletes from conversations downward).

pub mod mock;
pub mod postgres;

pub use mock::MockStorage;
pub use postgres::{PgConfig, PgStorage};

use async_trait::async_trait;
use colloquy_core::{
    CollabMessage, CollabRun, CollabStep, ColloquyResult, Conversation, EntityId, Timestamp,
};

// ============================================================================
// READ MODELS
// ============================================================================

/// One user turn: the triggering message, the run it started (if any), and
/// that run's steps in order.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRecord {
    pub message: CollabMessage,
    pub run: Option<CollabRun>,
    pub steps: Vec<CollabStep>,
}

/// Per-conversation aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadStats {
    pub conversation_id: EntityId,
    pub message_count: i64,
    pub run_count: i64,
    pub completed_runs: i64,
    pub error_runs: i64,
    pub avg_run_time_ms: Option<f64>,
    pub last_activity: Option<Timestamp>,
}

/// Store-wide aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalStats {
    pub conversations: i64,
    pub messages: i64,
    pub runs: i64,
    pub steps: i64,
    pub completed_runs: i64,
    pub error_runs: i64,
}

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Persistence operations for the collaboration data model.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Storage: Send + Sync {
    // Conversations
    async fn create_conversation(&self, conversation: &Conversation) -> ColloquyResult<()>;
    async fn get_conversation(&self, id: EntityId) -> ColloquyResult<Conversation>;
    /// Bump `updated_at` to now.
    async fn touch_conversation(&self, id: EntityId) -> ColloquyResult<()>;
    /// Cascade delete: messages, runs, and steps go with the conversation.
    async fn delete_conversation(&self, id: EntityId) -> ColloquyResult<()>;

    // Messages
    async fn insert_message(&self, message: &CollabMessage) -> ColloquyResult<()>;
    async fn get_message(&self, id: EntityId) -> ColloquyResult<CollabMessage>;
    /// Messages of a conversation, oldest first.
    async fn list_messages(&self, conversation_id: EntityId) -> ColloquyResult<Vec<CollabMessage>>;

    // Runs
    async fn insert_run(&self, run: &CollabRun) -> ColloquyResult<()>;
    async fn get_run(&self, id: EntityId) -> ColloquyResult<CollabRun>;
    /// Rewrite a run. Status changes must follow the run state machine.
    async fn update_run(&self, run: &CollabRun) -> ColloquyResult<()>;
    /// Runs of a conversation, oldest first.
    async fn list_runs(&self, conversation_id: EntityId) -> ColloquyResult<Vec<CollabRun>>;

    // Steps
    async fn insert_step(&self, step: &CollabStep) -> ColloquyResult<()>;
    /// Rewrite a step. Status changes must follow the step state machine.
    async fn update_step(&self, step: &CollabStep) -> ColloquyResult<()>;
    /// Steps of a run, by position.
    async fn list_steps(&self, run_id: EntityId) -> ColloquyResult<Vec<CollabStep>>;
    /// Every step across a conversation's runs, run order then position.
    async fn list_agent_steps(&self, conversation_id: EntityId)
        -> ColloquyResult<Vec<CollabStep>>;

    // Read models
    async fn get_turn(&self, message_id: EntityId) -> ColloquyResult<TurnRecord>;
    async fn thread_stats(&self, conversation_id: EntityId) -> ColloquyResult<ThreadStats>;
    async fn global_stats(&self) -> ColloquyResult<GlobalStats>;
}
