//! COLLOQUY Core - Entity Types
//!
//! Pure data structures shared by every other crate: identifiers, enums,
//! run/insight/task entities, the intent vector, chat primitives, and the
//! error taxonomy. This crate contains ONLY data types - no business logic
//! and no I/O.

use sha2::{Digest, Sha256};

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod intent;
pub mod llm;

pub use config::EngineConfig;
pub use entities::{
    AgentOutput, CollabMessage, CollabRun, CollabStep, Contradiction, Conversation, Insight,
    StepFailure, TrackedEntity, TaskNode, WorkflowDag,
};
pub use enums::{
    AgentRole, ConflictType, InsightType, MessageRole, PipelineMode, ResolutionStatus, RunStatus,
    StepStatus, TaskStatus, TaskType,
};
pub use error::{
    ColloquyError, ColloquyResult, ConfigError, LatticeError, OrchestratorError, PipelineError,
    ProviderError, RoutingError, StorageError,
};
pub use intent::{IntentType, IntentVector};
pub use llm::{ChatMessage, ChatRequest, ChatRole, ProviderResponse, StreamEvent, TokenUsage};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// SHA-256 content hash for deduplication and stable insight ids.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    uuid::Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Hex-encode the first `bytes` bytes of a content hash.
/// Used for short, stable, human-greppable insight ids.
pub fn short_hash_hex(hash: &ContentHash, bytes: usize) -> String {
    let take = bytes.min(hash.len());
    hash[..take].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = compute_content_hash(b"the same content");
        let b = compute_content_hash(b"the same content");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_hash_differs() {
        let a = compute_content_hash(b"content a");
        let b = compute_content_hash(b"content b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_hash_hex_length() {
        let hash = compute_content_hash(b"anything");
        assert_eq!(short_hash_hex(&hash, 8).len(), 16);
        assert_eq!(short_hash_hex(&hash, 64).len(), 64); // capped at hash size
    }

    #[test]
    fn test_entity_ids_are_sortable_by_time() {
        let first = new_entity_id();
        let second = new_entity_id();
        // UUIDv7 embeds a millisecond timestamp; ids created later never sort earlier.
        assert!(first <= second);
    }
}
