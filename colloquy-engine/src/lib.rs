//! COLLOQUY Engine - Decision Logic
//!
//! The parts of the system that decide things, all synchronous in-memory
//! computation except where the pipeline and orchestrator await provider
//! calls:
//! - Intent classification: keyword/regex scoring into an intent vector
//! - Model routing: intent vector x static skill matrix, with a tunable
//!   historical-reward blend
//! - Pipeline execution: one configurable engine covering the sequential,
//!   enhanced, anonymous, and swarm modes
//! - Memory lattice: insight dedup, relationship and contradiction
//!   bookkeeping, context compression
//! - Task orchestration: workflow templates, topological batching, per-task
//!   model assignment
//! - Coreference rewriting: pronoun resolution against session entities
//! - Session store: per-session state handles with TTL eviction

pub mod classifier;
pub mod lattice;
pub mod orchestrator;
pub mod pipeline;
pub mod rewrite;
pub mod router;
pub mod session;
pub mod thinking;

pub use classifier::IntentClassifier;
pub use lattice::{LatticeStats, MemoryLattice};
pub use orchestrator::{TaskOrchestrator, TaskOutcome};
pub use pipeline::{
    FanoutPolicy, PipelineConfig, PipelineEngine, PipelineRun, StageDefinition, StageTarget,
};
pub use rewrite::{CoreferenceRewriter, Disambiguation, EntityTracker, Referent, RewriteResult};
pub use router::{ModelProfile, ModelRouter, RewardTracker, RouteCandidate, SkillMatrix};
pub use session::{SessionHandle, SessionState, SessionStore};
pub use thinking::extract_thinking;
