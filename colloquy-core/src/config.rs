//! Engine configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the decision engine: classifier/router thresholds, pipeline
/// context budgets, lattice capacity, and session retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Character budget for prior-stage context persisted on a step
    pub stage_context_budget_chars: usize,

    /// Minimum confidence for the router to consider an intent at all
    pub route_confidence_gate: f32,
    /// Minimum weighted score for an intent to be assigned to a model
    pub route_assignment_threshold: f32,
    /// Complexity above which large context windows earn a bonus
    pub route_complexity_bonus_gate: f32,
    /// Context window size (tokens) above which the bonus applies
    pub route_large_window_tokens: i64,
    /// Score bonus for large-window models on complex queries
    pub route_window_bonus: f32,
    /// Weight of historical reward vs static skill when blending routing
    /// scores. 0 = pure static matrix, 1 = pure observed reward.
    pub route_reward_blend: f32,

    /// Maximum insights held before eviction triggers
    pub lattice_max_insights: usize,
    /// Fraction of oldest insights evicted when over capacity
    pub lattice_cleanup_fraction: f32,
    /// Word-set Jaccard overlap above which same-type insights merge
    pub lattice_duplicate_threshold: f32,
    /// Relationship score above which a bidirectional edge is created
    pub lattice_relationship_threshold: f32,
    /// Combined contradiction score above which a contradiction is flagged
    pub lattice_contradiction_threshold: f32,
    /// Recency half-life for context ranking
    pub lattice_recency_half_life: Duration,

    /// Parallel synthesis candidates in anonymous mode
    pub anonymous_candidates: usize,

    /// How long a coreference entity stays resolvable
    pub entity_window: Duration,

    /// Idle lifetime of a session before the store evicts it
    pub session_ttl: Duration,
    /// Maximum number of live sessions
    pub max_sessions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stage_context_budget_chars: 2000,
            route_confidence_gate: 0.1,
            route_assignment_threshold: 0.3,
            route_complexity_bonus_gate: 0.7,
            route_large_window_tokens: 50_000,
            route_window_bonus: 0.2,
            route_reward_blend: 0.3,
            lattice_max_insights: 1000,
            lattice_cleanup_fraction: 0.1,
            lattice_duplicate_threshold: 0.8,
            lattice_relationship_threshold: 0.5,
            lattice_contradiction_threshold: 0.5,
            lattice_recency_half_life: Duration::from_secs(3600),
            anonymous_candidates: 3,
            entity_window: Duration::from_secs(72 * 3600),
            session_ttl: Duration::from_secs(2 * 3600),
            max_sessions: 1024,
        }
    }
}

impl EngineConfig {
    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "must be within [0, 1]".to_string(),
                });
            }
            Ok(())
        }

        unit("route_confidence_gate", self.route_confidence_gate)?;
        unit("route_assignment_threshold", self.route_assignment_threshold)?;
        unit("route_complexity_bonus_gate", self.route_complexity_bonus_gate)?;
        unit("route_reward_blend", self.route_reward_blend)?;
        unit("lattice_cleanup_fraction", self.lattice_cleanup_fraction)?;
        unit("lattice_duplicate_threshold", self.lattice_duplicate_threshold)?;
        unit(
            "lattice_relationship_threshold",
            self.lattice_relationship_threshold,
        )?;
        unit(
            "lattice_contradiction_threshold",
            self.lattice_contradiction_threshold,
        )?;

        if self.stage_context_budget_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stage_context_budget_chars".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.lattice_max_insights == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lattice_max_insights".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.anonymous_candidates == 0 {
            return Err(ConfigError::InvalidValue {
                field: "anonymous_candidates".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_sessions".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(())
    }
}
