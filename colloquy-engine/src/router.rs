//! Model routing.
//!
//! Maps an intent vector onto a ranked list of candidate models using a
//! static skill matrix (model x intent -> 0-10), weighted by classifier
//! confidence, with a performance bonus from a fixed latency/accuracy table
//! and a context-window bonus for complex queries. Optionally blends the
//! static skill with observed historical reward.
//!
//! Ties are broken by the input order of `available` (the sort is stable),
//! which keeps routing deterministic for a fixed catalog.

use colloquy_core::{EngineConfig, IntentType, IntentVector};
use std::collections::{BTreeMap, HashMap};

/// Skill assumed for a model the matrix has no row for.
const DEFAULT_SKILL: f32 = 5.0;

/// Latency under which a model earns the fast-response bonus.
const FAST_LATENCY_MS: f64 = 1500.0;

// ============================================================================
// MODEL CATALOG
// ============================================================================

/// Static facts about one routable model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    pub id: String,
    pub provider: String,
    pub context_window_tokens: i64,
    pub avg_latency_ms: f64,
    /// Benchmark-derived quality estimate in [0, 1]
    pub accuracy: f32,
}

impl ModelProfile {
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        context_window_tokens: i64,
        avg_latency_ms: f64,
        accuracy: f32,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            context_window_tokens,
            avg_latency_ms,
            accuracy: accuracy.clamp(0.0, 1.0),
        }
    }

    /// The default catalog: one flagship model per supported provider.
    pub fn catalog() -> Vec<ModelProfile> {
        vec![
            ModelProfile::new("gpt-4o", "openai", 128_000, 1800.0, 0.88),
            ModelProfile::new("gemini-2.5-pro", "gemini", 1_000_000, 2400.0, 0.87),
            ModelProfile::new("sonar-pro", "perplexity", 127_000, 2100.0, 0.82),
            ModelProfile::new("kimi-k2", "moonshot", 128_000, 2600.0, 0.80),
            ModelProfile::new(
                "deepseek/deepseek-chat",
                "openrouter",
                64_000,
                1400.0,
                0.78,
            ),
        ]
    }
}

// ============================================================================
// SKILL MATRIX
// ============================================================================

/// Static model x intent skill table, scores 0-10.
#[derive(Debug, Clone, Default)]
pub struct SkillMatrix {
    rows: HashMap<String, BTreeMap<IntentType, f32>>,
}

impl SkillMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table covering the default catalog.
    pub fn builtin() -> Self {
        use IntentType::*;
        let mut matrix = Self::new();

        matrix.set_row(
            "gpt-4o",
            &[
                (Research, 6.5),
                (Generate, 9.0),
                (Debug, 8.8),
                (Refactor, 8.7),
                (Explain, 9.0),
                (Summarize, 8.5),
                (Translate, 8.0),
                (Brainstorm, 8.3),
                (Plan, 8.6),
                (Review, 8.8),
            ],
        );
        matrix.set_row(
            "gemini-2.5-pro",
            &[
                (Research, 7.5),
                (Generate, 8.5),
                (Debug, 8.2),
                (Refactor, 8.0),
                (Explain, 8.7),
                (Summarize, 9.2),
                (Translate, 9.0),
                (Brainstorm, 8.0),
                (Plan, 8.4),
                (Review, 8.2),
            ],
        );
        matrix.set_row(
            "sonar-pro",
            &[
                (Research, 9.8),
                (Generate, 6.0),
                (Debug, 5.5),
                (Refactor, 5.0),
                (Explain, 7.5),
                (Summarize, 7.8),
                (Translate, 6.0),
                (Brainstorm, 6.5),
                (Plan, 6.8),
                (Review, 6.2),
            ],
        );
        matrix.set_row(
            "kimi-k2",
            &[
                (Research, 6.8),
                (Generate, 8.2),
                (Debug, 7.8),
                (Refactor, 7.5),
                (Explain, 7.9),
                (Summarize, 8.0),
                (Translate, 8.8),
                (Brainstorm, 7.6),
                (Plan, 7.4),
                (Review, 7.2),
            ],
        );
        matrix.set_row(
            "deepseek/deepseek-chat",
            &[
                (Research, 5.8),
                (Generate, 8.0),
                (Debug, 8.4),
                (Refactor, 8.2),
                (Explain, 7.4),
                (Summarize, 7.0),
                (Translate, 6.5),
                (Brainstorm, 7.0),
                (Plan, 7.1),
                (Review, 7.8),
            ],
        );

        matrix
    }

    pub fn set_row(&mut self, model_id: impl Into<String>, skills: &[(IntentType, f32)]) {
        let row = skills
            .iter()
            .map(|(intent, score)| (*intent, score.clamp(0.0, 10.0)))
            .collect();
        self.rows.insert(model_id.into(), row);
    }

    /// Skill score for a model/intent pair; unknown models score
    /// [`DEFAULT_SKILL`] everywhere.
    pub fn skill(&self, model_id: &str, intent: IntentType) -> f32 {
        self.rows
            .get(model_id)
            .and_then(|row| row.get(&intent))
            .copied()
            .unwrap_or(DEFAULT_SKILL)
    }

    pub fn knows(&self, model_id: &str) -> bool {
        self.rows.contains_key(model_id)
    }
}

// ============================================================================
// HISTORICAL REWARD
// ============================================================================

/// Running per-model reward averages, fed back from run outcomes.
///
/// The blend with static skill is a single named formula:
/// `effective_skill = (1 - w) * static_skill + w * 10 * avg_reward`
/// where `w` is `EngineConfig::route_reward_blend` and `avg_reward` is the
/// model's mean observed reward in [0, 1]. Unobserved models use the static
/// skill unchanged.
#[derive(Debug, Clone, Default)]
pub struct RewardTracker {
    observations: HashMap<String, (f64, u64)>,
}

impl RewardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed reward in [0, 1] for a model.
    pub fn record(&mut self, model_id: impl Into<String>, reward: f32) {
        let entry = self.observations.entry(model_id.into()).or_insert((0.0, 0));
        entry.0 += reward.clamp(0.0, 1.0) as f64;
        entry.1 += 1;
    }

    /// Mean observed reward, None when the model was never observed.
    pub fn average(&self, model_id: &str) -> Option<f32> {
        self.observations
            .get(model_id)
            .map(|(sum, count)| (*sum / *count as f64) as f32)
    }

    pub fn observation_count(&self, model_id: &str) -> u64 {
        self.observations.get(model_id).map(|(_, c)| *c).unwrap_or(0)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// One ranked routing candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCandidate {
    pub model_id: String,
    pub provider: String,
    pub score: f32,
    /// Intents this model was assigned, strongest contribution first
    pub assigned_intents: Vec<IntentType>,
}

/// Intent-to-model router over a skill matrix.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    matrix: SkillMatrix,
    config: EngineConfig,
}

impl ModelRouter {
    pub fn new(matrix: SkillMatrix, config: EngineConfig) -> Self {
        Self { matrix, config }
    }

    pub fn with_builtin_matrix(config: EngineConfig) -> Self {
        Self::new(SkillMatrix::builtin(), config)
    }

    /// Rank `available` models for this intent vector.
    ///
    /// Returns an empty list when no model clears the assignment threshold
    /// for any intent - the caller is responsible for falling back to a
    /// default model.
    pub fn route(
        &self,
        intent: &IntentVector,
        available: &[ModelProfile],
        max_models: usize,
        rewards: Option<&RewardTracker>,
    ) -> Vec<RouteCandidate> {
        let active: Vec<(IntentType, f32)> =
            intent.active_needs(self.config.route_confidence_gate);

        let mut candidates = Vec::new();
        for profile in available {
            let mut total = 0.0f32;
            let mut assigned: Vec<(IntentType, f32)> = Vec::new();

            for (need, confidence) in &active {
                let skill = self.effective_skill(&profile.id, *need, rewards);
                let intent_score = confidence * (skill / 10.0);
                if intent_score > self.config.route_assignment_threshold {
                    total += intent_score;
                    assigned.push((*need, intent_score));
                }
            }

            // Models with no assigned intents are dropped outright.
            if assigned.is_empty() {
                continue;
            }

            total += self.performance_bonus(profile);

            if intent.complexity > self.config.route_complexity_bonus_gate
                && profile.context_window_tokens > self.config.route_large_window_tokens
            {
                total += self.config.route_window_bonus;
            }

            assigned.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            candidates.push(RouteCandidate {
                model_id: profile.id.clone(),
                provider: profile.provider.clone(),
                score: total,
                assigned_intents: assigned.into_iter().map(|(i, _)| i).collect(),
            });
        }

        // Stable sort: equal scores keep catalog order.
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(max_models);

        tracing::debug!(
            candidates = candidates.len(),
            top = candidates.first().map(|c| c.model_id.as_str()).unwrap_or("-"),
            "routed intent vector"
        );
        candidates
    }

    fn effective_skill(
        &self,
        model_id: &str,
        intent: IntentType,
        rewards: Option<&RewardTracker>,
    ) -> f32 {
        let static_skill = self.matrix.skill(model_id, intent);
        let Some(avg) = rewards.and_then(|t| t.average(model_id)) else {
            return static_skill;
        };

        let w = self.config.route_reward_blend;
        (1.0 - w) * static_skill + w * 10.0 * avg
    }

    /// Fixed bonus from the latency/accuracy table: accurate models earn up
    /// to +0.1, fast ones another +0.05.
    fn performance_bonus(&self, profile: &ModelProfile) -> f32 {
        let mut bonus = profile.accuracy * 0.1;
        if profile.avg_latency_ms < FAST_LATENCY_MS {
            bonus += 0.05;
        }
        bonus
    }
}
