//! Memory lattice: session-scoped insight store with duplicate merging,
//! relationship edges, contradiction bookkeeping, and context compression.
//!
//! All detection is word-overlap arithmetic against every existing insight,
//! O(n) per insertion. That is acceptable because a session holds at most
//! hundreds of insights; the lattice self-limits via `max_insights` and
//! evicts the oldest slice when exceeded.

use chrono::Utc;
use colloquy_core::{
    Contradiction, ConflictType, EngineConfig, EntityId, Insight, InsightType, IntentType,
    IntentVector, LatticeError,
};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Antonym pairs checked for cross-presence between two insights.
const ANTONYM_PAIRS: &[(&str, &str)] = &[
    ("can", "cannot"),
    ("is", "not"),
    ("always", "never"),
    ("true", "false"),
    ("secure", "insecure"),
    ("safe", "unsafe"),
    ("fast", "slow"),
    ("increases", "decreases"),
    ("works", "fails"),
    ("possible", "impossible"),
];

/// Words stripped by the negation-substring heuristic.
const NEGATION_WORDS: &[&str] = &["not", "never", "cannot", "no"];

/// How many top-ranked insights context compression considers.
const CONTEXT_TOP_K: usize = 20;

fn word_set(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Whether one statement reads as the direct negation of the other:
/// exactly one side carries a negation word, and stripping negation words
/// leaves identical word sets.
fn negation_of(a: &str, b: &str) -> bool {
    let is_negation = |w: &String| NEGATION_WORDS.contains(&w.as_str());
    let a_words = word_set(a);
    let b_words = word_set(b);

    let a_negated = a_words.iter().any(is_negation);
    let b_negated = b_words.iter().any(is_negation);
    if a_negated == b_negated {
        return false;
    }

    let strip = |words: BTreeSet<String>| -> BTreeSet<String> {
        words.into_iter().filter(|w| !is_negation(w)).collect()
    };
    strip(a_words) == strip(b_words)
}

/// Counts reported by [`MemoryLattice::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeStats {
    pub insights: usize,
    pub contradictions: usize,
    pub unresolved_contradictions: usize,
    pub evicted_total: usize,
}

/// In-process insight store for one session.
pub struct MemoryLattice {
    insights: HashMap<String, Insight>,
    /// Ids in insertion order; eviction pops from the front
    insertion_order: VecDeque<String>,
    contradictions: Vec<Contradiction>,
    type_index: HashMap<InsightType, BTreeSet<String>>,
    intent_index: HashMap<IntentType, BTreeSet<String>>,
    evicted_total: usize,

    max_insights: usize,
    cleanup_fraction: f32,
    duplicate_threshold: f32,
    relationship_threshold: f32,
    contradiction_threshold: f32,
    recency_half_life_secs: f32,
}

impl MemoryLattice {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            insights: HashMap::new(),
            insertion_order: VecDeque::new(),
            contradictions: Vec::new(),
            type_index: HashMap::new(),
            intent_index: HashMap::new(),
            evicted_total: 0,
            max_insights: config.lattice_max_insights,
            cleanup_fraction: config.lattice_cleanup_fraction,
            duplicate_threshold: config.lattice_duplicate_threshold,
            relationship_threshold: config.lattice_relationship_threshold,
            contradiction_threshold: config.lattice_contradiction_threshold,
            recency_half_life_secs: config.lattice_recency_half_life.as_secs_f32().max(1.0),
        }
    }

    pub fn len(&self) -> usize {
        self.insights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Insight> {
        self.insights.get(id)
    }

    pub fn contradictions(&self) -> &[Contradiction] {
        &self.contradictions
    }

    pub fn stats(&self) -> LatticeStats {
        LatticeStats {
            insights: self.insights.len(),
            contradictions: self.contradictions.len(),
            unresolved_contradictions: self
                .contradictions
                .iter()
                .filter(|c| c.resolution_status == colloquy_core::ResolutionStatus::Unresolved)
                .count(),
            evicted_total: self.evicted_total,
        }
    }

    /// Insert an insight, returning the id it now lives under.
    ///
    /// A near-duplicate (same type, word-set Jaccard above the duplicate
    /// threshold) merges into the existing insight instead of growing the
    /// lattice: its `validation_count` goes up by one and its confidence is
    /// nudged. Otherwise the insight is indexed, relationship and
    /// contradiction detection run against every existing insight, and a
    /// capacity check may evict the oldest slice.
    pub fn add_insight(&mut self, insight: Insight) -> String {
        let mut insight = insight;
        let words = word_set(&insight.content);

        // Identical type + content hashes to the same id: always a merge.
        if self.insights.contains_key(&insight.id) {
            let existing = self.insights.get_mut(&insight.id).expect("id present");
            existing.validation_count += 1;
            existing.confidence = (existing.confidence + 0.1).min(1.0);
            return insight.id;
        }

        if let Some(existing_id) = self.find_duplicate(&insight, &words) {
            let existing = self
                .insights
                .get_mut(&existing_id)
                .expect("duplicate id indexed");
            existing.validation_count += 1;
            existing.confidence = (existing.confidence + 0.1).min(1.0);
            tracing::debug!(id = %existing_id, "insight merged into duplicate");
            return existing_id;
        }

        let id = insight.id.clone();
        self.detect_relationships(&mut insight, &words);
        self.detect_contradictions(&mut insight, &words);

        self.type_index
            .entry(insight.insight_type)
            .or_default()
            .insert(id.clone());
        for intent in &insight.intent_types {
            self.intent_index.entry(*intent).or_default().insert(id.clone());
        }
        self.insertion_order.push_back(id.clone());
        self.insights.insert(id.clone(), insight);

        if self.insights.len() > self.max_insights {
            self.evict_oldest();
        }
        id
    }

    /// Mark a contradiction resolved with an explanation.
    pub fn resolve_contradiction(
        &mut self,
        contradiction_id: EntityId,
        resolution: impl Into<String>,
    ) -> Result<(), LatticeError> {
        let record = self
            .contradictions
            .iter_mut()
            .find(|c| c.id == contradiction_id)
            .ok_or(LatticeError::ContradictionNotFound {
                id: contradiction_id.to_string(),
            })?;

        if record.resolution_status == colloquy_core::ResolutionStatus::Resolved {
            return Err(LatticeError::AlreadyResolved {
                id: contradiction_id.to_string(),
            });
        }
        record.resolution_status = colloquy_core::ResolutionStatus::Resolved;
        record.resolution = Some(resolution.into());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Detection passes
    // ------------------------------------------------------------------

    fn find_duplicate(&self, insight: &Insight, words: &BTreeSet<String>) -> Option<String> {
        let same_type = self.type_index.get(&insight.insight_type)?;

        same_type
            .iter()
            .filter_map(|id| {
                let existing = self.insights.get(id)?;
                let overlap = jaccard(words, &word_set(&existing.content));
                (overlap > self.duplicate_threshold).then_some((id.clone(), overlap))
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, _)| id)
    }

    /// Pairwise relationship score against every existing insight:
    /// `0.3 x intent_overlap + word_jaccard + 0.1 x source_affinity +
    /// 0.2 x same_type`; above the threshold creates a bidirectional edge.
    fn detect_relationships(&mut self, insight: &mut Insight, words: &BTreeSet<String>) {
        let incoming_intents: BTreeSet<IntentType> = insight.intent_types.iter().copied().collect();
        let mut related = Vec::new();

        for (id, existing) in &self.insights {
            let existing_intents: BTreeSet<IntentType> =
                existing.intent_types.iter().copied().collect();
            let intent_union = incoming_intents.union(&existing_intents).count();
            let intent_overlap = if intent_union == 0 {
                0.0
            } else {
                incoming_intents.intersection(&existing_intents).count() as f32
                    / intent_union as f32
            };

            let mut score = 0.3 * intent_overlap + jaccard(words, &word_set(&existing.content));
            if existing.source_model == insight.source_model {
                score += 0.1;
            }
            if existing.insight_type == insight.insight_type {
                score += 0.2;
            }

            if score > self.relationship_threshold {
                related.push(id.clone());
            }
        }

        for id in related {
            if let Some(existing) = self.insights.get_mut(&id) {
                existing.related_insights.insert(insight.id.clone());
            }
            insight.related_insights.insert(id);
        }
    }

    /// Antonym cross-presence plus a negation-substring check, weighted by
    /// topical overlap so unrelated statements don't collide.
    fn detect_contradictions(&mut self, insight: &mut Insight, words: &BTreeSet<String>) {
        let mut found = Vec::new();

        for (id, existing) in &self.insights {
            let existing_words = word_set(&existing.content);
            let topical = jaccard(words, &existing_words);

            let mut score = topical * 0.3;
            let mut conflict_type = ConflictType::Factual;

            for (a, b) in ANTONYM_PAIRS {
                let cross = (words.contains(*a) && existing_words.contains(*b))
                    || (words.contains(*b) && existing_words.contains(*a));
                if cross {
                    score += 0.4;
                    if *a == "can" {
                        conflict_type = ConflictType::Capability;
                    }
                    break;
                }
            }

            if negation_of(&insight.content, &existing.content) {
                score += 0.5;
                conflict_type = ConflictType::Negation;
            }

            if score > self.contradiction_threshold {
                found.push((id.clone(), conflict_type, score.min(1.0)));
            }
        }

        for (existing_id, conflict_type, severity) in found {
            tracing::debug!(
                a = %insight.id,
                b = %existing_id,
                severity,
                "contradiction detected"
            );
            self.contradictions.push(Contradiction::new(
                insight.id.clone(),
                existing_id.clone(),
                conflict_type,
                severity,
                "lattice",
            ));
            if let Some(existing) = self.insights.get_mut(&existing_id) {
                existing.contradicts.insert(insight.id.clone());
            }
            insight.contradicts.insert(existing_id);
        }
    }

    fn evict_oldest(&mut self) {
        let cleanup = ((self.max_insights as f32 * self.cleanup_fraction) as usize).max(1);

        for _ in 0..cleanup {
            let Some(id) = self.insertion_order.pop_front() else {
                break;
            };
            let Some(evicted) = self.insights.remove(&id) else {
                continue;
            };

            if let Some(ids) = self.type_index.get_mut(&evicted.insight_type) {
                ids.remove(&id);
            }
            for intent in &evicted.intent_types {
                if let Some(ids) = self.intent_index.get_mut(intent) {
                    ids.remove(&id);
                }
            }
            for insight in self.insights.values_mut() {
                insight.related_insights.remove(&id);
                insight.contradicts.remove(&id);
            }
            self.evicted_total += 1;
            tracing::debug!(%id, "insight evicted at capacity");
        }
    }

    // ------------------------------------------------------------------
    // Context compression
    // ------------------------------------------------------------------

    /// Build a compressed context blurb for a query, bounded by an
    /// approximate token budget (word count x 1.3; hard character slice
    /// when over).
    pub fn get_relevant_context(
        &self,
        query: &str,
        intent: &IntentVector,
        max_tokens: usize,
    ) -> String {
        if self.insights.is_empty() || max_tokens == 0 {
            return String::new();
        }

        let query_words = word_set(query);
        let active: BTreeSet<IntentType> = intent
            .active_needs(0.1)
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        let now = Utc::now();

        let mut ranked: Vec<(&Insight, f32)> = self
            .insights
            .values()
            .map(|insight| {
                let overlap = jaccard(&query_words, &word_set(&insight.content));

                let alignment = if insight.intent_types.is_empty() || active.is_empty() {
                    0.0
                } else {
                    insight
                        .intent_types
                        .iter()
                        .filter(|i| active.contains(i))
                        .count() as f32
                        / insight.intent_types.len() as f32
                };

                let age_secs = (now - insight.created_at).num_seconds().max(0) as f32;
                let recency = 0.5f32.powf(age_secs / self.recency_half_life_secs);

                let score =
                    0.4 * overlap + 0.3 * alignment + 0.1 * recency + 0.2 * insight.confidence;
                (insight, score)
            })
            .collect();

        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(CONTEXT_TOP_K);

        let rendered = self.render_context(&ranked);
        truncate_to_token_budget(rendered, max_tokens)
    }

    fn render_context(&self, ranked: &[(&Insight, f32)]) -> String {
        let picked: BTreeSet<&str> = ranked.iter().map(|(i, _)| i.id.as_str()).collect();
        let mut sections = Vec::new();

        let warnings: Vec<String> = ranked
            .iter()
            .filter(|(i, _)| i.insight_type == InsightType::Warning)
            .map(|(i, _)| format!("- {}", i.content))
            .collect();
        if !warnings.is_empty() {
            sections.push(format!("## Warnings\n{}", warnings.join("\n")));
        }

        let conflicts: Vec<String> = self
            .contradictions
            .iter()
            .filter(|c| {
                c.resolution_status != colloquy_core::ResolutionStatus::Resolved
                    && (picked.contains(c.insight_a.as_str())
                        || picked.contains(c.insight_b.as_str()))
            })
            .filter_map(|c| {
                let a = self.insights.get(&c.insight_a)?;
                let b = self.insights.get(&c.insight_b)?;
                Some(format!(
                    "- \"{}\" conflicts with \"{}\" (severity {:.1})",
                    a.content, b.content, c.severity
                ))
            })
            .collect();
        if !conflicts.is_empty() {
            sections.push(format!("## Contradictions\n{}", conflicts.join("\n")));
        }

        let facts: Vec<String> = ranked
            .iter()
            .filter(|(i, _)| i.insight_type == InsightType::Fact && i.validation_count > 0)
            .map(|(i, _)| format!("- {} (validated x{})", i.content, i.validation_count + 1))
            .collect();
        if !facts.is_empty() {
            sections.push(format!("## Key facts\n{}", facts.join("\n")));
        }

        let rest: Vec<String> = ranked
            .iter()
            .filter(|(i, _)| {
                i.insight_type != InsightType::Warning
                    && !(i.insight_type == InsightType::Fact && i.validation_count > 0)
            })
            .map(|(i, _)| format!("- {}", i.content))
            .collect();
        if !rest.is_empty() {
            sections.push(format!("## Insights\n{}", rest.join("\n")));
        }

        sections.join("\n\n")
    }
}

/// Estimate tokens as whitespace-split words x 1.3.
fn token_estimate(text: &str) -> f32 {
    text.split_whitespace().count() as f32 * 1.3
}

/// Hard character slice down to the budget's character equivalent, kept on
/// a char boundary.
fn truncate_to_token_budget(text: String, max_tokens: usize) -> String {
    let estimate = token_estimate(&text);
    if estimate <= max_tokens as f32 {
        return text;
    }

    let keep = (text.len() as f32 * max_tokens as f32 / estimate) as usize;
    let boundary = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= keep)
        .last()
        .unwrap_or(0);
    text[..boundary].to_string()
}

impl std::fmt::Debug for MemoryLattice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLattice")
            .field("insights", &self.insights.len())
            .field("contradictions", &self.contradictions.len())
            .field("max_insights", &self.max_insights)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lattice() -> MemoryLattice {
        MemoryLattice::new(&EngineConfig::default())
    }

    fn small_lattice(max: usize) -> MemoryLattice {
        let mut config = EngineConfig::default();
        config.lattice_max_insights = max;
        MemoryLattice::new(&config)
    }

    fn fact(content: &str) -> Insight {
        Insight::new(content, InsightType::Fact, "gpt-4o", 0.8, vec![])
    }

    #[test]
    fn test_duplicate_merges_instead_of_growing() {
        let mut lattice = lattice();
        let id = lattice.add_insight(fact("the cache uses an LRU eviction policy"));
        assert_eq!(lattice.len(), 1);

        let merged = lattice.add_insight(fact("the cache uses an LRU eviction policy"));
        assert_eq!(merged, id);
        assert_eq!(lattice.len(), 1);
        assert_eq!(lattice.get(&id).unwrap().validation_count, 1);
    }

    #[test]
    fn test_merge_nudges_confidence_capped() {
        let mut lattice = lattice();
        let id = lattice.add_insight(Insight::new(
            "rust builds are reproducible",
            InsightType::Fact,
            "m",
            0.95,
            vec![],
        ));
        lattice.add_insight(fact("rust builds are reproducible"));
        assert_eq!(lattice.get(&id).unwrap().confidence, 1.0);
    }

    #[test]
    fn test_same_words_different_type_does_not_merge() {
        let mut lattice = lattice();
        lattice.add_insight(fact("the queue drops messages under load"));
        lattice.add_insight(Insight::new(
            "the queue drops messages under load",
            InsightType::Warning,
            "m",
            0.8,
            vec![],
        ));
        assert_eq!(lattice.len(), 2);
    }

    #[test]
    fn test_relationship_edges_are_bidirectional() {
        let mut lattice = lattice();
        let first = lattice.add_insight(Insight::new(
            "postgres connection pool saturates at fifty clients",
            InsightType::Metric,
            "gpt-4o",
            0.8,
            vec![IntentType::Debug],
        ));
        let second = lattice.add_insight(Insight::new(
            "postgres connection pool saturates under heavy load",
            InsightType::Metric,
            "gpt-4o",
            0.8,
            vec![IntentType::Debug],
        ));

        assert_ne!(first, second);
        assert!(lattice.get(&first).unwrap().related_insights.contains(&second));
        assert!(lattice.get(&second).unwrap().related_insights.contains(&first));
    }

    #[test]
    fn test_contradiction_detected_for_capability_conflict() {
        let mut lattice = lattice();
        let a = lattice.add_insight(fact("the scheduler can preempt running tasks"));
        let b = lattice.add_insight(fact("the scheduler cannot preempt running tasks"));

        assert_eq!(lattice.contradictions().len(), 1);
        let record = &lattice.contradictions()[0];
        assert!(record.severity > 0.0 && record.severity <= 1.0);
        assert!(lattice.get(&a).unwrap().contradicts.contains(&b));
    }

    #[test]
    fn test_negation_contradiction() {
        let mut lattice = lattice();
        lattice.add_insight(fact("the ingest api is idempotent"));
        // A hypothesis, so the near-identical wording can't merge as a duplicate.
        lattice.add_insight(Insight::new(
            "the ingest api is not idempotent",
            InsightType::Hypothesis,
            "sonar-pro",
            0.7,
            vec![],
        ));

        assert_eq!(lattice.contradictions().len(), 1);
        let record = &lattice.contradictions()[0];
        assert_eq!(record.conflict_type, ConflictType::Negation);
        assert_eq!(record.severity, 1.0);
    }

    #[test]
    fn test_unrelated_statements_do_not_contradict() {
        let mut lattice = lattice();
        lattice.add_insight(fact("bananas are yellow and people can eat them"));
        lattice.add_insight(fact("the compiler cannot vectorize this loop"));
        assert!(lattice.contradictions().is_empty());
    }

    #[test]
    fn test_resolve_contradiction() {
        let mut lattice = lattice();
        lattice.add_insight(fact("the index can serve range scans"));
        lattice.add_insight(fact("the index cannot serve range scans"));
        let id = lattice.contradictions()[0].id;

        lattice
            .resolve_contradiction(id, "the second claim tested an older version")
            .expect("resolves");
        assert!(matches!(
            lattice.resolve_contradiction(id, "again"),
            Err(LatticeError::AlreadyResolved { .. })
        ));
        assert!(matches!(
            lattice.resolve_contradiction(colloquy_core::new_entity_id(), "nope"),
            Err(LatticeError::ContradictionNotFound { .. })
        ));
    }

    #[test]
    fn test_capacity_eviction_removes_one_and_all_references() {
        let mut lattice = small_lattice(10);
        let mut first_id = String::new();
        for i in 0..10 {
            let id = lattice.add_insight(fact(&format!(
                "distinct observation number {} about subsystem {}",
                i,
                i * 7
            )));
            if i == 0 {
                first_id = id;
            }
        }
        assert_eq!(lattice.len(), 10);

        lattice.add_insight(fact("the eleventh wholly unrelated observation arrives"));
        // 10% of 10 = exactly one eviction, oldest first.
        assert_eq!(lattice.len(), 10);
        assert!(lattice.get(&first_id).is_none());
        for insight in lattice.insights.values() {
            assert!(!insight.related_insights.contains(&first_id));
            assert!(!insight.contradicts.contains(&first_id));
        }
        assert_eq!(lattice.stats().evicted_total, 1);
    }

    #[test]
    fn test_context_renders_warnings_first() {
        let mut lattice = lattice();
        lattice.add_insight(Insight::new(
            "migration drops the audit table",
            InsightType::Warning,
            "m",
            0.9,
            vec![],
        ));
        lattice.add_insight(fact("the audit table holds seven years of records"));

        let context =
            lattice.get_relevant_context("audit table migration", &IntentVector::default(), 500);
        assert!(context.starts_with("## Warnings"));
        assert!(context.contains("migration drops the audit table"));
    }

    #[test]
    fn test_context_marks_validated_facts() {
        let mut lattice = lattice();
        lattice.add_insight(fact("the binary ships with symbols stripped"));
        lattice.add_insight(fact("the binary ships with symbols stripped"));

        let context =
            lattice.get_relevant_context("binary symbols", &IntentVector::default(), 500);
        assert!(context.contains("Key facts"));
        assert!(context.contains("validated x2"));
    }

    #[test]
    fn test_context_respects_token_budget() {
        let mut lattice = lattice();
        for i in 0..30 {
            lattice.add_insight(fact(&format!(
                "observation {} with a reasonably long sentence about component {} and its \
                 behavior under sustained load in production environment {}",
                i,
                i * 3,
                i * 5
            )));
        }

        let context = lattice.get_relevant_context("load", &IntentVector::default(), 50);
        assert!(token_estimate(&context) <= 50.0 + 1.0);
    }

    #[test]
    fn test_empty_lattice_yields_empty_context() {
        let lattice = lattice();
        assert_eq!(
            lattice.get_relevant_context("anything", &IntentVector::default(), 100),
            ""
        );
    }

    proptest! {
        /// The lattice never exceeds its capacity, whatever gets inserted.
        #[test]
        fn prop_capacity_bound_holds(contents in proptest::collection::vec("[a-z ]{5,60}", 1..40)) {
            let mut lattice = small_lattice(10);
            for content in contents {
                lattice.add_insight(fact(&content));
            }
            prop_assert!(lattice.len() <= 10);
        }

        /// Re-inserting identical content never grows the lattice.
        #[test]
        fn prop_identical_reinsert_is_merge(content in "[a-z]{3,12}( [a-z]{3,12}){2,8}") {
            let mut lattice = lattice();
            lattice.add_insight(fact(&content));
            let before = lattice.len();
            lattice.add_insight(fact(&content));
            prop_assert_eq!(lattice.len(), before);
        }
    }
}
