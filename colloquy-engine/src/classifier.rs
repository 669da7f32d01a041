//! Intent classification.
//!
//! Scores free text against fixed regex pattern tables to produce a sparse
//! confidence vector over intent categories plus derived scalar metrics.
//! Pure computation: no allocation beyond the vector, no I/O, deterministic
//! for a given input, and it never fails - unmatched text yields an all-zero
//! needs map, which callers must treat as "no strong signal".

use colloquy_core::{IntentType, IntentVector};
use once_cell::sync::Lazy;
use regex::Regex;

/// Confidence contributed per pattern match, capped at 1.0.
const MATCH_WEIGHT: f32 = 0.3;

/// Boost applied to code-adjacent intents when the message mentions code.
const CODE_BOOST: f32 = 0.2;

fn patterns(raw: &[&str]) -> Vec<Regex> {
    raw.iter()
        .map(|p| Regex::new(p).expect("static intent pattern"))
        .collect()
}

static INTENT_PATTERNS: Lazy<Vec<(IntentType, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (
            IntentType::Research,
            patterns(&[
                r"\b(research|investigate|find out|look up|search for)\b",
                r"\b(latest|current|recent|news|up.to.date)\b",
                r"\b(sources?|citations?|references?|evidence)\b",
                r"\bwhat (is|are) the\b",
            ]),
        ),
        (
            IntentType::Generate,
            patterns(&[
                r"\b(write|create|generate|build|make|draft|compose)\b",
                r"\b(implement|develop|produce)\b",
            ]),
        ),
        (
            IntentType::Debug,
            patterns(&[
                r"\b(debug|fix|broken|crash(es|ing)?|fails?|failing)\b",
                r"\b(bug|error|exception|stack ?trace|traceback)\b",
                r"\b(not work(s|ing)?|doesn'?t work|wrong (output|result))\b",
            ]),
        ),
        (
            IntentType::Refactor,
            patterns(&[
                r"\b(refactor|clean ?up|restructure|reorganize|simplify)\b",
                r"\b(improve|optimi[sz]e|speed up) (the |my |this )?(code|function|module)\b",
                r"\b(technical debt|code smell)\b",
            ]),
        ),
        (
            IntentType::Explain,
            patterns(&[
                r"\b(explain|clarify|understand|walk me through)\b",
                r"\bhow (does|do|did|would|could)\b",
                r"\bwhy (does|do|did|is|are)\b",
                r"\bwhat does .+ mean\b",
            ]),
        ),
        (
            IntentType::Summarize,
            patterns(&[
                r"\b(summari[sz]e|condense|tl;?dr|recap|digest)\b",
                r"\b(key points?|main ideas?|gist)\b",
                r"\bin (a few|fewer) words\b",
            ]),
        ),
        (
            IntentType::Translate,
            patterns(&[
                r"\b(translate|translation)\b",
                r"\b(convert|port|rewrite) .+ (to|into|from)\b",
                r"\bin (french|german|spanish|japanese|chinese|korean|italian)\b",
            ]),
        ),
        (
            IntentType::Brainstorm,
            patterns(&[
                r"\b(brainstorm|ideas?|ideate|possibilities)\b",
                r"\b(alternatives?|options?|approaches|ways to)\b",
                r"\bwhat (if|about|could)\b",
            ]),
        ),
        (
            IntentType::Plan,
            patterns(&[
                r"\b(plan|roadmap|schedule|timeline|milestones?)\b",
                r"\b(steps?|phases?|stages?) (to|for|of)\b",
                r"\b(strategy|strategi[sz]e)\b",
            ]),
        ),
        (
            IntentType::Review,
            patterns(&[
                r"\b(review|critique|evaluate|assess|audit)\b",
                r"\b(feedback|opinion|thoughts) on\b",
                r"\b(check|look) (over|at) (my|this|the)\b",
            ]),
        ),
    ]
});

static CODE_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[
        r"\b(code|coding|function|class|method|api|script|program)\b",
        r"\b(bug|compile|runtime|syntax)\b",
        r"```",
    ])
});

static TECHNICAL_VOCABULARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\b(algorithm|database|schema|endpoint|async|concurren(t|cy)|latency|throughput",
        r"|protocol|encryption|authentication|kubernetes|docker|microservices?|regression",
        r"|distributed|cache|queue|index|transaction|deployment)\b",
    ))
    .expect("static vocabulary pattern")
});

static URGENT_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(urgent(ly)?|asap|immediately|right now|critical|emergency|deadline|today)\b")
        .expect("static urgency pattern")
});

static REFERENTIAL_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(it|that|this|those|these|they|them|the same|as before|previous(ly)?|again|earlier)\b")
        .expect("static referential pattern")
});

/// Keyword/regex intent classifier.
///
/// Stateless; a single instance can be shared freely.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a user message, optionally in light of prior conversation
    /// context (only its presence matters - context raises the ceiling of
    /// `context_dependency`).
    pub fn classify(&self, text: &str, context: Option<&str>) -> IntentVector {
        let lowered = text.to_lowercase();
        let mut vector = IntentVector::default();

        for (intent, intent_patterns) in INTENT_PATTERNS.iter() {
            let confidence = intent_patterns
                .iter()
                .map(|pattern| {
                    let matches = pattern.find_iter(&lowered).count();
                    (matches as f32 * MATCH_WEIGHT).min(1.0)
                })
                .fold(0.0f32, f32::max);

            if confidence > 0.0 {
                vector.needs.insert(*intent, confidence);
            }
        }

        self.apply_contextual_boosts(&lowered, &mut vector);

        vector.complexity = self.complexity(&lowered, &vector);
        vector.urgency = self.urgency(&lowered);
        vector.creativity = self.creativity(&vector);
        vector.context_dependency = self.context_dependency(&lowered, context);

        vector
    }

    /// A message that mentions code makes the code-adjacent intents more
    /// likely even when their own patterns matched weakly.
    fn apply_contextual_boosts(&self, lowered: &str, vector: &mut IntentVector) {
        let mentions_code = CODE_MARKERS.iter().any(|p| p.is_match(lowered));
        if !mentions_code {
            return;
        }

        for intent in [IntentType::Refactor, IntentType::Debug, IntentType::Generate] {
            let boosted = (vector.need(intent) + CODE_BOOST).min(1.0);
            vector.needs.insert(intent, boosted);
        }
    }

    fn complexity(&self, lowered: &str, vector: &IntentVector) -> f32 {
        let mut score: f32 = 0.0;

        // Length thresholds
        let chars = lowered.chars().count();
        if chars > 100 {
            score += 0.2;
        }
        if chars > 300 {
            score += 0.2;
        }
        if chars > 600 {
            score += 0.1;
        }

        // Intent spread: queries that need many things are harder
        let active = vector.active_needs(0.1).len();
        score += (active as f32 * 0.1).min(0.3);

        // Technical vocabulary
        let technical = TECHNICAL_VOCABULARY.find_iter(lowered).count();
        score += (technical as f32 * 0.1).min(0.3);

        score.clamp(0.0, 1.0)
    }

    fn urgency(&self, lowered: &str) -> f32 {
        let hits = URGENT_WORDS.find_iter(lowered).count();
        (hits as f32 * 0.4).clamp(0.0, 1.0)
    }

    /// Ratio of creative-intent mass to creative + analytical mass.
    /// 0.5 when neither side carries any signal.
    fn creativity(&self, vector: &IntentVector) -> f32 {
        let creative: f32 = vector
            .needs
            .iter()
            .filter(|(i, _)| i.is_creative())
            .map(|(_, c)| c)
            .sum();
        let analytical: f32 = vector
            .needs
            .iter()
            .filter(|(i, _)| i.is_analytical())
            .map(|(_, c)| c)
            .sum();

        let total = creative + analytical;
        if total <= f32::EPSILON {
            0.5
        } else {
            (creative / total).clamp(0.0, 1.0)
        }
    }

    /// Floor of 0.1 always; referential words only count when there is
    /// prior context to refer back to.
    fn context_dependency(&self, lowered: &str, context: Option<&str>) -> f32 {
        let has_context = context.is_some_and(|c| !c.trim().is_empty());
        if !has_context {
            return 0.1;
        }

        let referential = REFERENTIAL_WORDS.find_iter(lowered).count();
        if referential == 0 {
            return 0.1;
        }
        (0.3 + referential as f32 * 0.2).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classify(text: &str) -> IntentVector {
        IntentClassifier::new().classify(text, None)
    }

    #[test]
    fn test_fix_bug_boosts_debug_and_refactor() {
        let vector = classify("Fix this bug in my API");
        assert!(vector.need(IntentType::Debug) > 0.0);
        assert!(vector.need(IntentType::Refactor) > 0.0);
    }

    #[test]
    fn test_research_query() {
        let vector = classify("research the latest developments in battery chemistry, with sources");
        assert!(vector.need(IntentType::Research) >= 0.6);
    }

    #[test]
    fn test_unmatched_text_is_no_signal() {
        let vector = classify("zxqv plorf umble");
        assert!(vector.is_empty_signal());
        assert!(vector.complexity < 0.3);
    }

    #[test]
    fn test_creativity_defaults_to_half() {
        let vector = classify("zxqv plorf umble");
        assert_eq!(vector.creativity, 0.5);
    }

    #[test]
    fn test_creative_query_leans_creative() {
        let vector = classify("brainstorm some wild ideas for a mural");
        assert!(vector.creativity > 0.5);
    }

    #[test]
    fn test_analytical_query_leans_analytical() {
        let vector = classify("debug why this crashes and explain the error");
        assert!(vector.creativity < 0.5);
    }

    #[test]
    fn test_urgency_detection() {
        assert!(classify("fix this asap, it's urgent").urgency > 0.5);
        assert_eq!(classify("whenever you get a chance").urgency, 0.0);
    }

    #[test]
    fn test_context_dependency_floor_without_context() {
        let vector = classify("what about that one?");
        assert_eq!(vector.context_dependency, 0.1);
    }

    #[test]
    fn test_context_dependency_rises_with_context() {
        let classifier = IntentClassifier::new();
        let vector = classifier.classify("what about that one?", Some("we discussed Purdue"));
        assert!(vector.context_dependency > 0.1);
    }

    #[test]
    fn test_longer_technical_text_is_more_complex() {
        let short = classify("hi");
        let long = classify(
            "Design a distributed cache with async replication across regions. The database \
             schema needs an index per tenant, and the api endpoint must handle authentication \
             and encryption while keeping latency low under concurrent load from the queue \
             consumers. Also plan the deployment of the microservices on kubernetes with docker.",
        );
        assert!(long.complexity > short.complexity);
    }

    #[test]
    fn test_deterministic() {
        let text = "refactor this function and write tests, urgently";
        assert_eq!(classify(text), classify(text));
    }

    proptest! {
        /// Every value in the needs map and every derived scalar lies in [0, 1].
        #[test]
        fn prop_all_values_in_unit_range(text in ".{0,400}") {
            let vector = classify(&text);
            for (_, confidence) in vector.needs.iter() {
                prop_assert!((0.0..=1.0).contains(confidence));
            }
            prop_assert!((0.0..=1.0).contains(&vector.complexity));
            prop_assert!((0.0..=1.0).contains(&vector.urgency));
            prop_assert!((0.0..=1.0).contains(&vector.creativity));
            prop_assert!((0.0..=1.0).contains(&vector.context_dependency));
        }
    }
}
