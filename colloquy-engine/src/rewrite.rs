//! Coreference resolution and query rewriting.
//!
//! Regex-based pronoun and vague-reference resolution against the entities
//! recently mentioned in a session. Multi-word patterns ("that university")
//! are checked before bare pronouns, matches resolve left to right, and each
//! distinct pronoun text is substituted once via a first-occurrence string
//! replace - repeated identical pronouns later in the same message are not
//! independently re-resolved.
//!
//! Zero candidates leave the reference untouched; exactly one substitutes;
//! two or more mark the whole rewrite ambiguous and produce a
//! disambiguation question instead of guessing.

use chrono::Utc;
use colloquy_core::TrackedEntity;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

/// Named candidates listed in a disambiguation question, plus "Other".
const MAX_DISAMBIGUATION_OPTIONS: usize = 3;

/// Typed vague references: "that university", "this company", ...
/// The capture is the expected entity type.
static TYPED_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:that|this|the|the same)\s+",
        r"(university|college|school|company|startup|person|place|city|country|product",
        r"|tool|library|framework|language|model|paper|book|project)\b",
    ))
    .expect("static reference pattern")
});

/// Bare pronouns resolved against any recent entity.
static BARE_PRONOUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(it|they|them|its|their)\b").expect("static pronoun pattern"));

// ============================================================================
// ENTITY TRACKER
// ============================================================================

/// Session-scoped record of mentioned entities. Entities merge on
/// re-mention and are never deleted within a session; resolution only
/// considers entities mentioned within the configured window.
#[derive(Debug, Clone)]
pub struct EntityTracker {
    entities: Vec<TrackedEntity>,
    window: Duration,
}

impl EntityTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            entities: Vec::new(),
            window,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Record a mention, merging into an existing entity when the name
    /// matches (directly or via alias).
    pub fn observe(
        &mut self,
        name: impl Into<String>,
        entity_type: impl Into<String>,
        context: impl Into<String>,
    ) {
        let name = name.into();
        let context = context.into();
        if let Some(existing) = self.entities.iter_mut().find(|e| e.matches_name(&name)) {
            existing.touch(context);
            return;
        }
        self.entities.push(TrackedEntity::new(name, entity_type.into(), context));
    }

    /// Scan text for proper-noun phrases and record them. The entity type
    /// is guessed from a type word inside the phrase ("Purdue University"
    /// is a university); phrases without one register as "topic".
    pub fn observe_text(&mut self, text: &str) {
        for phrase in extract_proper_nouns(text) {
            let entity_type = guess_entity_type(&phrase);
            self.observe(phrase, entity_type, text.chars().take(120).collect::<String>());
        }
    }

    /// Entities mentioned within the window, most recent first.
    pub fn recent(&self) -> Vec<&TrackedEntity> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::hours(72));
        let mut recent: Vec<&TrackedEntity> = self
            .entities
            .iter()
            .filter(|e| now - e.last_mentioned <= window)
            .collect();
        recent.sort_by(|a, b| b.last_mentioned.cmp(&a.last_mentioned));
        recent
    }
}

/// Consecutive capitalized words (skipping a leading sentence-start word)
/// form candidate proper-noun phrases.
fn extract_proper_nouns(text: &str) -> Vec<String> {
    static PHRASE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\b[A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+){0,3}\b").expect("static phrase pattern")
    });

    PHRASE
        .find_iter(text)
        .filter(|m| {
            // A single capitalized word at the start of the text (or right
            // after sentence punctuation) is probably just sentence case.
            let single_word = !m.as_str().contains(' ');
            let at_sentence_start = m.start() == 0
                || text[..m.start()]
                    .trim_end()
                    .ends_with(['.', '!', '?']);
            !(single_word && at_sentence_start)
        })
        .map(|m| m.as_str().to_string())
        .collect()
}

fn guess_entity_type(phrase: &str) -> String {
    let lowered = phrase.to_lowercase();
    for marker in [
        "university",
        "college",
        "school",
        "institute",
        "company",
        "labs",
        "inc",
        "corp",
    ] {
        if lowered.split_whitespace().any(|w| w == marker) {
            return match marker {
                "college" | "school" | "institute" => "university".to_string(),
                "labs" | "inc" | "corp" => "company".to_string(),
                other => other.to_string(),
            };
        }
    }
    "topic".to_string()
}

// ============================================================================
// REWRITER
// ============================================================================

/// One resolved reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referent {
    pub pronoun: String,
    pub resolved_to: String,
}

/// Clarification request produced when a reference has several equally
/// plausible antecedents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disambiguation {
    pub question: String,
    /// Up to three candidate names plus a literal "Other"
    pub options: Vec<String>,
}

/// Result of rewriting one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResult {
    pub rewritten: String,
    pub ambiguous: bool,
    pub referents: Vec<Referent>,
    pub disambiguation: Option<Disambiguation>,
}

#[derive(Debug)]
struct ReferenceMatch {
    start: usize,
    text: String,
    expected_type: Option<String>,
}

/// Stateless pronoun rewriter; all session state lives in the tracker.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreferenceRewriter;

impl CoreferenceRewriter {
    pub fn new() -> Self {
        Self
    }

    /// Rewrite a message against the session's recent entities.
    pub fn rewrite(&self, message: &str, tracker: &EntityTracker) -> RewriteResult {
        let matches = collect_matches(message);
        let recent = tracker.recent();

        let mut rewritten = message.trim().to_string();
        let mut referents = Vec::new();
        let mut disambiguation = None;
        let mut ambiguous = false;

        for reference in &matches {
            if ambiguous {
                // First ambiguity stops resolution; the caller needs an
                // answer before any later reference can be trusted.
                break;
            }

            let candidates: Vec<&&TrackedEntity> = recent
                .iter()
                .filter(|e| match &reference.expected_type {
                    Some(expected) => e.entity_type.eq_ignore_ascii_case(expected),
                    None => true,
                })
                .collect();

            match candidates.len() {
                0 => {}
                1 => {
                    let name = candidates[0].name.clone();
                    rewritten = rewritten.replacen(&reference.text, &name, 1);
                    tracing::debug!(pronoun = %reference.text, resolved = %name, "reference resolved");
                    referents.push(Referent {
                        pronoun: reference.text.clone(),
                        resolved_to: name,
                    });
                }
                _ => {
                    ambiguous = true;
                    let mut options: Vec<String> = candidates
                        .iter()
                        .take(MAX_DISAMBIGUATION_OPTIONS)
                        .map(|e| e.name.clone())
                        .collect();
                    options.push("Other".to_string());

                    let question = match &reference.expected_type {
                        Some(expected) => {
                            format!("Which {} do you mean by \"{}\"?", expected, reference.text)
                        }
                        None => format!("Which one do you mean by \"{}\"?", reference.text),
                    };
                    disambiguation = Some(Disambiguation { question, options });
                }
            }
        }

        RewriteResult {
            rewritten,
            ambiguous,
            referents,
            disambiguation,
        }
    }
}

/// Typed multi-word references first, then bare pronouns that don't overlap
/// them; one entry per distinct matched text, ordered by string position.
fn collect_matches(message: &str) -> Vec<ReferenceMatch> {
    let mut matches: Vec<ReferenceMatch> = Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();

    for capture in TYPED_REFERENCE.captures_iter(message) {
        let whole = capture.get(0).expect("whole match");
        matches.push(ReferenceMatch {
            start: whole.start(),
            text: whole.as_str().to_string(),
            expected_type: Some(
                capture
                    .get(1)
                    .expect("type capture")
                    .as_str()
                    .to_lowercase(),
            ),
        });
        spans.push((whole.start(), whole.end()));
    }

    for found in BARE_PRONOUN.find_iter(message) {
        let overlaps = spans
            .iter()
            .any(|(start, end)| found.start() < *end && found.end() > *start);
        if !overlaps {
            matches.push(ReferenceMatch {
                start: found.start(),
                text: found.as_str().to_string(),
                expected_type: None,
            });
        }
    }

    matches.sort_by_key(|m| m.start);

    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    matches.retain(|m| seen.insert(m.text.to_lowercase()));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tracker_with(entries: &[(&str, &str)]) -> EntityTracker {
        let mut tracker = EntityTracker::new(Duration::from_secs(72 * 3600));
        for (name, entity_type) in entries {
            tracker.observe(*name, *entity_type, "recent talk");
        }
        tracker
    }

    #[test]
    fn test_no_pronouns_roundtrips() {
        let tracker = tracker_with(&[("Purdue University", "university")]);
        let result = CoreferenceRewriter::new().rewrite("how do solar panels work?", &tracker);

        assert_eq!(result.rewritten, "how do solar panels work?");
        assert!(result.referents.is_empty());
        assert!(!result.ambiguous);
        assert!(result.disambiguation.is_none());
    }

    #[test]
    fn test_single_candidate_substitutes() {
        let tracker = tracker_with(&[("Purdue University", "university")]);
        let result = CoreferenceRewriter::new()
            .rewrite("what is the ranking at that university?", &tracker);

        assert!(!result.ambiguous);
        assert!(result.rewritten.contains("Purdue University"));
        assert_eq!(result.referents.len(), 1);
        assert_eq!(result.referents[0].pronoun, "that university");
        assert_eq!(result.referents[0].resolved_to, "Purdue University");
    }

    #[test]
    fn test_two_candidates_disambiguate() {
        let tracker = tracker_with(&[
            ("Purdue University", "university"),
            ("Indiana University", "university"),
        ]);
        let result = CoreferenceRewriter::new()
            .rewrite("what is the ranking at that university?", &tracker);

        assert!(result.ambiguous);
        assert_eq!(result.referents.len(), 0);
        let disambiguation = result.disambiguation.expect("question");
        assert!(disambiguation.options.contains(&"Purdue University".to_string()));
        assert!(disambiguation.options.contains(&"Indiana University".to_string()));
        assert_eq!(disambiguation.options.last().map(String::as_str), Some("Other"));
        assert!(disambiguation.question.contains("university"));
    }

    #[test]
    fn test_type_filter_excludes_wrong_entities() {
        let tracker = tracker_with(&[
            ("Purdue University", "university"),
            ("Acme Corp", "company"),
        ]);
        let result = CoreferenceRewriter::new()
            .rewrite("what is the tuition at that university?", &tracker);

        // The company never competes, so there is exactly one candidate.
        assert!(!result.ambiguous);
        assert!(result.rewritten.contains("Purdue University"));
    }

    #[test]
    fn test_bare_pronoun_resolves_against_any_recent_entity() {
        let tracker = tracker_with(&[("Tokio", "library")]);
        let result = CoreferenceRewriter::new().rewrite("does it support timers?", &tracker);

        assert!(result.rewritten.contains("Tokio"));
        assert_eq!(result.referents[0].pronoun, "it");
    }

    #[test]
    fn test_zero_candidates_leaves_reference_untouched() {
        let tracker = tracker_with(&[]);
        let result = CoreferenceRewriter::new()
            .rewrite("what is the ranking at that university?", &tracker);

        assert_eq!(result.rewritten, "what is the ranking at that university?");
        assert!(!result.ambiguous);
        assert!(result.referents.is_empty());
    }

    #[test]
    fn test_repeated_pronoun_substituted_once() {
        let tracker = tracker_with(&[("Tokio", "library")]);
        let result = CoreferenceRewriter::new()
            .rewrite("does it support timers and does it batch them?", &tracker);

        // One referent for the deduplicated "it"; the second occurrence is
        // left as-is (first-occurrence replacement only).
        let it_referents: Vec<_> = result.referents.iter().filter(|r| r.pronoun == "it").collect();
        assert_eq!(it_referents.len(), 1);
        assert!(result.rewritten.contains("does Tokio support timers"));
        assert!(result.rewritten.contains("does it batch"));
    }

    #[test]
    fn test_stale_entities_fall_out_of_window() {
        let mut tracker = EntityTracker::new(Duration::from_secs(0));
        tracker.observe("Purdue University", "university", "old talk");
        // Window of zero: nothing counts as recent.
        let result = CoreferenceRewriter::new()
            .rewrite("what is the ranking at that university?", &tracker);
        assert!(result.referents.is_empty());
    }

    #[test]
    fn test_observe_merges_re_mentions() {
        let mut tracker = tracker_with(&[("Purdue University", "university")]);
        tracker.observe("Purdue", "university", "again");
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.recent()[0].mention_count, 2);
    }

    #[test]
    fn test_observe_text_extracts_typed_entities() {
        let mut tracker = EntityTracker::new(Duration::from_secs(72 * 3600));
        tracker.observe_text("I applied to Purdue University and to Acme Labs last year");

        assert_eq!(tracker.len(), 2);
        let recent = tracker.recent();
        let types: Vec<&str> = recent.iter().map(|e| e.entity_type.as_str()).collect();
        assert!(types.contains(&"university"));
        assert!(types.contains(&"company"));
    }

    #[test]
    fn test_extract_proper_nouns_skips_sentence_case() {
        let phrases = extract_proper_nouns("Tell me about Purdue University. What else?");
        assert_eq!(phrases, vec!["Purdue University".to_string()]);
    }

    proptest! {
        /// Messages with no pronoun patterns round-trip untouched (modulo
        /// the whitespace trim) with zero referents.
        #[test]
        fn prop_pronoun_free_message_roundtrips(message in "[0-9 .,;:!?+*/=-]{0,80}") {
            let tracker = tracker_with(&[
                ("Purdue University", "university"),
                ("Acme Corp", "company"),
            ]);
            let result = CoreferenceRewriter::new().rewrite(&message, &tracker);

            prop_assert_eq!(result.rewritten, message.trim());
            prop_assert!(result.referents.is_empty());
            prop_assert!(!result.ambiguous);
            prop_assert!(result.disambiguation.is_none());
        }
    }
}
