//! Intent vector types.
//!
//! The classifier (colloquy-engine) produces an [`IntentVector`] per user
//! message; the router consumes it immediately. Intent vectors are never
//! persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Coarse category of user need, scored by the intent classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntentType {
    Research,
    Generate,
    Debug,
    Refactor,
    Explain,
    Summarize,
    Translate,
    Brainstorm,
    Plan,
    Review,
}

impl IntentType {
    /// All intent categories, in a fixed order.
    pub fn all() -> &'static [IntentType] {
        &[
            IntentType::Research,
            IntentType::Generate,
            IntentType::Debug,
            IntentType::Refactor,
            IntentType::Explain,
            IntentType::Summarize,
            IntentType::Translate,
            IntentType::Brainstorm,
            IntentType::Plan,
            IntentType::Review,
        ]
    }

    /// Whether this intent is a "creative" category for the creativity ratio.
    pub fn is_creative(&self) -> bool {
        matches!(
            self,
            IntentType::Generate | IntentType::Brainstorm | IntentType::Translate
        )
    }

    /// Whether this intent is an "analytical" category for the creativity ratio.
    pub fn is_analytical(&self) -> bool {
        matches!(
            self,
            IntentType::Research
                | IntentType::Debug
                | IntentType::Refactor
                | IntentType::Review
                | IntentType::Explain
        )
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Sparse confidence vector over intent categories plus derived scalar
/// metrics. Every value lies in [0, 1].
///
/// A BTreeMap keeps iteration order deterministic, which matters for
/// reproducible routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IntentVector {
    /// Per-category confidence; absent categories are implicitly 0.
    pub needs: BTreeMap<IntentType, f32>,
    /// How involved the query is (length, intent spread, technical vocabulary)
    pub complexity: f32,
    /// Presence of urgency markers
    pub urgency: f32,
    /// Creative vs analytical mass ratio; 0.5 when neither is present
    pub creativity: f32,
    /// Whether the message leans on prior conversation context
    pub context_dependency: f32,
}

impl IntentVector {
    /// Confidence for a category, 0 if absent.
    pub fn need(&self, intent: IntentType) -> f32 {
        self.needs.get(&intent).copied().unwrap_or(0.0)
    }

    /// Categories with confidence strictly above `threshold`, strongest first.
    pub fn active_needs(&self, threshold: f32) -> Vec<(IntentType, f32)> {
        let mut active: Vec<(IntentType, f32)> = self
            .needs
            .iter()
            .filter(|(_, c)| **c > threshold)
            .map(|(i, c)| (*i, *c))
            .collect();
        active.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        active
    }

    /// Whether no category carries any signal.
    pub fn is_empty_signal(&self) -> bool {
        self.needs.values().all(|c| *c <= f32::EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_need_defaults_to_zero() {
        let v = IntentVector::default();
        assert_eq!(v.need(IntentType::Research), 0.0);
        assert!(v.is_empty_signal());
    }

    #[test]
    fn test_active_needs_sorted_descending() {
        let mut v = IntentVector::default();
        v.needs.insert(IntentType::Debug, 0.4);
        v.needs.insert(IntentType::Research, 0.9);
        v.needs.insert(IntentType::Plan, 0.05);

        let active = v.active_needs(0.1);
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].0, IntentType::Research);
        assert_eq!(active[1].0, IntentType::Debug);
    }

    #[test]
    fn test_creative_analytical_partition() {
        assert!(IntentType::Brainstorm.is_creative());
        assert!(IntentType::Debug.is_analytical());
        assert!(!IntentType::Debug.is_creative());
        // Summarize and Plan sit in neither camp.
        assert!(!IntentType::Summarize.is_creative());
        assert!(!IntentType::Summarize.is_analytical());
    }
}
