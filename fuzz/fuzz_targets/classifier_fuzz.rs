//! Fuzz test for the intent classifier.
//!
//! Arbitrary UTF-8 input must classify without panicking, and every value
//! in the resulting vector must stay inside the unit interval.
//!
//! Run with: cargo +nightly fuzz run classifier_fuzz -- -max_total_time=60

#![no_main]

use colloquy_engine::IntentClassifier;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let classifier = IntentClassifier::new();
        let vector = classifier.classify(input, None);

        for (intent, confidence) in vector.needs.iter() {
            assert!(
                (0.0..=1.0).contains(confidence),
                "confidence for {:?} out of range: {}",
                intent,
                confidence
            );
        }
        assert!((0.0..=1.0).contains(&vector.complexity));
        assert!((0.0..=1.0).contains(&vector.urgency));
        assert!((0.0..=1.0).contains(&vector.creativity));
        assert!((0.0..=1.0).contains(&vector.context_dependency));

        // Presence of context may raise context_dependency but never
        // pushes anything out of range.
        let with_context = classifier.classify(input, Some("earlier conversation"));
        assert!((0.0..=1.0).contains(&with_context.context_dependency));
    }
});
