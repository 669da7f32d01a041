//! Fuzz test for the SSE frame parser.
//!
//! The parser consumes raw network chunks, so it must survive arbitrary
//! input and arbitrary chunk boundaries: no panics, no lost frames when
//! the same bytes arrive split differently.
//!
//! Run with: cargo +nightly fuzz run sse_fuzz -- -max_total_time=60

#![no_main]

use colloquy_llm::streaming::{SseFrame, SseParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let mut whole = SseParser::new();
        let frames_whole = whole.push(input);

        for frame in &frames_whole {
            if let SseFrame::Data(payload) = frame {
                assert!(!payload.is_empty(), "data frames never carry an empty payload");
            }
        }

        // Splitting the input at every char boundary must produce the
        // same frames as feeding it in one piece.
        let mut split = SseParser::new();
        let mut frames_split = Vec::new();
        for (i, _) in input.char_indices() {
            let end = input[i..]
                .char_indices()
                .nth(1)
                .map(|(j, _)| i + j)
                .unwrap_or(input.len());
            frames_split.extend(split.push(&input[i..end]));
        }
        assert_eq!(frames_whole, frames_split);
    }
});
