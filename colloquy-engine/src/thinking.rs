//! Best-effort extraction of a "thinking process" section from stage output.
//!
//! Enhanced-mode prompts ask the model to open with a marked reasoning
//! section. Models do not reliably comply, so this is a text-parsing utility
//! with an explicit not-found result - never a guaranteed structured-output
//! contract.

/// Markers that open a thinking section, checked in order.
const OPENING_MARKERS: &[&str] = &["## Thinking", "THINKING:", "Thinking:", "[thinking]"];

/// Markers that close a thinking section and open the answer.
const CLOSING_MARKERS: &[&str] = &["## Answer", "ANSWER:", "Answer:", "[answer]"];

/// Split output into (thinking, answer) when a marked section is present.
///
/// Returns `None` when no opening marker is found, or when the section would
/// swallow the entire output (no closing marker and no paragraph break) -
/// callers treat that as "no thinking recorded" rather than guessing.
pub fn extract_thinking(output: &str) -> Option<(String, String)> {
    let (marker, start) = OPENING_MARKERS
        .iter()
        .filter_map(|m| output.find(m).map(|pos| (*m, pos)))
        .min_by_key(|(_, pos)| *pos)?;

    let body_start = start + marker.len();
    let body = &output[body_start..];

    // Prefer an explicit closing marker; fall back to the first blank line.
    let (thinking_raw, answer_raw) = if let Some((close, close_pos)) = CLOSING_MARKERS
        .iter()
        .filter_map(|m| body.find(m).map(|pos| (*m, pos)))
        .min_by_key(|(_, pos)| *pos)
    {
        (&body[..close_pos], &body[close_pos + close.len()..])
    } else if let Some(break_pos) = body.find("\n\n") {
        (&body[..break_pos], &body[break_pos..])
    } else {
        return None;
    };

    let thinking = thinking_raw.trim();
    let answer = format!(
        "{}{}",
        output[..start].trim_end(),
        answer_raw.trim_start()
    );
    let answer = answer.trim().to_string();

    if thinking.is_empty() || answer.is_empty() {
        return None;
    }
    Some((thinking.to_string(), answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_marked_section() {
        let output = "Thinking: the query is about rankings.\n\nPurdue is ranked highly.";
        let (thinking, answer) = extract_thinking(output).expect("found");
        assert_eq!(thinking, "the query is about rankings.");
        assert_eq!(answer, "Purdue is ranked highly.");
    }

    #[test]
    fn test_explicit_closing_marker() {
        let output = "## Thinking\nstep one\nstep two\n## Answer\nthe result";
        let (thinking, answer) = extract_thinking(output).expect("found");
        assert_eq!(thinking, "step one\nstep two");
        assert_eq!(answer, "the result");
    }

    #[test]
    fn test_no_marker_is_none() {
        assert!(extract_thinking("just a plain answer").is_none());
    }

    #[test]
    fn test_unterminated_section_is_none() {
        // Marker present but the section would swallow everything.
        assert!(extract_thinking("Thinking: all of this is reasoning with no answer").is_none());
    }

    #[test]
    fn test_preserves_text_before_marker() {
        let output = "Preamble.\nThinking: because.\n\nConclusion.";
        let (_, answer) = extract_thinking(output).expect("found");
        assert!(answer.contains("Preamble."));
        assert!(answer.contains("Conclusion."));
    }
}
