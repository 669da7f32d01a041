//! SSE decoding for token-streaming responses.
//!
//! Providers emit `data: <json>` frames separated by blank lines; the
//! OpenAI-compatible family terminates with a literal `data: [DONE]` frame,
//! Gemini simply ends the stream. Frames decode into the normalized
//! [`StreamEvent`] shape: `delta` for incremental text, `meta` for
//! time-to-first-token, and a terminal `done` with finish reason and usage.

use crate::providers::gemini::GenerateContentResponse;
use crate::providers::wire::ChatCompletionChunk;
use crate::EventStream;
use colloquy_core::{ColloquyResult, ProviderError, StreamEvent, TokenUsage};
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Instant;

// ============================================================================
// FRAME PARSER
// ============================================================================

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A `data:` payload
    Data(String),
    /// The literal `data: [DONE]` terminator
    Done,
}

/// Incremental SSE frame parser. Push raw chunks in, pop complete frames
/// out; partial frames stay buffered until their terminating blank line
/// arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes-as-text; returns every frame completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(&chunk.replace('\r', ""));

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            for line in block.lines() {
                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim();
                if payload.is_empty() {
                    continue;
                }
                if payload == "[DONE]" {
                    frames.push(SseFrame::Done);
                } else {
                    frames.push(SseFrame::Data(payload.to_string()));
                }
            }
        }
        frames
    }

    /// Whether unconsumed partial input remains buffered.
    pub fn has_partial(&self) -> bool {
        !self.buffer.trim().is_empty()
    }
}

// ============================================================================
// WIRE DIALECTS
// ============================================================================

/// Which provider dialect the `data:` payloads are in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    /// `chat.completion.chunk` payloads (OpenAI, Perplexity, Moonshot, OpenRouter)
    OpenAiCompat,
    /// `generateContent` candidate payloads
    Gemini,
}

/// Decode one data payload into zero or more normalized events.
/// A `done` event is returned at most once per stream by the caller.
fn decode_payload(
    kind: WireKind,
    provider: &str,
    payload: &str,
) -> ColloquyResult<Vec<StreamEvent>> {
    let mut events = Vec::new();
    match kind {
        WireKind::OpenAiCompat => {
            let chunk: ChatCompletionChunk = serde_json::from_str(payload).map_err(|e| {
                ProviderError::InvalidResponse {
                    provider: provider.to_string(),
                    reason: format!("bad stream chunk: {}", e),
                }
            })?;
            let usage = chunk.usage.map(TokenUsage::from);
            if let Some(choice) = chunk.choices.first() {
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty() {
                        events.push(StreamEvent::Delta {
                            delta: content.clone(),
                        });
                    }
                }
                if let Some(reason) = &choice.finish_reason {
                    events.push(StreamEvent::Done {
                        finish_reason: Some(reason.clone()),
                        usage,
                    });
                }
            }
        }
        WireKind::Gemini => {
            let chunk: GenerateContentResponse = serde_json::from_str(payload).map_err(|e| {
                ProviderError::InvalidResponse {
                    provider: provider.to_string(),
                    reason: format!("bad stream chunk: {}", e),
                }
            })?;
            let usage = chunk.usage();
            if let Some(candidate) = chunk.candidates.first() {
                let text = candidate.text();
                if !text.is_empty() {
                    events.push(StreamEvent::Delta { delta: text });
                }
                if let Some(reason) = &candidate.finish_reason {
                    events.push(StreamEvent::Done {
                        finish_reason: Some(reason.clone()),
                        usage: Some(usage),
                    });
                }
            }
        }
    }
    Ok(events)
}

// ============================================================================
// STREAM DECODER
// ============================================================================

struct DecodeState<S> {
    source: Pin<Box<S>>,
    parser: SseParser,
    pending: VecDeque<ColloquyResult<StreamEvent>>,
    provider: String,
    kind: WireKind,
    started: Instant,
    first_token_seen: bool,
    done_emitted: bool,
    exhausted: bool,
}

/// Wrap a raw byte stream of SSE frames into a stream of normalized events.
///
/// Emits a `meta` event carrying time-to-first-token right before the first
/// delta, and guarantees exactly one terminal `done` event even when the
/// upstream ends without a terminator frame.
pub fn decode_sse<S, B, E>(provider: String, kind: WireKind, source: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecodeState {
        source: Box::pin(source),
        parser: SseParser::new(),
        pending: VecDeque::new(),
        provider,
        kind,
        started: Instant::now(),
        first_token_seen: false,
        done_emitted: false,
        exhausted: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((event, st));
            }
            if st.exhausted {
                if !st.done_emitted {
                    st.done_emitted = true;
                    return Some((
                        Ok(StreamEvent::Done {
                            finish_reason: None,
                            usage: None,
                        }),
                        st,
                    ));
                }
                return None;
            }

            match st.source.next().await {
                Some(Ok(chunk)) => {
                    let text = String::from_utf8_lossy(chunk.as_ref()).into_owned();
                    for frame in st.parser.push(&text) {
                        match frame {
                            SseFrame::Done => {
                                if !st.done_emitted {
                                    st.done_emitted = true;
                                    st.pending.push_back(Ok(StreamEvent::Done {
                                        finish_reason: None,
                                        usage: None,
                                    }));
                                }
                            }
                            SseFrame::Data(payload) => {
                                match decode_payload(st.kind, &st.provider, &payload) {
                                    Ok(events) => {
                                        for event in events {
                                            match &event {
                                                StreamEvent::Delta { .. } => {
                                                    if !st.first_token_seen {
                                                        st.first_token_seen = true;
                                                        let ttft_ms = st.started.elapsed().as_secs_f64() * 1000.0;
                                                        st.pending.push_back(Ok(StreamEvent::Meta {
                                                            ttft_ms: Some(ttft_ms),
                                                            usage: None,
                                                        }));
                                                    }
                                                    st.pending.push_back(Ok(event));
                                                }
                                                StreamEvent::Done { .. } => {
                                                    if !st.done_emitted {
                                                        st.done_emitted = true;
                                                        st.pending.push_back(Ok(event));
                                                    }
                                                }
                                                StreamEvent::Meta { .. } => {
                                                    st.pending.push_back(Ok(event));
                                                }
                                            }
                                        }
                                    }
                                    Err(err) => st.pending.push_back(Err(err)),
                                }
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    st.exhausted = true;
                    st.pending.push_back(Err(ProviderError::StreamInterrupted {
                        provider: st.provider.clone(),
                        reason: err.to_string(),
                    }
                    .into()));
                }
                None => {
                    st.exhausted = true;
                }
            }
        }
    }))
}
