//! Chat primitive types.
//!
//! Pure data types for chat-completion calls. The provider trait and the
//! HTTP adapters live in colloquy-llm.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// Role of a chat message as sent to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// One message in a chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A normalized chat-completion request, provider-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
}

/// Normalized response from a single provider call. Immutable; produced
/// once per call and owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Assistant text content
    pub content: String,
    /// Provider-assigned message/completion id, when present
    pub provider_message_id: Option<String>,
    /// Token usage, when the provider reports it
    pub usage: TokenUsage,
    /// Wall-clock latency of the HTTP round trip
    pub latency_ms: f64,
    /// Request id echoed by the provider, when present
    pub request_id: Option<String>,
    /// Source citations (Perplexity-style providers)
    pub citations: Vec<String>,
    /// The raw provider payload, kept opaque for debugging
    pub raw: serde_json::Value,
}

impl ProviderResponse {
    /// Minimal response carrying only content and latency.
    /// Mostly useful for mocks and tests.
    pub fn text(content: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            content: content.into(),
            provider_message_id: None,
            usage: TokenUsage::default(),
            latency_ms,
            request_id: None,
            citations: Vec::new(),
            raw: serde_json::Value::Null,
        }
    }
}

// ============================================================================
// STREAMING TYPES
// ============================================================================

/// One event in a token stream, decoded from SSE frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text
    Delta { delta: String },
    /// Mid-stream metadata (time-to-first-token, partial usage)
    Meta {
        #[serde(skip_serializing_if = "Option::is_none")]
        ttft_ms: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// Terminal event
    Done {
        finish_reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("a").role, ChatRole::System);
        assert_eq!(ChatMessage::user("b").role, ChatRole::User);
        assert_eq!(ChatMessage::assistant("c").role, ChatRole::Assistant);
    }

    #[test]
    fn test_chat_role_serializes_lowercase() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_chat_request_builder() {
        let req = ChatRequest::new("gpt-4o", vec![ChatMessage::user("hi")])
            .with_max_tokens(256)
            .with_temperature(0.7);
        assert_eq!(req.max_tokens, Some(256));
        assert_eq!(req.temperature, Some(0.7));
    }

    #[test]
    fn test_request_omits_unset_options() {
        let req = ChatRequest::new("gpt-4o", vec![]);
        let json = serde_json::to_string(&req).expect("serialize");
        assert!(!json.contains("max_tokens"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_stream_event_tagging() {
        let event = StreamEvent::Delta {
            delta: "hel".to_string(),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"delta\""));

        let done: StreamEvent =
            serde_json::from_str(r#"{"type":"done","finish_reason":"stop"}"#).expect("parse");
        assert!(matches!(done, StreamEvent::Done { .. }));
    }
}
