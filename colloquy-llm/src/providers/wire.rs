//! Chat-completions wire types shared by the OpenAI-compatible providers.

use colloquy_core::{ChatRequest, ProviderResponse, TokenUsage};
use serde::{Deserialize, Serialize};

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl ChatCompletionRequest {
    /// Build the wire body from a normalized request.
    pub fn from_request(request: &ChatRequest, stream: bool) -> Self {
        Self {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: stream.then_some(true),
        }
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
    /// Perplexity-style source citations
    #[serde(default)]
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: Option<i64>,
    #[serde(default)]
    pub completion_tokens: Option<i64>,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }
    }
}

// ============================================================================
// STREAMING CHUNK TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

// ============================================================================
// ERROR BODY
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(default)]
    pub r#type: Option<String>,
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize a parsed wire response into a [`ProviderResponse`].
/// Returns None when the response carries no choices.
pub fn normalize_response(
    response: ChatCompletionResponse,
    raw: serde_json::Value,
    latency_ms: f64,
    request_id: Option<String>,
) -> Option<ProviderResponse> {
    let content = response
        .choices
        .first()?
        .message
        .content
        .clone()
        .unwrap_or_default();

    Some(ProviderResponse {
        content,
        provider_message_id: response.id,
        usage: response.usage.map(TokenUsage::from).unwrap_or_default(),
        latency_ms,
        request_id,
        citations: response.citations,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::ChatMessage;

    #[test]
    fn test_request_wire_shape() {
        let request = ChatRequest::new(
            "gpt-4o",
            vec![ChatMessage::system("be terse"), ChatMessage::user("hi")],
        )
        .with_max_tokens(100);
        let wire = ChatCompletionRequest::from_request(&request, false);
        let json = serde_json::to_value(&wire).expect("serialize");

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 100);
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn test_stream_flag_set_when_streaming() {
        let request = ChatRequest::new("m", vec![]);
        let wire = ChatCompletionRequest::from_request(&request, true);
        assert_eq!(wire.stream, Some(true));
    }

    #[test]
    fn test_parse_and_normalize_response() {
        let body = r#"{
            "id": "chatcmpl-123",
            "choices": [{"message": {"content": "hello there"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).expect("parse");
        let raw: serde_json::Value = serde_json::from_str(body).expect("raw");

        let normalized = normalize_response(parsed, raw, 42.0, None).expect("choices");
        assert_eq!(normalized.content, "hello there");
        assert_eq!(normalized.provider_message_id.as_deref(), Some("chatcmpl-123"));
        assert_eq!(normalized.usage.prompt_tokens, Some(12));
        assert_eq!(normalized.usage.completion_tokens, Some(4));
        assert_eq!(normalized.latency_ms, 42.0);
    }

    #[test]
    fn test_normalize_empty_choices() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices": []}"#).expect("parse");
        assert!(normalize_response(parsed, serde_json::Value::Null, 1.0, None).is_none());
    }

    #[test]
    fn test_citations_carried_through() {
        let body = r#"{
            "choices": [{"message": {"content": "cited"}}],
            "citations": ["https://example.com/a", "https://example.com/b"]
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).expect("parse");
        let normalized =
            normalize_response(parsed, serde_json::Value::Null, 1.0, None).expect("choices");
        assert_eq!(normalized.citations.len(), 2);
    }

    #[test]
    fn test_chunk_parsing() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices": [{"delta": {"content": "he"}, "finish_reason": null}]}"#,
        )
        .expect("parse");
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("he"));
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn test_error_body_parsing() {
        let body: ApiErrorBody = serde_json::from_str(
            r#"{"error": {"message": "invalid key", "type": "auth_error"}}"#,
        )
        .expect("parse");
        assert_eq!(body.error.message, "invalid key");
    }
}
