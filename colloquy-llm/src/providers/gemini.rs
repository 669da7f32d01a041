//! Gemini chat adapter.
//!
//! Gemini does not speak the chat-completions dialect: requests carry
//! `contents`/`parts`, system prompts ride in `systemInstruction`, the
//! assistant role is called `model`, and the key goes in an
//! `x-goog-api-key` header instead of a bearer token.

use super::{invalid_response, ProviderHttpClient};
use crate::streaming::{decode_sse, WireKind};
use crate::{ChatProvider, EventStream};
use async_trait::async_trait;
use colloquy_core::{
    ChatRequest, ChatRole, ColloquyResult, ProviderResponse, TokenUsage,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<i64>,
    #[serde(default)]
    pub candidates_token_count: Option<i64>,
}

impl Candidate {
    /// Concatenated text of every part in this candidate.
    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }
}

impl GenerateContentResponse {
    /// Token usage in the normalized shape.
    pub fn usage(&self) -> TokenUsage {
        match self.usage_metadata {
            Some(meta) => TokenUsage {
                prompt_tokens: meta.prompt_token_count,
                completion_tokens: meta.candidates_token_count,
            },
            None => TokenUsage::default(),
        }
    }
}

impl GenerateContentRequest {
    /// Build the Gemini body from a normalized request. System messages
    /// fold into `systemInstruction`; the assistant role becomes `model`.
    pub fn from_request(request: &ChatRequest) -> Self {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for message in &request.messages {
            match message.role {
                ChatRole::System => system_parts.push(Part {
                    text: message.content.clone(),
                }),
                ChatRole::User | ChatRole::Assistant => {
                    let role = if message.role == ChatRole::User {
                        "user"
                    } else {
                        "model"
                    };
                    contents.push(Content {
                        role: Some(role.to_string()),
                        parts: vec![Part {
                            text: message.content.clone(),
                        }],
                    });
                }
            }
        }

        let generation_config = if request.max_tokens.is_some() || request.temperature.is_some() {
            Some(GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            })
        } else {
            None
        };

        Self {
            contents,
            system_instruction: (!system_parts.is_empty()).then_some(Content {
                role: None,
                parts: system_parts,
            }),
            generation_config,
        }
    }
}

// ============================================================================
// ADAPTER
// ============================================================================

/// Chat adapter for the Gemini API.
#[derive(Debug)]
pub struct GeminiChatProvider {
    client: ProviderHttpClient,
    default_model: String,
}

impl GeminiChatProvider {
    /// Create an adapter with the default pacing budget (60 rpm).
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self::with_rate_limit(api_key, default_model, 60)
    }

    pub fn with_rate_limit(
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        requests_per_minute: u32,
    ) -> Self {
        let client = ProviderHttpClient::new("gemini", BASE_URL, api_key, requests_per_minute)
            .with_api_key_header("x-goog-api-key");
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    fn effective_model(&self, request: &ChatRequest) -> String {
        if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiChatProvider {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat(&self, request: &ChatRequest) -> ColloquyResult<ProviderResponse> {
        let model = self.effective_model(request);
        let body = GenerateContentRequest::from_request(request);
        let endpoint = format!("models/{}:generateContent", model);
        let started = Instant::now();

        let raw: serde_json::Value = self.client.post_json(&endpoint, &body).await?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let parsed: GenerateContentResponse = serde_json::from_value(raw.clone())
            .map_err(|e| invalid_response("gemini", e.to_string()))?;

        let candidate = parsed
            .candidates
            .first()
            .ok_or_else(|| invalid_response("gemini", "response carried no candidates"))?;

        tracing::debug!(provider = "gemini", %model, latency_ms, "chat completion");

        Ok(ProviderResponse {
            content: candidate.text(),
            provider_message_id: None,
            usage: parsed.usage(),
            latency_ms,
            request_id: None,
            citations: Vec::new(),
            raw,
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> ColloquyResult<EventStream> {
        let model = self.effective_model(request);
        let body = GenerateContentRequest::from_request(request);
        let endpoint = format!("models/{}:streamGenerateContent?alt=sse", model);

        let response = self.client.post_stream(&endpoint, &body).await?;
        Ok(decode_sse(
            "gemini".to_string(),
            WireKind::Gemini,
            response.bytes_stream(),
        ))
    }
}
