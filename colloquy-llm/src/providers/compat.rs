//! Shared call path for the chat-completions-compatible providers.
//!
//! OpenAI, Perplexity, Moonshot, and OpenRouter all accept the same request
//! body and return the same response shape, so their adapters delegate to
//! this one implementation and differ only in endpoint, pacing, and default
//! model.

use super::wire::{normalize_response, ChatCompletionRequest, ChatCompletionResponse};
use super::{invalid_response, ProviderHttpClient};
use crate::streaming::{decode_sse, WireKind};
use crate::EventStream;
use colloquy_core::{ChatRequest, ColloquyResult, ProviderResponse};
use std::time::Instant;

/// One compatible provider endpoint plus its default model.
pub(crate) struct CompatChat {
    client: ProviderHttpClient,
    default_model: String,
}

impl CompatChat {
    pub(crate) fn new(client: ProviderHttpClient, default_model: impl Into<String>) -> Self {
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    pub(crate) fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Substitute the default model when the request leaves it blank.
    fn effective_model(&self, request: &ChatRequest) -> String {
        if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        }
    }

    fn wire_body(&self, request: &ChatRequest, stream: bool) -> ChatCompletionRequest {
        let mut body = ChatCompletionRequest::from_request(request, stream);
        body.model = self.effective_model(request);
        body
    }

    pub(crate) async fn chat(&self, request: &ChatRequest) -> ColloquyResult<ProviderResponse> {
        let body = self.wire_body(request, false);
        let started = Instant::now();

        let raw: serde_json::Value = self.client.post_json("chat/completions", &body).await?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone())
            .map_err(|e| invalid_response(self.client.provider(), e.to_string()))?;

        tracing::debug!(
            provider = %self.client.provider(),
            model = %body.model,
            latency_ms,
            "chat completion"
        );

        normalize_response(parsed, raw, latency_ms, None)
            .ok_or_else(|| invalid_response(self.client.provider(), "response carried no choices"))
    }

    pub(crate) async fn chat_stream(&self, request: &ChatRequest) -> ColloquyResult<EventStream> {
        let body = self.wire_body(request, true);
        let response = self.client.post_stream("chat/completions", &body).await?;
        Ok(decode_sse(
            self.client.provider().to_string(),
            WireKind::OpenAiCompat,
            response.bytes_stream(),
        ))
    }
}

impl std::fmt::Debug for CompatChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompatChat")
            .field("client", &self.client)
            .field("default_model", &self.default_model)
            .finish()
    }
}
