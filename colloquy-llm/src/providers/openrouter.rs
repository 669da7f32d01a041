//! OpenRouter chat adapter.
//!
//! OpenRouter fronts many upstream models behind one chat-completions
//! endpoint; the model string selects the upstream (e.g.
//! `anthropic/claude-3.5-sonnet`).

use super::compat::CompatChat;
use super::ProviderHttpClient;
use crate::{ChatProvider, EventStream};
use async_trait::async_trait;
use colloquy_core::{ChatRequest, ColloquyResult, ProviderResponse};

const BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Chat adapter for the OpenRouter API.
#[derive(Debug)]
pub struct OpenRouterChatProvider {
    inner: CompatChat,
}

impl OpenRouterChatProvider {
    /// Create an adapter with the default pacing budget (60 rpm).
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self::with_rate_limit(api_key, default_model, 60)
    }

    pub fn with_rate_limit(
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        requests_per_minute: u32,
    ) -> Self {
        let client = ProviderHttpClient::new("openrouter", BASE_URL, api_key, requests_per_minute);
        Self {
            inner: CompatChat::new(client, default_model),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenRouterChatProvider {
    fn provider_id(&self) -> &str {
        "openrouter"
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    async fn chat(&self, request: &ChatRequest) -> ColloquyResult<ProviderResponse> {
        self.inner.chat(request).await
    }

    async fn chat_stream(&self, request: &ChatRequest) -> ColloquyResult<EventStream> {
        self.inner.chat_stream(request).await
    }
}
