//! Perplexity chat adapter.
//!
//! Perplexity's sonar models return source citations alongside the
//! completion; the shared wire normalization carries them through on
//! [`colloquy_core::ProviderResponse::citations`].

use super::compat::CompatChat;
use super::ProviderHttpClient;
use crate::{ChatProvider, EventStream};
use async_trait::async_trait;
use colloquy_core::{ChatRequest, ColloquyResult, ProviderResponse};

const BASE_URL: &str = "https://api.perplexity.ai";

/// Chat adapter for the Perplexity API.
#[derive(Debug)]
pub struct PerplexityChatProvider {
    inner: CompatChat,
}

impl PerplexityChatProvider {
    /// Create an adapter with the default pacing budget (50 rpm).
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self::with_rate_limit(api_key, default_model, 50)
    }

    pub fn with_rate_limit(
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        requests_per_minute: u32,
    ) -> Self {
        let client = ProviderHttpClient::new("perplexity", BASE_URL, api_key, requests_per_minute);
        Self {
            inner: CompatChat::new(client, default_model),
        }
    }
}

#[async_trait]
impl ChatProvider for PerplexityChatProvider {
    fn provider_id(&self) -> &str {
        "perplexity"
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
