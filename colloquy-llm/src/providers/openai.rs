//! OpenAI chat adapter.

use super::compat::CompatChat;
use super::ProviderHttpClient;
use crate::{ChatProvider, EventStream};
use async_trait::async_trait;
use colloquy_core::{ChatRequest, ColloquyResult, ProviderResponse};

const BASE_URL: &str = "https://api.openai.com/v1";

/// Chat adapter for the OpenAI API.
#[derive(Debug)]
pub struct OpenAiChatProvider {
    inner: CompatChat,
}

impl OpenAiChatProvider {
    /// Create an adapter with the default pacing budget (60 rpm).
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self::with_rate_limit(api_key, default_model, 60)
    }

    pub fn with_rate_limit(
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        requests_per_minute: u32,
    ) -> Self {
        let client = ProviderHttpClient::new("openai", BASE_URL, api_key, requests_per_minute);
        Self {
            inner: CompatChat::new(client, default_model),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    fn provider_id(&self) -> &str {
        "openai"
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
