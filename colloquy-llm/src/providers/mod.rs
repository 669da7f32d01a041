//! Provider adapter implementations.
//!
//! Four of the five providers (OpenAI, Perplexity, Moonshot, OpenRouter)
//! speak the same chat-completions wire format and share the types in
//! [`wire`]; Gemini has its own request/response shape.

pub mod client;
pub(crate) mod compat;
pub mod gemini;
pub mod moonshot;
pub mod openai;
pub mod openrouter;
pub mod perplexity;
pub mod wire;

pub use client::ProviderHttpClient;
pub use gemini::GeminiChatProvider;
pub use moonshot::MoonshotChatProvider;
pub use openai::OpenAiChatProvider;
pub use openrouter::OpenRouterChatProvider;
pub use perplexity::PerplexityChatProvider;

use colloquy_core::{ColloquyError, ProviderError};

/// Build a RequestFailed error.
pub(crate) fn request_failed(
    provider: &str,
    status: i32,
    message: impl Into<String>,
) -> ColloquyError {
    ProviderError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    }
    .into()
}

/// Build a RateLimited error.
pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> ColloquyError {
    ProviderError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    }
    .into()
}

/// Build an InvalidResponse error.
pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> ColloquyError {
    ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
    .into()
}
