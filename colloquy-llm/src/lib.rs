//! COLLOQUY LLM - Provider Adapter Layer
//!
//! Normalizes chat-completion calls across hosted LLM APIs. Each provider
//! implements [`ChatProvider`]; dispatch goes through a registered-adapter
//! lookup table ([`ProviderRegistry`]) so adding a provider never touches
//! pipeline code. Streaming responses decode into the shared
//! [`StreamEvent`] shape, and [`fallback`] implements the ordered
//! (provider, model) retry ladder.

use async_trait::async_trait;
use colloquy_core::{ChatRequest, ColloquyResult, ProviderError, ProviderResponse, StreamEvent};
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;

pub mod fallback;
pub mod providers;
pub mod streaming;

pub use fallback::{FallbackLadder, LadderOutcome, LadderRung};
pub use providers::{
    GeminiChatProvider, MoonshotChatProvider, OpenAiChatProvider, OpenRouterChatProvider,
    PerplexityChatProvider,
};

/// Boxed stream of normalized streaming events.
pub type EventStream = BoxStream<'static, ColloquyResult<StreamEvent>>;

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// Trait for chat-completion providers.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stable identifier for this provider (e.g. "openai", "perplexity").
    fn provider_id(&self) -> &str;

    /// Model used when a request does not name one explicitly.
    fn default_model(&self) -> &str;

    /// Execute a whole-response chat call.
    async fn chat(&self, request: &ChatRequest) -> ColloquyResult<ProviderResponse>;

    /// Execute a token-streaming chat call.
    async fn chat_stream(&self, request: &ChatRequest) -> ColloquyResult<EventStream>;
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Lookup table from provider id to adapter. Providers must be explicitly
/// registered - no auto-discovery.
///
/// # Example
/// ```ignore
/// let mut registry = ProviderRegistry::new();
/// registry.register(Arc::new(OpenAiChatProvider::new(key, "gpt-4o")));
/// let response = registry.get("openai")?.chat(&request).await?;
/// ```
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter under its own provider id.
    /// Replaces any previously registered adapter with the same id.
    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        self.adapters
            .insert(provider.provider_id().to_string(), provider);
    }

    /// Look up an adapter by provider id.
    pub fn get(&self, provider_id: &str) -> ColloquyResult<Arc<dyn ChatProvider>> {
        self.adapters.get(provider_id).cloned().ok_or_else(|| {
            ProviderError::NotRegistered {
                provider: provider_id.to_string(),
            }
            .into()
        })
    }

    /// Whether an adapter is registered for this id.
    pub fn contains(&self, provider_id: &str) -> bool {
        self.adapters.contains_key(provider_id)
    }

    /// Registered provider ids, sorted for determinism.
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.provider_ids())
            .finish()
    }
}

// ============================================================================
// MOCK PROVIDER FOR TESTING
// ============================================================================

/// Mock chat provider for tests. Replies with scripted responses in order,
/// then repeats the last one; can be scripted to fail on specific calls.
pub struct MockChatProvider {
    provider_id: String,
    model: String,
    responses: Vec<String>,
    fail_on_calls: Vec<usize>,
    call_count: std::sync::atomic::AtomicUsize,
}

impl MockChatProvider {
    pub fn new(provider_id: impl Into<String>, responses: Vec<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model: "mock-model".to_string(),
            responses,
            fail_on_calls: Vec::new(),
            call_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Fail the given zero-based call indices with a request error.
    pub fn failing_on(mut self, calls: Vec<usize>) -> Self {
        self.fail_on_calls = calls;
        self
    }

    /// A provider that fails every call.
    pub fn always_failing(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model: "mock-model".to_string(),
            responses: Vec::new(),
            fail_on_calls: Vec::new(),
            call_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Calls observed so far.
    pub fn calls(&self) -> usize {
        self.call_count.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, _request: &ChatRequest) -> ColloquyResult<ProviderResponse> {
        let call = self
            .call_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        if self.responses.is_empty() || self.fail_on_calls.contains(&call) {
            return Err(ProviderError::RequestFailed {
                provider: self.provider_id.clone(),
                status: 500,
                message: format!("scripted failure on call {}", call),
            }
            .into());
        }

        let idx = call.min(self.responses.len() - 1);
        Ok(ProviderResponse::text(self.responses[idx].clone(), 1.0))
    }

    async fn chat_stream(&self, request: &ChatRequest) -> ColloquyResult<EventStream> {
        let response = self.chat(request).await?;
        let events = vec![
            Ok(StreamEvent::Delta {
                delta: response.content,
            }),
            Ok(StreamEvent::Done {
                finish_reason: Some("stop".to_string()),
                usage: None,
            }),
        ];
        Ok(Box::pin(futures_util::stream::iter(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::{ChatMessage, ColloquyError};
    use futures_util::StreamExt;

    fn request() -> ChatRequest {
        ChatRequest::new("mock-model", vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(MockChatProvider::new(
            "openai",
            vec!["hello".to_string()],
        )));
        assert!(registry.contains("openai"));
        assert_eq!(registry.len(), 1);

        let provider = registry.get("openai").expect("registered");
        let response = provider.chat(&request()).await.expect("chat");
        assert_eq!(response.content, "hello");
    }

    #[tokio::test]
    async fn test_registry_unknown_provider() {
        let registry = ProviderRegistry::new();
        let err = match registry.get("gemini") {
            Err(e) => e,
            Ok(_) => panic!("expected unknown provider lookup to fail"),
        };
        assert!(matches!(
            err,
            ColloquyError::Provider(ProviderError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_registry_ids_sorted() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockChatProvider::new("perplexity", vec![])));
        registry.register(Arc::new(MockChatProvider::new("gemini", vec![])));
        registry.register(Arc::new(MockChatProvider::new("openai", vec![])));
        assert_eq!(registry.provider_ids(), vec!["gemini", "openai", "perplexity"]);
    }

    #[tokio::test]
    async fn test_mock_scripted_responses_in_order() {
        let mock = MockChatProvider::new("m", vec!["one".to_string(), "two".to_string()]);
        assert_eq!(mock.chat(&request()).await.unwrap().content, "one");
        assert_eq!(mock.chat(&request()).await.unwrap().content, "two");
        // Repeats the last response once exhausted.
        assert_eq!(mock.chat(&request()).await.unwrap().content, "two");
    }

    #[tokio::test]
    async fn test_mock_scripted_failure() {
        let mock =
            MockChatProvider::new("m", vec!["ok".to_string()]).failing_on(vec![0]);
        assert!(mock.chat(&request()).await.is_err());
        assert!(mock.chat(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_stream_yields_delta_then_done() {
        let mock = MockChatProvider::new("m", vec!["streamed".to_string()]);
        let mut stream = mock.chat_stream(&request()).await.expect("stream");

        let first = stream.next().await.expect("delta").expect("ok");
        assert_eq!(
            first,
            StreamEvent::Delta {
                delta: "streamed".to_string()
            }
        );
        let second = stream.next().await.expect("done").expect("ok");
        assert!(matches!(second, StreamEvent::Done { .. }));
        assert!(stream.next().await.is_none());
    }
}
