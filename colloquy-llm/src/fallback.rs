//! Ordered (provider, model) fallback ladder.
//!
//! The only retry mechanism in the system. A ladder never retries the same
//! rung: on timeout or error it advances to the next configured pair, bounded
//! by `max_retries` attempts in total. Adapters themselves never retry.

use crate::ProviderRegistry;
use colloquy_core::{ChatRequest, ColloquyResult, ProviderError, ProviderResponse};
use std::time::Duration;

/// One (provider, model) pair in a fallback ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LadderRung {
    pub provider: String,
    pub model: String,
}

impl LadderRung {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// Which rung finally served the call, and what it returned.
#[derive(Debug)]
pub struct LadderOutcome {
    pub provider: String,
    pub model: String,
    /// Rungs tried, including the successful one
    pub attempts: usize,
    pub response: ProviderResponse,
}

/// An ordered list of (provider, model) pairs tried in sequence on
/// failure or timeout.
#[derive(Debug, Clone)]
pub struct FallbackLadder {
    rungs: Vec<LadderRung>,
    per_call_timeout: Duration,
    max_retries: usize,
}

impl FallbackLadder {
    /// Build a ladder over the given rungs with a 60s per-call timeout and
    /// every rung eligible.
    pub fn new(rungs: Vec<LadderRung>) -> Self {
        let max_retries = rungs.len();
        Self {
            rungs,
            per_call_timeout: Duration::from_secs(60),
            max_retries,
        }
    }

    /// Per-call timeout applied to each rung independently.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    /// Cap the number of rungs tried.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn rungs(&self) -> &[LadderRung] {
        &self.rungs
    }

    /// Walk the ladder until a rung answers.
    ///
    /// Each attempt rewrites the request's model to the rung's model. An
    /// unregistered provider counts as a failed attempt and the ladder
    /// advances, same as an error or timeout.
    pub async fn call(
        &self,
        registry: &ProviderRegistry,
        request: &ChatRequest,
    ) -> ColloquyResult<LadderOutcome> {
        let budget = self.max_retries.min(self.rungs.len());
        let mut last_error = String::from("ladder has no rungs");
        let mut attempts = 0;

        for rung in self.rungs.iter().take(budget) {
            attempts += 1;

            let provider = match registry.get(&rung.provider) {
                Ok(provider) => provider,
                Err(err) => {
                    tracing::warn!(provider = %rung.provider, %err, "ladder rung unavailable");
                    last_error = err.to_string();
                    continue;
                }
            };

            let mut attempt = request.clone();
            attempt.model = rung.model.clone();

            match tokio::time::timeout(self.per_call_timeout, provider.chat(&attempt)).await {
                Ok(Ok(response)) => {
                    tracing::debug!(
                        provider = %rung.provider,
                        model = %rung.model,
                        attempts,
                        "ladder call served"
                    );
                    return Ok(LadderOutcome {
                        provider: rung.provider.clone(),
                        model: rung.model.clone(),
                        attempts,
                        response,
                    });
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        provider = %rung.provider,
                        model = %rung.model,
                        %err,
                        "ladder rung failed, advancing"
                    );
                    last_error = err.to_string();
                }
                Err(_) => {
                    let err = ProviderError::Timeout {
                        provider: rung.provider.clone(),
                        model: rung.model.clone(),
                        timeout_ms: self.per_call_timeout.as_millis() as u64,
                    };
                    tracing::warn!(%err, "ladder rung timed out, advancing");
                    last_error = err.to_string();
                }
            }
        }

        Err(ProviderError::LadderExhausted {
            attempts,
            last_error,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatProvider, EventStream, MockChatProvider};
    use async_trait::async_trait;
    use colloquy_core::{ChatMessage, ColloquyError};
    use std::sync::Arc;

    fn request() -> ChatRequest {
        ChatRequest::new("", vec![ChatMessage::user("hi")])
    }

    fn registry(providers: Vec<MockChatProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(Arc::new(provider));
        }
        registry
    }

    #[tokio::test]
    async fn test_first_rung_serves() {
        let registry = registry(vec![MockChatProvider::new("a", vec!["from a".to_string()])]);
        let ladder = FallbackLadder::new(vec![LadderRung::new("a", "model-a")]);

        let outcome = ladder.call(&registry, &request()).await.expect("served");
        assert_eq!(outcome.provider, "a");
        assert_eq!(outcome.model, "model-a");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.response.content, "from a");
    }

    #[tokio::test]
    async fn test_advances_past_failing_rung() {
        let registry = registry(vec![
            MockChatProvider::always_failing("a"),
            MockChatProvider::new("b", vec!["from b".to_string()]),
        ]);
        let ladder = FallbackLadder::new(vec![
            LadderRung::new("a", "model-a"),
            LadderRung::new("b", "model-b"),
        ]);

        let outcome = ladder.call(&registry, &request()).await.expect("served");
        assert_eq!(outcome.provider, "b");
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_max_retries_bounds_attempts() {
        let registry = registry(vec![
            MockChatProvider::always_failing("a"),
            MockChatProvider::new("b", vec!["from b".to_string()]),
        ]);
        let ladder = FallbackLadder::new(vec![
            LadderRung::new("a", "model-a"),
            LadderRung::new("b", "model-b"),
        ])
        .with_max_retries(1);

        let err = ladder.call(&registry, &request()).await.unwrap_err();
        match err {
            ColloquyError::Provider(ProviderError::LadderExhausted { attempts, .. }) => {
                assert_eq!(attempts, 1);
            }
            other => panic!("expected LadderExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unregistered_provider_advances() {
        let registry = registry(vec![MockChatProvider::new("b", vec!["from b".to_string()])]);
        let ladder = FallbackLadder::new(vec![
            LadderRung::new("missing", "m"),
            LadderRung::new("b", "model-b"),
        ]);

        let outcome = ladder.call(&registry, &request()).await.expect("served");
        assert_eq!(outcome.provider, "b");
        assert_eq!(outcome.attempts, 2);
    }

    struct SlowProvider;

    #[async_trait]
    impl ChatProvider for SlowProvider {
        fn provider_id(&self) -> &str {
            "slow"
        }

        fn default_model(&self) -> &str {
            "slow-model"
        }

        async fn chat(&self, _request: &ChatRequest) -> ColloquyResult<ProviderResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ProviderResponse::text("too late", 0.0))
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> ColloquyResult<EventStream> {
            Ok(Box::pin(futures_util::stream::empty()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_advances_to_next_rung() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(SlowProvider));
        registry.register(Arc::new(MockChatProvider::new(
            "b",
            vec!["from b".to_string()],
        )));

        let ladder = FallbackLadder::new(vec![
            LadderRung::new("slow", "slow-model"),
            LadderRung::new("b", "model-b"),
        ])
        .with_timeout(Duration::from_millis(50));

        let outcome = ladder.call(&registry, &request()).await.expect("served");
        assert_eq!(outcome.provider, "b");
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_empty_ladder_exhausts_immediately() {
        let registry = ProviderRegistry::new();
        let ladder = FallbackLadder::new(Vec::new());

        let err = ladder.call(&registry, &request()).await.unwrap_err();
        assert!(matches!(
            err,
            ColloquyError::Provider(ProviderError::LadderExhausted { attempts: 0, .. })
        ));
    }
}
