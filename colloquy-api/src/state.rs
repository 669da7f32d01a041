//! Shared application state.

use crate::config::{ApiConfig, StorageBackend};
use crate::error::{ApiError, ApiResult};
use colloquy_core::{EngineConfig, PipelineMode};
use colloquy_engine::{
    IntentClassifier, ModelProfile, ModelRouter, PipelineEngine, SessionStore, SkillMatrix,
};
use colloquy_llm::{
    GeminiChatProvider, MoonshotChatProvider, OpenAiChatProvider, OpenRouterChatProvider,
    PerplexityChatProvider, ProviderRegistry,
};
use colloquy_storage::{MockStorage, PgConfig, PgStorage, Storage};
use std::sync::Arc;

/// Everything the handlers share.
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub registry: Arc<ProviderRegistry>,
    pub engine: PipelineEngine,
    pub classifier: IntentClassifier,
    pub router: ModelRouter,
    pub sessions: SessionStore,
    pub catalog: Vec<ModelProfile>,
    pub engine_config: EngineConfig,
    pub default_mode: PipelineMode,
    /// Allowed CORS origins; empty means allow all
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Assemble state from configuration: pick the storage backend,
    /// register an adapter per configured provider key, and wire the
    /// decision engine on top.
    pub async fn from_config(config: &ApiConfig) -> ApiResult<Arc<Self>> {
        let storage: Arc<dyn Storage> = match config.storage {
            StorageBackend::Postgres => {
                let pg = PgStorage::from_config(&PgConfig::from_env())?;
                pg.apply_schema().await?;
                Arc::new(pg)
            }
            StorageBackend::Memory => {
                tracing::warn!("running against in-memory storage; nothing persists");
                Arc::new(MockStorage::new())
            }
        };

        let registry = Arc::new(build_registry(config));
        if registry.is_empty() {
            tracing::warn!("no provider API keys configured; every run will fail");
        } else {
            tracing::info!(providers = ?registry.provider_ids(), "providers registered");
        }

        let mut state = Self::wire(storage, registry, config.default_mode);
        state.cors_origins = config.cors_origins.clone();
        Ok(Arc::new(state))
    }

    /// Wire state from explicit parts. Tests use this with mock storage
    /// and scripted providers.
    pub fn assemble(
        storage: Arc<dyn Storage>,
        registry: Arc<ProviderRegistry>,
        default_mode: PipelineMode,
    ) -> Arc<Self> {
        Arc::new(Self::wire(storage, registry, default_mode))
    }

    fn wire(
        storage: Arc<dyn Storage>,
        registry: Arc<ProviderRegistry>,
        default_mode: PipelineMode,
    ) -> Self {
        let engine_config = EngineConfig::default();
        Self {
            storage,
            registry: registry.clone(),
            engine: PipelineEngine::new(registry, engine_config.clone()),
            classifier: IntentClassifier::new(),
            router: ModelRouter::new(SkillMatrix::builtin(), engine_config.clone()),
            sessions: SessionStore::new(engine_config.clone()),
            catalog: ModelProfile::catalog(),
            engine_config,
            default_mode,
            cors_origins: Vec::new(),
        }
    }

    /// Catalog entries whose provider has a registered adapter.
    pub fn available_models(&self) -> Vec<ModelProfile> {
        self.catalog
            .iter()
            .filter(|profile| self.registry.contains(&profile.provider))
            .cloned()
            .collect()
    }

    /// The model used when routing produces no candidate.
    pub fn default_target(&self) -> ApiResult<ModelProfile> {
        self.available_models()
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::internal("no provider API keys configured"))
    }
}

fn build_registry(config: &ApiConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    if let Some(key) = &config.openai_api_key {
        registry.register(Arc::new(OpenAiChatProvider::new(key.clone(), "gpt-4o")));
    }
    if let Some(key) = &config.gemini_api_key {
        registry.register(Arc::new(GeminiChatProvider::new(
            key.clone(),
            "gemini-2.5-pro",
        )));
    }
    if let Some(key) = &config.perplexity_api_key {
        registry.register(Arc::new(PerplexityChatProvider::new(
            key.clone(),
            "sonar-pro",
        )));
    }
    if let Some(key) = &config.moonshot_api_key {
        registry.register(Arc::new(MoonshotChatProvider::new(key.clone(), "kimi-k2")));
    }
    if let Some(key) = &config.openrouter_api_key {
        registry.register(Arc::new(OpenRouterChatProvider::new(
            key.clone(),
            "deepseek/deepseek-chat",
        )));
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_llm::MockChatProvider;

    #[test]
    fn test_available_models_follow_registry() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockChatProvider::new("perplexity", vec![])));
        let state = AppState::assemble(
            Arc::new(MockStorage::new()),
            Arc::new(registry),
            PipelineMode::Sequential,
        );

        let available = state.available_models();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "sonar-pro");
        assert_eq!(state.default_target().unwrap().id, "sonar-pro");
    }

    #[test]
    fn test_empty_registry_has_no_default_target() {
        let state = AppState::assemble(
            Arc::new(MockStorage::new()),
            Arc::new(ProviderRegistry::new()),
            PipelineMode::Sequential,
        );
        assert!(state.default_target().is_err());
    }
}
