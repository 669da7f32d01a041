//! API server configuration from environment variables.

use colloquy_core::PipelineMode;

/// Which storage backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL via `COLLOQUY_DB_*`
    Postgres,
    /// In-memory mock, for local runs without a database
    Memory,
}

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub default_mode: PipelineMode,
    /// Allowed CORS origins; empty means allow all
    pub cors_origins: Vec<String>,

    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub moonshot_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let storage = match std::env::var("COLLOQUY_STORAGE").as_deref() {
            Ok("memory") => StorageBackend::Memory,
            Ok(_) => StorageBackend::Postgres,
            Err(_) => StorageBackend::Postgres,
        };

        let default_mode = std::env::var("COLLOQUY_DEFAULT_MODE")
            .ok()
            .and_then(|m| PipelineMode::from_db_str(&m).ok())
            .unwrap_or_default();

        Self {
            bind_host: std::env::var("COLLOQUY_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .or_else(|| std::env::var("COLLOQUY_API_PORT").ok())
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            storage,
            default_mode,
            cors_origins: std::env::var("COLLOQUY_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            perplexity_api_key: non_empty("PERPLEXITY_API_KEY"),
            moonshot_api_key: non_empty("MOONSHOT_API_KEY"),
            openrouter_api_key: non_empty("OPENROUTER_API_KEY"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr_format() {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            storage: StorageBackend::Memory,
            default_mode: PipelineMode::Sequential,
            cors_origins: Vec::new(),
            openai_api_key: None,
            gemini_api_key: None,
            perplexity_api_key: None,
            moonshot_api_key: None,
            openrouter_api_key: None,
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }
}
