//! COLLOQUY API server entry point.

use colloquy_api::{api_router, ApiConfig, ApiError, ApiResult, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env();
    let state = AppState::from_config(&config).await?;
    let app = api_router(state);

    let addr = config.bind_addr();
    tracing::info!(%addr, "starting COLLOQUY API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::internal(format!("failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal(format!("server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
