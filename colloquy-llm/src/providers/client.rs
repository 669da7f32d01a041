//! Shared provider HTTP client with rate limiting.

use super::{invalid_response, rate_limited, request_failed};
use colloquy_core::ColloquyResult;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// How the API key is presented to the provider.
#[derive(Debug, Clone)]
enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Bare key in a provider-specific header (Gemini's `x-goog-api-key`)
    ApiKeyHeader(&'static str),
}

/// HTTP client for one provider endpoint, with request pacing.
///
/// Pacing is permit-based plus a minimum inter-request interval, so a burst
/// of pipeline stages cannot trip a provider's per-minute quota.
pub struct ProviderHttpClient {
    client: Client,
    provider: String,
    api_key: String,
    base_url: String,
    auth: AuthStyle,
    rate_limiter: Arc<Semaphore>,
    last_request: Arc<AtomicU64>,
    min_request_interval_ms: u64,
    start_time: Instant,
}

impl ProviderHttpClient {
    /// Create a client for a provider endpoint.
    ///
    /// # Arguments
    /// * `provider` - Provider id used in error tags and logs
    /// * `base_url` - Endpoint base, e.g. `https://api.openai.com/v1`
    /// * `api_key` - Bearer credential
    /// * `requests_per_minute` - Pacing budget (min 1)
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        requests_per_minute: u32,
    ) -> Self {
        let rpm = requests_per_minute.max(1);
        let permits = rpm as usize;
        let min_interval_ms = (60_000 / rpm as u64).max(10);

        Self {
            client: Client::new(),
            provider: provider.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            auth: AuthStyle::Bearer,
            rate_limiter: Arc::new(Semaphore::new(permits)),
            last_request: Arc::new(AtomicU64::new(0)),
            min_request_interval_ms: min_interval_ms,
            start_time: Instant::now(),
        }
    }

    /// Present the key in a bare provider-specific header instead of
    /// `Authorization: Bearer`.
    pub fn with_api_key_header(mut self, header: &'static str) -> Self {
        self.auth = AuthStyle::ApiKeyHeader(header);
        self
    }

    /// Provider id this client serves.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// POST a JSON body and decode a JSON response, with pacing and
    /// provider-tagged error mapping.
    pub async fn post_json<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> ColloquyResult<Res> {
        let response = self.post_raw(endpoint, body, false).await?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);

        if status.is_success() {
            response.json().await.map_err(|e| {
                invalid_response(&self.provider, format!("Failed to parse response: {}", e))
            })
        } else {
            Err(self.map_error_status(status, retry_after_ms, response).await)
        }
    }

    /// POST a JSON body and return the raw streaming response on success.
    pub async fn post_stream<Req: Serialize>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> ColloquyResult<Response> {
        let response = self.post_raw(endpoint, body, true).await?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);

        if status.is_success() {
            Ok(response)
        } else {
            Err(self.map_error_status(status, retry_after_ms, response).await)
        }
    }

    async fn post_raw<Req: Serialize>(
        &self,
        endpoint: &str,
        body: &Req,
        sse: bool,
    ) -> ColloquyResult<Response> {
        // Pacing: acquire permit, then honor the minimum interval.
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            request_failed(&self.provider, 0, format!("Rate limiter error: {}", e))
        })?;

        let now_ms = self.start_time.elapsed().as_millis() as u64;
        let last_ms = self.last_request.load(Ordering::Relaxed);
        let elapsed = now_ms.saturating_sub(last_ms);

        if elapsed < self.min_request_interval_ms {
            let wait_ms = self.min_request_interval_ms - elapsed;
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }

        self.last_request.store(now_ms, Ordering::Relaxed);

        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!(provider = %self.provider, %url, sse, "provider request");

        let mut request = self.client.post(&url).header("Content-Type", "application/json");
        request = match self.auth {
            AuthStyle::Bearer => {
                request.header("Authorization", format!("Bearer {}", self.api_key))
            }
            AuthStyle::ApiKeyHeader(header) => request.header(header, &self.api_key),
        };
        if sse {
            request = request.header("Accept", "text/event-stream");
        }

        request.json(body).send().await.map_err(|e| {
            request_failed(&self.provider, 0, format!("HTTP request failed: {}", e))
        })
    }

    async fn map_error_status(
        &self,
        status: StatusCode,
        retry_after_ms: i64,
        response: Response,
    ) -> colloquy_core::ColloquyError {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        // Best-effort extraction of the provider's error message.
        let error_msg = serde_json::from_str::<super::wire::ApiErrorBody>(&error_text)
            .map(|body| body.error.message)
            .unwrap_or(error_text);

        match status {
            StatusCode::TOO_MANY_REQUESTS => rate_limited(&self.provider, retry_after_ms),
            _ => request_failed(&self.provider, status.as_u16() as i32, error_msg),
        }
    }
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as i64)
}

impl std::fmt::Debug for ProviderHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHttpClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
