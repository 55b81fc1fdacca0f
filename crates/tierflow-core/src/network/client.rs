//! Authenticated HTTP client for the fabric management API.
//!
//! Wraps reqwest with:
//! - Basic authentication on every request
//! - TLS verification toggle and request timeout
//! - A semaphore bounding in-flight requests
//! - Request counters and average latency
//! - Status mapping onto the library error taxonomy

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::config::FabricConfig;
use crate::error::{Result, TierflowError};
use crate::network::retry::{retry_async, RetryConfig};

const USER_AGENT: &str = concat!("tierflow/", env!("CARGO_PKG_VERSION"));

/// Snapshot of request counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub active_requests: u64,
    pub average_response_ms: f64,
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
    latency_us: AtomicU64,
}

/// HTTP client bound to one fabric endpoint.
pub struct FabricClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
    permits: Semaphore,
    max_concurrent: usize,
    counters: Counters,
    read_retry: RetryConfig,
}

impl FabricClient {
    /// Build a client from the fabric section of the configuration.
    pub fn new(config: &FabricConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(TierflowError::Config {
                message: "fabric base_url, username, and password are required".to_string(),
            });
        }

        let mut base_url = Url::parse(&config.base_url).map_err(|e| TierflowError::Config {
            message: format!("invalid fabric base_url '{}': {}", config.base_url, e),
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        if !config.verify_tls {
            warn!("TLS certificate verification is disabled for {}", base_url);
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TierflowError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let max_concurrent = config.max_concurrent_requests.max(1);
        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            counters: Counters::default(),
            read_retry: RetryConfig::for_fabric_reads(config),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve path segments against the base URL, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TierflowError::Config {
                message: format!("fabric base_url {} cannot be a base", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a JSON document, retrying transient failures.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        let target = &url;
        let (result, stats) = retry_async(
            &self.read_retry,
            || {
                let request = self.client.get(target.clone()).query(query);
                async move {
                    let response = self.execute(request, target).await?;
                    decode_json(response).await
                }
            },
            is_transient,
        )
        .await;

        if stats.attempts > 1 {
            debug!(url = %url, attempts = stats.attempts, "GET completed after retries");
        }
        result
    }

    /// Send a request with an optional JSON body. Never retried.
    pub async fn send_json<B, T>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let mut request = self.client.request(method, url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.execute(request, &url).await?;
        decode_json(response).await
    }

    /// Snapshot the request counters.
    pub fn stats(&self) -> RequestStats {
        let total = self.counters.total.load(Ordering::Relaxed);
        let latency_us = self.counters.latency_us.load(Ordering::Relaxed);
        RequestStats {
            total_requests: total,
            failed_requests: self.counters.failed.load(Ordering::Relaxed),
            active_requests: self.counters.active.load(Ordering::Relaxed),
            average_response_ms: if total == 0 {
                0.0
            } else {
                latency_us as f64 / total as f64 / 1000.0
            },
            max_concurrent_requests: self.max_concurrent,
        }
    }

    // Internal methods

    async fn execute(&self, request: RequestBuilder, url: &Url) -> Result<Response> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TierflowError::Other("fabric client is shut down".to_string()))?;

        self.counters.active.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let outcome = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await;
        let elapsed = started.elapsed();
        self.counters.active.fetch_sub(1, Ordering::Relaxed);
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.counters
            .latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        let result = match outcome {
            Ok(response) => check_response_status(response, url).await,
            Err(e) => Err(TierflowError::from(e)),
        };

        if let Err(e) = &result {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            debug!(url = %url, error = %e, "Fabric request failed");
        } else {
            debug!(url = %url, elapsed_ms = elapsed.as_millis() as u64, "Fabric request succeeded");
        }
        result
    }
}

async fn check_response_status(response: Response, url: &Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, url.path(), &body))
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    let trimmed = text.trim();
    let body = if trimmed.is_empty() { "null" } else { trimmed };
    serde_json::from_str(body).map_err(|e| TierflowError::Api {
        message: format!("unexpected response body: {}", e),
        status: None,
    })
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_status(status: StatusCode, resource: &str, body: &str) -> TierflowError {
    let detail = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body.trim().chars().take(512).collect()
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TierflowError::Authentication {
            message: format!("{} rejected credentials: {}", resource, detail),
        },
        StatusCode::NOT_FOUND => TierflowError::NotFound {
            resource: resource.to_string(),
        },
        _ => TierflowError::Api {
            message: detail,
            status: Some(status.as_u16()),
        },
    }
}

/// Check if an HTTP status code indicates a retryable error.
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

/// Retry predicate for reads: API errors with a status retry only on
/// transient codes; transport errors (no status) always retry.
fn is_transient(err: &TierflowError) -> bool {
    match err {
        TierflowError::Api {
            status: Some(code), ..
        } => StatusCode::from_u16(*code).is_ok_and(is_retryable_status),
        other => other.is_retryable(),
    }
}
