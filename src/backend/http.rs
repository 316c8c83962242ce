//! HTTP client for the translation model service.
//!
//! `POST {base}/translate` takes either a single text or a list of texts;
//! `GET {base}/health` reports model and GPU state. 5xx and transport
//! failures are retried with exponential backoff, 4xx fail immediately.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::metrics::{ClientMetrics, ClientMetricsSnapshot};
use super::{BackendHealth, InferenceBackend};
use crate::error::{ConfigError, TranslationError};
use crate::telemetry;

/// Default model service location.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8001";

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    /// Sent as `X-API-Key` when present.
    pub api_key: Option<String>,
    /// Per-request timeout, covering connect and body.
    pub timeout: Duration,
    pub max_retries: u32,
    /// First backoff delay; doubles on each further attempt.
    pub retry_base_delay: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum TranslatePayload<'a> {
    Single {
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
    },
    Batch {
        texts: &'a [String],
        source_lang: &'a str,
        target_lang: &'a str,
    },
}

#[derive(Deserialize)]
struct SingleResponse {
    translation: String,
    #[serde(default)]
    tokens_used: Option<u64>,
}

#[derive(Deserialize)]
struct BatchResponse {
    translations: Vec<String>,
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    tokens_used: Option<u64>,
}

/// Outcome of one failed attempt.
enum AttemptError {
    /// Worth another attempt (5xx, connect/timeout/body errors).
    Transient(TranslationError),
    /// Will fail the same way again (4xx, malformed response).
    Permanent(TranslationError),
}

/// Batch translation client with bounded retries.
#[derive(Debug)]
pub struct HttpInferenceClient {
    client: reqwest::Client,
    config: HttpClientConfig,
    metrics: ClientMetrics,
}

impl HttpInferenceClient {
    pub fn new(mut config: HttpClientConfig) -> Result<Self, ConfigError> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let value = reqwest::header::HeaderValue::from_str(key)
                .map_err(|e| ConfigError::HttpClient(format!("invalid API key header: {e}")))?;
            headers.insert("X-API-Key", value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(20)
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self { client, config, metrics: ClientMetrics::new() })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.retry_base_delay * 2u32.saturating_pow(attempt)
    }

    async fn send_once(
        &self,
        url: &str,
        payload: &TranslatePayload<'_>,
        expected: usize,
    ) -> Result<(Vec<String>, u64), AttemptError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(TranslationError::transient(format!("request error: {e}"), None)))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            error!(
                status_code = status.as_u16(),
                response = %truncate(&body, 200),
                "translation_client_error"
            );
            return Err(AttemptError::Permanent(TranslationError::permanent(
                format!("backend rejected request with status {}", status.as_u16()),
                Some(status.as_u16()),
            )));
        }
        if !status.is_success() {
            return Err(AttemptError::Transient(TranslationError::transient(
                format!("backend returned status {}", status.as_u16()),
                Some(status.as_u16()),
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            AttemptError::Transient(TranslationError::transient(format!("body read error: {e}"), None))
        })?;
        decode_translations(&body, expected).map_err(AttemptError::Permanent)
    }
}

fn decode_translations(body: &[u8], expected: usize) -> Result<(Vec<String>, u64), TranslationError> {
    let malformed = |e: serde_json::Error| TranslationError::permanent(format!("malformed backend response: {e}"), None);
    if expected == 1 {
        let parsed: SingleResponse = serde_json::from_slice(body).map_err(malformed)?;
        return Ok((vec![parsed.translation], parsed.tokens_used.unwrap_or(0)));
    }
    let parsed: BatchResponse = serde_json::from_slice(body).map_err(malformed)?;
    if parsed.translations.len() != expected {
        return Err(TranslationError::permanent(
            format!(
                "backend returned {} translations for {} texts",
                parsed.translations.len(),
                expected
            ),
            None,
        ));
    }
    let tokens = parsed.total_tokens.or(parsed.tokens_used).unwrap_or(0);
    Ok((parsed.translations, tokens))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait::async_trait]
impl InferenceBackend for HttpInferenceClient {
    async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>, TranslationError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/translate", self.config.base_url);
        let payload = match texts {
            [text] => TranslatePayload::Single { text, source_lang, target_lang },
            _ => TranslatePayload::Batch { texts, source_lang, target_lang },
        };

        let start = Instant::now();
        let attempts = self.config.max_retries + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.send_once(&url, &payload, texts.len()).await {
                Ok((translations, tokens)) => {
                    let elapsed = start.elapsed();
                    self.metrics.record_success(texts.len(), tokens, elapsed);
                    debug!(
                        batch_size = texts.len(),
                        tokens,
                        attempt = attempt + 1,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "translation_batch_ok"
                    );
                    return Ok(translations);
                }
                Err(AttemptError::Permanent(err)) => {
                    self.metrics.record_error();
                    telemetry::record_backend_error(&err);
                    return Err(err);
                }
                Err(AttemptError::Transient(err)) => {
                    self.metrics.record_error();
                    telemetry::record_backend_error(&err);
                    if attempt + 1 < attempts {
                        self.metrics.record_retry();
                        telemetry::record_backend_retry();
                        let wait = self.backoff(attempt);
                        warn!(
                            attempt = attempt + 1,
                            error = %err,
                            wait_ms = wait.as_millis() as u64,
                            "translation_retry"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        let (message, status) = match last_error {
            Some(TranslationError::Backend { message, status, .. }) => (message, status),
            Some(other) => (other.to_string(), None),
            None => ("no attempt was made".to_string(), None),
        };
        error!(
            error = %message,
            attempts,
            batch_size = texts.len(),
            "translation_failed"
        );
        Err(TranslationError::transient(
            format!("batch translation failed after {attempts} attempts: {message}"),
            status,
        ))
    }

    async fn health_check(&self) -> BackendHealth {
        let url = format!("{}/health", self.config.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "health_check_failed");
                return BackendHealth::unhealthy(e.to_string());
            }
        };
        if !response.status().is_success() {
            let status = response.status().as_u16();
            error!(status_code = status, "health_check_failed");
            return BackendHealth::unhealthy(format!("health endpoint returned status {status}"));
        }
        match response.json::<BackendHealth>().await {
            Ok(health) => health,
            Err(e) => {
                error!(error = %e, "health_check_failed");
                BackendHealth::unhealthy(format!("malformed health response: {e}"))
            }
        }
    }

    fn metrics(&self) -> ClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }
}
