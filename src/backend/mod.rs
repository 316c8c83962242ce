//! Inference backend access.
//!
//! The scheduler only talks to `InferenceBackend`; `HttpInferenceClient` is
//! the production implementation against the translation model service.

mod http;
mod metrics;

pub use http::{HttpClientConfig, HttpInferenceClient};
pub use self::metrics::{ClientMetrics, ClientMetricsSnapshot};

use serde::{Deserialize, Serialize};

use crate::error::TranslationError;

/// Backend health as reported by its health endpoint. Failures to reach the
/// endpoint are reported here as data, never as errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_loaded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Any other fields the backend includes.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BackendHealth {
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// A batch-capable translation backend.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Translate `texts` in one call. The result has the same length and
    /// order as the input.
    async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>, TranslationError>;

    /// Query backend health without failing.
    async fn health_check(&self) -> BackendHealth;

    fn metrics(&self) -> ClientMetricsSnapshot;

    fn reset_metrics(&self);
}
