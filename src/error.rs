//! Error types for the translation scheduler.
//!
//! Callers only ever observe `TranslationError`. The other enums are
//! component-level and convert into it at the service boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors delivered to translation callers.
///
/// `Clone` so one backend failure can be broadcast to every request
/// in the batch that triggered it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Translation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Translation failed: {message}")]
    Backend {
        message: String,
        status: Option<u16>,
        retryable: bool,
    },

    #[error("Translation service is not running; call start() first")]
    NotRunning,

    #[error("Translation queue is full ({max} pending requests)")]
    QueueFull { max: usize },

    #[error("Request {request_id} was dropped before a result was delivered")]
    Dropped { request_id: String },

    #[error("Result for request {request_id} was already delivered")]
    AlreadyResolved { request_id: String },
}

impl TranslationError {
    /// Build a backend error that the caller may retry.
    pub fn transient(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Backend { message: message.into(), status, retryable: true }
    }

    /// Build a backend error that will fail again if retried unchanged.
    pub fn permanent(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Backend { message: message.into(), status, retryable: false }
    }

    /// Whether the caller's own retry policy should try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { retryable, .. } => *retryable,
            Self::Timeout { .. } | Self::QueueFull { .. } | Self::Dropped { .. } => true,
            Self::NotRunning | Self::AlreadyResolved { .. } => false,
        }
    }

    /// Returns true if this error should be logged as a warning rather than an error.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::QueueFull { .. })
    }
}

/// Queue admission errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Translation queue is full ({max} pending requests)")]
    QueueFull { max: usize },
}

impl From<QueueError> for TranslationError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::QueueFull { max } => Self::QueueFull { max },
        }
    }
}

/// Errors from one batch collection/processing cycle.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Cannot process an empty batch")]
    EmptyBatch,

    #[error("Batch of {batch_size} failed: {source}")]
    Inference {
        batch_size: usize,
        #[source]
        source: TranslationError,
    },
}

/// Configuration errors (tier table and config files).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid tier policy for {tier}: {reason}")]
    InvalidTier { tier: String, reason: String },

    #[error("Tier ordering violated between {lower} and {higher}: {reason}")]
    TierOrdering {
        lower: String,
        higher: String,
        reason: String,
    },

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("Failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Invalid tier file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),
}
