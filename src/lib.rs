//! tierbatch
//!
//! Tier-aware request batching in front of a machine-translation inference
//! backend. Callers submit single texts tagged with a subscription tier;
//! worker tasks group them into same-language batches under per-tier size
//! and wait limits, send each batch to the backend in one call, and deliver
//! every caller its own translation.
//!
//! # Scheduling
//!
//! - **Aging priority**: score = -(tier priority + seconds waited * boost);
//!   recomputed before every dequeue, so low tiers cannot starve.
//! - **Tier policy**: the first request of a batch fixes its size ceiling,
//!   max wait and language pair.
//! - **Failure broadcast**: a failed backend call fails every request in
//!   that batch with the same error.
//!
//! The HTTP routing and auth in front of the service belong to the
//! embedding application.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;
pub mod tier;

pub use backend::{BackendHealth, HttpClientConfig, HttpInferenceClient, InferenceBackend};
pub use error::{BatchError, ConfigError, QueueError, TranslationError};
pub use scheduler::{ServiceConfig, TranslationOutput, TranslationService};
pub use tier::{Tier, TierConfig, TierTable};
