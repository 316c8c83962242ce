//! Subscription tiers and their batching policy.
//!
//! Higher tiers get a higher base priority, a lower latency target and a
//! smaller (or equal) batch ceiling. `TierTable::validate` enforces that
//! ordering for any table loaded from a file.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// SLA tolerance applied on top of a tier's target latency.
pub const SLA_TOLERANCE: f64 = 1.2;

/// Caller subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl Tier {
    /// All tiers, lowest first.
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Basic, Tier::Pro, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parse a tier name, treating anything unknown as FREE.
    pub fn parse_or_free(value: &str) -> Self {
        value.parse().unwrap_or(Self::Free)
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self::Free
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(ConfigError::UnknownTier(other.to_string())),
        }
    }
}

/// Immutable batching policy for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Base priority; higher is more important.
    pub priority: u32,
    pub max_batch_size: usize,
    pub min_batch_size: usize,
    /// Hard cap on how long a batch of this tier keeps collecting.
    pub max_wait_ms: u64,
    /// Target end-to-end latency, used for SLA evaluation only.
    pub target_latency_ms: u64,
}

impl TierConfig {
    /// Latency above which a single observation counts as an SLA violation.
    pub fn sla_threshold_ms(&self) -> f64 {
        self.target_latency_ms as f64 * SLA_TOLERANCE
    }

    fn check(&self, tier: Tier) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTier {
            tier: tier.to_string(),
            reason: reason.to_string(),
        };
        if self.min_batch_size == 0 {
            return Err(invalid("min_batch_size must be >= 1"));
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(invalid("min_batch_size must not exceed max_batch_size"));
        }
        if self.max_wait_ms == 0 {
            return Err(invalid("max_wait_ms must be > 0"));
        }
        if self.target_latency_ms == 0 {
            return Err(invalid("target_latency_ms must be > 0"));
        }
        Ok(())
    }
}

/// Per-tier policy lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierTable {
    configs: [TierConfig; 4],
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            configs: [
                TierConfig {
                    priority: 1,
                    max_batch_size: 32,
                    min_batch_size: 8,
                    max_wait_ms: 100,
                    target_latency_ms: 200,
                },
                TierConfig {
                    priority: 2,
                    max_batch_size: 16,
                    min_batch_size: 4,
                    max_wait_ms: 60,
                    target_latency_ms: 160,
                },
                TierConfig {
                    priority: 3,
                    max_batch_size: 12,
                    min_batch_size: 4,
                    max_wait_ms: 40,
                    target_latency_ms: 135,
                },
                TierConfig {
                    priority: 4,
                    max_batch_size: 8,
                    min_batch_size: 2,
                    max_wait_ms: 20,
                    target_latency_ms: 110,
                },
            ],
        }
    }
}

/// Partial override file: any tier table left out keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TierOverrides {
    free: Option<TierConfig>,
    basic: Option<TierConfig>,
    pro: Option<TierConfig>,
    enterprise: Option<TierConfig>,
}

impl TierTable {
    /// Build a table from explicit configs, validating the ordering invariant.
    pub fn new(
        free: TierConfig,
        basic: TierConfig,
        pro: TierConfig,
        enterprise: TierConfig,
    ) -> Result<Self, ConfigError> {
        let table = Self { configs: [free, basic, pro, enterprise] };
        table.validate()?;
        Ok(table)
    }

    pub fn get(&self, tier: Tier) -> &TierConfig {
        &self.configs[tier.index()]
    }

    /// Iterate `(tier, config)` pairs, lowest tier first.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &TierConfig)> {
        Tier::ALL.iter().map(move |t| (*t, self.get(*t)))
    }

    /// Check per-tier sanity and the cross-tier monotonic ordering.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (tier, config) in self.iter() {
            config.check(tier)?;
        }
        for pair in Tier::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            let (lo, hi) = (self.get(lower), self.get(higher));
            let violation = |reason: &str| ConfigError::TierOrdering {
                lower: lower.to_string(),
                higher: higher.to_string(),
                reason: reason.to_string(),
            };
            if hi.priority <= lo.priority {
                return Err(violation("priority must strictly increase"));
            }
            if hi.target_latency_ms >= lo.target_latency_ms {
                return Err(violation("target latency must strictly decrease"));
            }
            if hi.max_batch_size > lo.max_batch_size {
                return Err(violation("max batch size must not increase"));
            }
        }
        Ok(())
    }

    /// Parse a TOML override document on top of the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let overrides: TierOverrides = toml::from_str(source)?;
        let mut table = Self::default();
        let slots = [overrides.free, overrides.basic, overrides.pro, overrides.enterprise];
        for (config, slot) in table.configs.iter_mut().zip(slots) {
            if let Some(custom) = slot {
                *config = custom;
            }
        }
        table.validate()?;
        Ok(table)
    }

    /// Load a TOML override file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }
}
