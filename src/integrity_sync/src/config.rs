//! Reconciler configuration: TOML model, defaults, validation, and loading.
//!
//! Every key is optional; an empty file (or no file at all) yields the
//! production defaults:
//!
//! ```toml
//! [fetch]
//! identity_page_size = 1000
//! document_page_size = 500
//! rate_limit_delay_ms = 100
//! memory_pause_ms = 2000
//!
//! [memory]
//! budget_mb = 512
//! pause_threshold = 0.8
//!
//! [progress]
//! interval = 1000
//!
//! [checks]
//! chunk_size = 500
//! chunk_concurrency = 32
//! issue_preview_limit = 10
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 100
//! backoff_multiplier = 2
//!
//! [apply]
//! batch_size = 500
//!
//! [collections]
//! users = "users"
//! provider_profiles = "sos_profiles"
//! calls = "calls"
//!
//! [pricing]
//! lawyer = 49
//! expat = 19
//! ```
//!
//! Unknown keys are rejected so typos surface instead of silently falling
//! back to a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::ProviderKind;
use crate::retry::RetryPolicy;

/// Errors raised while loading or validating [`ReconcilerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("read config file {path}: {source}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The TOML did not match the schema.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is outside its allowed range.
    #[error("invalid config value `{key}`: {reason}")]
    Invalid {
        /// Dotted key, e.g. `fetch.identity_page_size`.
        key: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// Paging and throttling of the fetchers.
    pub fetch: FetchCfg,
    /// Memory accounting.
    pub memory: MemoryCfg,
    /// Progress logging.
    pub progress: ProgressCfg,
    /// Check-phase tuning.
    pub checks: ChecksCfg,
    /// Retry policy for every remote call.
    pub retry: RetryCfg,
    /// Fix application.
    pub apply: ApplyCfg,
    /// Collection names in the document store.
    pub collections: CollectionsCfg,
    /// Default prices for synthesized provider profiles.
    pub pricing: PricingCfg,
}

/// Paging and throttling of the fetchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchCfg {
    /// Accounts requested per identity page.
    pub identity_page_size: usize,
    /// Documents requested per collection page.
    pub document_page_size: usize,
    /// Fixed pause between pages and between fix batches.
    pub rate_limit_delay_ms: u64,
    /// Pause applied when memory pressure is detected.
    pub memory_pause_ms: u64,
}

impl Default for FetchCfg {
    fn default() -> Self {
        Self {
            identity_page_size: 1000,
            document_page_size: 500,
            rate_limit_delay_ms: 100,
            memory_pause_ms: 2000,
        }
    }
}

impl FetchCfg {
    /// [`Self::rate_limit_delay_ms`] as a `Duration`.
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    /// [`Self::memory_pause_ms`] as a `Duration`.
    pub fn memory_pause(&self) -> Duration {
        Duration::from_millis(self.memory_pause_ms)
    }
}

/// Memory accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryCfg {
    /// Budget for records held by the fetchers, in MiB.
    pub budget_mb: u64,
    /// Fraction of the budget above which fetchers pause.
    pub pause_threshold: f64,
}

impl Default for MemoryCfg {
    fn default() -> Self {
        Self {
            budget_mb: 512,
            pause_threshold: 0.8,
        }
    }
}

impl MemoryCfg {
    /// Budget in bytes.
    pub fn budget_bytes(&self) -> u64 {
        self.budget_mb.saturating_mul(1024 * 1024)
    }
}

/// Progress logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgressCfg {
    /// Log progress every `interval` items.
    pub interval: u64,
}

impl Default for ProgressCfg {
    fn default() -> Self {
        Self { interval: 1000 }
    }
}

/// Check-phase tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksCfg {
    /// Identity accounts compared per chunk in the user check.
    pub chunk_size: usize,
    /// Entries compared concurrently within one chunk.
    pub chunk_concurrency: usize,
    /// Issues listed in the final report before truncating.
    pub issue_preview_limit: usize,
}

impl Default for ChecksCfg {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_concurrency: 32,
            issue_preview_limit: 10,
        }
    }
}

/// Retry policy for every remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryCfg {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay_ms: u64,
    /// Factor applied to the delay after each further failure.
    pub backoff_multiplier: u32,
}

impl Default for RetryCfg {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
        }
    }
}

impl RetryCfg {
    /// Builds the runtime policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// Fix application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApplyCfg {
    /// Maximum writes per atomic batch.
    pub batch_size: usize,
}

impl Default for ApplyCfg {
    fn default() -> Self {
        Self { batch_size: 500 }
    }
}

/// Collection names in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectionsCfg {
    /// User documents, keyed by identity uid.
    pub users: String,
    /// Provider profiles, keyed by the owning user's uid.
    pub provider_profiles: String,
    /// Call records.
    pub calls: String,
}

impl Default for CollectionsCfg {
    fn default() -> Self {
        Self {
            users: "users".into(),
            provider_profiles: "sos_profiles".into(),
            calls: "calls".into(),
        }
    }
}

/// Default prices for synthesized provider profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PricingCfg {
    /// Price of a lawyer call.
    pub lawyer: u32,
    /// Price of an expat call.
    pub expat: u32,
}

impl Default for PricingCfg {
    fn default() -> Self {
        Self {
            lawyer: 49,
            expat: 19,
        }
    }
}

impl PricingCfg {
    /// Role-keyed price table lookup.
    pub fn price_for(&self, kind: ProviderKind) -> u32 {
        match kind {
            ProviderKind::Lawyer => self.lawyer,
            ProviderKind::Expat => self.expat,
        }
    }
}

impl ReconcilerConfig {
    /// Rejects values that would stall or break a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key, reason| Err(ConfigError::Invalid { key, reason });

        if self.fetch.identity_page_size == 0 {
            return invalid("fetch.identity_page_size", "must be at least 1");
        }
        if self.fetch.document_page_size == 0 {
            return invalid("fetch.document_page_size", "must be at least 1");
        }
        if !(self.memory.pause_threshold > 0.0 && self.memory.pause_threshold <= 1.0) {
            return invalid("memory.pause_threshold", "must be in (0, 1]");
        }
        if self.memory.budget_mb == 0 {
            return invalid("memory.budget_mb", "must be at least 1");
        }
        if self.progress.interval == 0 {
            return invalid("progress.interval", "must be at least 1");
        }
        if self.checks.chunk_size == 0 {
            return invalid("checks.chunk_size", "must be at least 1");
        }
        if self.checks.chunk_concurrency == 0 {
            return invalid("checks.chunk_concurrency", "must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts", "must be at least 1");
        }
        if self.retry.backoff_multiplier == 0 {
            return invalid("retry.backoff_multiplier", "must be at least 1");
        }
        if self.apply.batch_size == 0 {
            return invalid("apply.batch_size", "must be at least 1");
        }
        Ok(())
    }
}

/// Parse and validate a configuration from a TOML string.
pub fn load_config_str(toml_str: &str) -> Result<ReconcilerConfig, ConfigError> {
    let cfg: ReconcilerConfig = toml::from_str(toml_str)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Read a TOML file from disk, parse, and validate it.
pub fn load_config_path(path: impl AsRef<Path>) -> Result<ReconcilerConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_str(&text)
}
