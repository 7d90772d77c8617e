//! Engine configuration.
//!
//! Every field has a default, so a partial JSON document is enough.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error as ThisError;

use crate::haversine::DEFAULT_SPEED_KMH;
use crate::offline::DEFAULT_MAX_PASSES;

/// Documented per-call stop ceiling of the routing provider. The worker's
/// start point travels with the stops and is not counted.
pub const DEFAULT_PROVIDER_LIMIT: usize = 30;

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Connection settings for the OSRM routing service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub profile: String,
    /// Bound on one outbound call.
    pub timeout_secs: u64,
    /// Pause before the single retry of a failed call.
    pub retry_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 5,
            retry_backoff_ms: 250,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum stops per provider call, not counting the start point; larger
    /// sets are batched.
    pub provider_limit: usize,
    /// Assumed average driving speed for offline estimates.
    pub avg_speed_kmh: f64,
    pub two_opt_max_passes: usize,
    /// Retry hint returned with `Busy` to manual callers.
    pub busy_retry_after_secs: u64,
    /// Deviation from the planned position that callers should treat as drift.
    pub drift_threshold_meters: f64,
    pub provider: ProviderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_limit: DEFAULT_PROVIDER_LIMIT,
            avg_speed_kmh: DEFAULT_SPEED_KMH,
            two_opt_max_passes: DEFAULT_MAX_PASSES,
            busy_retry_after_secs: 5,
            drift_threshold_meters: 250.0,
            provider: ProviderConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_limit < 2 {
            return Err(ConfigError::Invalid(format!(
                "provider_limit must be at least 2, got {}",
                self.provider_limit
            )));
        }
        if !(self.avg_speed_kmh.is_finite() && self.avg_speed_kmh > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "avg_speed_kmh must be positive, got {}",
                self.avg_speed_kmh
            )));
        }
        if self.drift_threshold_meters < 0.0 {
            return Err(ConfigError::Invalid(
                "drift_threshold_meters must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn busy_retry_after(&self) -> Duration {
        Duration::from_secs(self.busy_retry_after_secs)
    }
}
