//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience layer. All types derive Serde traits for deserialization from
//! config files, and every section has defaults so a minimal (or absent)
//! config file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Circuit breaker thresholds and timings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Deduplication lock settings.
    pub dedup: DedupConfig,

    /// Backing store location (file backend).
    pub store: StoreConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Table holding one state record per protected service.
    pub table: String,

    /// Failures that open the circuit regardless of volume.
    pub failure_threshold: u32,

    /// Successes required in HALF_OPEN before closing.
    pub success_threshold: u32,

    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,

    /// Time an open circuit waits before allowing a trial call, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Minimum requests in the window before the error percentage is considered.
    pub volume_threshold: u32,

    /// Error percentage (0-100) that opens the circuit once volume is reached.
    pub error_threshold_percentage: u32,

    /// Lifetime of a state record after its last write, in seconds.
    pub record_ttl_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            table: "circuit-breaker-state".to_string(),
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 10_000,
            reset_timeout_ms: 60_000,
            volume_threshold: 10,
            error_threshold_percentage: 50,
            record_ttl_secs: 24 * 3600,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }
}

/// Deduplication lock configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Table holding one record per event id.
    pub table: String,

    /// Age after which a PROCESSING lock is considered abandoned, in seconds.
    pub lock_timeout_secs: u64,

    /// FAILED attempts allowed before an event is given up on.
    pub max_retries: u32,

    /// Record lifetime from first write, in days.
    pub record_ttl_days: u64,

    /// Accepted clock skew for webhook signature timestamps, in seconds.
    pub signature_tolerance_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            table: "webhook-deduplication".to_string(),
            lock_timeout_secs: 5 * 60,
            max_retries: 3,
            record_ttl_days: 30,
            signature_tolerance_secs: 300,
        }
    }
}

impl DedupConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_days.saturating_mul(24 * 3600))
    }

    pub fn signature_tolerance(&self) -> Duration {
        Duration::from_secs(self.signature_tolerance_secs)
    }
}

/// File store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON file backing the store.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "resilience-store.json".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// One JSON object per line for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.timeout(), Duration::from_secs(10));
        assert_eq!(config.dedup.max_retries, 3);
        assert_eq!(config.dedup.record_ttl(), Duration::from_secs(30 * 24 * 3600));
        assert_eq!(config.dedup.signature_tolerance(), Duration::from_secs(300));
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ResilienceConfig = toml::from_str(
            r#"
            [circuit_breaker]
            failure_threshold = 3

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.success_threshold, 2);
        assert_eq!(config.dedup.table, "webhook-deduplication");
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
