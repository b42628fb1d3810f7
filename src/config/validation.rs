//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, percentage within 1..=100)
//! - Reject empty table names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::ResilienceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every error found.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let cb = &config.circuit_breaker;

    if cb.table.trim().is_empty() {
        errors.push(ValidationError::new("circuit_breaker.table", "must not be empty"));
    }
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be > 0"));
    }
    if cb.success_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.success_threshold", "must be > 0"));
    }
    if cb.timeout_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.timeout_ms", "must be > 0"));
    }
    if cb.volume_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.volume_threshold", "must be > 0"));
    }
    if !(1..=100).contains(&cb.error_threshold_percentage) {
        errors.push(ValidationError::new(
            "circuit_breaker.error_threshold_percentage",
            format!("must be within 1..=100, got {}", cb.error_threshold_percentage),
        ));
    }
    if cb.record_ttl_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.record_ttl_secs", "must be > 0"));
    }

    let dedup = &config.dedup;
    if dedup.table.trim().is_empty() {
        errors.push(ValidationError::new("dedup.table", "must not be empty"));
    }
    if dedup.lock_timeout_secs == 0 {
        errors.push(ValidationError::new("dedup.lock_timeout_secs", "must be > 0"));
    }
    if dedup.record_ttl_days == 0 {
        errors.push(ValidationError::new("dedup.record_ttl_days", "must be > 0"));
    }

    if config.store.path.trim().is_empty() {
        errors.push(ValidationError::new("store.path", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
