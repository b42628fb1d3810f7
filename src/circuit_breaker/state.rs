//! Persisted breaker record and its state machine.
//!
//! The transition rules are pure functions over [`CircuitBreakerRecord`];
//! the executor in `breaker.rs` only loads, applies and saves.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::CircuitBreakerConfig;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    #[default]
    Closed,
    /// Dependency assumed down, calls fail fast.
    Open,
    /// Cooldown elapsed, calls are trials.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change produced by applying an outcome to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// One record per protected service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerRecord {
    pub service_name: String,
    pub state: CircuitState,
    /// Failures since the last reset.
    pub failure_count: u32,
    /// Successes accumulated while half-open (also counted while closed).
    pub success_count: u32,
    /// Requests counted toward the error-rate window.
    pub total_requests: u32,
    /// Failures counted toward the error-rate window.
    pub error_count: u32,
    /// round(100 * error_count / total_requests), 0 when there are no requests.
    pub error_percentage: u32,
    /// Epoch millis of the most recent failure.
    #[serde(default)]
    pub last_failure_time: Option<i64>,
    /// Expiry as epoch seconds.
    #[serde(default)]
    pub ttl: i64,
}

impl CircuitBreakerRecord {
    /// Fresh CLOSED record with zeroed counters.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            error_count: 0,
            error_percentage: 0,
            last_failure_time: None,
            ttl: 0,
        }
    }

    /// Whether an OPEN record may move to HALF_OPEN at `now_millis`.
    ///
    /// A record with no recorded failure time is always eligible.
    pub fn reset_timeout_elapsed(&self, now_millis: i64, reset_timeout_millis: i64) -> bool {
        match self.last_failure_time {
            Some(at) => now_millis.saturating_sub(at) >= reset_timeout_millis,
            None => true,
        }
    }

    /// OPEN → HALF_OPEN once the reset timeout has elapsed.
    pub fn try_half_open(&mut self, now_millis: i64, reset_timeout_millis: i64) -> Option<Transition> {
        if self.state != CircuitState::Open
            || !self.reset_timeout_elapsed(now_millis, reset_timeout_millis)
        {
            return None;
        }
        self.success_count = 0;
        Some(self.move_to(CircuitState::HalfOpen))
    }

    /// Apply a successful call.
    pub fn record_success(&mut self, config: &CircuitBreakerConfig) -> Option<Transition> {
        match self.state {
            CircuitState::Open => None,
            CircuitState::Closed => {
                self.success_count = self.success_count.saturating_add(1);
                self.total_requests = self.total_requests.saturating_add(1);
                self.recompute_error_percentage();
                None
            }
            CircuitState::HalfOpen => {
                self.success_count = self.success_count.saturating_add(1);
                self.total_requests = self.total_requests.saturating_add(1);
                self.recompute_error_percentage();
                if self.success_count >= config.success_threshold {
                    self.reset_counters();
                    Some(self.move_to(CircuitState::Closed))
                } else {
                    None
                }
            }
        }
    }

    /// Apply a failed or timed-out call at `now_millis`.
    pub fn record_failure(
        &mut self,
        now_millis: i64,
        config: &CircuitBreakerConfig,
    ) -> Option<Transition> {
        self.failure_count = self.failure_count.saturating_add(1);
        self.error_count = self.error_count.saturating_add(1);
        self.total_requests = self.total_requests.saturating_add(1);
        self.last_failure_time = Some(now_millis);
        self.recompute_error_percentage();

        match self.state {
            CircuitState::Open => None,
            CircuitState::HalfOpen => {
                self.success_count = 0;
                Some(self.move_to(CircuitState::Open))
            }
            CircuitState::Closed => {
                let over_absolute = self.failure_count >= config.failure_threshold;
                let over_rate = self.total_requests >= config.volume_threshold
                    && self.error_percentage >= config.error_threshold_percentage;
                if over_absolute || over_rate {
                    Some(self.move_to(CircuitState::Open))
                } else {
                    None
                }
            }
        }
    }

    /// Force CLOSED with all counters zeroed.
    pub fn reset(&mut self) -> Option<Transition> {
        self.reset_counters();
        self.last_failure_time = None;
        if self.state == CircuitState::Closed {
            None
        } else {
            Some(self.move_to(CircuitState::Closed))
        }
    }

    fn reset_counters(&mut self) {
        self.failure_count = 0;
        self.success_count = 0;
        self.total_requests = 0;
        self.error_count = 0;
        self.error_percentage = 0;
    }

    fn recompute_error_percentage(&mut self) {
        self.error_percentage = error_percentage(self.error_count, self.total_requests);
    }

    fn move_to(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }
}

/// round(100 * errors / total), halves rounding up; 0 when `total` is 0.
pub fn error_percentage(errors: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let (errors, total) = (u64::from(errors), u64::from(total));
    let rounded = (200 * errors + total) / (2 * total);
    u32::try_from(rounded).unwrap_or(u32::MAX)
}
