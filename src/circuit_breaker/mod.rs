//! Circuit breaker for protected dependencies.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast (or use the fallback)
//! - Half-Open: reset timeout elapsed, calls are trials
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//!                OR (total_requests >= volume_threshold AND error% >= error_threshold_percentage)
//! Open → Half-Open: first call after reset_timeout (that call runs as a trial)
//! Half-Open → Closed: success_count >= success_threshold (all counters reset)
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-service breaker, state persisted in the conditional store
//! - Timeouts count as failures and surface as a distinct error
//! - Store reads are fail-open: an unreadable record is treated as CLOSED
//! - State is written back after every call with a renewed expiry

pub mod breaker;
pub mod state;

pub use breaker::{BreakerError, CircuitBreaker};
pub use state::{error_percentage, CircuitBreakerRecord, CircuitState, Transition};
