//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! circuit_breaker / dedup / normalizer produce:
//!     → tracing events with service, event_id, correlation_id fields
//!     → metrics.rs (counters, gauges)
//!
//! The binary installs:
//!     → logging.rs (tracing-subscriber, pretty or JSON)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing subscribers/recorders is the caller's job
//! - Metrics are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
