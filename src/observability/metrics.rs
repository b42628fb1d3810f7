//! Metrics for the resilience layer.
//!
//! # Metrics
//! - `resilience_breaker_transitions_total` (counter): by service, from, to
//! - `resilience_breaker_rejections_total` (counter): calls short-circuited while open
//! - `resilience_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `resilience_dedup_acquisitions_total` (counter): by event type and outcome
//! - `resilience_dedup_cleanup_deleted_total` (counter): records removed by sweeps
//! - `resilience_responses_total` (counter): normalized responses by source and success
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade
//! - Exposition is left to whichever recorder the host process installs

use crate::circuit_breaker::CircuitState;

pub fn record_breaker_transition(service: &str, from: CircuitState, to: CircuitState) {
    metrics::counter!(
        "resilience_breaker_transitions_total",
        "service" => service.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(service, to);
}

pub fn record_breaker_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("resilience_breaker_state", "service" => service.to_string()).set(value);
}

pub fn record_breaker_rejection(service: &str) {
    metrics::counter!("resilience_breaker_rejections_total", "service" => service.to_string())
        .increment(1);
}

pub fn record_dedup_acquisition(event_type: &str, outcome: &'static str) {
    metrics::counter!(
        "resilience_dedup_acquisitions_total",
        "event_type" => event_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_cleanup_deleted(count: usize) {
    metrics::counter!("resilience_dedup_cleanup_deleted_total").increment(count as u64);
}

pub fn record_response(source: &str, success: bool) {
    metrics::counter!(
        "resilience_responses_total",
        "source" => source.to_string(),
        "success" => if success { "true" } else { "false" }
    )
    .increment(1);
}
