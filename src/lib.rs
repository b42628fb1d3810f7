//! Store-backed resilience layer for stateless workers.
//!
//! Three independent components coordinate only through a conditional-write
//! key-value store:
//! - [`circuit_breaker`]: per-service breaker with persisted state
//! - [`dedup`]: at-most-once processing lock for inbound events
//! - [`normalizer`]: uniform envelope over two invocation transports

pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod context;
pub mod dedup;
pub mod normalizer;
pub mod observability;
pub mod store;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitState};
pub use config::schema::ResilienceConfig;
pub use context::RequestContext;
pub use dedup::{DeduplicationLock, LockAcquisition, LockOutcome};
pub use normalizer::NormalizedResponse;
pub use store::{ConditionalStore, FileStore, MemoryStore};
