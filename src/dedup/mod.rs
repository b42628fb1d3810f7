//! Event deduplication subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound event (e.g. webhook delivery)
//!     → signature.rs (verify `t=...,v1=...` header)
//!     → lock.rs acquire_processing_lock (conditional create / takeover)
//!     → caller processes the event
//!     → lock.rs mark_completed | mark_failed | mark_skipped
//!
//! Periodically:
//!     → lock.rs cleanup_old_records (age-based sweep)
//!     → store expiry (backstop)
//! ```
//!
//! # Design Decisions
//! - The store's conditional write is the only arbiter between racing workers
//! - Lock-acquisition storage errors propagate (fail-closed)
//! - Read helpers and cleanup degrade to `None` / 0 and log
//! - FAILED events are retried up to `max_retries`; the count moves only on failure

pub mod lock;
pub mod record;
pub mod signature;

pub use lock::{DedupError, DedupResult, DeduplicationLock, LockAcquisition, LockOutcome};
pub use record::{DedupRecord, DedupStatus};
pub use signature::{
    compute_stripe_signature, stripe_signature_header, validate_stripe_signature,
    validate_stripe_signature_at, SignatureHeader, DEFAULT_TOLERANCE,
};
