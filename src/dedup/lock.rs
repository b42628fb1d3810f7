//! Per-event processing lock backed by conditional writes.
//!
//! # How It Works
//!
//! 1. Read the record for the event id
//! 2. Absent: create it as PROCESSING with a `NotExists` condition; only one
//!    worker can win, the loser re-reads and reports the winner's record
//! 3. PROCESSING and older than the lock timeout: take it over, guarded by
//!    "start time is still older than the boundary"
//! 4. FAILED under the retry limit: take it over, guarded by "still FAILED
//!    with the same retry count"
//! 5. COMPLETED, SKIPPED, fresh PROCESSING or exhausted FAILED: not acquired
//!
//! Losing a race is a normal return value. Storage errors propagate so a
//! failed lock attempt never lets a duplicate through.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::clock::{duration_millis, duration_secs, Clock, SystemClock};
use crate::config::DedupConfig;
use crate::dedup::record::{attr, DedupRecord, DedupStatus};
use crate::dedup::signature::validate_stripe_signature_at;
use crate::observability::metrics;
use crate::store::{Condition, ConditionalStore, Item, PutOutcome, StoreError};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Errors raised by the deduplication lock.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The store failed; the caller must not assume the lock is held.
    #[error("deduplication store error: {0}")]
    Store(#[from] StoreError),

    #[error("event id must not be empty")]
    EmptyEventId,
}

/// Result type for deduplication operations.
pub type DedupResult<T> = Result<T, DedupError>;

/// Why an acquisition attempt ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// First delivery; record created.
    Acquired,
    /// A FAILED event taken back for another attempt.
    Reacquired,
    /// An abandoned PROCESSING lock taken over.
    StaleOverride,
    /// Another worker holds a fresh lock.
    InProgress,
    AlreadyCompleted,
    RetriesExhausted,
    Skipped,
    /// A concurrent worker won the conditional write.
    LostRace,
}

impl LockOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            LockOutcome::Acquired => "acquired",
            LockOutcome::Reacquired => "reacquired",
            LockOutcome::StaleOverride => "stale_override",
            LockOutcome::InProgress => "in_progress",
            LockOutcome::AlreadyCompleted => "already_completed",
            LockOutcome::RetriesExhausted => "retries_exhausted",
            LockOutcome::Skipped => "skipped",
            LockOutcome::LostRace => "lost_race",
        }
    }

    pub fn is_acquired(self) -> bool {
        matches!(
            self,
            LockOutcome::Acquired | LockOutcome::Reacquired | LockOutcome::StaleOverride
        )
    }
}

/// Result of [`DeduplicationLock::acquire_processing_lock`].
#[derive(Debug, Clone, PartialEq)]
pub struct LockAcquisition {
    pub acquired: bool,
    pub outcome: LockOutcome,
    /// The record that prevented acquisition (or was taken over).
    pub existing_record: Option<DedupRecord>,
}

impl LockAcquisition {
    fn new(outcome: LockOutcome, existing_record: Option<DedupRecord>) -> Self {
        Self {
            acquired: outcome.is_acquired(),
            outcome,
            existing_record,
        }
    }
}

/// Idempotency guard for inbound events.
pub struct DeduplicationLock<S: ConditionalStore + ?Sized> {
    config: DedupConfig,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: ConditionalStore + ?Sized> Clone for DeduplicationLock<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: ConditionalStore + ?Sized> DeduplicationLock<S> {
    pub fn new(config: DedupConfig, store: Arc<S>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(config: DedupConfig, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Try to take the processing lock for `event_id`.
    pub async fn acquire_processing_lock(
        &self,
        event_id: &str,
        event_type: &str,
        signature: Option<&str>,
        source: Option<&str>,
    ) -> DedupResult<LockAcquisition> {
        if event_id.is_empty() {
            return Err(DedupError::EmptyEventId);
        }

        let now = self.clock.now_millis();
        let acquisition = match self.read(event_id).await? {
            None => {
                let record = DedupRecord::processing(
                    event_id,
                    event_type,
                    signature,
                    source,
                    now,
                    self.expiry_from(now),
                );
                let item = self.item(&record)?;
                match self.store.put_if_absent(&self.config.table, item).await? {
                    PutOutcome::Written => LockAcquisition::new(LockOutcome::Acquired, None),
                    PutOutcome::ConditionFailed => self.lost_race(event_id).await?,
                }
            }
            Some(existing) => self.acquire_existing(existing, signature, now).await?,
        };

        metrics::record_dedup_acquisition(event_type, acquisition.outcome.as_str());
        tracing::debug!(
            event_id,
            event_type,
            outcome = acquisition.outcome.as_str(),
            "Processing lock attempt"
        );
        Ok(acquisition)
    }

    async fn acquire_existing(
        &self,
        existing: DedupRecord,
        signature: Option<&str>,
        now: i64,
    ) -> DedupResult<LockAcquisition> {
        let lock_timeout = duration_millis(self.config.lock_timeout());

        match existing.status {
            DedupStatus::Completed => Ok(LockAcquisition::new(
                LockOutcome::AlreadyCompleted,
                Some(existing),
            )),
            DedupStatus::Skipped => Ok(LockAcquisition::new(LockOutcome::Skipped, Some(existing))),
            DedupStatus::Processing if existing.lock_age_millis(now) < lock_timeout => Ok(
                LockAcquisition::new(LockOutcome::InProgress, Some(existing)),
            ),
            DedupStatus::Processing => {
                let boundary = now.saturating_sub(lock_timeout);
                let still_stale = match existing.processing_started_at {
                    Some(_) => Condition::less_than(attr::PROCESSING_STARTED_AT, boundary.saturating_add(1)),
                    None => Condition::equals(attr::PROCESSING_STARTED_AT, Value::Null),
                };
                let guard = Condition::All(vec![
                    Condition::equals(attr::STATUS, DedupStatus::Processing.as_str()),
                    still_stale,
                ]);
                let next = existing.relock(signature, now);
                match self.overwrite(&next, guard).await? {
                    PutOutcome::Written => {
                        tracing::warn!(
                            event_id = %existing.event_id,
                            started_at = ?existing.processing_started_at,
                            lock_timeout_ms = lock_timeout,
                            "Overriding stale processing lock"
                        );
                        Ok(LockAcquisition::new(LockOutcome::StaleOverride, Some(existing)))
                    }
                    PutOutcome::ConditionFailed => self.lost_race(&existing.event_id).await,
                }
            }
            DedupStatus::Failed if existing.retry_count < self.config.max_retries => {
                let guard = Condition::All(vec![
                    Condition::equals(attr::STATUS, DedupStatus::Failed.as_str()),
                    Condition::equals(attr::RETRY_COUNT, existing.retry_count),
                ]);
                let next = existing.relock(signature, now);
                match self.overwrite(&next, guard).await? {
                    PutOutcome::Written => {
                        tracing::info!(
                            event_id = %existing.event_id,
                            retry_count = existing.retry_count,
                            "Retrying failed event"
                        );
                        Ok(LockAcquisition::new(LockOutcome::Reacquired, Some(existing)))
                    }
                    PutOutcome::ConditionFailed => self.lost_race(&existing.event_id).await,
                }
            }
            DedupStatus::Failed => {
                tracing::warn!(
                    event_id = %existing.event_id,
                    retry_count = existing.retry_count,
                    max_retries = self.config.max_retries,
                    "Event exceeded retry limit"
                );
                Ok(LockAcquisition::new(
                    LockOutcome::RetriesExhausted,
                    Some(existing),
                ))
            }
        }
    }

    async fn lost_race(&self, event_id: &str) -> DedupResult<LockAcquisition> {
        tracing::info!(event_id, "Processing lock taken by a concurrent worker");
        let winner = self.read(event_id).await?;
        Ok(LockAcquisition::new(LockOutcome::LostRace, winner))
    }

    /// Mark a held lock COMPLETED with the cached `result`.
    ///
    /// Returns `false` without writing when the record is not PROCESSING or
    /// changed hands since it was read.
    pub async fn mark_completed(&self, event_id: &str, result: Option<Value>) -> DedupResult<bool> {
        let Some(current) = self.read(event_id).await? else {
            tracing::warn!(event_id, "Cannot complete event without a processing record");
            return Ok(false);
        };
        if current.status != DedupStatus::Processing {
            tracing::warn!(
                event_id,
                status = %current.status,
                "Cannot complete event that is not processing"
            );
            return Ok(false);
        }

        let guard = Condition::All(vec![
            Condition::equals(attr::STATUS, DedupStatus::Processing.as_str()),
            Condition::equals(
                attr::PROCESSING_STARTED_AT,
                current.processing_started_at.map_or(Value::Null, Value::from),
            ),
        ]);

        let mut next = current;
        next.status = DedupStatus::Completed;
        next.processing_completed_at = Some(self.clock.now_millis());
        next.result = result;

        match self.overwrite(&next, guard).await? {
            PutOutcome::Written => {
                tracing::info!(event_id, event_type = %next.event_type, "Event processing completed");
                Ok(true)
            }
            PutOutcome::ConditionFailed => {
                tracing::warn!(event_id, "Processing lock changed before completion, not marking completed");
                Ok(false)
            }
        }
    }

    /// Record a failed attempt, bumping the retry count.
    ///
    /// With `should_retry = false` the count is raised to the retry limit so
    /// the event is never attempted again. COMPLETED and SKIPPED records are
    /// final: the call returns `false` without writing, as it does when the
    /// record changed between the read and the write.
    pub async fn mark_failed(
        &self,
        event_id: &str,
        error_message: &str,
        should_retry: bool,
    ) -> DedupResult<bool> {
        let now = self.clock.now_millis();
        let current = self.read(event_id).await?;
        if let Some(record) = current.as_ref().filter(|r| r.is_terminal()) {
            tracing::warn!(
                event_id,
                status = %record.status,
                error = error_message,
                "Ignoring failure for an event that already finished"
            );
            return Ok(false);
        }

        let guard = unchanged_since_read(current.as_ref());
        let mut record = current.unwrap_or_else(|| {
            let mut fresh =
                DedupRecord::processing(event_id, "unknown", None, None, now, self.expiry_from(now));
            fresh.processing_started_at = None;
            fresh
        });

        record.status = DedupStatus::Failed;
        record.processing_completed_at = Some(now);
        record.error = Some(error_message.to_string());
        record.retry_count = record.retry_count.saturating_add(1);
        if !should_retry {
            record.retry_count = record.retry_count.max(self.config.max_retries);
        }

        if self.overwrite(&record, guard).await? == PutOutcome::ConditionFailed {
            tracing::warn!(event_id, "Deduplication record changed before failure was recorded");
            return Ok(false);
        }
        tracing::warn!(
            event_id,
            retry_count = record.retry_count,
            should_retry,
            error = error_message,
            "Event processing failed"
        );
        Ok(true)
    }

    /// Record that the event was deliberately not processed.
    ///
    /// A COMPLETED event stays COMPLETED; returns `false` when nothing was written.
    pub async fn mark_skipped(&self, event_id: &str, reason: &str) -> DedupResult<bool> {
        let now = self.clock.now_millis();
        let current = self.read(event_id).await?;
        if let Some(record) = current.as_ref().filter(|r| r.is_terminal()) {
            tracing::warn!(event_id, status = %record.status, reason, "Event already finished, not skipping");
            return Ok(false);
        }

        let guard = unchanged_since_read(current.as_ref());
        let mut record = current.unwrap_or_else(|| {
            DedupRecord::processing(event_id, "unknown", None, None, now, self.expiry_from(now))
        });
        record.status = DedupStatus::Skipped;
        record.processing_completed_at = Some(now);
        record.error = Some(reason.to_string());

        if self.overwrite(&record, guard).await? == PutOutcome::ConditionFailed {
            tracing::warn!(event_id, "Deduplication record changed before skip was recorded");
            return Ok(false);
        }
        tracing::info!(event_id, reason, "Event skipped");
        Ok(true)
    }

    /// Best-effort read; storage errors are logged and reported as `None`.
    pub async fn get_webhook_record(&self, event_id: &str) -> Option<DedupRecord> {
        match self.read(event_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(event_id, error = %e, "Failed to read deduplication record");
                None
            }
        }
    }

    /// Whether the event has been processed to completion.
    pub async fn is_processed(&self, event_id: &str) -> bool {
        self.get_webhook_record(event_id)
            .await
            .is_some_and(|record| record.status == DedupStatus::Completed)
    }

    /// Verify a webhook signature header with the configured tolerance.
    pub fn validate_signature(&self, payload: &str, header: &str, secret: &str) -> bool {
        validate_stripe_signature_at(
            payload,
            header,
            secret,
            self.config.signature_tolerance(),
            self.clock.now_secs(),
        )
    }

    /// Delete records first written more than `max_age_days` ago.
    ///
    /// Each delete is independent; failures are logged and skipped. A failed
    /// query deletes nothing and returns 0.
    pub async fn cleanup_old_records(&self, max_age_days: u32) -> usize {
        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(i64::from(max_age_days) * MILLIS_PER_DAY);
        let filter = Condition::less_than(attr::CREATED_AT, cutoff);

        let candidates = match self.store.query(&self.config.table, &filter).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, max_age_days, "Failed to query old deduplication records");
                return 0;
            }
        };

        let mut deleted = 0;
        for item in candidates {
            match self.store.delete(&self.config.table, &item.key).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(event_id = %item.key, error = %e, "Failed to delete old record")
                }
            }
        }

        metrics::record_cleanup_deleted(deleted);
        tracing::info!(deleted, max_age_days, "Deduplication cleanup finished");
        deleted
    }

    async fn read(&self, event_id: &str) -> DedupResult<Option<DedupRecord>> {
        match self.store.get(&self.config.table, event_id).await? {
            Some(item) => Ok(Some(item.to_record()?)),
            None => Ok(None),
        }
    }

    async fn overwrite(&self, record: &DedupRecord, condition: Condition) -> DedupResult<PutOutcome> {
        let item = self.item(record)?;
        Ok(self.store.put(&self.config.table, item, condition).await?)
    }

    fn item(&self, record: &DedupRecord) -> DedupResult<Item> {
        Ok(Item::from_record(&record.event_id, record, Some(record.ttl))?)
    }

    fn expiry_from(&self, now_millis: i64) -> i64 {
        (now_millis / 1000).saturating_add(duration_secs(self.config.record_ttl()))
    }
}

/// Write guard for a record read earlier: still absent, or still carrying
/// the same status and retry count.
fn unchanged_since_read(current: Option<&DedupRecord>) -> Condition {
    match current {
        None => Condition::NotExists,
        Some(record) => Condition::All(vec![
            Condition::equals(attr::STATUS, record.status.as_str()),
            Condition::equals(attr::RETRY_COUNT, record.retry_count),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn lock() -> (DeduplicationLock<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        (
            DeduplicationLock::with_clock(DedupConfig::default(), store, clock.clone()),
            clock,
        )
    }

    #[tokio::test]
    async fn test_first_acquire_creates_record() {
        let (lock, clock) = lock();
        let acq = lock
            .acquire_processing_lock("evt_1", "charge.succeeded", Some("t=1,v1=aa"), Some("stripe"))
            .await
            .unwrap();
        assert!(acq.acquired);
        assert_eq!(acq.outcome, LockOutcome::Acquired);

        let record = lock.get_webhook_record("evt_1").await.unwrap();
        assert_eq!(record.status, DedupStatus::Processing);
        assert_eq!(record.processing_started_at, Some(clock.now_millis()));
        assert_eq!(record.signature.as_deref(), Some("t=1,v1=aa"));
        assert_eq!(record.ttl, clock.now_secs() + 30 * 24 * 3600);
    }

    #[tokio::test]
    async fn test_empty_event_id_rejected() {
        let (lock, _) = lock();
        let err = lock.acquire_processing_lock("", "t", None, None).await.unwrap_err();
        assert!(matches!(err, DedupError::EmptyEventId));
    }

    #[tokio::test]
    async fn test_mark_skipped_blocks_acquire() {
        let (lock, _) = lock();
        lock.mark_skipped("evt_1", "unsupported event type").await.unwrap();
        let acq = lock.acquire_processing_lock("evt_1", "t", None, None).await.unwrap();
        assert!(!acq.acquired);
        assert_eq!(acq.outcome, LockOutcome::Skipped);
        assert!(!lock.is_processed("evt_1").await);
    }

    #[tokio::test]
    async fn test_finished_events_ignore_late_failure_and_skip() {
        let (lock, _) = lock();
        lock.acquire_processing_lock("evt_1", "t", None, None).await.unwrap();
        assert!(lock.mark_completed("evt_1", None).await.unwrap());

        assert!(!lock.mark_failed("evt_1", "late error", true).await.unwrap());
        assert!(!lock.mark_skipped("evt_1", "late skip").await.unwrap());
        let record = lock.get_webhook_record("evt_1").await.unwrap();
        assert_eq!(record.status, DedupStatus::Completed);
        assert_eq!(record.retry_count, 0);
        assert!(record.error.is_none());

        lock.mark_skipped("evt_2", "unsupported").await.unwrap();
        assert!(!lock.mark_failed("evt_2", "late error", false).await.unwrap());
        assert_eq!(
            lock.get_webhook_record("evt_2").await.unwrap().status,
            DedupStatus::Skipped
        );
    }

    #[test]
    fn test_unchanged_since_read_guard() {
        let record = DedupRecord::processing("evt_1", "t", None, None, 1_000, 2);
        let guard = unchanged_since_read(Some(&record));
        let same = Item::from_record("evt_1", &record, None).unwrap();
        assert!(guard.matches(Some(&same)));

        let mut bumped = record.clone();
        bumped.retry_count = 1;
        assert!(!guard.matches(Some(&Item::from_record("evt_1", &bumped, None).unwrap())));
        assert!(!guard.matches(None));
        assert!(unchanged_since_read(None).matches(None));
    }

    #[tokio::test]
    async fn test_validate_signature_uses_clock() {
        let (lock, clock) = lock();
        let payload = r#"{"id":"evt_123"}"#;
        let header = crate::dedup::signature::stripe_signature_header(payload, "whsec_test", clock.now_secs());
        assert!(lock.validate_signature(payload, &header, "whsec_test"));

        clock.advance(Duration::from_secs(301));
        assert!(!lock.validate_signature(payload, &header, "whsec_test"));
    }

    #[test]
    fn test_outcome_acquired_flags() {
        assert!(LockOutcome::StaleOverride.is_acquired());
        assert!(!LockOutcome::LostRace.is_acquired());
        assert_eq!(LockOutcome::RetriesExhausted.as_str(), "retries_exhausted");
    }
}
