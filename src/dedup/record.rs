//! Deduplication record types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lock / outcome state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DedupStatus {
    /// A worker holds the processing lock.
    Processing,
    /// Processing finished; `result` holds the cached outcome.
    Completed,
    /// The last attempt failed; may be retried while under the retry limit.
    Failed,
    /// The event was deliberately not processed.
    Skipped,
}

impl DedupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DedupStatus::Processing => "PROCESSING",
            DedupStatus::Completed => "COMPLETED",
            DedupStatus::Failed => "FAILED",
            DedupStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for DedupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute names used in store conditions.
pub(crate) mod attr {
    pub const STATUS: &str = "status";
    pub const PROCESSING_STARTED_AT: &str = "processingStartedAt";
    pub const RETRY_COUNT: &str = "retryCount";
    pub const CREATED_AT: &str = "createdAt";
}

/// One record per inbound event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupRecord {
    pub event_id: String,
    pub event_type: String,
    pub status: DedupStatus,
    /// Epoch millis when the current lock was taken.
    #[serde(default)]
    pub processing_started_at: Option<i64>,
    /// Epoch millis when a terminal state was written.
    #[serde(default)]
    pub processing_completed_at: Option<i64>,
    /// Cached outcome of a completed event.
    #[serde(default)]
    pub result: Option<Value>,
    /// Last failure message.
    #[serde(default)]
    pub error: Option<String>,
    /// FAILED attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Origin system of the event.
    pub source: String,
    /// Signature header received with the event, if any.
    #[serde(default)]
    pub signature: Option<String>,
    /// Epoch millis of the first write.
    pub created_at: i64,
    /// Expiry as epoch seconds.
    pub ttl: i64,
}

impl DedupRecord {
    /// A new record holding the processing lock.
    pub fn processing(
        event_id: &str,
        event_type: &str,
        signature: Option<&str>,
        source: Option<&str>,
        now_millis: i64,
        ttl: i64,
    ) -> Self {
        Self {
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            status: DedupStatus::Processing,
            processing_started_at: Some(now_millis),
            processing_completed_at: None,
            result: None,
            error: None,
            retry_count: 0,
            source: source.unwrap_or("unknown").to_string(),
            signature: signature.map(str::to_string),
            created_at: now_millis,
            ttl,
        }
    }

    /// Take the lock over on an existing record, keeping its history.
    ///
    /// `retry_count` is left untouched; it only moves on failure.
    pub fn relock(&self, signature: Option<&str>, now_millis: i64) -> Self {
        let mut next = self.clone();
        next.status = DedupStatus::Processing;
        next.processing_started_at = Some(now_millis);
        next.processing_completed_at = None;
        if let Some(sig) = signature {
            next.signature = Some(sig.to_string());
        }
        next
    }

    /// Milliseconds the current lock has been held at `now_millis`.
    ///
    /// A PROCESSING record without a start time is treated as infinitely old.
    pub fn lock_age_millis(&self, now_millis: i64) -> i64 {
        self.processing_started_at
            .map(|started| now_millis.saturating_sub(started))
            .unwrap_or(i64::MAX)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, DedupStatus::Completed | DedupStatus::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_format() {
        let record = DedupRecord::processing("evt_1", "payment_intent.succeeded", None, Some("stripe"), 1_000, 99);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["eventId"], "evt_1");
        assert_eq!(json["status"], "PROCESSING");
        assert_eq!(json["processingStartedAt"], 1_000);
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["source"], "stripe");
    }

    #[test]
    fn test_relock_keeps_retry_count() {
        let mut record = DedupRecord::processing("evt_1", "t", None, None, 1_000, 99);
        record.status = DedupStatus::Failed;
        record.retry_count = 2;
        record.processing_completed_at = Some(2_000);
        record.error = Some("boom".into());

        let relocked = record.relock(Some("t=1,v1=ab"), 5_000);
        assert_eq!(relocked.status, DedupStatus::Processing);
        assert_eq!(relocked.retry_count, 2);
        assert_eq!(relocked.processing_started_at, Some(5_000));
        assert_eq!(relocked.processing_completed_at, None);
        assert_eq!(relocked.error.as_deref(), Some("boom"));
        assert_eq!(relocked.created_at, 1_000);
        assert_eq!(relocked.source, "unknown");
    }

    #[test]
    fn test_lock_age() {
        let mut record = DedupRecord::processing("evt_1", "t", None, None, 1_000, 99);
        assert_eq!(record.lock_age_millis(1_500), 500);
        record.processing_started_at = None;
        assert_eq!(record.lock_age_millis(1_500), i64::MAX);
    }
}
