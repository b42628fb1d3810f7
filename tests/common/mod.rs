//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use worker_resilience::clock::ManualClock;
use worker_resilience::config::{CircuitBreakerConfig, DedupConfig};
use worker_resilience::store::{
    Condition, ConditionalStore, Item, MemoryStore, PutOutcome, StoreError, StoreResult,
};

/// Fixed starting instant for manual clocks (2024-01-01T00:00:00Z).
pub const T0_MILLIS: i64 = 1_704_067_200_000;

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(T0_MILLIS))
}

/// Breaker config with small, test-friendly numbers.
pub fn breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        success_threshold: 2,
        timeout_ms: 200,
        reset_timeout_ms: 1_000,
        volume_threshold: 10,
        error_threshold_percentage: 50,
        ..CircuitBreakerConfig::default()
    }
}

pub fn dedup_config() -> DedupConfig {
    DedupConfig::default()
}

/// A [`MemoryStore`] whose operations can be made to fail on demand.
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_get: AtomicBool,
    fail_put: AtomicBool,
    fail_query: AtomicBool,
    fail_delete_keys: Mutex<HashSet<String>>,
    stale_gets: AtomicUsize,
    replayed: Mutex<Option<Item>>,
    puts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            inner: MemoryStore::with_clock(clock),
            fail_get: AtomicBool::new(false),
            fail_put: AtomicBool::new(false),
            fail_query: AtomicBool::new(false),
            fail_delete_keys: Mutex::new(HashSet::new()),
            stale_gets: AtomicUsize::new(0),
            replayed: Mutex::new(None),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_query(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.fail_delete_keys.lock().unwrap().insert(key.to_string());
    }

    /// Make the next `n` reads miss, as if another worker's write had not
    /// landed yet when they ran.
    pub fn stale_gets(&self, n: usize) {
        self.stale_gets.store(n, Ordering::SeqCst);
    }

    /// Serve `item` to the next read instead of the stored value, as if the
    /// reader ran just before a concurrent overwrite.
    pub fn replay_get(&self, item: Item) {
        *self.replayed.lock().unwrap() = Some(item);
    }

    /// Number of put attempts that reached the backend.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn injected(op: &str) -> StoreError {
        StoreError::Backend(format!("injected {op} failure"))
    }
}

#[async_trait]
impl ConditionalStore for FlakyStore {
    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Item>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Self::injected("get"));
        }
        let stale = self
            .stale_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        if let Some(item) = self.replayed.lock().unwrap().take() {
            return Ok(Some(item));
        }
        self.inner.get(table, key).await
    }

    async fn put(&self, table: &str, item: Item, condition: Condition) -> StoreResult<PutOutcome> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(Self::injected("put"));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(table, item, condition).await
    }

    async fn delete(&self, table: &str, key: &str) -> StoreResult<()> {
        if self.fail_delete_keys.lock().unwrap().contains(key) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete(table, key).await
    }

    async fn query(&self, table: &str, filter: &Condition) -> StoreResult<Vec<Item>> {
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(Self::injected("query"));
        }
        self.inner.query(table, filter).await
    }
}
