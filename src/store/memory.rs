//! In-memory conditional store.
//!
//! Backed by a `DashMap`; a conditional put holds the shard lock for the
//! key while it evaluates the condition and writes, which gives the same
//! per-key atomicity a remote conditional-write store provides.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::store::{Condition, ConditionalStore, Item, PutOutcome, StoreResult};

type TableKey = (String, String);

/// Thread-safe in-memory store.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    items: Arc<DashMap<TableKey, Item>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store using the system clock for expiry.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            items: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of stored items, expired ones included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Physically remove expired items. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let before = self.items.len();
        self.items.retain(|_, item| !item.is_expired(now));
        before.saturating_sub(self.items.len())
    }

    /// Snapshot of every stored item with its table name.
    pub(crate) fn snapshot(&self) -> Vec<(String, Item)> {
        self.items
            .iter()
            .map(|r| (r.key().0.clone(), r.value().clone()))
            .collect()
    }

    /// Insert an item unconditionally (used when loading persisted state).
    pub(crate) fn insert_raw(&self, table: String, item: Item) {
        self.items.insert((table, item.key.clone()), item);
    }
}

#[async_trait]
impl ConditionalStore for MemoryStore {
    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Item>> {
        let now = self.clock.now_secs();
        Ok(self
            .items
            .get(&(table.to_string(), key.to_string()))
            .map(|r| r.value().clone())
            .filter(|item| !item.is_expired(now)))
    }

    async fn put(&self, table: &str, item: Item, condition: Condition) -> StoreResult<PutOutcome> {
        let now = self.clock.now_secs();
        match self.items.entry((table.to_string(), item.key.clone())) {
            Entry::Occupied(mut entry) => {
                let holds = {
                    let current = Some(entry.get()).filter(|i| !i.is_expired(now));
                    condition.matches(current)
                };
                if !holds {
                    return Ok(PutOutcome::ConditionFailed);
                }
                entry.insert(item);
            }
            Entry::Vacant(entry) => {
                if !condition.matches(None) {
                    return Ok(PutOutcome::ConditionFailed);
                }
                entry.insert(item);
            }
        }
        Ok(PutOutcome::Written)
    }

    async fn delete(&self, table: &str, key: &str) -> StoreResult<()> {
        self.items.remove(&(table.to_string(), key.to_string()));
        Ok(())
    }

    async fn query(&self, table: &str, filter: &Condition) -> StoreResult<Vec<Item>> {
        let now = self.clock.now_secs();
        Ok(self
            .items
            .iter()
            .filter(|r| r.key().0 == table)
            .filter(|r| !r.value().is_expired(now))
            .filter(|r| filter.matches(Some(r.value())))
            .map(|r| r.value().clone())
            .collect())
    }
}
