//! Conditional-write key-value store abstraction.
//!
//! # Data Flow
//! ```text
//! circuit_breaker / dedup
//!     → record <-> Item (serde_json attribute map)
//!     → ConditionalStore::put(table, item, Condition)
//!     → backend evaluates Condition against the live item atomically
//!     → PutOutcome::Written | PutOutcome::ConditionFailed
//! ```
//!
//! # Design Decisions
//! - A failed condition is a normal outcome, never an error
//! - Conditions are a closed enum so every backend evaluates them the same way
//! - Items carry an expiry (epoch seconds); expired items read as absent
//! - Any store offering single-key compare-and-swap can implement the trait

pub mod condition;
pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use condition::{Condition, Item};
pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An item could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored item does not have the expected shape.
    #[error("malformed item '{key}': {message}")]
    MalformedItem { key: String, message: String },

    /// Backend-specific failure (throttling, connectivity, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The condition held and the item was written.
    Written,
    /// The condition did not hold; nothing was written.
    ConditionFailed,
}

impl PutOutcome {
    pub fn is_written(self) -> bool {
        self == PutOutcome::Written
    }
}

/// Durable key-value store with single-key conditional writes.
///
/// All backends must evaluate the condition and apply the write as one
/// atomic step per key. That atomicity is the only coordination primitive
/// the breaker and the dedup lock rely on.
#[async_trait]
pub trait ConditionalStore: Send + Sync + 'static {
    /// Reads a live item. Expired items are reported as `None`.
    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Item>>;

    /// Writes `item` if `condition` holds against the current live item.
    async fn put(&self, table: &str, item: Item, condition: Condition) -> StoreResult<PutOutcome>;

    /// Deletes an item. Succeeds even if the item does not exist.
    async fn delete(&self, table: &str, key: &str) -> StoreResult<()>;

    /// Returns all live items in `table` matching `filter`, in arbitrary order.
    async fn query(&self, table: &str, filter: &Condition) -> StoreResult<Vec<Item>>;

    /// Creates the item only if no live item exists under its key.
    async fn put_if_absent(&self, table: &str, item: Item) -> StoreResult<PutOutcome> {
        self.put(table, item, Condition::NotExists).await
    }

    /// Overwrites the item only if the current one satisfies `predicate`.
    async fn put_if_matches(
        &self,
        table: &str,
        item: Item,
        predicate: Condition,
    ) -> StoreResult<PutOutcome> {
        self.put(table, item, Condition::All(vec![Condition::Exists, predicate]))
            .await
    }
}
