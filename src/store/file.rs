//! JSON-file persisted store.
//!
//! Wraps a [`MemoryStore`] and writes a full snapshot to disk after every
//! mutation. Intended for the operator CLI and single-host deployments;
//! conditional-write atomicity holds within one process only.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::store::{Condition, ConditionalStore, Item, MemoryStore, PutOutcome, StoreResult};

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    table: String,
    item: Item,
}

/// A [`MemoryStore`] mirrored to a JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing contents if the file exists.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = MemoryStore::with_clock(clock);

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let entries: Vec<StoredEntry> = serde_json::from_reader(reader)?;
            for entry in entries {
                inner.insert_raw(entry.table, entry.item);
            }
            tracing::info!(path = %path.display(), items = inner.len(), "Loaded store file");
        }

        Ok(Self {
            inner,
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop expired items and persist the result.
    pub async fn purge_expired(&self) -> StoreResult<usize> {
        let purged = self.inner.purge_expired();
        if purged > 0 {
            self.save().await?;
        }
        Ok(purged)
    }

    /// Write the current snapshot to disk via a temp file and rename.
    pub async fn save(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let entries: Vec<StoredEntry> = self
            .inner
            .snapshot()
            .into_iter()
            .map(|(table, item)| StoredEntry { table, item })
            .collect();

        let tmp = self.path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, &entries)?;
        }
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), items = entries.len(), "Saved store file");
        Ok(())
    }
}

#[async_trait]
impl ConditionalStore for FileStore {
    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Item>> {
        self.inner.get(table, key).await
    }

    async fn put(&self, table: &str, item: Item, condition: Condition) -> StoreResult<PutOutcome> {
        let outcome = self.inner.put(table, item, condition).await?;
        if outcome.is_written() {
            self.save().await?;
        }
        Ok(outcome)
    }

    async fn delete(&self, table: &str, key: &str) -> StoreResult<()> {
        self.inner.delete(table, key).await?;
        self.save().await
    }

    async fn query(&self, table: &str, filter: &Condition) -> StoreResult<Vec<Item>> {
        self.inner.query(table, filter).await
    }
}
