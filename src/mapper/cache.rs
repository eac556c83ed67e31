//! Interning Cache
//!
//! The live, concurrent mirror of one mapper table.
//!
//! # Locking
//!
//! - `index` (a `parking_lot::RwLock`) guards `forward` and `reverse` as one
//!   unit. Reads take it shared; mutations take it exclusive and never hold
//!   it across a store call.
//! - `insert_gate` (a `tokio::sync::Mutex`) is held for the whole of a
//!   creating insert, store round-trip included, so at most one local insert
//!   reaches the store at a time. The key is looked up again once the gate is
//!   held; a concurrent caller may have just recorded it.
//! - Readers are not held off by an in-flight insert. A key being inserted
//!   stays invisible until the store has assigned its id, after which it is
//!   recorded under a short exclusive lock. This departs from holding the
//!   exclusive lock for the whole store round-trip.
//!
//! Entries are never evicted. Writes made by other processes after the bulk
//! load are picked up only when a local insert of the same key collides
//! with them.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::trace;

use crate::domain::ports::{ItemId, MapperStore, TableName, INVALID};
use crate::error::Result;

use super::index::InternIndex;
use super::insert::insert_or_fetch;
use super::loader::LoadReport;
use super::stats::MapperStats;
use super::truncate_key;

/// Named bidirectional string/id cache backed by one table.
pub struct IdMapper {
    name: String,
    table: TableName,
    load_report: LoadReport,
    index: RwLock<InternIndex>,
    insert_gate: Mutex<()>,
    store: Arc<dyn MapperStore>,
    stats: MapperStats,
}

impl std::fmt::Debug for IdMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdMapper")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("max_key_size", &self.max_key_size())
            .field("len", &self.len())
            .finish()
    }
}

impl IdMapper {
    pub(crate) fn new(
        name: impl Into<String>,
        table: TableName,
        index: InternIndex,
        load_report: LoadReport,
        store: Arc<dyn MapperStore>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            load_report,
            index: RwLock::new(index),
            insert_gate: Mutex::new(()),
            store,
            stats: MapperStats::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Longest key, in characters, stored without truncation.
    pub fn max_key_size(&self) -> usize {
        self.load_report.max_key_size
    }

    /// Outcome of the bulk load that warmed this mapper.
    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    /// Number of interned keys.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &MapperStats {
        &self.stats
    }

    /// Id of `key` if it is already interned. Never touches the store.
    pub fn has_item(&self, key: &str) -> Option<ItemId> {
        let key = truncate_key(key, self.max_key_size());
        self.index.read().id_of(key)
    }

    /// Id of `key`, interning it first when `create_if_absent` is set.
    ///
    /// Returns [`INVALID`] if the key is absent and `create_if_absent` is
    /// false, or if the store cannot encode the key. Store failures other
    /// than a lost insert race are returned as fatal errors.
    pub async fn id_from_item(&self, key: &str, create_if_absent: bool) -> Result<ItemId> {
        let key = truncate_key(key, self.max_key_size());

        let cached = self.index.read().id_of(key);
        if let Some(id) = cached {
            self.stats.record_hit();
            return Ok(id);
        }
        self.stats.record_miss();

        if !create_if_absent {
            return Ok(INVALID);
        }

        let _gate = self.insert_gate.lock().await;

        let cached = self.index.read().id_of(key);
        if let Some(id) = cached {
            trace!(mapper = %self.name, key = %key, id, "Interned by a concurrent caller");
            return Ok(id);
        }

        let id = insert_or_fetch(self.store.as_ref(), &self.table, key, &self.stats).await?;
        if id != INVALID {
            self.index.write().record(Arc::from(key), id);
        }
        Ok(id)
    }

    /// Key stored under `id`. `None` for 0, unused ids, and ids beyond the
    /// highest one known.
    pub fn item_from_id(&self, id: ItemId) -> Option<String> {
        self.index.read().item_of(id).map(|key| key.to_string())
    }

    /// Snapshot of every interned key, in no particular order.
    pub fn items(&self) -> Vec<String> {
        self.index.read().keys()
    }
}
