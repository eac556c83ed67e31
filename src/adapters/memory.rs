//! In-Memory Store Adapter
//!
//! Implements the `MapperStore` port over process memory. Several mapper
//! registries can share one `InMemoryStore` to stand in for independent
//! processes writing to the same database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream;
use parking_lot::{Mutex, RwLock};

use crate::domain::ports::{Encoding, ItemId, MapperStore, RowStream, TableName, NAME_COLUMN};
use crate::error::{Error, Result};

/// Physical order of an unordered scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanOrder {
    /// Rows come back by ascending id (insertion order)
    #[default]
    Ascending,
    /// Rows come back by descending id
    Descending,
    /// Listed ids come back first, in the given order, then the rest ascending
    Explicit(Vec<ItemId>),
}

impl ScanOrder {
    fn apply(&self, rows: &mut [(ItemId, String)]) {
        match self {
            ScanOrder::Ascending => {}
            ScanOrder::Descending => rows.reverse(),
            ScanOrder::Explicit(ids) => {
                let rank: HashMap<ItemId, usize> =
                    ids.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();
                rows.sort_by_key(|(id, _)| rank.get(id).copied().unwrap_or(usize::MAX));
            }
        }
    }
}

#[derive(Debug)]
struct MemTable {
    encoding: Encoding,
    max_len: usize,
    next_id: ItemId,
    by_name: HashMap<String, ItemId>,
    by_id: BTreeMap<ItemId, String>,
}

impl MemTable {
    fn new(encoding: Encoding, max_len: usize) -> Self {
        Self {
            encoding,
            max_len,
            next_id: 1,
            by_name: HashMap::new(),
            by_id: BTreeMap::new(),
        }
    }

    fn put(&mut self, id: ItemId, name: &str) {
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
        self.next_id = self.next_id.max(id + 1);
    }
}

/// Statement counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryStoreStats {
    pub creates: u64,
    pub inserts: u64,
    pub fetches: u64,
    pub scans: u64,
}

/// In-memory relational store for tests and single-process use.
///
/// Tables are keyed by name in a `DashMap`; each table keeps an
/// auto-increment counter and a unique index on the key column.
#[derive(Default)]
pub struct InMemoryStore {
    tables: DashMap<String, MemTable>,
    unsupported: RwLock<HashSet<Encoding>>,
    rejected: RwLock<HashSet<String>>,
    scan_order: RwLock<ScanOrder>,
    foreign_writes: DashMap<String, Vec<(ItemId, String)>>,
    scan_failure_after: Mutex<Option<usize>>,
    next_failure: Mutex<Option<String>>,
    creates: AtomicU64,
    create_attempts: Mutex<Vec<Encoding>>,
    inserts: AtomicU64,
    fetches: AtomicU64,
    scans: AtomicU64,
}

impl InMemoryStore {
    /// Create a new, empty store that supports every encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects `encoding` as an unknown character set.
    pub fn without_encoding(encoding: Encoding) -> Self {
        let store = Self::new();
        store.unsupported.write().insert(encoding);
        store
    }

    /// Make `key` unencodable, in addition to keys outside the BMP.
    pub fn reject_key(&self, key: &str) {
        self.rejected.write().insert(key.to_string());
    }

    /// Order used when a caller asks for an unordered scan.
    pub fn set_scan_order(&self, order: ScanOrder) {
        *self.scan_order.write() = order;
    }

    /// Commit `rows` to `table` as another writer would, right before the
    /// next scan of that table starts (after any `query_max_id`).
    pub fn write_during_scan(&self, table: &TableName, rows: &[(ItemId, &str)]) {
        self.foreign_writes
            .entry(table.0.clone())
            .or_default()
            .extend(rows.iter().map(|(id, name)| (*id, name.to_string())));
    }

    /// Fail the next scan after yielding `rows` rows.
    pub fn fail_scan_after(&self, rows: usize) {
        *self.scan_failure_after.lock() = Some(rows);
    }

    /// Fail the next store call with a fatal error.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.next_failure.lock() = Some(message.into());
    }

    /// Seed a table with explicit rows, bypassing auto-increment.
    pub fn seed(&self, table: &TableName, encoding: Encoding, rows: &[(ItemId, &str)]) {
        let mut entry = self
            .tables
            .entry(table.0.clone())
            .or_insert_with(|| MemTable::new(encoding, encoding.max_key_size()));
        for (id, name) in rows {
            entry.put(*id, name);
        }
    }

    /// Number of rows in `table`, if it exists.
    pub fn row_count(&self, table: &TableName) -> Option<usize> {
        self.tables.get(table.as_str()).map(|t| t.by_id.len())
    }

    /// Encoding a table was created with.
    pub fn table_encoding(&self, table: &TableName) -> Option<Encoding> {
        self.tables.get(table.as_str()).map(|t| t.encoding)
    }

    /// Every encoding passed to `create_table_if_not_exists`, in call order.
    pub fn create_attempts(&self) -> Vec<Encoding> {
        self.create_attempts.lock().clone()
    }

    pub fn stats(&self) -> InMemoryStoreStats {
        InMemoryStoreStats {
            creates: self.creates.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
        }
    }

    fn take_failure(&self) -> Result<()> {
        match self.next_failure.lock().take() {
            Some(message) => Err(Error::Store(message)),
            None => Ok(()),
        }
    }

    fn is_encodable(&self, name: &str) -> bool {
        // Neither ucs2 nor 3-byte utf8 can hold supplementary planes.
        !self.rejected.read().contains(name) && name.chars().all(|c| (c as u32) <= 0xFFFF)
    }
}

#[async_trait]
impl MapperStore for InMemoryStore {
    async fn query_max_string_length(&self, table: &TableName, column: &str) -> Result<usize> {
        self.take_failure()?;
        if column != NAME_COLUMN {
            return Err(Error::not_found(table.as_str()));
        }
        self.tables
            .get(table.as_str())
            .map(|t| t.max_len)
            .ok_or_else(|| Error::not_found(table.as_str()))
    }

    async fn query_max_id(&self, table: &TableName) -> Result<ItemId> {
        self.take_failure()?;
        self.tables
            .get(table.as_str())
            .map(|t| t.by_id.keys().next_back().copied().unwrap_or(0))
            .ok_or_else(|| Error::not_found(table.as_str()))
    }

    fn stream_rows<'a>(&'a self, table: &'a TableName, ordered: bool) -> RowStream<'a> {
        self.scans.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.take_failure() {
            return Box::pin(stream::iter(vec![Err(e)]));
        }

        if let Some((_, writes)) = self.foreign_writes.remove(table.as_str()) {
            if let Some(mut t) = self.tables.get_mut(table.as_str()) {
                for (id, name) in &writes {
                    t.put(*id, name);
                }
            }
        }

        let mut found: Vec<(ItemId, String)> = match self.tables.get(table.as_str()) {
            Some(t) => t.by_id.iter().map(|(id, name)| (*id, name.clone())).collect(),
            None => return Box::pin(stream::iter(vec![Err(Error::not_found(table.as_str()))])),
        };
        if !ordered {
            self.scan_order.read().apply(&mut found);
        }

        let mut rows: Vec<Result<(ItemId, String)>> = found.into_iter().map(Ok).collect();

        if let Some(after) = self.scan_failure_after.lock().take() {
            rows.truncate(after);
            rows.push(Err(Error::Store("scan interrupted".to_string())));
        }

        Box::pin(stream::iter(rows))
    }

    async fn create_table_if_not_exists(
        &self,
        table: &TableName,
        encoding: Encoding,
        max_len: usize,
    ) -> Result<()> {
        self.take_failure()?;
        self.create_attempts.lock().push(encoding);

        if self.unsupported.read().contains(&encoding) {
            return Err(Error::EncodingUnsupported {
                encoding: encoding.to_string(),
            });
        }

        self.creates.fetch_add(1, Ordering::Relaxed);
        self.tables
            .entry(table.0.clone())
            .or_insert_with(|| MemTable::new(encoding, max_len));
        Ok(())
    }

    async fn insert_row(&self, table: &TableName, name: &str) -> Result<ItemId> {
        self.take_failure()?;
        self.inserts.fetch_add(1, Ordering::Relaxed);

        let encodable = self.is_encodable(name);
        let mut t = self
            .tables
            .get_mut(table.as_str())
            .ok_or_else(|| Error::not_found(table.as_str()))?;

        if !encodable {
            return Err(Error::EncodingRejected {
                table: table.0.clone(),
            });
        }
        if name.chars().count() > t.max_len {
            return Err(Error::Store(format!(
                "data too long for column '{}' in {}",
                NAME_COLUMN, table
            )));
        }
        if t.by_name.contains_key(name) {
            // The id is burnt even though no row is written.
            t.next_id += 1;
            return Err(Error::DuplicateKey {
                table: table.0.clone(),
            });
        }

        let id = t.next_id;
        t.next_id += 1;
        t.by_name.insert(name.to_string(), id);
        t.by_id.insert(id, name.to_string());
        Ok(id)
    }

    async fn fetch_id_by_name(&self, table: &TableName, name: &str) -> Result<ItemId> {
        self.take_failure()?;
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let t = self
            .tables
            .get(table.as_str())
            .ok_or_else(|| Error::not_found(table.as_str()))?;
        t.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::Store(format!("no row named '{}' in {}", name, table)))
    }
}
