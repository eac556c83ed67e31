//! Bulk Loader
//!
//! Rebuilds a mapper's index from its whole backing table in a single scan.
//!
//! # Protocol
//!
//! ```text
//!   store ──rows──▶ producer ──writes──▶ reverse[id]
//!                      │
//!                      └──watermark w──▶ consumer ──reads reverse[cidx..=w]──▶ forward
//! ```
//!
//! - The producer streams `(id, name)` rows and writes every name into the
//!   pre-sized `reverse` vector. After each `load_batch_size` rows it flushes
//!   and publishes the id of the row it just consumed; at end of stream it
//!   publishes the highest id seen, then the `0` sentinel, even on failure.
//! - The consumer walks a cursor from 1 up to each watermark, inserting
//!   `(reverse[cidx], cidx)` into `forward`. Slots still empty when passed are
//!   revisited once the sentinel arrives, which picks up rows an unordered scan
//!   delivered late.
//! - The caller waits on the consumer, then on the producer's result; a read
//!   error fails the whole load.
//!
//! A name appearing under two ids is tolerated: the last one indexed wins and
//! the name is reported as a data-quality warning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::ports::{ItemId, MapperStore, TableName, NAME_COLUMN};
use crate::error::Result;

use super::index::InternIndex;
use super::MapperConfig;

/// Reverse index shared between producer and consumer during a load.
type SharedSlots = Arc<RwLock<Vec<Option<Arc<str>>>>>;

/// Duplicate names listed individually in the load warning.
const MAX_REPORTED_DUPLICATES: usize = 10;

/// Outcome of a bulk load
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Declared key width of the table
    pub max_key_size: usize,
    /// Highest id at the start of the load
    pub max_id: ItemId,
    /// Rows streamed from the store
    pub rows: u64,
    /// Names found under more than one id
    pub duplicate_names: u64,
    /// Rows indexed only after the end-of-stream sentinel
    pub late_rows: u64,
    /// Wall time of the load
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct ScanProgress {
    rows: u64,
    last: ItemId,
    highest: ItemId,
}

#[derive(Debug, Default)]
struct IndexBuild {
    forward: HashMap<Arc<str>, ItemId>,
    duplicates: HashMap<Arc<str>, u32>,
    late_rows: u64,
}

impl IndexBuild {
    fn index(&mut self, name: &Arc<str>, id: ItemId) {
        if let Some(previous) = self.forward.insert(Arc::clone(name), id) {
            if previous != id {
                *self.duplicates.entry(Arc::clone(name)).or_insert(1) += 1;
            }
        }
    }
}

/// One-shot loader for a single table.
pub(crate) struct BulkLoader {
    store: Arc<dyn MapperStore>,
    table: TableName,
    batch_size: usize,
    ordered: bool,
    block: usize,
}

impl BulkLoader {
    pub(crate) fn new(store: Arc<dyn MapperStore>, table: TableName, config: &MapperConfig) -> Self {
        Self {
            store,
            table,
            batch_size: config.load_batch_size.max(1),
            ordered: config.ordered_scan,
            block: config.reverse_block,
        }
    }

    /// Load the table. `NotFound` if it does not exist.
    pub(crate) async fn load(&self) -> Result<(InternIndex, LoadReport)> {
        let start = Instant::now();

        let max_key_size = self
            .store
            .query_max_string_length(&self.table, NAME_COLUMN)
            .await?;
        let max_id = self.store.query_max_id(&self.table).await?;

        let slots: SharedSlots = Arc::new(RwLock::new(vec![None; max_id as usize + 1]));
        let (tx, rx) = mpsc::channel::<ItemId>(1);

        let consumer = tokio::spawn(consume(Arc::clone(&slots), rx));
        let producer = tokio::spawn(produce(
            Arc::clone(&self.store),
            self.table.clone(),
            Arc::clone(&slots),
            tx,
            self.batch_size,
            self.ordered,
        ));

        let build = consumer.await?;
        let progress = producer.await??;

        let reverse = Arc::try_unwrap(slots)
            .map(RwLock::into_inner)
            .unwrap_or_else(|shared| shared.read().clone());

        let report = LoadReport {
            max_key_size,
            max_id,
            rows: progress.rows,
            duplicate_names: build.duplicates.len() as u64,
            late_rows: build.late_rows,
            elapsed: start.elapsed(),
        };

        if !build.duplicates.is_empty() {
            let sample: Vec<String> = build
                .duplicates
                .iter()
                .take(MAX_REPORTED_DUPLICATES)
                .map(|(name, count)| format!("'{}' x{}", name, count))
                .collect();
            warn!(
                table = %self.table,
                count = build.duplicates.len(),
                sample = %sample.join(", "),
                "There are duplicated items"
            );
        }
        if build.late_rows > 0 {
            warn!(table = %self.table, late_rows = build.late_rows, "Scan returned rows out of id order");
        }
        info!(
            table = %self.table,
            rows = report.rows,
            max_id,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Mapper table loaded"
        );

        let index = InternIndex::from_parts(build.forward, reverse, self.block);
        Ok((index, report))
    }
}

/// Write a batch of rows into their slots, growing past the initial size
/// if rows were inserted after the max-id query.
fn flush(slots: &RwLock<Vec<Option<Arc<str>>>>, batch: &mut Vec<(ItemId, Arc<str>)>) {
    if batch.is_empty() {
        return;
    }
    let mut slots = slots.write();
    for (id, name) in batch.drain(..) {
        let slot = id as usize;
        if slot >= slots.len() {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(name);
    }
}

async fn produce(
    store: Arc<dyn MapperStore>,
    table: TableName,
    slots: SharedSlots,
    tx: mpsc::Sender<ItemId>,
    batch_size: usize,
    ordered: bool,
) -> Result<ScanProgress> {
    let mut progress = ScanProgress::default();
    let mut batch = Vec::with_capacity(batch_size.min(DEFAULT_BATCH_CAPACITY));

    let result = scan(
        store.as_ref(),
        &table,
        ordered,
        batch_size,
        &slots,
        &tx,
        &mut batch,
        &mut progress,
    )
    .await;

    flush(&slots, &mut batch);
    if progress.highest != 0 {
        let _ = tx.send(progress.highest).await;
    }
    // Consumer stops on 0; a send error only means it is already gone.
    let _ = tx.send(0).await;

    result.map(|()| progress)
}

/// Initial batch allocation; batches larger than this grow on demand.
const DEFAULT_BATCH_CAPACITY: usize = 4096;

#[allow(clippy::too_many_arguments)]
async fn scan(
    store: &dyn MapperStore,
    table: &TableName,
    ordered: bool,
    batch_size: usize,
    slots: &RwLock<Vec<Option<Arc<str>>>>,
    tx: &mpsc::Sender<ItemId>,
    batch: &mut Vec<(ItemId, Arc<str>)>,
    progress: &mut ScanProgress,
) -> Result<()> {
    let mut rows = store.stream_rows(table, ordered);

    while let Some(row) = rows.next().await {
        let (id, name) = row?;
        if id == 0 {
            warn!(table = %table, name = %name, "Skipping row with reserved id 0");
            continue;
        }

        batch.push((id, Arc::from(name)));
        progress.rows += 1;
        progress.last = id;
        progress.highest = progress.highest.max(id);

        if batch.len() >= batch_size {
            flush(slots, batch);
            debug!(table = %table, rows = progress.rows, watermark = progress.last, "Load batch flushed");
            let _ = tx.send(progress.last).await;
        }
    }
    Ok(())
}

async fn consume(slots: SharedSlots, mut rx: mpsc::Receiver<ItemId>) -> IndexBuild {
    let mut build = IndexBuild::default();
    let mut cidx: usize = 1;
    let mut pending: Vec<usize> = Vec::new();

    while let Some(watermark) = rx.recv().await {
        if watermark == 0 {
            break;
        }
        let watermark = watermark as usize;
        let slots = slots.read();
        while cidx <= watermark {
            match slots.get(cidx) {
                Some(Some(name)) => build.index(name, cidx as ItemId),
                _ => pending.push(cidx),
            }
            cidx += 1;
        }
    }

    let slots = slots.read();
    let tail = cidx..slots.len();
    for idx in pending.into_iter().chain(tail) {
        if let Some(Some(name)) = slots.get(idx) {
            build.index(name, idx as ItemId);
            build.late_rows += 1;
        }
    }

    build
}
