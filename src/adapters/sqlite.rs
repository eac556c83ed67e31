//! SQLite Store Adapter
//!
//! Implements the `MapperStore` port on a SQLite database file. Blocking
//! driver calls run on the tokio blocking pool; table scans are streamed
//! back through a bounded channel so row retrieval overlaps with indexing.
//!
//! SQLite has no per-column character sets, so only [`Encoding::Utf8`] is
//! accepted. Several `SqliteStore`s (or processes) may open the same file;
//! the unique index on `name` arbitrates concurrent inserts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::ports::{Encoding, ItemId, MapperStore, RowStream, TableName};
use crate::error::{Error, Result};

/// Default busy timeout (ms) while another connection holds the write lock.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Rows buffered between the scanning thread and the consumer.
const STREAM_BUFFER: usize = 1024;

/// SQLite-backed mapper store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::configure(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&conn.lock())).await?
    }
}

fn quote_ident(table: &TableName) -> String {
    format!("\"{}\"", table.as_str().replace('"', "\"\""))
}

/// Translate driver failures into the store error taxonomy.
fn map_error(table: &str, err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Error::DuplicateKey {
                table: table.to_string(),
            }
        }
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.starts_with("no such table") => {
            Error::not_found(table)
        }
        _ => Error::Sqlite(err),
    }
}

/// Width from a declared column type such as `VARCHAR(333)`.
fn parse_declared_width(declared: &str) -> Option<usize> {
    let open = declared.find('(')?;
    let close = declared[open..].find(')')? + open;
    declared[open + 1..close].trim().parse().ok()
}

fn to_item_id(table: &str, raw: i64) -> Result<ItemId> {
    ItemId::try_from(raw)
        .map_err(|_| Error::Store(format!("id {} in {} does not fit 32 bits", raw, table)))
}

#[async_trait]
impl MapperStore for SqliteStore {
    async fn query_max_string_length(&self, table: &TableName, column: &str) -> Result<usize> {
        let table = table.0.clone();
        let column = column.to_string();
        self.with_conn(move |conn| {
            let declared: Option<String> = conn
                .query_row(
                    "SELECT type FROM pragma_table_info(?1) WHERE name = ?2",
                    params![table, column],
                    |row| row.get(0),
                )
                .optional()?;
            match declared {
                None => Err(Error::not_found(table)),
                Some(declared) => parse_declared_width(&declared).ok_or_else(|| {
                    Error::Store(format!(
                        "column {}.{} has no declared width: {}",
                        table, column, declared
                    ))
                }),
            }
        })
        .await
    }

    async fn query_max_id(&self, table: &TableName) -> Result<ItemId> {
        let sql = format!("SELECT MAX(id) FROM {}", quote_ident(table));
        let table = table.0.clone();
        self.with_conn(move |conn| {
            let max: Option<i64> = conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(|e| map_error(&table, e))?;
            to_item_id(&table, max.unwrap_or(0))
        })
        .await
    }

    fn stream_rows<'a>(&'a self, table: &'a TableName, ordered: bool) -> RowStream<'a> {
        let (tx, rx) = mpsc::channel::<Result<(ItemId, String)>>(STREAM_BUFFER);
        let conn = Arc::clone(&self.conn);
        let table_name = table.0.clone();
        let sql = format!(
            "SELECT id, name FROM {}{}",
            quote_ident(table),
            if ordered { " ORDER BY id" } else { "" }
        );

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let scan = || -> Result<()> {
                let mut stmt = conn.prepare(&sql).map_err(|e| map_error(&table_name, e))?;
                let mut rows = stmt.query([]).map_err(|e| map_error(&table_name, e))?;
                while let Some(row) = rows.next()? {
                    let id = to_item_id(&table_name, row.get(0)?)?;
                    let name: String = row.get(1)?;
                    if tx.blocking_send(Ok((id, name))).is_err() {
                        debug!(table = %table_name, "Scan abandoned by reader");
                        break;
                    }
                }
                Ok(())
            };
            if let Err(e) = scan() {
                let _ = tx.blocking_send(Err(e));
            }
        });

        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|row| (row, rx))
        }))
    }

    async fn create_table_if_not_exists(
        &self,
        table: &TableName,
        encoding: Encoding,
        max_len: usize,
    ) -> Result<()> {
        if encoding != Encoding::Utf8 {
            return Err(Error::EncodingUnsupported {
                encoding: encoding.to_string(),
            });
        }

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             name VARCHAR({}) NOT NULL UNIQUE CHECK (length(name) <= {}))",
            quote_ident(table),
            max_len,
            max_len
        );
        let table = table.0.clone();
        self.with_conn(move |conn| {
            conn.execute_batch(&sql).map_err(|e| map_error(&table, e))?;
            Ok(())
        })
        .await
    }

    async fn insert_row(&self, table: &TableName, name: &str) -> Result<ItemId> {
        if name.contains('\0') {
            return Err(Error::EncodingRejected {
                table: table.0.clone(),
            });
        }

        let sql = format!("INSERT INTO {} (name) VALUES (?1)", quote_ident(table));
        let table = table.0.clone();
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.execute(&sql, params![name])
                .map_err(|e| map_error(&table, e))?;
            to_item_id(&table, conn.last_insert_rowid())
        })
        .await
    }

    async fn fetch_id_by_name(&self, table: &TableName, name: &str) -> Result<ItemId> {
        let sql = format!("SELECT id FROM {} WHERE name = ?1", quote_ident(table));
        let table = table.0.clone();
        let name = name.to_string();
        self.with_conn(move |conn| {
            let id: Option<i64> = conn
                .query_row(&sql, params![name], |row| row.get(0))
                .optional()
                .map_err(|e| map_error(&table, e))?;
            match id {
                Some(id) => to_item_id(&table, id),
                None => Err(Error::Store(format!("no row named '{}' in {}", name, table))),
            }
        })
        .await
    }
}
