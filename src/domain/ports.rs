//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! This module defines the narrow contract the mapper core consumes from its
//! backing store. Infrastructure adapters implement [`MapperStore`] to provide
//! concrete relational backends.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Mapper Core                           │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Port (MapperStore)                  │    │
//! │  │  schema probe │ bulk scan │ insert-or-fetch          │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │        SqliteStore        │      InMemoryStore       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Identifier assigned to an interned key by the store's auto-increment.
pub type ItemId = u32;

/// Sentinel meaning "no mapping could be established".
pub const INVALID: ItemId = 0xFFFF_FFFF;

/// Name of the key column in every mapper table.
pub const NAME_COLUMN: &str = "name";

/// Physical table identifier (value object).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(pub String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the table for a mapper, optionally under a shared namespace prefix.
    pub fn for_mapper(mapper_name: &str, prefix: Option<&str>) -> Self {
        match prefix {
            Some(prefix) if !prefix.is_empty() => Self(format!("{}.idmap.{}", prefix, mapper_name)),
            _ => Self(format!("idmap.{}", mapper_name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Character set used for the key column.
///
/// Variants are listed widest first; negotiation tries them in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Fixed two-byte Unicode, up to 500 characters
    Ucs2,
    /// Variable width UTF-8, up to 333 characters
    Utf8,
}

impl Encoding {
    /// All encodings in negotiation order.
    pub const ALL: [Encoding; 2] = [Encoding::Ucs2, Encoding::Utf8];

    /// Widest key, in characters, a column of this encoding can hold.
    pub fn max_key_size(self) -> usize {
        match self {
            Encoding::Ucs2 => 500,
            Encoding::Utf8 => 333,
        }
    }

    /// Character set name as spelled in DDL.
    pub fn charset(self) -> &'static str {
        match self {
            Encoding::Ucs2 => "ucs2",
            Encoding::Utf8 => "utf8",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Encoding::Ucs2 => 0,
            Encoding::Utf8 => 1,
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.charset())
    }
}

// =============================================================================
// Store Port
// =============================================================================

/// Lazy sequence of `(id, name)` rows.
pub type RowStream<'a> = BoxStream<'a, Result<(ItemId, String)>>;

/// Port for the relational table backing a mapper.
///
/// Adapters map their native failures onto the recoverable error kinds
/// (`NotFound`, `EncodingUnsupported`, `DuplicateKey`, `EncodingRejected`);
/// everything else is reported as a fatal error.
///
/// # Example
///
/// ```ignore
/// let store: Arc<dyn MapperStore> = Arc::new(SqliteStore::open("ids.db")?);
/// store.create_table_if_not_exists(&table, Encoding::Utf8, 333).await?;
/// let id = store.insert_row(&table, "alice").await?;
/// ```
#[async_trait]
pub trait MapperStore: Send + Sync {
    /// Declared width of `column`. `NotFound` if the table does not exist.
    async fn query_max_string_length(&self, table: &TableName, column: &str) -> Result<usize>;

    /// Highest assigned id, 0 for an empty table.
    async fn query_max_id(&self, table: &TableName) -> Result<ItemId>;

    /// Stream every row of the table.
    ///
    /// With `ordered` set the rows arrive in ascending id order; otherwise
    /// the order is whatever the physical scan yields.
    fn stream_rows<'a>(&'a self, table: &'a TableName, ordered: bool) -> RowStream<'a>;

    /// Create the table unless it exists. `EncodingUnsupported` if the store
    /// does not know `encoding`.
    async fn create_table_if_not_exists(
        &self,
        table: &TableName,
        encoding: Encoding,
        max_len: usize,
    ) -> Result<()>;

    /// Insert `name` with an auto-assigned id.
    async fn insert_row(&self, table: &TableName, name: &str) -> Result<ItemId>;

    /// Id of an existing row.
    async fn fetch_id_by_name(&self, table: &TableName, name: &str) -> Result<ItemId>;
}

// =============================================================================
// Tests
// =============================================================================
