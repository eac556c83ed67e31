//! Domain Layer
//!
//! Value objects and the store port the mapper core depends on.
//!
//! # Usage
//!
//! ```ignore
//! use idmapper::domain::{MapperStore, TableName, Encoding};
//!
//! async fn ensure<S: MapperStore>(store: &S) -> Result<()> {
//!     let table = TableName::for_mapper("users", None);
//!     store.create_table_if_not_exists(&table, Encoding::Utf8, 333).await
//! }
//! ```

pub mod ports;

pub use ports::{Encoding, ItemId, MapperStore, RowStream, TableName, INVALID, NAME_COLUMN};
