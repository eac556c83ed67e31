//! idmapper - Durable String Interning
//!
//! Assigns a stable, dense, increasing `u32` id to every distinct string the
//! first time it is seen, and answers lookups in both directions from an
//! in-memory mirror. Every mapping is persisted in a relational table, so ids
//! survive restarts and are shared by every process using the same table.
//!
//! # Architecture
//!
//! ```text
//! Schema Negotiator (create) → Bulk Loader (warm-up) → IdMapper (serve)
//!                                    │                       │
//!                                    └──── MapperStore ◀─────┘
//! ```
//!
//! Concurrent processes racing to intern the same new key converge on one id
//! through the table's unique index: the loser adopts the winner's id.
//!
//! # Modules
//!
//! - [`adapters`] - SQLite and in-memory implementations of the store port
//! - [`domain`] - Store port and value objects
//! - [`error`] - Error types
//! - [`mapper`] - Interning cache, bulk loader, schema negotiation, registry

pub mod adapters;
pub mod domain;
pub mod error;
pub mod mapper;

// Re-export commonly used types
pub use adapters::{InMemoryStore, SqliteStore};
pub use domain::{Encoding, ItemId, MapperStore, TableName, INVALID};
pub use error::{Error, Result};
pub use mapper::{IdMapper, MapperConfig, MapperRegistry};
