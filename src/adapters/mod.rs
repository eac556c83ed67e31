//! Infrastructure Adapters
//!
//! Implementations of the [`MapperStore`](crate::domain::MapperStore) port,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Port (MapperStore)                       │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │      SqliteStore (durable)   │   InMemoryStore (tests)     │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use idmapper::adapters::SqliteStore;
//! use idmapper::mapper::{MapperConfig, MapperRegistry};
//!
//! let store = Arc::new(SqliteStore::open("ids.db")?);
//! let registry = MapperRegistry::new(store, MapperConfig::default());
//! ```

mod memory;
mod sqlite;

pub use memory::{InMemoryStore, InMemoryStoreStats, ScanOrder};
pub use sqlite::SqliteStore;
