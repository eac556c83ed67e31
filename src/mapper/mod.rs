//! Mapper Module
//!
//! Durable string interning. Each named mapper mirrors one backing table in
//! memory and hands out the ids the table's auto-increment assigned.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           MapperRegistry                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  ┌──────────────┐    ┌──────────────┐    ┌───────────────────────────┐  │
//! │  │    Schema    │    │     Bulk     │    │        IdMapper           │  │
//! │  │  Negotiator  │───▶│    Loader    │───▶│  (interning cache +       │  │
//! │  │  (creation)  │    │  (warm-up)   │    │   insert-or-fetch)        │  │
//! │  └──────────────┘    └──────────────┘    └───────────────────────────┘  │
//! │                                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **Schema Negotiator** (`schema.rs`): creates the table with the widest
//!   character set the store accepts and remembers rejected ones.
//! - **Bulk Loader** (`loader.rs`): streams the table into a fresh index with
//!   a producer/consumer pair synchronised by watermarks.
//! - **IdMapper** (`cache.rs`): concurrent lookups in both directions and
//!   get-or-create through the race-safe insert protocol (`insert.rs`).
//! - **Registry** (`registry.rs`): one `IdMapper` per name per process.
//!
//! # Usage
//!
//! ```rust,ignore
//! let registry = MapperRegistry::new(store, MapperConfig::default());
//! let users = registry.get_mapper("users", true).await?.unwrap();
//!
//! let id = users.id_from_item("alice", true).await?;
//! assert_eq!(users.item_from_id(id).as_deref(), Some("alice"));
//! ```

mod cache;
mod index;
mod insert;
mod loader;
mod registry;
mod schema;
mod stats;

#[cfg(test)]
mod proptest;

pub use cache::IdMapper;
pub use insert::insert_or_fetch;
pub use loader::LoadReport;
pub use registry::MapperRegistry;
pub use schema::{EncodingCapabilities, SchemaNegotiator};
pub use stats::{MapperStats, MapperStatsSnapshot};

/// Rows consumed between two load watermarks.
pub const DEFAULT_LOAD_BATCH_SIZE: usize = 100_000;

/// Slots added to the reverse index each time it grows.
pub const DEFAULT_REVERSE_BLOCK: usize = 100;

/// Mapper configuration
#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// Shared namespace prefix for table names
    pub table_prefix: Option<String>,

    /// Rows consumed between two load watermarks
    pub load_batch_size: usize,

    /// Growth increment of the reverse index
    pub reverse_block: usize,

    /// Ask the store for rows in id order during bulk load
    pub ordered_scan: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            table_prefix: None,
            load_batch_size: DEFAULT_LOAD_BATCH_SIZE,
            reverse_block: DEFAULT_REVERSE_BLOCK,
            ordered_scan: true,
        }
    }
}

impl MapperConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = Some(prefix.into());
        self
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.load_batch_size == 0 {
            return Err(crate::error::Error::Config(
                "load_batch_size must be positive".to_string(),
            ));
        }
        if self.reverse_block == 0 {
            return Err(crate::error::Error::Config(
                "reverse_block must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cut `key` to at most `max_chars` characters, on a char boundary.
pub fn truncate_key(key: &str, max_chars: usize) -> &str {
    match key.char_indices().nth(max_chars) {
        Some((offset, _)) => &key[..offset],
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_key_ascii() {
        assert_eq!(truncate_key("abcdef", 3), "abc");
        assert_eq!(truncate_key("abc", 3), "abc");
        assert_eq!(truncate_key("ab", 3), "ab");
        assert_eq!(truncate_key("abc", 0), "");
    }

    #[test]
    fn test_truncate_key_multibyte() {
        // Multi-byte characters count once
        assert_eq!(truncate_key("éèêë", 2), "éè");
        assert_eq!(truncate_key("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn test_default_config() {
        let config = MapperConfig::default();
        assert_eq!(config.load_batch_size, 100_000);
        assert_eq!(config.reverse_block, 100);
        assert!(config.ordered_scan);
        assert!(config.table_prefix.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = MapperConfig {
            load_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
