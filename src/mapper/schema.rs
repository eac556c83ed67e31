//! Schema Negotiator
//!
//! Creates a mapper table with the widest key column the store accepts.
//! Stores differ in which character sets they know about, so creation walks
//! [`Encoding::ALL`] widest first and falls back on "unknown character set"
//! errors. A rejected encoding is remembered in [`EncodingCapabilities`] and
//! never tried again by any negotiator sharing that state.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::domain::ports::{Encoding, MapperStore, TableName, NAME_COLUMN};
use crate::error::{Error, Result};

/// Process-wide record of character sets the store rejected.
///
/// Written at most once per encoding, read without locking.
#[derive(Debug, Default)]
pub struct EncodingCapabilities {
    unsupported: [AtomicBool; 2],
}

impl EncodingCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_supported(&self, encoding: Encoding) -> bool {
        !self.unsupported[encoding.index()].load(Ordering::Acquire)
    }

    /// Returns true if this call is the one that flipped the flag.
    pub fn mark_unsupported(&self, encoding: Encoding) -> bool {
        !self.unsupported[encoding.index()].swap(true, Ordering::AcqRel)
    }

    /// Encodings still worth trying, widest first.
    pub fn candidates(&self) -> impl Iterator<Item = Encoding> + '_ {
        Encoding::ALL
            .into_iter()
            .filter(move |e| self.is_supported(*e))
    }
}

/// Ensures a mapper table exists and reports its key width.
pub struct SchemaNegotiator<'a> {
    store: &'a dyn MapperStore,
    capabilities: &'a EncodingCapabilities,
}

impl<'a> SchemaNegotiator<'a> {
    pub fn new(store: &'a dyn MapperStore, capabilities: &'a EncodingCapabilities) -> Self {
        Self {
            store,
            capabilities,
        }
    }

    /// Create `table` if needed and return the maximum key size in characters.
    ///
    /// The width is read back from the store, so a table created concurrently
    /// by another process with a narrower encoding is reported correctly.
    pub async fn ensure_table(&self, table: &TableName) -> Result<usize> {
        let encoding = self.create(table).await?;
        let width = self
            .store
            .query_max_string_length(table, NAME_COLUMN)
            .await?;

        if width != encoding.max_key_size() {
            warn!(
                table = %table,
                requested = encoding.max_key_size(),
                actual = width,
                "Table already existed with a different key width"
            );
        }
        Ok(width)
    }

    async fn create(&self, table: &TableName) -> Result<Encoding> {
        for encoding in self.capabilities.candidates() {
            match self
                .store
                .create_table_if_not_exists(table, encoding, encoding.max_key_size())
                .await
            {
                Ok(()) => {
                    info!(table = %table, charset = %encoding, "Mapper table ready");
                    return Ok(encoding);
                }
                Err(Error::EncodingUnsupported { .. }) => {
                    if self.capabilities.mark_unsupported(encoding) {
                        warn!(table = %table, charset = %encoding, "Can not use charset, trying next");
                    }
                }
                Err(e) => {
                    error!(table = %table, charset = %encoding, error = %e, "Create table failed");
                    return Err(e);
                }
            }
        }

        Err(Error::Store(format!(
            "no supported character set left for table {}",
            table
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use assert_matches::assert_matches;

    #[test]
    fn test_capabilities_written_once() {
        let caps = EncodingCapabilities::new();
        assert!(caps.is_supported(Encoding::Ucs2));

        assert!(caps.mark_unsupported(Encoding::Ucs2));
        assert!(!caps.mark_unsupported(Encoding::Ucs2));
        assert!(!caps.is_supported(Encoding::Ucs2));
        assert_eq!(caps.candidates().collect::<Vec<_>>(), vec![Encoding::Utf8]);
    }

    #[tokio::test]
    async fn test_widest_encoding_first() {
        let store = InMemoryStore::new();
        let caps = EncodingCapabilities::new();
        let table = TableName::for_mapper("wide", None);

        let width = SchemaNegotiator::new(&store, &caps)
            .ensure_table(&table)
            .await
            .unwrap();
        assert_eq!(width, 500);
        assert_eq!(store.table_encoding(&table), Some(Encoding::Ucs2));
    }

    #[tokio::test]
    async fn test_fallback_is_remembered() {
        let store = InMemoryStore::without_encoding(Encoding::Ucs2);
        let caps = EncodingCapabilities::new();

        let first = TableName::for_mapper("first", None);
        let width = SchemaNegotiator::new(&store, &caps)
            .ensure_table(&first)
            .await
            .unwrap();
        assert_eq!(width, 333);

        let second = TableName::for_mapper("second", None);
        SchemaNegotiator::new(&store, &caps)
            .ensure_table(&second)
            .await
            .unwrap();

        assert_eq!(
            store.create_attempts(),
            vec![Encoding::Ucs2, Encoding::Utf8, Encoding::Utf8]
        );
    }

    #[tokio::test]
    async fn test_other_errors_abort() {
        let store = InMemoryStore::new();
        let caps = EncodingCapabilities::new();
        store.fail_next("access denied");

        let result = SchemaNegotiator::new(&store, &caps)
            .ensure_table(&TableName::from("t"))
            .await;
        assert_matches!(result, Err(Error::Store(_)));
        assert!(caps.is_supported(Encoding::Ucs2));
    }

    #[tokio::test]
    async fn test_no_encoding_left() {
        let store = InMemoryStore::new();
        let caps = EncodingCapabilities::new();
        caps.mark_unsupported(Encoding::Ucs2);
        caps.mark_unsupported(Encoding::Utf8);

        let result = SchemaNegotiator::new(&store, &caps)
            .ensure_table(&TableName::from("t"))
            .await;
        assert_matches!(result, Err(Error::Store(_)));
    }

    #[tokio::test]
    async fn test_existing_table_width_is_reported() {
        let store = InMemoryStore::new();
        let caps = EncodingCapabilities::new();
        let table = TableName::for_mapper("existing", None);
        store
            .create_table_if_not_exists(&table, Encoding::Utf8, 333)
            .await
            .unwrap();

        let width = SchemaNegotiator::new(&store, &caps)
            .ensure_table(&table)
            .await
            .unwrap();
        assert_eq!(width, 333);
    }
}
