//! Race-safe get-or-create against the backing store.
//!
//! Independent processes may insert the same new key at the same time. The
//! table's unique index lets exactly one insert through; every loser reads
//! the winner's id back instead of failing.

use tracing::{error, warn};

use crate::domain::ports::{ItemId, MapperStore, TableName, INVALID};
use crate::error::{Error, Result};

use super::stats::MapperStats;

/// Insert `key`, or fetch its id if another writer got there first.
///
/// Returns [`INVALID`] when the store cannot encode `key`; such keys are
/// recorded nowhere. Every other store failure is returned as a fatal error.
pub async fn insert_or_fetch(
    store: &dyn MapperStore,
    table: &TableName,
    key: &str,
    stats: &MapperStats,
) -> Result<ItemId> {
    stats.record_store_insert();

    let id = match store.insert_row(table, key).await {
        Ok(id) => id,
        Err(Error::DuplicateKey { .. }) => {
            stats.record_duplicate_resolution();
            let id = store.fetch_id_by_name(table, key).await.map_err(|e| {
                error!(table = %table, key = %key, error = %e, "Fetch after duplicate insert failed");
                e
            })?;
            warn!(table = %table, key = %key, id, "Duplicate item, adopting existing id");
            id
        }
        Err(Error::EncodingRejected { .. }) => {
            stats.record_rejected_key();
            warn!(table = %table, key = %key, "Invalid item, can not insert");
            return Ok(INVALID);
        }
        Err(e) => {
            error!(table = %table, key = %key, error = %e, "Insert failed");
            return Err(e);
        }
    };

    if id == 0 || id == INVALID {
        return Err(Error::Store(format!(
            "store assigned reserved id {} to '{}' in {}",
            id, key, table
        )));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::ports::Encoding;
    use assert_matches::assert_matches;

    async fn store_with_table() -> (InMemoryStore, TableName) {
        let store = InMemoryStore::new();
        let table = TableName::for_mapper("insert", None);
        store
            .create_table_if_not_exists(&table, Encoding::Utf8, 333)
            .await
            .unwrap();
        (store, table)
    }

    #[tokio::test]
    async fn test_fresh_insert() {
        let (store, table) = store_with_table().await;
        let stats = MapperStats::new();

        let id = insert_or_fetch(&store, &table, "k", &stats).await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(stats.snapshot().duplicate_resolutions, 0);
    }

    #[tokio::test]
    async fn test_duplicate_adopts_winner_id() {
        let (store, table) = store_with_table().await;
        let winner = store.insert_row(&table, "k").await.unwrap();
        let stats = MapperStats::new();

        let id = insert_or_fetch(&store, &table, "k", &stats).await.unwrap();
        assert_eq!(id, winner);
        assert_eq!(stats.snapshot().duplicate_resolutions, 1);
        assert_eq!(store.row_count(&table), Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_callers_converge() {
        let (store, table) = store_with_table().await;
        let (stats_a, stats_b) = (MapperStats::new(), MapperStats::new());

        let (a, b) = tokio::join!(
            insert_or_fetch(&store, &table, "race", &stats_a),
            insert_or_fetch(&store, &table, "race", &stats_b),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(store.row_count(&table), Some(1));
    }

    #[tokio::test]
    async fn test_rejected_key_is_invalid() {
        let (store, table) = store_with_table().await;
        store.reject_key("bad");
        let stats = MapperStats::new();

        let id = insert_or_fetch(&store, &table, "bad", &stats).await.unwrap();
        assert_eq!(id, INVALID);
        assert_eq!(stats.snapshot().rejected_keys, 1);
        assert_eq!(store.row_count(&table), Some(0));
    }

    #[tokio::test]
    async fn test_other_errors_are_fatal() {
        let (store, table) = store_with_table().await;
        store.fail_next("server has gone away");
        let stats = MapperStats::new();

        let result = insert_or_fetch(&store, &table, "k", &stats).await;
        assert_matches!(result, Err(ref e) if e.is_fatal());
    }
}
