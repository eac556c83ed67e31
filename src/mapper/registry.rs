//! Mapper Registry
//!
//! Hands out one [`IdMapper`] per name for the lifetime of the registry.
//! Creating a mapper loads its table, or negotiates and creates the table
//! first when asked to.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::domain::ports::{MapperStore, TableName};
use crate::error::{Error, Result};

use super::cache::IdMapper;
use super::loader::BulkLoader;
use super::schema::{EncodingCapabilities, SchemaNegotiator};
use super::MapperConfig;

/// Process-wide collection of named mappers sharing one store.
pub struct MapperRegistry {
    store: Arc<dyn MapperStore>,
    config: MapperConfig,
    capabilities: Arc<EncodingCapabilities>,
    mappers: DashMap<String, Arc<OnceCell<Arc<IdMapper>>>>,
}

impl MapperRegistry {
    /// Create a registry with fresh encoding capabilities.
    pub fn new(store: Arc<dyn MapperStore>, config: MapperConfig) -> Self {
        Self::with_capabilities(store, config, Arc::new(EncodingCapabilities::new()))
    }

    /// Create a registry sharing encoding capabilities with other registries.
    pub fn with_capabilities(
        store: Arc<dyn MapperStore>,
        config: MapperConfig,
        capabilities: Arc<EncodingCapabilities>,
    ) -> Self {
        Self {
            store,
            config,
            capabilities,
            mappers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Arc<EncodingCapabilities> {
        &self.capabilities
    }

    /// Get the mapper called `name`, opening it on first use.
    ///
    /// Returns `Ok(None)` when the table does not exist and
    /// `create_table_if_not_exist` is false. Concurrent callers for the same
    /// name share a single open.
    pub async fn get_mapper(
        &self,
        name: &str,
        create_table_if_not_exist: bool,
    ) -> Result<Option<Arc<IdMapper>>> {
        if name.is_empty() {
            return Err(Error::Config("mapper name is empty".to_string()));
        }

        let cell = Arc::clone(self.mappers.entry(name.to_string()).or_default().value());
        if let Some(mapper) = cell.get() {
            return Ok(Some(Arc::clone(mapper)));
        }

        match cell
            .get_or_try_init(|| self.open(name, create_table_if_not_exist))
            .await
        {
            Ok(mapper) => Ok(Some(Arc::clone(mapper))),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Names of the mappers opened so far.
    pub fn mapper_names(&self) -> Vec<String> {
        self.mappers
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect()
    }

    async fn open(&self, name: &str, create: bool) -> Result<Arc<IdMapper>> {
        self.config.validate()?;

        let table = TableName::for_mapper(name, self.config.table_prefix.as_deref());
        let loader = BulkLoader::new(Arc::clone(&self.store), table.clone(), &self.config);

        let loaded = match loader.load().await {
            Err(Error::NotFound { .. }) if create => {
                SchemaNegotiator::new(self.store.as_ref(), &self.capabilities)
                    .ensure_table(&table)
                    .await?;
                info!(mapper = %name, table = %table, "Mapper table has been created");
                // Another process may have created and filled it first.
                loader.load().await
            }
            other => other,
        };

        let (index, report) = loaded.map_err(|e| {
            if e.is_fatal() {
                error!(mapper = %name, table = %table, error = %e, "Failed to open mapper");
            }
            e
        })?;

        let (rows, duplicates) = (report.rows, report.duplicate_names);
        let mapper = IdMapper::new(name, table, index, report, Arc::clone(&self.store));
        mapper.stats().record_load(rows, duplicates);
        Ok(Arc::new(mapper))
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("config", &self.config)
            .field("mapper_count", &self.mappers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::ports::{Encoding, INVALID};
    use assert_matches::assert_matches;

    fn registry(store: &Arc<InMemoryStore>) -> MapperRegistry {
        MapperRegistry::new(store.clone(), MapperConfig::default())
    }

    #[tokio::test]
    async fn test_missing_table_without_create() {
        let store = Arc::new(InMemoryStore::new());
        let registry = registry(&store);

        assert!(registry.get_mapper("users", false).await.unwrap().is_none());
        assert!(registry.mapper_names().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_reuse() {
        let store = Arc::new(InMemoryStore::new());
        let registry = registry(&store);

        let first = registry.get_mapper("users", true).await.unwrap().unwrap();
        let second = registry.get_mapper("users", false).await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.max_key_size(), 500);
        assert_eq!(registry.mapper_names(), vec!["users".to_string()]);
        assert_eq!(store.stats().creates, 1);
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let store = Arc::new(InMemoryStore::new());

        assert_matches!(
            registry(&store).get_mapper("", true).await,
            Err(Error::Config(_))
        );
    }

    #[tokio::test]
    async fn test_existing_table_is_loaded() {
        let store = Arc::new(InMemoryStore::new());
        let table = TableName::for_mapper("colors", None);
        store.seed(&table, Encoding::Utf8, &[(1, "red"), (2, "green")]);

        let mapper = registry(&store)
            .get_mapper("colors", false)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(mapper.max_key_size(), 333);
        assert_eq!(mapper.has_item("green"), Some(2));
        assert_eq!(mapper.stats().snapshot().loaded_rows, 2);
        assert_eq!(mapper.load_report().rows, 2);
        assert_eq!(mapper.load_report().max_id, 2);
        assert_eq!(mapper.load_report().max_key_size, 333);
        assert_eq!(store.stats().creates, 0);
    }

    #[tokio::test]
    async fn test_prefix_is_applied() {
        let store = Arc::new(InMemoryStore::new());
        let registry = MapperRegistry::new(store.clone(), MapperConfig::default().with_prefix("tenant"));

        let mapper = registry.get_mapper("tags", true).await.unwrap().unwrap();

        assert_eq!(mapper.table().as_str(), "tenant.idmap.tags");
        assert_eq!(store.row_count(&TableName::from("tenant.idmap.tags")), Some(0));
    }

    #[tokio::test]
    async fn test_fatal_load_error_propagates() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_next("disk I/O error");

        assert_matches!(
            registry(&store).get_mapper("users", true).await,
            Err(Error::Store(_))
        );
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let config = MapperConfig {
            reverse_block: 0,
            ..Default::default()
        };

        assert_matches!(
            MapperRegistry::new(store, config).get_mapper("users", true).await,
            Err(Error::Config(_))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_open_creates_once() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(registry(&store));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_mapper("shared", true).await.unwrap().unwrap() })
            })
            .collect();

        let mut mappers = Vec::new();
        for handle in handles {
            mappers.push(handle.await.unwrap());
        }

        assert!(mappers.iter().all(|m| Arc::ptr_eq(m, &mappers[0])));
        assert_eq!(store.stats().creates, 1);
        assert_eq!(mappers[0].id_from_item("x", false).await.unwrap(), INVALID);
    }
}
