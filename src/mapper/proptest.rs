//! Property-Based Tests for the Interning Cache
//!
//! # Test Properties
//!
//! 1. **Round-trip**: item_from_id(id_from_item(k)) = k for keys within width
//! 2. **Idempotence**: interning twice yields one id and one store insert
//! 3. **Truncation**: over-long keys share the id of their prefix
//! 4. **Reload**: a fresh load reproduces every mapping

#![cfg(test)]

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use super::{MapperConfig, MapperRegistry};
use crate::adapters::InMemoryStore;
use crate::domain::ports::INVALID;

// =============================================================================
// Property Strategies
// =============================================================================

/// Keys within the narrowest column width, BMP characters only.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _.\\-éü日本]{0,40}"
}

fn key_set_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(key_strategy(), 1..40)
}

fn small_width_config() -> MapperConfig {
    MapperConfig {
        load_batch_size: 3,
        reverse_block: 4,
        ..Default::default()
    }
}

// =============================================================================
// Cache Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: every interned key reads back under its id.
    #[test]
    fn prop_round_trip(keys in key_set_strategy()) {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let registry = MapperRegistry::new(store, small_width_config());
            let mapper = registry.get_mapper("prop", true).await.unwrap().unwrap();

            for key in &keys {
                let id = mapper.id_from_item(key, true).await.unwrap();
                prop_assert_ne!(id, INVALID);
                prop_assert_ne!(id, 0);
                prop_assert_eq!(mapper.item_from_id(id), Some(key.clone()));
            }
            Ok(())
        })?;
    }

    /// Property: re-interning never reaches the store again.
    #[test]
    fn prop_idempotent(keys in key_set_strategy()) {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let registry = MapperRegistry::new(store.clone(), small_width_config());
            let mapper = registry.get_mapper("prop", true).await.unwrap().unwrap();

            let mut first = Vec::new();
            for key in &keys {
                first.push(mapper.id_from_item(key, true).await.unwrap());
            }
            let inserts = store.stats().inserts;

            for (key, id) in keys.iter().zip(&first) {
                prop_assert_eq!(mapper.id_from_item(key, true).await.unwrap(), *id);
            }
            prop_assert_eq!(store.stats().inserts, inserts);

            let distinct: HashSet<&String> = keys.iter().collect();
            prop_assert_eq!(inserts as usize, distinct.len());
            Ok(())
        })?;
    }

    /// Property: a key longer than the width maps to the id of its prefix.
    #[test]
    fn prop_truncation(prefix in "[a-z]{333}", tail in "[a-z]{1,20}") {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryStore::without_encoding(crate::domain::Encoding::Ucs2));
            let registry = MapperRegistry::new(store, MapperConfig::default());
            let mapper = registry.get_mapper("prop", true).await.unwrap().unwrap();
            prop_assert_eq!(mapper.max_key_size(), 333);

            let long = format!("{}{}", prefix, tail);
            let long_id = mapper.id_from_item(&long, true).await.unwrap();
            let prefix_id = mapper.id_from_item(&prefix, true).await.unwrap();
            prop_assert_eq!(long_id, prefix_id);
            Ok(())
        })?;
    }

    /// Property: a second registry over the same store sees every mapping.
    #[test]
    fn prop_reload_reproduces_mappings(keys in key_set_strategy()) {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let writer = MapperRegistry::new(store.clone(), small_width_config());
            let mapper = writer.get_mapper("prop", true).await.unwrap().unwrap();

            let mut ids = Vec::new();
            for key in &keys {
                ids.push(mapper.id_from_item(key, true).await.unwrap());
            }

            let reader = MapperRegistry::new(store, small_width_config());
            let reloaded = reader.get_mapper("prop", false).await.unwrap().unwrap();

            for (key, id) in keys.iter().zip(&ids) {
                prop_assert_eq!(reloaded.has_item(key), Some(*id));
                prop_assert_eq!(reloaded.item_from_id(*id), Some(key.clone()));
            }
            prop_assert_eq!(reloaded.len(), mapper.len());
            Ok(())
        })?;
    }
}
