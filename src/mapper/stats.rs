//! Mapper Statistics
//!
//! Per-instance counters for monitoring cache effectiveness and store traffic.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Mapper statistics collector
#[derive(Debug, Default)]
pub struct MapperStats {
    // Lookups
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,

    // Store traffic
    store_inserts: AtomicU64,
    duplicate_resolutions: AtomicU64,
    rejected_keys: AtomicU64,

    // Bulk load
    loaded_rows: AtomicU64,
    load_duplicates: AtomicU64,
}

impl MapperStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_insert(&self) {
        self.store_inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_resolution(&self) {
        self.duplicate_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_key(&self) {
        self.rejected_keys.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self, rows: u64, duplicates: u64) {
        self.loaded_rows.store(rows, Ordering::Relaxed);
        self.load_duplicates.store(duplicates, Ordering::Relaxed);
    }

    pub fn store_inserts(&self) -> u64 {
        self.store_inserts.load(Ordering::Relaxed)
    }

    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.lookups.load(Ordering::Relaxed) as f64;
        if lookups == 0.0 {
            0.0
        } else {
            self.hits.load(Ordering::Relaxed) as f64 / lookups
        }
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MapperStatsSnapshot {
        MapperStatsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            hit_ratio: self.hit_ratio(),
            store_inserts: self.store_inserts.load(Ordering::Relaxed),
            duplicate_resolutions: self.duplicate_resolutions.load(Ordering::Relaxed),
            rejected_keys: self.rejected_keys.load(Ordering::Relaxed),
            loaded_rows: self.loaded_rows.load(Ordering::Relaxed),
            load_duplicates: self.load_duplicates.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of [`MapperStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapperStatsSnapshot {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub store_inserts: u64,
    pub duplicate_resolutions: u64,
    pub rejected_keys: u64,
    pub loaded_rows: u64,
    pub load_duplicates: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let stats = MapperStats::new();
        assert_eq!(stats.hit_ratio(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = MapperStats::new();
        stats.record_store_insert();
        stats.record_load(42, 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.store_inserts, 1);
        assert_eq!(snapshot.loaded_rows, 42);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["load_duplicates"], 1);
    }
}
