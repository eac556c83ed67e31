//! Bidirectional key/id index.
//!
//! `forward` maps keys to ids; `reverse` is indexed by id directly (slot 0 is
//! never used) and holds `None` for ids that were never seen. Both sides share
//! one `Arc<str>` per key. `reverse` only ever grows, in fixed-size blocks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::ports::ItemId;

#[derive(Debug, Default)]
pub(crate) struct InternIndex {
    forward: HashMap<Arc<str>, ItemId>,
    reverse: Vec<Option<Arc<str>>>,
    block: usize,
}

impl InternIndex {
    #[cfg(test)]
    pub(crate) fn new(block: usize) -> Self {
        Self {
            forward: HashMap::new(),
            reverse: Vec::new(),
            block: block.max(1),
        }
    }

    /// Adopt the two halves built by the bulk loader.
    pub(crate) fn from_parts(
        forward: HashMap<Arc<str>, ItemId>,
        reverse: Vec<Option<Arc<str>>>,
        block: usize,
    ) -> Self {
        Self {
            forward,
            reverse,
            block: block.max(1),
        }
    }

    pub(crate) fn id_of(&self, key: &str) -> Option<ItemId> {
        self.forward.get(key).copied()
    }

    pub(crate) fn item_of(&self, id: ItemId) -> Option<&Arc<str>> {
        if id == 0 {
            return None;
        }
        self.reverse.get(id as usize)?.as_ref()
    }

    /// Record a store-assigned `(key, id)` pair.
    pub(crate) fn record(&mut self, key: Arc<str>, id: ItemId) {
        let slot = id as usize;
        if slot >= self.reverse.len() {
            let blocks = (slot + 1 - self.reverse.len()).div_ceil(self.block);
            let new_len = self.reverse.len() + blocks * self.block;
            self.reverse.resize(new_len, None);
        }
        self.reverse[slot] = Some(Arc::clone(&key));
        self.forward.insert(key, id);
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.forward.keys().map(|k| k.to_string()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.forward.len()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.reverse.len()
    }
}
