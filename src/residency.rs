//! Recency-ordered record set
//!
//! Every record carries a monotonic sequence number taken when it was last
//! touched. The lookup index maps keys to records, the order map sequence
//! numbers to keys; together they give O(log n) touch and LRU-first
//! iteration without ties.

use crate::texture::ResourceKey;
use ahash::AHashMap;
use std::collections::BTreeMap;

struct Slot<V> {
    seq: u64,
    value: V,
}

pub struct Residency<V> {
    index: AHashMap<ResourceKey, Slot<V>>,
    order: BTreeMap<u64, ResourceKey>,
    next_seq: u64,
}

impl<V> Residency<V> {
    pub fn new() -> Self {
        Self {
            index: AHashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Insert as most recently used. Returns false (and leaves the existing
    /// record untouched) if the key is already present.
    pub fn insert(&mut self, key: ResourceKey, value: V) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        let seq = self.take_seq();
        self.order.insert(seq, key);
        self.index.insert(key, Slot { seq, value });
        true
    }

    /// Mark as most recently used
    pub fn touch(&mut self, key: ResourceKey) -> Option<&mut V> {
        let seq = self.take_seq();
        let slot = self.index.get_mut(&key)?;
        self.order.remove(&slot.seq);
        self.order.insert(seq, key);
        slot.seq = seq;
        Some(&mut slot.value)
    }

    pub fn remove(&mut self, key: ResourceKey) -> Option<V> {
        let slot = self.index.remove(&key)?;
        self.order.remove(&slot.seq);
        Some(slot.value)
    }

    pub fn get(&self, key: ResourceKey) -> Option<&V> {
        self.index.get(&key).map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, key: ResourceKey) -> Option<&mut V> {
        self.index.get_mut(&key).map(|slot| &mut slot.value)
    }

    pub fn contains(&self, key: ResourceKey) -> bool {
        self.index.contains_key(&key)
    }

    /// Records from least to most recently used
    pub fn iter_lru(&self) -> impl Iterator<Item = (ResourceKey, &V)> + '_ {
        self.order.values().filter_map(move |key| {
            self.index.get(key).map(|slot| (*key, &slot.value))
        })
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.index.values().map(|slot| &slot.value)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Index and order hold the same keys, each exactly once
    pub fn is_consistent(&self) -> bool {
        self.index.len() == self.order.len()
            && self.order.iter().all(|(seq, key)| {
                self.index
                    .get(key)
                    .is_some_and(|slot| slot.seq == *seq)
            })
    }
}

impl<V> Default for Residency<V> {
    fn default() -> Self {
        Self::new()
    }
}
