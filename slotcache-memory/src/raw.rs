// Copyright 2026 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use equivalent::Equivalent;
use parking_lot::{Mutex, MutexGuard};
use slotcache_common::{
    code::{HashBuilder, Key},
    error::Result,
    strict_assert, strict_assert_eq,
};

use crate::{
    arena::SlotIndex,
    indexer::HashTableIndexer,
    recency::{Evicted, RecencyList},
};

/// Arena, recency list and index of one cache, always mutated together.
#[derive(Debug)]
pub struct RawCacheShard<K, V> {
    list: RecencyList<K, V>,
    indexer: HashTableIndexer,
}

impl<K, V> RawCacheShard<K, V>
where
    K: Key,
{
    fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            list: RecencyList::new(capacity)?,
            indexer: HashTableIndexer::with_capacity(capacity),
        })
    }

    /// Find the slot holding `key` without touching recency.
    pub fn find<Q>(&self, hash: u64, key: &Q) -> Option<SlotIndex>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.indexer.get(hash, key, self.list.arena())
    }

    /// Promote a slot to most recently used.
    pub fn touch(&mut self, index: SlotIndex) {
        self.list.move_to_head(index);
    }

    /// Value stored in a live slot.
    pub fn value(&self, index: SlotIndex) -> &V {
        self.list.value(index)
    }

    /// Overwrite the value of a live slot and promote it. Returns the previous value.
    pub fn replace(&mut self, index: SlotIndex, value: V) -> V {
        let old = self.list.set_value(index, value);
        self.list.move_to_head(index);
        old
    }

    /// Insert a key that is known to be absent.
    ///
    /// Returns the evicted entry, if any. The caller should drop it after releasing the lock.
    pub fn insert(&mut self, hash: u64, key: K, value: V) -> Option<Evicted<K, V>> {
        strict_assert!(self.find(hash, &key).is_none());

        let (index, evicted) = self.list.push_front(hash, key, value);
        if let Some(evicted) = evicted.as_ref() {
            let removed = self.indexer.remove(evicted.hash, index);
            strict_assert!(removed);
            tracing::trace!("[lru]: evict slot {index} with hash {hash}", hash = evicted.hash);
        }
        self.indexer.insert(hash, index, self.list.arena());

        strict_assert_eq!(self.indexer.len(), self.list.len());

        evicted
    }

    /// Insert or overwrite `key`, promoting it either way.
    ///
    /// Returns whatever value left the cache: the overwritten one or the evicted one.
    pub fn upsert(&mut self, hash: u64, key: K, value: V) -> Option<V> {
        match self.find(hash, &key) {
            Some(index) => Some(self.replace(index, value)),
            None => self.insert(hash, key, value).map(|evicted| evicted.value),
        }
    }

    /// Count of live entries.
    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    /// Iterate over live entries from the most to the least recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.list.iter().map(|(_, k, v)| (k, v))
    }

    #[cfg(test)]
    pub(crate) fn check(&self) {
        self.list.check();
        assert_eq!(self.indexer.len(), self.list.len());
        for (index, key, _) in self.list.iter() {
            let hash = self.list.arena().hash(index);
            assert_eq!(self.find(hash, key), Some(index));
        }
    }
}

struct RawCacheInner<K, V, S> {
    shard: Mutex<RawCacheShard<K, V>>,
    capacity: usize,
    hash_builder: S,
    name: String,
}

/// The locked core shared by every cache flavor.
///
/// A single mutex guards the shard for the whole duration of a compound operation. Clones share the same state.
pub struct RawCache<K, V, S> {
    inner: Arc<RawCacheInner<K, V, S>>,
}

impl<K, V, S> Clone for RawCache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, S> Debug for RawCache<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCache")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl<K, V, S> RawCache<K, V, S>
where
    K: Key,
    S: HashBuilder,
{
    /// Allocate the arena and index for `capacity` entries.
    pub fn new(capacity: usize, name: impl Into<String>, hash_builder: S) -> Result<Self> {
        let name = name.into();
        let shard = RawCacheShard::new(capacity)?;

        tracing::debug!("[lru]: create cache {name} with capacity {capacity}");

        let inner = RawCacheInner {
            shard: Mutex::new(shard),
            capacity,
            hash_builder,
            name,
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Hash a key with the injected hash builder.
    pub fn hash<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        self.inner.hash_builder.hash_one(key)
    }

    /// Acquire the cache lock.
    pub fn lock(&self) -> MutexGuard<'_, RawCacheShard<K, V>> {
        self.inner.shard.lock()
    }

    /// Maximum count of live entries.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Name of the cache, used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use slotcache_common::code::DefaultHasher;

    use super::*;

    fn keys(shard: &RawCacheShard<u64, u64>) -> Vec<u64> {
        shard.iter().map(|(k, _)| *k).collect_vec()
    }

    #[test_log::test]
    fn test_raw_cache_insert_and_evict() {
        let raw = RawCache::<u64, u64, DefaultHasher>::new(3, "test", DefaultHasher::default()).unwrap();
        let mut shard = raw.lock();

        for i in 1..=3 {
            let hash = raw.hash(&i);
            assert!(shard.insert(hash, i, i * 10).is_none());
        }
        assert_eq!(keys(&shard), vec![3, 2, 1]);

        let hash = raw.hash(&4);
        let evicted = shard.insert(hash, 4, 40).unwrap();
        assert_eq!((evicted.key, evicted.value), (1, 10));
        assert_eq!(shard.find(raw.hash(&1), &1), None);
        assert_eq!(keys(&shard), vec![4, 3, 2]);
        shard.check();
    }

    #[test]
    fn test_raw_cache_upsert() {
        let raw = RawCache::<u64, u64, DefaultHasher>::new(2, "test", DefaultHasher::default()).unwrap();
        let mut shard = raw.lock();

        assert_eq!(shard.upsert(raw.hash(&1), 1, 1), None);
        assert_eq!(shard.upsert(raw.hash(&2), 2, 2), None);
        // overwrite promotes
        assert_eq!(shard.upsert(raw.hash(&1), 1, 11), Some(1));
        assert_eq!(keys(&shard), vec![1, 2]);
        // evicts 2
        assert_eq!(shard.upsert(raw.hash(&3), 3, 3), Some(2));
        assert_eq!(keys(&shard), vec![3, 1]);
        shard.check();
    }

    #[test]
    fn test_raw_cache_zero_capacity() {
        let res = RawCache::<u64, u64, DefaultHasher>::new(0, "test", DefaultHasher::default());
        assert!(res.is_err());
    }

    #[test]
    fn test_raw_cache_fuzzy() {
        const CAPACITY: usize = 32;
        const OPS: usize = 20_000;

        let raw = RawCache::<u64, u64, DefaultHasher>::new(CAPACITY, "fuzzy", DefaultHasher::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1024);
        let mut shard = raw.lock();

        for _ in 0..OPS {
            let key = rng.random_range(0..128u64);
            let hash = raw.hash(&key);
            match shard.find(hash, &key) {
                Some(index) => {
                    if rng.random_bool(0.5) {
                        shard.touch(index);
                    } else {
                        shard.replace(index, key + 1);
                    }
                    assert_eq!(shard.iter().next().map(|(k, _)| *k), Some(key));
                }
                None => {
                    let full = shard.len() == CAPACITY;
                    let evicted = shard.insert(hash, key, key);
                    assert_eq!(evicted.is_some(), full);
                }
            }
            assert!(shard.len() <= CAPACITY);
        }
        shard.check();
    }
}
