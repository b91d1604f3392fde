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

use std::{convert::Infallible, fmt::Debug, hash::Hash};

use equivalent::Equivalent;
use slotcache_common::{
    code::{DefaultHasher, HashBuilder, Key, Value},
    error::{Error, Result},
};

use crate::{builder::CacheBuilder, raw::RawCache};

/// The contract shared by every synchronous cache flavor.
///
/// Both compound operations run under the cache lock for their whole duration, factories included. A factory must not
/// call back into the same cache, or it will deadlock.
pub trait SimpleCache<K, V>: Send + Sync + 'static {
    /// Return the cached value for `key`, or compute it with `factory` and cache it.
    ///
    /// The factory is called at most once, and only if the key is absent. A factory error is returned as is and
    /// leaves the cache untouched.
    fn try_get_or_add<F, ER>(&self, key: K, factory: F) -> std::result::Result<V, ER>
    where
        F: FnOnce(&K) -> std::result::Result<V, ER>;

    /// Compute a value for `key` with `add` if absent, or with `update` from the cached value if present.
    ///
    /// Exactly one of the two factories is called. A factory error is returned as is and leaves the cache untouched.
    fn try_add_or_update<FA, FU, ER>(&self, key: K, add: FA, update: FU) -> std::result::Result<V, ER>
    where
        FA: FnOnce(&K) -> std::result::Result<V, ER>,
        FU: FnOnce(&K, V) -> std::result::Result<V, ER>;

    /// Insert or overwrite `key` unconditionally.
    fn insert(&self, key: K, value: V);

    /// Return the cached value for `key` without promoting it.
    fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized;

    /// Returns `true` if `key` is cached.
    fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized;

    /// Count of cached entries.
    fn len(&self) -> usize;

    /// Maximum count of cached entries.
    fn capacity(&self) -> usize;

    /// Returns `true` if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Infallible form of [`SimpleCache::try_get_or_add`].
    fn get_or_add<F>(&self, key: K, factory: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        match self.try_get_or_add(key, |k| Ok::<_, Infallible>(factory(k))) {
            Ok(value) => value,
            Err(e) => match e {},
        }
    }

    /// Infallible form of [`SimpleCache::try_add_or_update`].
    fn add_or_update<FA, FU>(&self, key: K, add: FA, update: FU) -> V
    where
        FA: FnOnce(&K) -> V,
        FU: FnOnce(&K, V) -> V,
    {
        match self.try_add_or_update(key, |k| Ok::<_, Infallible>(add(k)), |k, v| Ok(update(k, v))) {
            Ok(value) => value,
            Err(e) => match e {},
        }
    }
}

/// Fixed-capacity LRU cache.
///
/// # Examples
///
/// ```
/// use slotcache_memory::{Cache, SimpleCache};
///
/// let cache: Cache<&str, u64> = Cache::new(2).unwrap();
/// assert_eq!(cache.get_or_add("a", |_| 1), 1);
/// assert_eq!(cache.get_or_add("a", |_| 2), 1);
/// assert_eq!(cache.add_or_update("a", |_| 0, |_, v| v + 1), 2);
/// ```
pub struct Cache<K, V, S = DefaultHasher> {
    raw: RawCache<K, V, S>,
}

impl<K, V, S> Clone for Cache<K, V, S> {
    fn clone(&self) -> Self {
        Self { raw: self.raw.clone() }
    }
}

impl<K, V, S> Debug for Cache<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("raw", &self.raw).finish()
    }
}

impl<K, V> Cache<K, V, DefaultHasher>
where
    K: Key,
    V: Value,
{
    /// Create a cache holding at most `capacity` entries.
    ///
    /// Fails with [`slotcache_common::error::ErrorKind::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        CacheBuilder::new(capacity).build()
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    pub(crate) fn from_raw(raw: RawCache<K, V, S>) -> Self {
        Self { raw }
    }

    /// Return the cached value for `key` and promote it.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.raw.hash(key);
        let mut shard = self.raw.lock();
        let index = shard.find(hash, key)?;
        shard.touch(index);
        Some(shard.value(index).clone())
    }

    /// Like [`Cache::get`], but fails with [`slotcache_common::error::ErrorKind::KeyNotFound`] on a miss.
    pub fn try_get<Q>(&self, key: &Q) -> Result<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.get(key).ok_or_else(Error::key_not_found)
    }

    /// Name of the cache.
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Snapshot of the cached keys, from the most to the least recently used.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.raw.lock().iter().map(|(k, _)| k.clone()).collect()
    }
}

impl<K, V, S> SimpleCache<K, V> for Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn try_get_or_add<F, ER>(&self, key: K, factory: F) -> std::result::Result<V, ER>
    where
        F: FnOnce(&K) -> std::result::Result<V, ER>,
    {
        let hash = self.raw.hash(&key);
        let mut shard = self.raw.lock();

        if let Some(index) = shard.find(hash, &key) {
            tracing::trace!("[lru]: hit, hash: {hash}");
            shard.touch(index);
            return Ok(shard.value(index).clone());
        }

        tracing::trace!("[lru]: miss, hash: {hash}");
        let value = factory(&key)?;
        let evicted = shard.insert(hash, key, value.clone());
        drop(shard);

        // Do not deallocate data within the lock section.
        drop(evicted);
        Ok(value)
    }

    fn try_add_or_update<FA, FU, ER>(&self, key: K, add: FA, update: FU) -> std::result::Result<V, ER>
    where
        FA: FnOnce(&K) -> std::result::Result<V, ER>,
        FU: FnOnce(&K, V) -> std::result::Result<V, ER>,
    {
        let hash = self.raw.hash(&key);
        let mut shard = self.raw.lock();

        let value;
        let mut replaced = None;
        let mut evicted = None;
        match shard.find(hash, &key) {
            Some(index) => {
                tracing::trace!("[lru]: update, hash: {hash}");
                value = update(&key, shard.value(index).clone())?;
                replaced = Some(shard.replace(index, value.clone()));
            }
            None => {
                tracing::trace!("[lru]: add, hash: {hash}");
                value = add(&key)?;
                evicted = shard.insert(hash, key, value.clone());
            }
        }
        drop(shard);

        // Do not deallocate data within the lock section.
        drop((replaced, evicted));
        Ok(value)
    }

    fn insert(&self, key: K, value: V) {
        let hash = self.raw.hash(&key);
        let garbage = self.raw.lock().upsert(hash, key, value);
        drop(garbage);
    }

    fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.raw.hash(key);
        let shard = self.raw.lock();
        shard.find(hash, key).map(|index| shard.value(index).clone())
    }

    fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.raw.hash(key);
        self.raw.lock().find(hash, key).is_some()
    }

    fn len(&self) -> usize {
        self.raw.lock().len()
    }

    fn capacity(&self) -> usize {
        self.raw.capacity()
    }
}
