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
    time::{Duration, Instant},
};

use equivalent::Equivalent;
use slotcache_common::{
    code::{HashBuilder, Key, Value},
    error::{Error, Result},
};

use crate::{cache::SimpleCache, raw::RawCache};

/// Source of the current instant for expiring caches.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
struct Timed<V> {
    value: V,
    /// `None` if the deadline overflows [`Instant`], which means never.
    expire_at: Option<Instant>,
}

impl<V> Timed<V> {
    fn new(value: V, now: Instant, lifetime: Duration) -> Self {
        Self {
            value,
            expire_at: now.checked_add(lifetime),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        // Expired at the deadline itself, for lookups and writes alike.
        self.expire_at.is_some_and(|expire_at| now >= expire_at)
    }
}

/// Fixed-capacity LRU cache whose entries also expire a fixed `lifetime` after they were last written.
///
/// Expired entries are treated as absent by every lookup, but are not purged proactively: they keep their slot until
/// they are overwritten or evicted by recency, and they are counted by `len`.
pub struct ExpiringCache<K, V, S> {
    raw: RawCache<K, Timed<V>, S>,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V, S> Clone for ExpiringCache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            lifetime: self.lifetime,
            clock: self.clock.clone(),
        }
    }
}

impl<K, V, S> Debug for ExpiringCache<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("raw", &self.raw)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl<K, V, S> ExpiringCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    pub(crate) fn new(
        capacity: usize,
        name: String,
        hash_builder: S,
        lifetime: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let raw = RawCache::new(capacity, name, hash_builder)?;
        Ok(Self { raw, lifetime, clock })
    }

    /// Return the cached value for `key` and promote it, unless it has expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.raw.hash(key);
        let now = self.clock.now();
        let mut shard = self.raw.lock();

        let index = shard.find(hash, key)?;
        let entry = shard.value(index);
        if entry.is_expired(now) {
            return None;
        }
        let value = entry.value.clone();
        shard.touch(index);
        Some(value)
    }

    /// Like [`ExpiringCache::get`], but fails with [`slotcache_common::error::ErrorKind::KeyNotFound`] on a miss.
    pub fn try_get<Q>(&self, key: &Q) -> Result<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.get(key).ok_or_else(Error::key_not_found)
    }

    /// Time an entry stays fresh after a write.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Name of the cache.
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Snapshot of the cached keys, expired ones included, from the most to the least recently used.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.raw.lock().iter().map(|(k, _)| k.clone()).collect()
    }
}

impl<K, V, S> SimpleCache<K, V> for ExpiringCache<K, V, S>
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
        let now = self.clock.now();
        let mut shard = self.raw.lock();

        let value;
        let mut replaced = None;
        let mut evicted = None;
        match shard.find(hash, &key) {
            Some(index) => {
                if !shard.value(index).is_expired(now) {
                    tracing::trace!("[lru]: hit, hash: {hash}");
                    shard.touch(index);
                    return Ok(shard.value(index).value.clone());
                }
                tracing::trace!("[lru]: expired, hash: {hash}");
                value = factory(&key)?;
                replaced = Some(shard.replace(index, Timed::new(value.clone(), now, self.lifetime)));
            }
            None => {
                tracing::trace!("[lru]: miss, hash: {hash}");
                value = factory(&key)?;
                evicted = shard.insert(hash, key, Timed::new(value.clone(), now, self.lifetime));
            }
        }
        drop(shard);

        // Do not deallocate data within the lock section.
        drop((replaced, evicted));
        Ok(value)
    }

    fn try_add_or_update<FA, FU, ER>(&self, key: K, add: FA, update: FU) -> std::result::Result<V, ER>
    where
        FA: FnOnce(&K) -> std::result::Result<V, ER>,
        FU: FnOnce(&K, V) -> std::result::Result<V, ER>,
    {
        let hash = self.raw.hash(&key);
        let now = self.clock.now();
        let mut shard = self.raw.lock();

        let value;
        let mut replaced = None;
        let mut evicted = None;
        match shard.find(hash, &key) {
            Some(index) => {
                let entry = shard.value(index);
                value = if entry.is_expired(now) {
                    tracing::trace!("[lru]: expired, hash: {hash}");
                    add(&key)?
                } else {
                    tracing::trace!("[lru]: update, hash: {hash}");
                    let previous = entry.value.clone();
                    update(&key, previous)?
                };
                replaced = Some(shard.replace(index, Timed::new(value.clone(), now, self.lifetime)));
            }
            None => {
                tracing::trace!("[lru]: add, hash: {hash}");
                value = add(&key)?;
                evicted = shard.insert(hash, key, Timed::new(value.clone(), now, self.lifetime));
            }
        }
        drop(shard);

        drop((replaced, evicted));
        Ok(value)
    }

    fn insert(&self, key: K, value: V) {
        let hash = self.raw.hash(&key);
        let now = self.clock.now();
        let garbage = self.raw.lock().upsert(hash, key, Timed::new(value, now, self.lifetime));
        drop(garbage);
    }

    fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.raw.hash(key);
        let now = self.clock.now();
        let shard = self.raw.lock();

        let entry = shard.value(shard.find(hash, key)?);
        (!entry.is_expired(now)).then(|| entry.value.clone())
    }

    fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.raw.hash(key);
        let now = self.clock.now();
        let shard = self.raw.lock();

        shard
            .find(hash, key)
            .is_some_and(|index| !shard.value(index).is_expired(now))
    }

    fn len(&self) -> usize {
        self.raw.lock().len()
    }

    fn capacity(&self) -> usize {
        self.raw.capacity()
    }
}
