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

use std::{marker::PhantomData, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use slotcache_common::{
    code::{DefaultHasher, HashBuilder, Key, Value},
    error::{Error, ErrorKind, Result},
    spawn::Spawner,
};

use crate::{
    cache::{Cache, SimpleCache},
    expiring::{Clock, ExpiringCache, SystemClock},
    raw::RawCache,
    single_flight::{AsyncCache, InflightHandle},
};

fn default_name() -> String {
    "slotcache".to_string()
}

/// Serializable cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Name of the cache, used in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Maximum count of cached entries. Must be at least 1.
    pub capacity: usize,
    /// Time an entry stays fresh after a write. Only used by expiring caches.
    #[serde(default)]
    pub lifetime: Option<Duration>,
}

impl CacheConfig {
    /// Configuration with the default name and no lifetime.
    pub fn new(capacity: usize) -> Self {
        Self {
            name: default_name(),
            capacity,
            lifetime: None,
        }
    }
}

/// Builder for every cache flavor.
///
/// ```
/// use std::time::Duration;
///
/// use slotcache_memory::{CacheBuilder, SimpleCache};
///
/// let cache = CacheBuilder::<u64, String>::new(128)
///     .with_name("users")
///     .with_lifetime(Duration::from_secs(60))
///     .build_expiring()
///     .unwrap();
/// assert_eq!(cache.get_or_add(1, |id| format!("user-{id}")), "user-1");
/// ```
pub struct CacheBuilder<K, V, S = DefaultHasher> {
    config: CacheConfig,
    hash_builder: S,
    clock: Arc<dyn Clock>,
    spawner: Option<Spawner>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> CacheBuilder<K, V, DefaultHasher>
where
    K: Key,
    V: Value,
{
    /// Start building a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self::from_config(CacheConfig::new(capacity))
    }

    /// Start building a cache from a loaded configuration.
    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            hash_builder: DefaultHasher::default(),
            clock: Arc::new(SystemClock),
            spawner: None,
            _marker: PhantomData,
        }
    }
}

impl<K, V, S> CacheBuilder<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Set the cache name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the key hash builder.
    pub fn with_hash_builder<OS>(self, hash_builder: OS) -> CacheBuilder<K, V, OS>
    where
        OS: HashBuilder,
    {
        CacheBuilder {
            config: self.config,
            hash_builder,
            clock: self.clock,
            spawner: self.spawner,
            _marker: PhantomData,
        }
    }

    /// Set the entry lifetime. Required by expiring caches, ignored by the others.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.lifetime = Some(lifetime);
        self
    }

    /// Set the clock of expiring caches.
    ///
    /// The default clock is [`SystemClock`].
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Set where single-flight caches spawn their computations.
    ///
    /// By default they spawn on the runtime of the calling context.
    pub fn with_spawner(mut self, spawner: impl Into<Spawner>) -> Self {
        self.spawner = Some(spawner.into());
        self
    }

    /// The configuration collected so far.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Build an LRU cache.
    pub fn build(self) -> Result<Cache<K, V, S>> {
        let raw = RawCache::new(self.config.capacity, self.config.name, self.hash_builder)?;
        Ok(Cache::from_raw(raw))
    }

    /// Build an LRU cache whose entries expire.
    ///
    /// Fails with [`ErrorKind::Config`] if no lifetime was set.
    pub fn build_expiring(self) -> Result<ExpiringCache<K, V, S>> {
        let lifetime = self.config.lifetime.ok_or_else(|| {
            Error::new(ErrorKind::Config, "lifetime is required by an expiring cache")
                .with_context("name", &self.config.name)
        })?;
        ExpiringCache::new(
            self.config.capacity,
            self.config.name,
            self.hash_builder,
            lifetime,
            self.clock,
        )
    }

    /// Build a single-flight cache over an LRU cache.
    pub fn build_async(self) -> Result<AsyncCache<K, V, Cache<K, InflightHandle<V>, S>>> {
        let raw = RawCache::new(self.config.capacity, self.config.name, self.hash_builder)?;
        Ok(Self::with_optional_spawner(
            AsyncCache::from_inner(Cache::from_raw(raw)),
            self.spawner,
        ))
    }

    /// Build a single-flight cache over an expiring LRU cache.
    ///
    /// Fails with [`ErrorKind::Config`] if no lifetime was set.
    pub fn build_expiring_async(self) -> Result<AsyncCache<K, V, ExpiringCache<K, InflightHandle<V>, S>>> {
        let CacheBuilder {
            config,
            hash_builder,
            clock,
            spawner,
            ..
        } = self;
        let inner = CacheBuilder::<K, InflightHandle<V>, S> {
            config,
            hash_builder,
            clock,
            spawner: None,
            _marker: PhantomData,
        }
        .build_expiring()?;
        Ok(Self::with_optional_spawner(AsyncCache::from_inner(inner), spawner))
    }

    fn with_optional_spawner<C>(cache: AsyncCache<K, V, C>, spawner: Option<Spawner>) -> AsyncCache<K, V, C>
    where
        C: SimpleCache<K, InflightHandle<V>>,
    {
        match spawner {
            Some(spawner) => cache.with_spawner(spawner),
            None => cache,
        }
    }
}
