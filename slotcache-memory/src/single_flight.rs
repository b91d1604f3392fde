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

use std::{fmt::Debug, future::Future, hash::Hash, marker::PhantomData};

use equivalent::Equivalent;
use futures_util::{
    future::{ready, BoxFuture, Shared},
    FutureExt,
};
use slotcache_common::{
    code::{Key, Value},
    error::{Error, Result},
    spawn::Spawner,
};

use crate::cache::{Cache, SimpleCache};

/// A shared computation stored in an [`AsyncCache`].
///
/// Every clone resolves to the same result. Pending computations run as tasks of their own, so they make progress
/// whether or not anybody awaits them, and neither dropping a holder nor evicting the handle cancels them.
pub type InflightHandle<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Single-flight wrapper over a [`SimpleCache`] of [`InflightHandle`]s.
///
/// Asynchronous factories are only started under the inner cache lock: their future is spawned and its handle stored
/// before the lock is released, and awaited by the caller afterwards. Concurrent callers for the same key therefore
/// share one computation.
///
/// Updates are chained: the task stored by [`AsyncCache::add_or_update`] awaits the handle it replaces before running
/// the update. Each link of a chain is its own task, so awaiting the newest handle only waits on that task.
///
/// Computations are spawned on the spawner set with [`AsyncCache::with_spawner`], or else on the runtime of the
/// calling context. Outside of any tokio runtime they are not spawned and run inside whoever awaits them.
pub struct AsyncCache<K, V, C = Cache<K, InflightHandle<V>>> {
    inner: C,
    spawner: Option<Spawner>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C> Clone for AsyncCache<K, V, C>
where
    C: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            spawner: self.spawner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V, C> Debug for AsyncCache<K, V, C>
where
    C: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCache")
            .field("inner", &self.inner)
            .field("spawner", &self.spawner)
            .finish()
    }
}

impl<K, V> AsyncCache<K, V>
where
    K: Key,
    V: Value,
{
    /// Create a single-flight LRU cache holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self::from_inner(Cache::new(capacity)?))
    }
}

impl<K, V, C> AsyncCache<K, V, C>
where
    K: Key,
    V: Value,
    C: SimpleCache<K, InflightHandle<V>>,
{
    /// Wrap an existing cache of handles.
    pub fn from_inner(inner: C) -> Self {
        Self {
            inner,
            spawner: None,
            _marker: PhantomData,
        }
    }

    /// Spawn computations on `spawner` instead of the runtime of the calling context.
    pub fn with_spawner(mut self, spawner: impl Into<Spawner>) -> Self {
        self.spawner = Some(spawner.into());
        self
    }

    /// The wrapped cache.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Return the handle cached for `key`, or start `factory` and cache its handle.
    ///
    /// The factory runs at most once per stored handle, no matter how many callers race for the key.
    pub fn get_or_add<F, FU, ER>(&self, key: K, factory: F) -> InflightHandle<V>
    where
        F: FnOnce(&K) -> FU,
        FU: Future<Output = std::result::Result<V, ER>> + Send + 'static,
        ER: Into<anyhow::Error>,
    {
        self.inner.get_or_add(key, |key| {
            tracing::trace!("[single flight]: start loading");
            self.spawn(factory(key).map(|res| res.map_err(Error::factory)))
        })
    }

    /// Like [`AsyncCache::get_or_add`], but with a synchronous factory run under the inner cache lock.
    pub fn get_or_add_sync<F, ER>(&self, key: K, factory: F) -> InflightHandle<V>
    where
        F: FnOnce(&K) -> std::result::Result<V, ER>,
        ER: Into<anyhow::Error>,
    {
        self.inner
            .get_or_add(key, |key| ready(factory(key).map_err(Error::factory)).boxed().shared())
    }

    /// Start `add` if `key` is absent. Otherwise chain `update` after the currently stored handle.
    ///
    /// The new handle is stored immediately, so a racing caller chains after it even before it resolves. A failure of
    /// the previous handle is propagated without calling `update`.
    pub fn add_or_update<FA, FUA, FU, FUU, ER>(&self, key: K, add: FA, update: FU) -> InflightHandle<V>
    where
        K: Clone,
        FA: FnOnce(&K) -> FUA,
        FUA: Future<Output = std::result::Result<V, ER>> + Send + 'static,
        FU: FnOnce(&K, V) -> FUU + Send + 'static,
        FUU: Future<Output = std::result::Result<V, ER>> + Send + 'static,
        ER: Into<anyhow::Error>,
    {
        self.inner.add_or_update(
            key,
            |key| {
                tracing::trace!("[single flight]: start adding");
                self.spawn(add(key).map(|res| res.map_err(Error::factory)))
            },
            |key, previous| {
                tracing::trace!("[single flight]: chain update");
                let key = key.clone();
                self.spawn(async move {
                    let value = previous.await?;
                    update(&key, value).await.map_err(Error::factory)
                })
            },
        )
    }

    /// Like [`AsyncCache::add_or_update`], but with synchronous factories.
    ///
    /// `add` runs under the inner cache lock. `update` runs once the previous handle has resolved.
    pub fn add_or_update_sync<FA, FU, ER>(&self, key: K, add: FA, update: FU) -> InflightHandle<V>
    where
        K: Clone,
        FA: FnOnce(&K) -> std::result::Result<V, ER>,
        FU: FnOnce(&K, V) -> std::result::Result<V, ER> + Send + 'static,
        ER: Into<anyhow::Error>,
    {
        self.inner.add_or_update(
            key,
            |key| ready(add(key).map_err(Error::factory)).boxed().shared(),
            |key, previous| {
                tracing::trace!("[single flight]: chain update");
                let key = key.clone();
                self.spawn(async move {
                    let value = previous.await?;
                    update(&key, value).map_err(Error::factory)
                })
            },
        )
    }

    /// Store a new computation for `key` unconditionally, replacing whatever handle was there.
    ///
    /// This is the way to retry a key whose stored handle has failed.
    pub fn insert<FU, ER>(&self, key: K, future: FU) -> InflightHandle<V>
    where
        FU: Future<Output = std::result::Result<V, ER>> + Send + 'static,
        ER: Into<anyhow::Error>,
    {
        let handle = self.spawn(future.map(|res| res.map_err(Error::factory)));
        self.inner.insert(key, handle.clone());
        handle
    }

    /// Return the handle stored for `key` without promoting it.
    pub fn peek<Q>(&self, key: &Q) -> Option<InflightHandle<V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.inner.peek(key)
    }

    /// Returns `true` if a handle is stored for `key`, whatever its state.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.inner.contains(key)
    }

    /// Count of stored handles.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no handle is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Maximum count of stored handles.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn spawn<FU>(&self, future: FU) -> InflightHandle<V>
    where
        FU: Future<Output = Result<V>> + Send + 'static,
    {
        match self.spawner.clone().or_else(Spawner::try_current) {
            Some(spawner) => {
                let handle = spawner.spawn(future);
                async move { handle.await? }.boxed().shared()
            }
            None => future.boxed().shared(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use futures_util::future::join_all;
    use itertools::Itertools;
    use slotcache_common::error::ErrorKind;

    use super::*;
    use crate::{builder::CacheBuilder, expiring::ExpiringCache, test_utils::ManualClock};

    const RUNS: usize = 1000;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct TestError;

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error")
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_or_add_loads_once() {
        let cache = AsyncCache::<u64, usize>::new(10).unwrap();
        let loads = Arc::new(AtomicUsize::new(0));

        let handles = (0..RUNS)
            .map(|_| {
                let loads = loads.clone();
                cache.get_or_add(0, move |_| async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, TestError>(loads.fetch_add(1, Ordering::Relaxed) + 1)
                })
            })
            .collect_vec();

        let results = join_all(handles).await;
        assert_eq!(loads.load(Ordering::Relaxed), 1);
        assert!(results.into_iter().all(|res| res.unwrap() == 1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_or_add_sync_loads_once() {
        let cache = AsyncCache::<u64, usize>::new(10).unwrap();
        let loads = Arc::new(AtomicUsize::new(0));

        let tasks = (0..RUNS)
            .map(|_| {
                let cache = cache.clone();
                let loads = loads.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    cache
                        .get_or_add_sync(0, |_| Ok::<_, TestError>(loads.fetch_add(1, Ordering::Relaxed) + 1))
                        .await
                })
            })
            .collect_vec();

        for res in join_all(tasks).await {
            assert_eq!(res.unwrap().unwrap(), 1);
        }
        assert_eq!(loads.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_add_or_update_chains_updates() {
        let cache = AsyncCache::<u64, usize>::new(10).unwrap();
        let adds = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));

        let handles = (0..RUNS)
            .map(|_| {
                let adds = adds.clone();
                let updates = updates.clone();
                cache.add_or_update(
                    0,
                    move |_| async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        adds.fetch_add(1, Ordering::Relaxed);
                        Ok::<_, TestError>(0)
                    },
                    move |_, previous| async move {
                        updates.fetch_add(1, Ordering::Relaxed);
                        Ok(previous + 1)
                    },
                )
            })
            .collect_vec();

        let results = join_all(handles).await.into_iter().map(|res| res.unwrap()).collect_vec();
        assert_eq!(adds.load(Ordering::Relaxed), 1);
        assert_eq!(updates.load(Ordering::Relaxed), RUNS - 1);
        assert_eq!(results, (0..RUNS).collect_vec());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_await_newest_of_long_chain() {
        const LEN: usize = 10_000;

        let cache = AsyncCache::<u64, usize>::new(10).unwrap();

        let mut last = None;
        for _ in 0..LEN {
            last = Some(cache.add_or_update(
                0,
                |_| async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, TestError>(0)
                },
                |_, v| async move { Ok(v + 1) },
            ));
        }

        // Only the newest handle is awaited, from a task with a default sized stack.
        let last = last.unwrap();
        assert_eq!(tokio::spawn(last).await.unwrap().unwrap(), LEN - 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_add_or_update_sync_concurrent() {
        let cache = AsyncCache::<u64, usize>::new(10).unwrap();
        let adds = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));

        let tasks = (0..RUNS)
            .map(|_| {
                let cache = cache.clone();
                let adds = adds.clone();
                let updates = updates.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    cache
                        .add_or_update_sync(
                            0,
                            |_| {
                                adds.fetch_add(1, Ordering::Relaxed);
                                Ok::<_, TestError>(0)
                            },
                            move |_, previous| {
                                updates.fetch_add(1, Ordering::Relaxed);
                                Ok(previous + 1)
                            },
                        )
                        .await
                })
            })
            .collect_vec();

        let mut results = join_all(tasks)
            .await
            .into_iter()
            .map(|res| res.unwrap().unwrap())
            .collect_vec();
        results.sort_unstable();

        assert_eq!(adds.load(Ordering::Relaxed), 1);
        assert_eq!(updates.load(Ordering::Relaxed), RUNS - 1);
        assert_eq!(results, (0..RUNS).collect_vec());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_add_or_update_sync() {
        let cache = AsyncCache::<u64, usize>::new(10).unwrap();

        let first = cache.add_or_update_sync(0, |_| Ok::<_, TestError>(1), |_, v| Ok(v * 10));
        let second = cache.add_or_update_sync(0, |_| unreachable!(), |_, v| Ok::<_, TestError>(v * 10));
        let third = cache.add_or_update_sync(0, |_| unreachable!(), |_, v| Ok::<_, TestError>(v + 1));

        assert_eq!(third.await.unwrap(), 11);
        assert_eq!(second.await.unwrap(), 10);
        assert_eq!(first.await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_is_shared_until_replaced() {
        let cache = AsyncCache::<u64, usize>::new(10).unwrap();
        let loads = Arc::new(AtomicUsize::new(0));

        let load = |fail: bool| {
            let loads = loads.clone();
            move |_: &u64| async move {
                loads.fetch_add(1, Ordering::Relaxed);
                if fail {
                    Err(TestError)
                } else {
                    Ok(42)
                }
            }
        };

        let handles = (0..10).map(|_| cache.get_or_add(0, load(true))).collect_vec();
        for res in join_all(handles).await {
            let e = res.unwrap_err();
            assert_eq!(e.kind(), ErrorKind::External);
            assert_eq!(e.downcast_ref::<TestError>(), Some(&TestError));
        }
        assert_eq!(loads.load(Ordering::Relaxed), 1);

        // The failed handle stays until overwritten.
        assert!(cache.contains(&0));
        assert!(cache.get_or_add(0, load(false)).await.is_err());
        assert_eq!(loads.load(Ordering::Relaxed), 1);

        let retried = cache.insert(0, load(false)(&0));
        assert_eq!(retried.await.unwrap(), 42);
        assert_eq!(cache.get_or_add(0, load(false)).await.unwrap(), 42);
        assert_eq!(loads.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_add_fails_chained_updates() {
        let cache = AsyncCache::<u64, usize>::new(10).unwrap();

        let added = cache.add_or_update(0, |_| async { Err(TestError) }, |_, v| async move { Ok(v + 1) });
        let updated = cache.add_or_update(
            0,
            |_| async { Ok::<_, TestError>(0) },
            |_, v| async move { Ok(v + 100) },
        );

        assert!(added.await.is_err());
        let e = updated.await.unwrap_err();
        assert_eq!(e.downcast_ref::<TestError>(), Some(&TestError));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_waiter_does_not_cancel() {
        let cache = AsyncCache::<u64, usize>::new(10).unwrap();

        let handle = cache.get_or_add(0, |_| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, TestError>(7)
        });

        let res = tokio::time::timeout(Duration::from_millis(10), handle).await;
        assert!(res.is_err());

        let handle = cache.peek(&0).unwrap();
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_evicted_computation_runs_to_completion() {
        let cache = AsyncCache::<u64, usize>::new(1).unwrap();
        let loads = Arc::new(AtomicUsize::new(0));

        let handle = {
            let loads = loads.clone();
            cache.get_or_add(0, move |_| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, TestError>(loads.fetch_add(1, Ordering::Relaxed) + 1)
            })
        };
        drop(handle);

        // Evict the pending handle. Nobody holds it any more.
        assert_eq!(cache.get_or_add_sync(1, |_| Ok::<_, TestError>(0)).await.unwrap(), 0);
        assert!(!cache.contains(&0));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(loads.load(Ordering::Relaxed), 1);
    }

    #[test_log::test]
    fn test_dedicated_spawner() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let cache = AsyncCache::<u64, usize>::new(10).unwrap().with_spawner(runtime);

        // No runtime in this context: computations still start on the dedicated one.
        let first = cache.add_or_update(0, |_| async { Ok::<_, TestError>(1) }, |_, v| async move { Ok(v + 1) });
        let second = cache.add_or_update(0, |_| async { Ok::<_, TestError>(1) }, |_, v| async move { Ok(v + 1) });

        let driver = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert_eq!(driver.block_on(second).unwrap(), 2);
        assert_eq!(driver.block_on(first).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_expiring_inner_cache() {
        let clock = ManualClock::default();
        let inner: ExpiringCache<u64, InflightHandle<usize>, _> = CacheBuilder::new(4)
            .with_lifetime(Duration::from_secs(1))
            .with_clock(clock.clone())
            .build_expiring()
            .unwrap();
        let cache: AsyncCache<u64, usize, _> = AsyncCache::from_inner(inner);
        let loads = Arc::new(AtomicUsize::new(0));

        let load = || {
            let loads = loads.clone();
            move |_: &u64| async move { Ok::<_, TestError>(loads.fetch_add(1, Ordering::Relaxed) + 1) }
        };

        assert_eq!(cache.get_or_add(0, load()).await.unwrap(), 1);
        assert_eq!(cache.get_or_add(0, load()).await.unwrap(), 1);

        clock.advance(Duration::from_secs(1));
        assert!(!cache.contains(&0));
        assert_eq!(cache.get_or_add(0, load()).await.unwrap(), 2);
        assert_eq!(cache.len(), 1);
    }
}
