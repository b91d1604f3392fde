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

use std::hash::{BuildHasher, Hash};

/// Key trait for the in-memory cache.
///
/// Equality comes from [`Eq`] and hashing from the cache's [`HashBuilder`], so any owned, hashable type can be used as
/// a key without further implementation.
pub trait Key: Send + Sync + 'static + Hash + Eq {}
impl<T: Send + Sync + 'static + Hash + Eq> Key for T {}

/// Value trait for the in-memory cache.
///
/// Lookups hand out clones of the stored value. Values that are expensive to clone should be wrapped in an
/// [`std::sync::Arc`] by the caller.
pub trait Value: Send + Sync + 'static + Clone {}
impl<T: Send + Sync + 'static + Clone> Value for T {}

/// Hash builder trait.
///
/// The hash builder is the pluggable key hashing strategy of a cache instance.
pub trait HashBuilder: BuildHasher + Send + Sync + 'static {}
impl<T> HashBuilder for T where T: BuildHasher + Send + Sync + 'static {}

/// The default hash builder used by slotcache.
pub type DefaultHasher = hashbrown::DefaultHashBuilder;
