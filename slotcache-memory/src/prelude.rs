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

#[cfg(any(test, feature = "test_utils"))]
pub use crate::test_utils::ManualClock;
pub use crate::{
    arena::{Arena, Slot, SlotIndex},
    builder::{CacheBuilder, CacheConfig},
    cache::{Cache, SimpleCache},
    expiring::{Clock, ExpiringCache, SystemClock},
    indexer::HashTableIndexer,
    raw::RawCache,
    recency::{Evicted, RecencyList},
    single_flight::{AsyncCache, InflightHandle},
};
