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

//! Fixed-capacity in-memory LRU caches for slotcache.
//!
//! Entries live in a slot arena allocated once at construction. The recency order is an intrusive doubly linked list
//! threaded through the slots by index, and a hash table maps keys to slots. A single lock guards all three for the
//! whole duration of a compound operation.
//!
//! [`Cache`] and [`ExpiringCache`] implement the synchronous [`SimpleCache`] contract. [`AsyncCache`] wraps either of
//! them to share one pending computation per key between concurrent callers.

/// Fixed-length slot storage addressed by [`SlotIndex`].
pub mod arena;
/// Cache configuration and builder.
pub mod builder;
/// The LRU cache and the synchronous cache contract.
pub mod cache;
/// LRU cache with time-based expiry.
pub mod expiring;
/// Key to slot index.
pub mod indexer;
/// The locked core shared by every cache flavor.
pub mod raw;
/// Recency order over the slot arena.
pub mod recency;
/// Single-flight asynchronous wrapper.
pub mod single_flight;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

mod prelude;
pub use prelude::*;
