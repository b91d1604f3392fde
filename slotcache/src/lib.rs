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

//! slotcache: a fixed-capacity in-memory LRU cache with single-flight loading.
//!
//! ```
//! use slotcache::prelude::*;
//!
//! let cache: Cache<u64, String> = Cache::new(2).unwrap();
//! assert_eq!(cache.get_or_add(1, |k| k.to_string()), "1");
//! cache.get_or_add(2, |k| k.to_string());
//! cache.get_or_add(3, |k| k.to_string());
//! assert!(!cache.contains(&1));
//! ```

pub use slotcache_common as common;
pub use slotcache_memory as memory;

/// Common imports.
pub mod prelude;
pub use prelude::*;
