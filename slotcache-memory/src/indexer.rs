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

use std::hash::Hash;

use equivalent::Equivalent;
use hashbrown::HashTable;

use crate::arena::{Arena, SlotIndex};

/// Maps keys to the arena slots holding them.
///
/// The table only stores slot indices. Hashes and keys are read back from the arena, so the indexer must always be
/// consulted together with the arena it was built over.
#[derive(Debug)]
pub struct HashTableIndexer {
    table: HashTable<SlotIndex>,
}

impl HashTableIndexer {
    /// Create an indexer sized for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
        }
    }

    /// Look up the slot holding `key`.
    pub fn get<K, V, Q>(&self, hash: u64, key: &Q, arena: &Arena<K, V>) -> Option<SlotIndex>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.table
            .find(hash, |&index| arena.hash(index) == hash && key.equivalent(arena.key(index)))
            .copied()
    }

    /// Register a slot under `hash`.
    ///
    /// The caller guarantees the key stored in the slot is not indexed yet.
    pub fn insert<K, V>(&mut self, hash: u64, index: SlotIndex, arena: &Arena<K, V>) {
        self.table.insert_unique(hash, index, |&index| arena.hash(index));
    }

    /// Unregister a slot previously inserted under `hash`.
    ///
    /// Matches on slot identity rather than key, so it is safe to call after the slot has been overwritten.
    pub fn remove(&mut self, hash: u64, index: SlotIndex) -> bool {
        match self.table.find_entry(hash, |&i| i == index) {
            Ok(entry) => {
                entry.remove();
                true
            }
            Err(_) => false,
        }
    }

    /// Count of indexed slots.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_table_indexer() {
        let mut arena = Arena::<String, u64>::new(4).unwrap();
        let mut indexer = HashTableIndexer::with_capacity(4);

        // Collide every key on purpose.
        const HASH: u64 = 7;

        let a = arena.claim(HASH, "a".to_string(), 1);
        indexer.insert(HASH, a, &arena);
        let b = arena.claim(HASH, "b".to_string(), 2);
        indexer.insert(HASH, b, &arena);

        assert_eq!(indexer.len(), 2);
        assert_eq!(indexer.get(HASH, "a", &arena), Some(a));
        assert_eq!(indexer.get(HASH, "b", &arena), Some(b));
        assert_eq!(indexer.get(HASH, "c", &arena), None);
        assert_eq!(indexer.get(HASH + 1, "a", &arena), None);

        // Overwrite slot `a` with a new key, then drop the stale registration by identity.
        arena.replace(a, HASH, "c".to_string(), 3);
        assert!(indexer.remove(HASH, a));
        assert!(!indexer.remove(HASH, a));
        indexer.insert(HASH, a, &arena);

        assert_eq!(indexer.get(HASH, "a", &arena), None);
        assert_eq!(indexer.get(HASH, "c", &arena), Some(a));
        assert_eq!(indexer.get(HASH, "b", &arena), Some(b));
        assert_eq!(indexer.len(), 2);
        assert!(!indexer.is_empty());
    }
}
