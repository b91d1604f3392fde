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

use std::fmt::Display;

use slotcache_common::{
    error::{Error, Result},
    strict_assert,
};

/// Position of a slot in the [`Arena`].
///
/// Slot indices are only handed out by the arena that owns the slot and stay valid for the arena's whole lifetime,
/// because slots are relabeled in place and never freed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Get the raw position in the arena.
    pub fn get(self) -> usize {
        self.0
    }
}

impl Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An arena element: one cache entry plus its recency-list links.
#[derive(Debug)]
pub struct Slot<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) hash: u64,

    pub(crate) prev: Option<SlotIndex>,
    pub(crate) next: Option<SlotIndex>,
}

impl<K, V> Slot<K, V> {
    /// Key of the entry occupying the slot.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Value of the entry occupying the slot.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Hash of the key, computed by the cache's hash builder.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The more recently used neighbour.
    pub fn prev(&self) -> Option<SlotIndex> {
        self.prev
    }

    /// The less recently used neighbour.
    pub fn next(&self) -> Option<SlotIndex> {
        self.next
    }
}

/// Fixed-capacity slot storage.
///
/// The backing buffer is allocated once with the final capacity. Slots are claimed in ascending order until the
/// allocation cursor reaches the capacity, after which the only way to get a slot is to [`Arena::replace`] an
/// occupied one. Claimed slots are never released, so every claimed slot is live.
#[derive(Debug)]
pub struct Arena<K, V> {
    slots: Vec<Slot<K, V>>,
    capacity: usize,
}

impl<K, V> Arena<K, V> {
    /// Allocate an arena that can hold `capacity` slots.
    ///
    /// Returns an [`ErrorKind::InvalidCapacity`](slotcache_common::error::ErrorKind::InvalidCapacity) error if
    /// `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_capacity(capacity));
        }
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// Capacity of the arena.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count of claimed slots, which is also the allocation cursor.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no slot has been claimed yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns `true` if every slot has been claimed.
    pub fn is_exhausted(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Claim the next never-used slot.
    ///
    /// The caller must check [`Arena::is_exhausted`] first.
    pub fn claim(&mut self, hash: u64, key: K, value: V) -> SlotIndex {
        strict_assert!(!self.is_exhausted());

        let index = SlotIndex(self.slots.len());
        self.slots.push(Slot {
            key,
            value,
            hash,
            prev: None,
            next: None,
        });

        // The buffer must never grow past its initial allocation.
        strict_assert!(self.slots.capacity() >= self.capacity);

        index
    }

    /// Overwrite the entry occupying a slot, returning the previous `(hash, key, value)`.
    ///
    /// Links are left untouched.
    pub fn replace(&mut self, index: SlotIndex, hash: u64, key: K, value: V) -> (u64, K, V) {
        let slot = &mut self.slots[index.0];
        let hash = std::mem::replace(&mut slot.hash, hash);
        let key = std::mem::replace(&mut slot.key, key);
        let value = std::mem::replace(&mut slot.value, value);
        (hash, key, value)
    }

    /// Get a claimed slot.
    pub fn slot(&self, index: SlotIndex) -> &Slot<K, V> {
        &self.slots[index.0]
    }

    pub(crate) fn slot_mut(&mut self, index: SlotIndex) -> &mut Slot<K, V> {
        &mut self.slots[index.0]
    }

    /// Key stored in a slot.
    pub fn key(&self, index: SlotIndex) -> &K {
        &self.slots[index.0].key
    }

    /// Key hash stored in a slot.
    pub fn hash(&self, index: SlotIndex) -> u64 {
        self.slots[index.0].hash
    }

    /// Value stored in a slot.
    pub fn value(&self, index: SlotIndex) -> &V {
        &self.slots[index.0].value
    }

    /// Replace the value stored in a slot, returning the previous one.
    pub fn set_value(&mut self, index: SlotIndex, value: V) -> V {
        std::mem::replace(&mut self.slots[index.0].value, value)
    }
}

#[cfg(test)]
mod tests {
    use slotcache_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = Arena::<u64, u64>::new(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCapacity);
    }

    #[test]
    fn test_claim_until_exhausted() {
        let mut arena = Arena::new(3).unwrap();
        assert!(arena.is_empty());

        let indices = (0..3u64).map(|i| arena.claim(i, i, i * 10)).collect::<Vec<_>>();
        assert_eq!(indices.iter().map(|i| i.get()).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(arena.is_exhausted());
        assert_eq!(arena.len(), 3);

        for (i, index) in indices.into_iter().enumerate() {
            let i = i as u64;
            assert_eq!(arena.key(index), &i);
            assert_eq!(arena.value(index), &(i * 10));
            assert_eq!(arena.hash(index), i);
            assert_eq!(arena.slot(index).prev(), None);
            assert_eq!(arena.slot(index).next(), None);
        }
    }

    #[test]
    fn test_replace_and_set_value_keep_links() {
        let mut arena = Arena::new(2).unwrap();
        let a = arena.claim(1, "a", 1);
        let b = arena.claim(2, "b", 2);
        arena.slot_mut(a).next = Some(b);
        arena.slot_mut(b).prev = Some(a);

        assert_eq!(arena.replace(b, 3, "c", 3), (2, "b", 2));
        assert_eq!(arena.key(b), &"c");
        assert_eq!(arena.slot(b).prev(), Some(a));

        assert_eq!(arena.set_value(a, 11), 1);
        assert_eq!(arena.value(a), &11);
        assert_eq!(arena.slot(a).next(), Some(b));
    }
}
