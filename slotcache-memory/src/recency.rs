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

use slotcache_common::{error::Result, strict_assert, strict_assert_eq};

use crate::arena::{Arena, SlotIndex};

/// An entry pushed out of the tail of a full [`RecencyList`].
#[derive(Debug, PartialEq, Eq)]
pub struct Evicted<K, V> {
    /// Hash of the evicted key.
    pub hash: u64,
    /// The evicted key.
    pub key: K,
    /// The evicted value.
    pub value: V,
}

/// Recency order over an [`Arena`].
///
/// The list is intrusive: links live inside the arena slots, and `head` / `tail` are slot indices. The head is the
/// most recently used entry and the tail is the eviction candidate.
///
/// Because the arena never frees a claimed slot, every claimed slot is on the list and `len() == arena.len()`.
#[derive(Debug)]
pub struct RecencyList<K, V> {
    arena: Arena<K, V>,

    head: Option<SlotIndex>,
    tail: Option<SlotIndex>,
}

impl<K, V> RecencyList<K, V> {
    /// Create an empty list over a freshly allocated arena.
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            arena: Arena::new(capacity)?,
            head: None,
            tail: None,
        })
    }

    /// The backing arena.
    pub fn arena(&self) -> &Arena<K, V> {
        &self.arena
    }

    /// The most recently used slot.
    pub fn head(&self) -> Option<SlotIndex> {
        self.head
    }

    /// The least recently used slot.
    pub fn tail(&self) -> Option<SlotIndex> {
        self.tail
    }

    /// Count of live entries.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Returns `true` if the list holds no entry.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Maximum count of live entries.
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Value stored in a slot. Does not affect ordering.
    pub fn value(&self, index: SlotIndex) -> &V {
        self.arena.value(index)
    }

    /// Replace the value stored in a slot, returning the previous one. Does not affect ordering.
    pub fn set_value(&mut self, index: SlotIndex, value: V) -> V {
        self.arena.set_value(index, value)
    }

    /// Insert an entry as the most recently used one.
    ///
    /// Claims a fresh slot while the arena has one. Otherwise the tail entry is detached, its slot is overwritten
    /// with the new entry, and the detached entry is returned so the caller can drop it from the index.
    pub fn push_front(&mut self, hash: u64, key: K, value: V) -> (SlotIndex, Option<Evicted<K, V>>) {
        let (index, evicted) = if self.arena.is_exhausted() {
            let tail = match self.tail {
                Some(tail) => tail,
                // An exhausted arena has at least one live slot.
                None => unreachable!("exhausted arena with an empty recency list"),
            };
            self.detach(tail);
            let (hash, key, value) = self.arena.replace(tail, hash, key, value);
            (tail, Some(Evicted { hash, key, value }))
        } else {
            (self.arena.claim(hash, key, value), None)
        };

        self.attach_front(index);

        #[cfg(feature = "sanity")]
        self.check();

        (index, evicted)
    }

    /// Promote a slot to the head.
    pub fn move_to_head(&mut self, index: SlotIndex) {
        if self.head == Some(index) {
            return;
        }

        self.detach(index);
        self.attach_front(index);

        #[cfg(feature = "sanity")]
        self.check();
    }

    /// Iterate over live slots, from the most to the least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn detach(&mut self, index: SlotIndex) {
        let (prev, next) = {
            let slot = self.arena.slot(index);
            (slot.prev, slot.next)
        };

        match prev {
            Some(prev) => self.arena.slot_mut(prev).next = next,
            None => {
                strict_assert_eq!(self.head, Some(index));
                self.head = next;
            }
        }
        match next {
            Some(next) => self.arena.slot_mut(next).prev = prev,
            None => {
                strict_assert_eq!(self.tail, Some(index));
                self.tail = prev;
            }
        }

        let slot = self.arena.slot_mut(index);
        slot.prev = None;
        slot.next = None;
    }

    fn attach_front(&mut self, index: SlotIndex) {
        let head = self.head;

        {
            let slot = self.arena.slot_mut(index);
            strict_assert!(slot.prev.is_none() && slot.next.is_none());
            slot.next = head;
        }

        match head {
            Some(head) => self.arena.slot_mut(head).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    /// Walk the whole list and assert every structural invariant.
    #[cfg(any(test, feature = "sanity"))]
    pub(crate) fn check(&self) {
        let mut visited = vec![false; self.arena.len()];
        let mut prev = None;
        let mut cursor = self.head;
        let mut count = 0;

        while let Some(index) = cursor {
            assert!(!visited[index.get()], "slot {index} is reachable twice");
            visited[index.get()] = true;

            let slot = self.arena.slot(index);
            assert_eq!(slot.prev, prev, "slot {index} has a broken back link");

            prev = cursor;
            cursor = slot.next;
            count += 1;
        }

        assert_eq!(self.tail, prev);
        assert_eq!(count, self.arena.len());
        assert!(count <= self.arena.capacity());
        assert_eq!(self.head.is_none(), self.tail.is_none());
        assert_eq!(self.head.is_none(), count == 0);
    }
}

/// Iterator over a [`RecencyList`], from the most to the least recently used entry.
pub struct Iter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    cursor: Option<SlotIndex>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (SlotIndex, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = self.list.arena.slot(index);
        self.cursor = slot.next;
        Some((index, &slot.key, &slot.value))
    }
}
