// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// Handle to an entry in a [`ProcessList`]
///
/// Handles are generational, a handle to a removed entry never resolves to a later one that
/// reused its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProcessId {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    entry: Option<Entry<T>>,
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

/// An insertion ordered list with constant time removal by handle
///
/// The head is the oldest entry, the tail the most recently pushed one.
#[derive(Debug)]
pub struct ProcessList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for ProcessList<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }
}

impl<T> ProcessList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_back(&mut self, value: T) -> ProcessId {
        let entry = Entry {
            value,
            prev: self.tail,
            next: None,
        };

        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation += 1;
                slot.entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => self.entry_mut(tail).next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        ProcessId {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Unlinks the entry, returning its value if the handle was still live
    pub fn remove(&mut self, id: ProcessId) -> Option<T> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;

        match entry.prev {
            Some(prev) => self.entry_mut(prev).next = entry.next,
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => self.entry_mut(next).prev = entry.prev,
            None => self.tail = entry.prev,
        }

        self.free.push(id.index);
        self.len -= 1;
        Some(entry.value)
    }

    pub fn get(&self, id: ProcessId) -> Option<&T> {
        self.live(id).map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, id: ProcessId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut().map(|entry| &mut entry.value)
    }

    /// Handle of the most recently pushed live entry
    pub fn tail(&self) -> Option<ProcessId> {
        self.tail.map(|index| self.id_of(index))
    }

    /// Walks from the head (oldest) to the tail (newest)
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            forward: true,
        }
    }

    /// Walks from the tail (newest) back to the head (oldest)
    pub fn iter_rev(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.tail,
            forward: false,
        }
    }

    fn live(&self, id: ProcessId) -> Option<&Entry<T>> {
        let slot = self.slots.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn id_of(&self, index: usize) -> ProcessId {
        ProcessId {
            index,
            generation: self.slots[index].generation,
        }
    }

    fn entry(&self, index: usize) -> &Entry<T> {
        self.slots[index]
            .entry
            .as_ref()
            .unwrap_or_else(|| unreachable!("linked slot {} is vacant", index))
    }

    fn entry_mut(&mut self, index: usize) -> &mut Entry<T> {
        self.slots[index]
            .entry
            .as_mut()
            .unwrap_or_else(|| unreachable!("linked slot {} is vacant", index))
    }
}

pub struct Iter<'a, T> {
    list: &'a ProcessList<T>,
    cursor: Option<usize>,
    forward: bool,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (ProcessId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let entry = self.list.entry(index);

        self.cursor = if self.forward { entry.next } else { entry.prev };
        Some((self.list.id_of(index), &entry.value))
    }
}
