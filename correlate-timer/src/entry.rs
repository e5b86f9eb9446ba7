//! The handle table (arena) that owns timer entries.
//!
//! The wheel never stores user data directly; it stores a [`Handle`], a
//! small integer index into this table. This keeps the wheel generic over
//! the callback's state without needing a trait object or a reference
//! counted pointer shared between the wheel and whatever else addresses the
//! same entry (see the crate-level docs for why).
//!
//! [`Arena`] is exported in its own right: a caller that needs a second,
//! independent handle table addressed the same cheap way — the correlation
//! engine built on this crate keeps its contexts in one, referenced by
//! handle from both its lookup map and this crate's [`Wheel`](crate::Wheel)
//! — can reuse it directly instead of rolling another slab allocator.

use std::fmt;

/// An opaque handle into an [`Arena`].
///
/// Cheap to copy. A `Handle` returned by [`Arena::insert`] stays valid until
/// that entry is [`Arena::remove`]d; a handle into one `Arena` must never be
/// used against another, since nothing but the caller's discipline keeps
/// the two handle spaces apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

pub struct Entry<T> {
    pub(crate) deadline_s: u64,
    pub(crate) generation: u64,
    pub(crate) data: Option<T>,
    /// Insertion sequence, used to break ties between entries that share a
    /// deadline: the wheel fires them in the order they were added.
    pub(crate) seq: u64,
}

/// Owns every live entry, indexed by [`Handle`].
///
/// Freed slots are recycled; the `generation` counter distinguishes a reused
/// slot from the handle that used to point at it, so an arena entry is never
/// accidentally read through a stale handle.
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free: Vec<usize>,
    next_seq: u64,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn insert(&mut self, data: T) -> Handle {
        self.insert_with_deadline(0, data)
    }

    pub(crate) fn insert_with_deadline(&mut self, deadline_s: u64, data: T) -> Handle {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.entries[index];
            slot.deadline_s = deadline_s;
            slot.data = Some(data);
            slot.seq = seq;
            slot.generation += 1;
            Handle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.entries.len();
            self.entries.push(Entry {
                deadline_s,
                generation: 0,
                data: Some(data),
                seq,
            });
            Handle {
                index,
                generation: 0,
            }
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.entries
            .get(handle.index)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.data.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let matches = self
            .entries
            .get(handle.index)
            .map(|entry| entry.generation == handle.generation)
            .unwrap_or(false);
        if matches {
            self.entries.get_mut(handle.index).and_then(|entry| entry.data.as_mut())
        } else {
            None
        }
    }

    pub(crate) fn get_entry(&self, handle: Handle) -> Option<&Entry<T>> {
        self.entries.get(handle.index).filter(|entry| {
            entry.generation == handle.generation && entry.data.is_some()
        })
    }

    pub(crate) fn get_entry_mut(&mut self, handle: Handle) -> Option<&mut Entry<T>> {
        let found = self
            .entries
            .get(handle.index)
            .map(|entry| entry.generation == handle.generation && entry.data.is_some())
            .unwrap_or(false);
        if found {
            self.entries.get_mut(handle.index)
        } else {
            None
        }
    }

    /// Removes the entry, returning its data. The slot's index is recycled
    /// on the next [`insert`](Self::insert); its generation is bumped then,
    /// not now, so a double-remove of the same handle is simply a no-op.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let entry = self.entries.get_mut(handle.index)?;
        if entry.generation != handle.generation {
            return None;
        }
        let data = entry.data.take();
        if data.is_some() {
            self.free.push(handle.index);
        }
        data
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Draws the next insertion-order sequence number without inserting a
    /// new entry; used by [`Wheel::modify`](crate::Wheel::modify) to mark a
    /// rescheduled entry as the freshest at its new deadline.
    pub(crate) fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
