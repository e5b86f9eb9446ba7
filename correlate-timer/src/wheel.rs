//! The hashed timing wheel itself.

use crate::entry::{Arena, Handle};
use smallvec::SmallVec;

/// Number of slots in the wheel. A deadline whose distance from `now_s`
/// reaches this many seconds is parked on the [`Wheel::far`] list instead
/// and migrated onto a slot once it comes into range.
const SLOTS: usize = 512;

type Bucket = SmallVec<[Handle; 4]>;

/// A hashed, second-granularity timing wheel.
///
/// Deadlines are absolute seconds on whatever clock the caller advances via
/// [`set_time`](Wheel::set_time). `Wheel` does not read wall-clock time
/// itself — it only reacts to `set_time` calls, so it is trivially testable
/// with any fake clock.
///
/// Ties (two entries due at the same deadline) fire in the order they were
/// [`add`](Wheel::add)ed or last [`modify`](Wheel::modify)ed.
pub struct Wheel<T> {
    arena: Arena<T>,
    slots: Vec<Bucket>,
    far: Vec<Handle>,
    now_s: u64,
}

impl<T> Wheel<T> {
    pub fn new() -> Self {
        Self::with_start_time(0)
    }

    pub fn with_start_time(now_s: u64) -> Self {
        Self {
            arena: Arena::new(),
            slots: vec![Bucket::new(); SLOTS],
            far: Vec::new(),
            now_s,
        }
    }

    pub fn now(&self) -> u64 {
        self.now_s
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.arena.contains(handle)
    }

    /// The absolute deadline a live entry is scheduled for, or `None` if
    /// `handle` no longer refers to one. Used to compute a remaining-time
    /// delta when persisting state ahead of a restart.
    pub fn deadline_of(&self, handle: Handle) -> Option<u64> {
        self.arena.get_entry(handle).map(|e| e.deadline_s)
    }

    /// Schedules `data` to fire once `now_s` reaches `deadline_s`.
    ///
    /// A `deadline_s` that has already elapsed is legal: the entry fires on
    /// the next [`set_time`](Wheel::set_time) call, exactly as if it had
    /// been due all along.
    pub fn add(&mut self, deadline_s: u64, data: T) -> Handle {
        let handle = self.arena.insert_with_deadline(deadline_s, data);
        self.place(handle, deadline_s);
        handle
    }

    /// Moves a live entry's deadline. Equivalent to removing and re-adding,
    /// except the handle stays valid.
    ///
    /// Returns `false` if `handle` does not refer to a live entry.
    pub fn modify(&mut self, handle: Handle, new_deadline_s: u64) -> bool {
        let old_deadline = match self.arena.get_entry(handle) {
            Some(entry) => entry.deadline_s,
            None => return false,
        };
        self.unplace(handle, old_deadline);

        let seq = self.arena.bump_seq();
        if let Some(entry) = self.arena.get_entry_mut(handle) {
            entry.deadline_s = new_deadline_s;
            entry.seq = seq;
        }
        self.place(handle, new_deadline_s);
        true
    }

    /// Cancels a live entry without firing it, dropping its data.
    ///
    /// Returns the removed data, or `None` if `handle` was already gone.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let deadline = self.arena.get_entry(handle)?.deadline_s;
        self.unplace(handle, deadline);
        self.arena.remove(handle)
    }

    /// Advances the wheel to `new_now_s`, firing `on_fire` for every entry
    /// whose deadline has been reached, in non-decreasing deadline order
    /// (ties broken by insertion/modification order).
    ///
    /// `new_now_s` must be `>=` the wheel's current time; this is a logic
    /// error the caller (the virtual clock) is responsible for never
    /// triggering, since wall-clock step-back must never regress virtual
    /// time (see the correlation engine's clock contract).
    pub fn set_time<F: FnMut(u64, T)>(&mut self, new_now_s: u64, mut on_fire: F) {
        debug_assert!(new_now_s >= self.now_s, "timer wheel must not move backwards");
        if new_now_s <= self.now_s {
            return;
        }

        let mut s = self.now_s;
        while s < new_now_s {
            s += 1;
            self.now_s = s;
            self.migrate_far();

            let idx = (s as usize) % SLOTS;
            let bucket = std::mem::take(&mut self.slots[idx]);
            let mut due: Vec<Handle> = Vec::new();
            let mut remaining: Bucket = Bucket::new();
            for handle in bucket {
                let reached = self
                    .arena
                    .get_entry(handle)
                    .map(|e| e.deadline_s <= s)
                    .unwrap_or(false);
                if reached {
                    due.push(handle);
                } else {
                    remaining.push(handle);
                }
            }
            self.slots[idx] = remaining;

            due.sort_by_key(|h| self.arena.get_entry(*h).map(|e| e.seq).unwrap_or(u64::MAX));
            for handle in due {
                if let Some(data) = self.arena.remove(handle) {
                    on_fire(s, data);
                }
            }
        }
    }

    /// The deadline actually used to pick a slot: a deadline that has
    /// already elapsed (or is the very next second) is scheduled for the
    /// next `set_time` step rather than waiting out a full wheel cycle.
    fn slot_deadline(&self, deadline_s: u64) -> u64 {
        deadline_s.max(self.now_s + 1)
    }

    fn in_range(&self, slot_deadline: u64) -> bool {
        slot_deadline - self.now_s < SLOTS as u64
    }

    fn place(&mut self, handle: Handle, deadline_s: u64) {
        let slot_deadline = self.slot_deadline(deadline_s);
        if self.in_range(slot_deadline) {
            let idx = (slot_deadline as usize) % SLOTS;
            self.slots[idx].push(handle);
        } else {
            self.far.push(handle);
        }
    }

    fn unplace(&mut self, handle: Handle, deadline_s: u64) {
        let slot_deadline = self.slot_deadline(deadline_s);
        if self.in_range(slot_deadline) {
            let idx = (slot_deadline as usize) % SLOTS;
            self.slots[idx].retain(|h| *h != handle);
        } else {
            self.far.retain(|h| *h != handle);
        }
    }

    /// Moves far-list entries that have come into range onto their slot.
    fn migrate_far(&mut self) {
        if self.far.is_empty() {
            return;
        }
        let now_s = self.now_s;
        let arena = &self.arena;
        let (ready, still_far): (Vec<Handle>, Vec<Handle>) =
            self.far.drain(..).partition(|h| {
                arena
                    .get_entry(*h)
                    .map(|e| e.deadline_s.max(now_s + 1) - now_s < SLOTS as u64)
                    .unwrap_or(true)
            });
        self.far = still_far;
        for handle in ready {
            if let Some(deadline_s) = self.arena.get_entry(handle).map(|e| e.deadline_s) {
                let idx = (self.slot_deadline(deadline_s) as usize) % SLOTS;
                self.slots[idx].push(handle);
            }
        }
    }
}

impl<T> Default for Wheel<T> {
    fn default() -> Self {
        Self::new()
    }
}
