//! A hashed timing wheel, specialized for second-granularity deadlines.
//!
//! This crate implements the [`Wheel`] type: a hashed timing wheel that
//! schedules opaque data to be handed back to the caller once a
//! caller-advanced virtual clock reaches a given deadline (in whole
//! seconds). Unlike a general-purpose timer, `Wheel` never reads wall-clock
//! time itself — every advance is driven explicitly via [`Wheel::set_time`].
//! This makes it trivially deterministic to test and lets a caller with its
//! own notion of "now" (for instance one derived from message timestamps, as
//! the correlation engine built on top of this crate does) drive it
//! directly.
//!
//! # Implementation
//!
//! Entries live in an arena addressed by small-integer [`Handle`]s, so the
//! wheel and whatever owns the handle (a hash map keyed on something else,
//! say) can each hold a cheap, `Copy` reference to the same scheduled item
//! without sharing a pointer.
//!
//! The wheel itself is a single ring of slots indexed by `deadline_s %
//! SLOTS`; a deadline further out than the ring's span is parked on an
//! overflow list and migrated onto its slot once [`set_time`](Wheel::set_time)
//! brings it into range. This is the same general hashed-wheel idea used by
//! most production timer wheels, simplified to one level since a
//! second-granularity deadline never needs sub-second precision.
//!
//! Ties — two entries due at the same second — fire in the order they were
//! added or last rescheduled.

mod entry;
mod wheel;

pub use entry::{Arena, Handle};
pub use wheel::Wheel;
