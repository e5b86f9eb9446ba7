//! [`CorrelationContext`]: the per-key bucket of accumulated messages.

use crate::key::CorrelationKey;
use crate::message::LogMessage;

use correlate_timer::Handle as TimerHandle;

/// Everything the engine knows about one open correlation group.
///
/// A context is created on the first message for a new key and lives until
/// its inactivity timer fires. Its `messages` list is append-only and never
/// empty once created (spec invariant (b)); `timer_handle` is the entry
/// this context currently owns in the [`correlate_timer::Wheel`] — `None`
/// only in the instant between construction and the first
/// `Wheel::add` call.
pub struct CorrelationContext<M: LogMessage> {
    key: CorrelationKey,
    messages: Vec<M>,
    timer_handle: Option<TimerHandle>,
}

impl<M: LogMessage> CorrelationContext<M> {
    /// Creates a context for `key`, seeded with its first message.
    ///
    /// A context with no messages is never observable outside this module:
    /// construction and the first `push` happen together.
    pub fn new(key: CorrelationKey, first_message: M) -> Self {
        Self {
            key,
            messages: vec![first_message],
            timer_handle: None,
        }
    }

    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    pub fn messages(&self) -> &[M] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends a message accepted by a later `process()` call for this
    /// context's key. Messages observe the order `process()` was invoked,
    /// since the engine lock serializes every append.
    pub fn push(&mut self, msg: M) {
        self.messages.push(msg);
    }

    pub fn timer_handle(&self) -> Option<TimerHandle> {
        self.timer_handle
    }

    pub fn set_timer_handle(&mut self, handle: TimerHandle) {
        self.timer_handle = Some(handle);
    }
}
