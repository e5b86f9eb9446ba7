//! [`CorrelationStore`]: the key → context lookup, sharing ownership of
//! each context with the timer wheel through an arena handle.

use crate::context::CorrelationContext;
use crate::key::CorrelationKey;
use crate::message::LogMessage;

use correlate_timer::{Arena, Handle as ContextHandle};
use hashbrown::HashMap;

/// Owns every live [`CorrelationContext`], addressed by [`ContextHandle`].
///
/// A context has exactly one true owner: this arena. The lookup map and the
/// timer wheel each hold a cheap, `Copy` handle into it rather than a
/// second copy of the data — the redesign called for in the correlation
/// engine's design notes, replacing the original's hand-rolled refcounted
/// pointer with an explicit handle table.
pub struct CorrelationStore<M: LogMessage> {
    contexts: Arena<CorrelationContext<M>>,
    by_key: HashMap<CorrelationKey, ContextHandle>,
}

impl<M: LogMessage> CorrelationStore<M> {
    pub fn new() -> Self {
        Self {
            contexts: Arena::new(),
            by_key: HashMap::new(),
        }
    }

    /// Looks up the context handle for `key`. Never allocates: a cache miss
    /// is just a hash map probe.
    pub fn lookup(&self, key: &CorrelationKey) -> Option<ContextHandle> {
        self.by_key.get(key).copied()
    }

    pub fn get(&self, handle: ContextHandle) -> Option<&CorrelationContext<M>> {
        self.contexts.get(handle)
    }

    pub fn get_mut(&mut self, handle: ContextHandle) -> Option<&mut CorrelationContext<M>> {
        self.contexts.get_mut(handle)
    }

    /// Inserts a newly created context, returning the handle both the
    /// lookup map and the timer wheel will use to address it.
    pub fn insert(&mut self, ctx: CorrelationContext<M>) -> ContextHandle {
        let key = ctx.key().clone();
        let handle = self.contexts.insert(ctx);
        self.by_key.insert(key, handle);
        handle
    }

    /// Removes a context by key, releasing the store's share of ownership.
    /// The caller is expected to have already taken whatever it needed out
    /// of the context (e.g. to build a synthetic message) via `get`, since
    /// this drops the arena's copy.
    pub fn remove(&mut self, key: &CorrelationKey) -> Option<CorrelationContext<M>> {
        let handle = self.by_key.remove(key)?;
        self.contexts.remove(handle)
    }

    /// Removes a context addressed by its arena handle, e.g. when a timer
    /// wheel firing only hands back the handle it was scheduled under.
    pub fn remove_by_handle(&mut self, handle: ContextHandle) -> Option<CorrelationContext<M>> {
        let key = self.contexts.get(handle)?.key().clone();
        self.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CorrelationContext<M>> {
        self.by_key.values().filter_map(move |h| self.contexts.get(*h))
    }
}

impl<M: LogMessage> Default for CorrelationStore<M> {
    fn default() -> Self {
        Self::new()
    }
}
