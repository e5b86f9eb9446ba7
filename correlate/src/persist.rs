//! Persisted state (spec.md §6): an opaque blob that round-trips the whole
//! store across a restart.

use crate::context::CorrelationContext;
use crate::error::{Error, ErrorKind};
use crate::key::{CorrelationKey, Scope};
use crate::message::LogMessage;

use serde::{Deserialize, Serialize};

/// The name the persisted blob is registered under, matching the original's
/// `"correllation()"` config entry name.
pub const PERSIST_NAME: &str = "correllation()";

/// A host-provided sink/source for the engine's persisted blob.
///
/// Grounded on the original's `cfg_persist_config_fetch`/
/// `cfg_persist_config_add` pair: the engine doesn't know or care where the
/// bytes end up (a file, a key-value store, shared memory across a
/// reload) — it only asks for them back under [`PERSIST_NAME`].
pub trait PersistenceStore {
    fn fetch(&self, name: &str) -> Option<Vec<u8>>;
    fn store(&self, name: &str, blob: Vec<u8>);
}

/// One persisted context: its key, its accumulated messages in order, and
/// how much longer it had to live as of the moment it was persisted.
///
/// `remaining_s` is a delta, not an absolute deadline, deliberately: an
/// absolute deadline would be meaningless after a restart whose wall clock
/// may have jumped arbitrarily far from the one that produced it. Restoring
/// re-derives the deadline as `restore_wall_now_s + remaining_s`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedContext<M> {
    pub scope: Scope,
    pub key_string: String,
    pub extra: Option<String>,
    pub messages: Vec<M>,
    pub remaining_s: i64,
}

/// A full snapshot of a [`crate::store::CorrelationStore`], ready to encode.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistedState<M> {
    pub contexts: Vec<PersistedContext<M>>,
}

impl<M> PersistedState<M> {
    pub fn new() -> Self {
        Self { contexts: Vec::new() }
    }

    pub fn push(&mut self, context: PersistedContext<M>) {
        self.contexts.push(context);
    }
}

impl<M: LogMessage + Serialize> PersistedState<M> {
    /// Encodes the snapshot as the opaque blob the engine hands to a
    /// [`PersistenceStore`].
    pub fn to_blob(&self) -> Result<Vec<u8>, Error<()>> {
        bincode::serialize(self)
            .map_err(|_| Error::new(ErrorKind::PersistCorrupt))
    }
}

impl<'de, M: LogMessage + Deserialize<'de>> PersistedState<M> {
    /// Decodes a blob previously produced by [`to_blob`](Self::to_blob).
    /// A corrupt or foreign blob is reported, never guessed at — the
    /// caller is expected to start with an empty store rather than load
    /// partial state.
    pub fn from_blob(blob: &'de [u8]) -> Result<Self, Error<()>> {
        bincode::deserialize(blob).map_err(|_| Error::new(ErrorKind::PersistCorrupt))
    }
}

/// Reconstructs the [`CorrelationKey`] a [`PersistedContext`] was filed
/// under, without needing the original message that built it (the scope's
/// `extra` field was already computed once and is carried verbatim).
pub fn rebuild_key<M: LogMessage>(persisted: &PersistedContext<M>) -> CorrelationKey {
    CorrelationKey::from_parts(
        persisted.scope,
        persisted.key_string.clone(),
        persisted.extra.clone(),
    )
}

/// Builds a [`CorrelationContext`] from its persisted form, ready to be
/// re-inserted into the store and re-armed on the timer wheel at
/// `restore_wall_now_s + remaining_s`.
///
/// `None` if `persisted.messages` is empty. A well-formed blob (one this
/// crate produced via [`PersistedState::to_blob`]) never has such a
/// context, but a blob is just bytes the host hands back on `init` — it may
/// be stale, hand-edited, or produced by a different version — and
/// deserializing successfully does not guarantee that invariant held. Per
/// spec.md §7, a malformed persisted context is non-fatal: the caller skips
/// it rather than panicking.
pub fn rebuild_context<M: LogMessage>(persisted: PersistedContext<M>) -> Option<(CorrelationContext<M>, i64)> {
    let key = rebuild_key(&persisted);
    let remaining_s = persisted.remaining_s;
    let mut messages = persisted.messages.into_iter();
    let first = messages.next()?;
    let mut ctx = CorrelationContext::new(key, first);
    for msg in messages {
        ctx.push(msg);
    }
    Some((ctx, remaining_s))
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Msg {
        ts_event: i64,
        host: String,
        program: String,
    }

    impl LogMessage for Msg {
        fn ts_event(&self) -> i64 {
            self.ts_event
        }
        fn host(&self) -> &str {
            &self.host
        }
        fn program(&self) -> &str {
            &self.program
        }
        fn set_context_id(&mut self, _context_id: &str) {}
        fn write_protect(&mut self) {}
    }

    #[test]
    fn round_trips_through_a_blob() {
        let mut state = PersistedState::new();
        state.push(PersistedContext {
            scope: Scope::Host,
            key_string: "disk-errors".into(),
            extra: Some("db1".into()),
            messages: vec![Msg {
                ts_event: 10,
                host: "db1".into(),
                program: "kernel".into(),
            }],
            remaining_s: 42,
        });

        let blob = state.to_blob().unwrap();
        let restored: PersistedState<Msg> = PersistedState::from_blob(&blob).unwrap();

        assert_eq!(restored.contexts.len(), 1);
        assert_eq!(restored.contexts[0].remaining_s, 42);
        assert_eq!(restored.contexts[0].messages[0].host, "db1");
    }

    #[test]
    fn rejects_a_corrupt_blob() {
        let garbage = vec![0xff; 4];
        let result: Result<PersistedState<Msg>, _> = PersistedState::from_blob(&garbage);
        assert!(result.is_err());
    }

    #[test]
    fn rebuild_context_restores_key_and_message_order() {
        let persisted = PersistedContext {
            scope: Scope::Process,
            key_string: "oom".into(),
            extra: Some("db1\u{1}kernel\u{1}123".into()),
            messages: vec![
                Msg { ts_event: 1, host: "db1".into(), program: "kernel".into() },
                Msg { ts_event: 2, host: "db1".into(), program: "kernel".into() },
            ],
            remaining_s: 5,
        };

        let (ctx, remaining_s) = rebuild_context(persisted).unwrap();
        assert_eq!(remaining_s, 5);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.messages()[0].ts_event, 1);
        assert_eq!(ctx.messages()[1].ts_event, 2);
        assert_eq!(ctx.key().scope(), Scope::Process);
    }

    #[test]
    fn rebuild_context_rejects_an_empty_message_list() {
        let persisted = PersistedContext::<Msg> {
            scope: Scope::Global,
            key_string: "oom".into(),
            extra: None,
            messages: Vec::new(),
            remaining_s: 5,
        };

        assert!(rebuild_context(persisted).is_none());
    }
}
