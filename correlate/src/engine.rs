//! [`Correlator`]: ties the clock, key, context, store and timer wheel
//! together into the engine the rest of this crate exists to support.
//!
//! Grounded directly on `correllate_with_state`/`correllate_process`/
//! `_correllate_timer_tick`/`correllate_expire_entry`/`correllate_init`/
//! `correllate_deinit`/`correllate_clone` in the original correlation
//! parser, restructured around a single coarse `Mutex` in place of the
//! original's `GStaticMutex` — the engine does no I/O while holding it, so
//! there's no benefit to finer-grained locking.

use crate::clock::{SystemClock, VirtualClock, WallClock};
use crate::config::CorrelatorConfig;
use crate::context::CorrelationContext;
use crate::key::CorrelationKey;
use crate::message::{Emitter, LogMessage, SyntheticBuilder, TemplateEvaluator};
use crate::persist::{rebuild_context, PersistedContext, PersistedState, PersistenceStore, PERSIST_NAME};
use crate::store::CorrelationStore;

use correlate_timer::{Handle as ContextHandle, Wheel};
use serde::{Deserialize, Serialize};

use std::sync::Mutex;

struct Inner<M: LogMessage> {
    clock: VirtualClock,
    wheel: Wheel<ContextHandle>,
    store: CorrelationStore<M>,
}

/// A stateful log-correlation engine.
///
/// `M` is the host's message type; `T`, `B` and `E` are the host's
/// implementations of the three collaborator traits in
/// [`crate::message`]; `C` is the wall-clock source, defaulting to
/// [`SystemClock`] (tests typically substitute
/// [`MockClock`](crate::clock::MockClock) instead).
///
/// Every method that touches engine state takes `&self`, not `&mut self`:
/// all mutation happens behind the internal [`Mutex`], so a `Correlator`
/// can be shared across threads (e.g. one per pipeline worker thread,
/// processing messages concurrently) the way a real log pipeline stage
/// must be.
pub struct Correlator<M, T, B, E, C = SystemClock>
where
    M: LogMessage,
    T: TemplateEvaluator<M>,
    B: SyntheticBuilder<M>,
    E: Emitter<M>,
    C: WallClock,
{
    config: CorrelatorConfig,
    template: Option<T>,
    synthetic: B,
    emitter: E,
    wall_clock: C,
    inner: Mutex<Inner<M>>,
}

impl<M, T, B, E, C> Correlator<M, T, B, E, C>
where
    M: LogMessage,
    T: TemplateEvaluator<M>,
    B: SyntheticBuilder<M>,
    E: Emitter<M>,
    C: WallClock,
{
    /// Builds a correlator. `template` is `None` when no `key(...)` was
    /// configured, in which case every message passes through untouched
    /// (spec.md §3's no-op mode) while the clock and timer wheel still run,
    /// exactly as `correllate_set_time` always runs ahead of the
    /// `context_id_template` check in the original.
    pub fn new(config: CorrelatorConfig, template: Option<T>, synthetic: B, emitter: E, wall_clock: C) -> Self {
        let clock = VirtualClock::new(wall_clock.wall_now_s());
        let wheel = Wheel::with_start_time(clock.now() as u64);
        Self {
            config,
            template,
            synthetic,
            emitter,
            wall_clock,
            inner: Mutex::new(Inner {
                clock,
                wheel,
                store: CorrelationStore::new(),
            }),
        }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Processes one message: advances the virtual clock, runs any
    /// expiries that fall due, then joins the message to its context (if a
    /// key is configured and evaluates successfully). Always returns the
    /// message — correlation never drops or blocks a message, only
    /// annotates it, matching `correllate_process`'s unconditional `TRUE`.
    pub fn process(&self, mut msg: M) -> M {
        let wall_now = self.wall_clock.wall_now_s();
        let mut inner = self.inner.lock().unwrap();

        inner.clock.advance_from_message(msg.ts_event(), wall_now);
        let vnow = inner.clock.now() as u64;
        log::debug!("correlate(): advancing current time because of an incoming message utc={}", vnow);
        self.expire_due(&mut inner, vnow);

        let joined = match &self.template {
            Some(template) => match template.evaluate(&msg) {
                Ok(key_string) => {
                    msg.set_context_id(&key_string);
                    self.join_context(&mut inner, key_string, &msg, vnow);
                    true
                }
                Err(_) => {
                    log::debug!(
                        "correlate(): context key template failed to evaluate, message passes through unmodified"
                    );
                    false
                }
            },
            None => false,
        };

        drop(inner);

        if joined {
            msg.write_protect();
        }
        msg
    }

    /// Advances the virtual clock based on elapsed real time alone (no
    /// incoming message) and runs any expiries that fall due. Intended to
    /// be called roughly once a second by a [`crate::tick::TickSource`].
    pub fn tick(&self) {
        let wall_now = self.wall_clock.wall_now_s();
        let mut inner = self.inner.lock().unwrap();
        inner.clock.advance_from_tick(wall_now);
        let vnow = inner.clock.now() as u64;
        log::debug!("correlate(): advancing current time because of timer tick utc={}", vnow);
        self.expire_due(&mut inner, vnow);
    }

    /// Builds an independent engine sharing this one's configuration but
    /// starting from an empty store and a freshly-seeded clock — option (b)
    /// of the state-sharing question the original left as a `FIXME`
    /// (`correllate_clone`: "share state between clones!"). Contexts never
    /// move between a parser and its clone.
    pub fn clone_fresh(&self) -> Self
    where
        T: Clone,
        B: Clone,
        E: Clone,
        C: Clone,
    {
        Self::new(
            self.config.clone(),
            self.template.clone(),
            self.synthetic.clone(),
            self.emitter.clone(),
            self.wall_clock.clone(),
        )
    }

    fn join_context(&self, inner: &mut Inner<M>, key_string: String, msg: &M, vnow: u64) {
        let key = CorrelationKey::new(self.config.scope(), key_string, msg);
        let deadline = vnow + self.config.timeout_s();

        match inner.store.lookup(&key) {
            Some(handle) => {
                let num_messages = inner.store.get(handle).map(CorrelationContext::len).unwrap_or(0);
                log::debug!(
                    "correlate(): correlation context lookup successful context={} context_timeout={} context_expiration={} num_messages={}",
                    key,
                    self.config.timeout_s(),
                    deadline,
                    num_messages,
                );
                if let Some(ctx) = inner.store.get_mut(handle) {
                    ctx.push(msg.clone());
                }
                let timer_handle = inner.store.get(handle).and_then(CorrelationContext::timer_handle);
                if let Some(timer_handle) = timer_handle {
                    inner.wheel.modify(timer_handle, deadline);
                }
            }
            None => {
                log::debug!(
                    "correlate(): correlation context lookup failure, starting a new context context={} context_timeout={} context_expiration={}",
                    key,
                    self.config.timeout_s(),
                    deadline,
                );
                let ctx = CorrelationContext::new(key, msg.clone());
                let handle = inner.store.insert(ctx);
                let timer_handle = inner.wheel.add(deadline, handle);
                if let Some(ctx) = inner.store.get_mut(handle) {
                    ctx.set_timer_handle(timer_handle);
                }
            }
        }
    }

    /// Runs every expiry due at or before `vnow`: builds and emits a
    /// synthetic summary for each, then drops the context. Mirrors
    /// `correllate_expire_entry` + `correllate_emit_synthetic`.
    fn expire_due(&self, inner: &mut Inner<M>, vnow: u64) {
        let mut fired = Vec::new();
        inner.wheel.set_time(vnow, |_deadline, handle| fired.push(handle));

        for handle in fired {
            log::debug!("correlate(): expiring correlation context utc={}", vnow);
            if let Some(ctx) = inner.store.get(handle) {
                let synthetic = self.synthetic.build(ctx.messages());
                if let Err(_err) = self.emitter.emit(synthetic) {
                    log::warn!("correlate(): downstream emitter rejected a synthetic message context={}", ctx.key());
                }
            }
            inner.store.remove_by_handle(handle);
        }
    }
}

impl<M, T, B, E, C> Correlator<M, T, B, E, C>
where
    M: LogMessage + Serialize + for<'de> Deserialize<'de>,
    T: TemplateEvaluator<M>,
    B: SyntheticBuilder<M>,
    E: Emitter<M>,
    C: WallClock,
{
    /// Restores whatever state was persisted under [`PERSIST_NAME`] ahead
    /// of a restart (`correllate_init`'s `cfg_persist_config_fetch`). A
    /// missing blob is normal (first start) and leaves the store empty; a
    /// corrupt blob is logged and likewise leaves the store empty rather
    /// than guessing at a partial recovery.
    pub fn init(&self, persistence: &dyn PersistenceStore) {
        let blob = match persistence.fetch(PERSIST_NAME) {
            Some(blob) => blob,
            None => return,
        };

        let state = match PersistedState::<M>::from_blob(&blob) {
            Ok(state) => state,
            Err(_err) => {
                log::warn!("correlate(): persisted state is corrupt, starting with an empty store");
                return;
            }
        };

        let wall_now = self.wall_clock.wall_now_s() as i64;
        let mut inner = self.inner.lock().unwrap();
        for persisted in state.contexts {
            let (ctx, remaining_s) = match rebuild_context(persisted) {
                Some(rebuilt) => rebuilt,
                None => {
                    log::warn!("correlate(): persisted context has no messages, skipping it");
                    continue;
                }
            };
            let deadline = (wall_now + remaining_s).max(0) as u64;
            let handle = inner.store.insert(ctx);
            let timer_handle = inner.wheel.add(deadline, handle);
            if let Some(ctx) = inner.store.get_mut(handle) {
                ctx.set_timer_handle(timer_handle);
            }
        }
    }

    /// Snapshots every open context and hands the encoded blob to
    /// `persistence` under [`PERSIST_NAME`] (`correllate_deinit`'s
    /// `cfg_persist_config_add`). Each context's remaining time is stored as
    /// a delta from "now", not an absolute deadline, so it survives however
    /// long the host stays down.
    pub fn deinit(&self, persistence: &dyn PersistenceStore) {
        let wall_now = self.wall_clock.wall_now_s() as i64;
        let inner = self.inner.lock().unwrap();

        let mut state = PersistedState::new();
        for ctx in inner.store.iter() {
            let remaining_s = ctx
                .timer_handle()
                .and_then(|h| inner.wheel.deadline_of(h))
                .map(|deadline| deadline as i64 - wall_now)
                .unwrap_or(0);
            state.push(PersistedContext {
                scope: ctx.key().scope(),
                key_string: ctx.key().key_string().to_owned(),
                extra: ctx.key().extra().map(str::to_owned),
                messages: ctx.messages().to_vec(),
                remaining_s,
            });
        }
        drop(inner);

        if let Ok(blob) = state.to_blob() {
            persistence.store(PERSIST_NAME, blob);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::MockClock;
    use crate::config::CorrelatorConfigBuilder;
    use crate::error::Error as CorrelateError;

    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Debug, Clone, PartialEq)]
    struct Msg {
        ts_event: i64,
        host: String,
        program: String,
        context_id: Option<String>,
        protected: bool,
        synthetic: bool,
    }

    impl Msg {
        fn new(ts_event: i64, host: &str, program: &str) -> Self {
            Self {
                ts_event,
                host: host.into(),
                program: program.into(),
                context_id: None,
                protected: false,
                synthetic: false,
            }
        }
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
        fn set_context_id(&mut self, context_id: &str) {
            self.context_id = Some(context_id.to_owned());
        }
        fn write_protect(&mut self) {
            self.protected = true;
        }
    }

    /// Groups messages by program name: `key(...)` evaluating to
    /// `"group:$PROGRAM"`.
    #[derive(Clone)]
    struct ByProgram;

    impl TemplateEvaluator<Msg> for ByProgram {
        fn evaluate(&self, msg: &Msg) -> Result<String, CorrelateError<()>> {
            Ok(format!("group:{}", msg.program()))
        }
    }

    #[derive(Clone)]
    struct JoinMessages;

    impl SyntheticBuilder<Msg> for JoinMessages {
        fn build(&self, messages: &[Msg]) -> Msg {
            let first = &messages[0];
            let last = messages.last().unwrap();
            Msg {
                ts_event: last.ts_event,
                host: first.host.clone(),
                program: first.program.clone(),
                context_id: first.context_id.clone(),
                protected: false,
                synthetic: true,
            }
        }
    }

    #[derive(Clone, Default)]
    struct Sink {
        emitted: Arc<StdMutex<Vec<Msg>>>,
    }

    impl Sink {
        fn emitted(&self) -> Vec<Msg> {
            self.emitted.lock().unwrap().clone()
        }
    }

    impl Emitter<Msg> for Sink {
        fn emit(&self, msg: Msg) -> Result<(), CorrelateError<Msg>> {
            self.emitted.lock().unwrap().push(msg);
            Ok(())
        }
    }

    fn engine_at(
        start_s: f64,
        timeout_s: u64,
    ) -> (Correlator<Msg, ByProgram, JoinMessages, Sink, Arc<MockClock>>, Sink, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new(start_s));
        let sink = Sink::default();
        let config = CorrelatorConfigBuilder::new().timeout_s(timeout_s).build().unwrap();
        let engine = Correlator::new(config, Some(ByProgram), JoinMessages, sink.clone(), clock.clone());
        (engine, sink, clock)
    }

    #[test]
    fn single_group_expires_once_after_timeout() {
        let (engine, sink, clock) = engine_at(0.0, 10);

        let out1 = engine.process(Msg::new(0, "db1", "kernel"));
        assert!(out1.protected);
        let out2 = engine.process(Msg::new(5, "db1", "kernel"));
        assert!(out2.protected);

        clock.set(21.0);
        engine.tick();

        let emitted = sink.emitted();
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].synthetic);
        assert_eq!(emitted[0].ts_event, 5);
    }

    #[test]
    fn new_message_slides_the_deadline() {
        let (engine, sink, clock) = engine_at(0.0, 10);

        engine.process(Msg::new(0, "db1", "kernel"));

        clock.set(9.0);
        engine.tick();
        assert!(sink.emitted().is_empty(), "must not expire before the original deadline");

        // A new message at t=9 slides the deadline to 19.
        engine.process(Msg::new(9, "db1", "kernel"));

        clock.set(15.0);
        engine.tick();
        assert!(sink.emitted().is_empty(), "slid deadline must not have passed yet");

        clock.set(20.0);
        engine.tick();
        let emitted = sink.emitted();
        assert_eq!(emitted.len(), 1);
    }

    #[test]
    fn independent_keys_expire_independently() {
        let (engine, sink, clock) = engine_at(0.0, 10);

        engine.process(Msg::new(0, "db1", "kernel"));
        engine.process(Msg::new(0, "db1", "httpd"));

        clock.set(11.0);
        engine.tick();

        let emitted = sink.emitted();
        assert_eq!(emitted.len(), 2, "both independent contexts expire");
    }

    #[test]
    fn distinct_contexts_emit_in_nondecreasing_deadline_order() {
        let (engine, sink, clock) = engine_at(0.0, 10);

        // "progA"'s last message (t=2) gives it a deadline of 12; "progB"'s
        // last message (t=3) gives it a deadline of 13. A single tick that
        // crosses both deadlines at once must still emit progA's synthetic
        // before progB's, per spec.md §5's ordering guarantee ("synthetic
        // messages for distinct contexts are emitted in non-decreasing
        // order of their deadlines, not arrival order").
        engine.process(Msg::new(0, "db1", "progA"));
        engine.process(Msg::new(1, "db1", "progB"));
        engine.process(Msg::new(2, "db1", "progA"));
        engine.process(Msg::new(3, "db1", "progB"));

        clock.set(13.0);
        engine.tick();

        let emitted = sink.emitted();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].program, "progA", "earlier deadline must emit first");
        assert_eq!(emitted[1].program, "progB");
    }

    #[test]
    fn future_dated_message_is_clamped_to_wall_time() {
        let (engine, sink, clock) = engine_at(0.0, 10);

        // Message claims to be from t=10_000, far in the future; the
        // virtual clock must clamp to wall time (0), not jump ahead.
        engine.process(Msg::new(10_000, "db1", "kernel"));

        clock.set(5.0);
        engine.tick();
        assert!(sink.emitted().is_empty(), "deadline must be based on wall time, not the bogus future timestamp");

        clock.set(11.0);
        engine.tick();
        assert_eq!(sink.emitted().len(), 1);
    }

    #[test]
    fn past_dated_message_still_joins_its_context() {
        let (engine, _sink, clock) = engine_at(100.0, 10);

        engine.process(Msg::new(100, "db1", "kernel"));
        clock.set(105.0);
        // A late message (ts_event in the past relative to vnow) must not
        // rewind the clock, but it still joins the existing context.
        let out = engine.process(Msg::new(50, "db1", "kernel"));
        assert!(out.protected);
    }

    #[test]
    fn disabled_correlation_passes_messages_through_unmodified() {
        let clock = Arc::new(MockClock::new(0.0));
        let sink = Sink::default();
        let config = CorrelatorConfigBuilder::new().timeout_s(10).build().unwrap();
        let engine: Correlator<Msg, ByProgram, JoinMessages, Sink, Arc<MockClock>> =
            Correlator::new(config, None, JoinMessages, sink.clone(), clock);

        let out = engine.process(Msg::new(0, "db1", "kernel"));
        assert!(!out.protected);
        assert!(out.context_id.is_none());
    }

    #[test]
    fn clone_fresh_starts_with_an_empty_store() {
        let (engine, _sink, _clock) = engine_at(0.0, 10);
        engine.process(Msg::new(0, "db1", "kernel"));

        let clone = engine.clone_fresh();
        let inner = clone.inner.lock().unwrap();
        assert!(inner.store.is_empty());
    }
}
