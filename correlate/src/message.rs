//! The external collaborators the correlation engine reads from and writes
//! to, expressed as traits so the engine never needs to know the host's
//! concrete message type.

use crate::error::Error;

use std::fmt::Debug;

/// A message flowing through the pipeline stage that owns the correlator.
///
/// The engine only ever touches the handful of fields below — timestamp,
/// the scope-derived identity fields, and the one field it writes back.
/// Everything else about a real log message (its raw text, its other
/// fields, its transport) is the host's concern.
///
/// `Sync + Debug` are required on top of the obvious `Clone + Send`
/// because [`Error<T>`] (used by [`Emitter::emit`] below) demands them of
/// whatever content it carries back to the caller.
pub trait LogMessage: Clone + Send + Sync + Debug + 'static {
    /// Seconds-resolution event timestamp, used to advance the virtual
    /// clock (see [`crate::clock::VirtualClock::advance_from_message`]).
    fn ts_event(&self) -> i64;

    /// The message's source host, used by [`Scope::Host`](crate::Scope::Host)
    /// and [`Scope::Process`](crate::Scope::Process).
    fn host(&self) -> &str;

    /// The message's originating program name, used by
    /// [`Scope::Program`](crate::Scope::Program) and
    /// [`Scope::Process`](crate::Scope::Process).
    fn program(&self) -> &str;

    /// The originating process id, if known, used by
    /// [`Scope::Process`](crate::Scope::Process).
    fn pid(&self) -> Option<&str> {
        None
    }

    /// Writes the derived context id into the well-known
    /// `.classifier.context_id` attribute (spec field injected by the
    /// engine on every message that joins a context).
    fn set_context_id(&mut self, context_id: &str);

    /// Marks the message read-only: once a message has joined a context and
    /// is referenced by a live synthetic-emission candidate, nothing
    /// downstream of the correlator may mutate it in a way the correlator
    /// would not observe.
    fn write_protect(&mut self);
}

/// Evaluates the `key(...)` template against a message to produce the
/// string that seeds a [`CorrelationKey`](crate::CorrelationKey).
///
/// A real implementation expands a user-authored template string; this
/// trait only describes the seam the engine calls through. Failing to
/// evaluate is expected and non-fatal — see [`ErrorKind::TemplateFailed`].
pub trait TemplateEvaluator<M: LogMessage> {
    fn evaluate(&self, msg: &M) -> Result<String, Error<()>>;
}

/// Builds a synthetic summary message from an expired context.
///
/// Mirrors `synthetic_message_generate_with_context` in the original: given
/// the context's accumulated messages (in arrival order) and whatever
/// template configuration the host holds, produce one new message that
/// inherits values from the group.
pub trait SyntheticBuilder<M: LogMessage> {
    fn build(&self, messages: &[M]) -> M;
}

/// Hands a synthetic message to the rest of the pipeline.
///
/// Called while the engine lock is held (see the crate-level docs); must
/// not block on that lock itself. A real implementation typically hands off
/// to its own queue rather than processing synchronously.
pub trait Emitter<M: LogMessage> {
    fn emit(&self, msg: M) -> Result<(), Error<M>>;
}
