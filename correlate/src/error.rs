use failure::{Backtrace, Context, Fail};

use std::fmt::{self, Debug, Display};

/// An error with a kind and, when the failure left something behind that
/// the caller should get back (an unconsumed message, say), its content.
///
/// Every fallible [`Correlator`](crate::Correlator) operation that can fail
/// without being locally recoverable returns this. Most failures named by
/// [`ErrorKind`] *are* locally recoverable (see each variant's docs) and
/// never reach the caller as an `Err` at all — they are logged and the
/// engine falls back to pass-through behavior instead.
///
/// # Usage example
/// ```
/// use correlate::{Error, ErrorKind};
///
/// let err: Error<()> = Error::new(ErrorKind::MissingTimeout);
/// assert_eq!(err.kind(), ErrorKind::MissingTimeout);
/// ```
#[derive(Debug)]
pub struct Error<T>
where
    T: 'static + Send + Sync + Debug,
{
    inner: Context<ErrorKind>,
    content: Option<T>,
}

impl<T> Error<T>
where
    T: 'static + Send + Sync + Debug,
{
    /// Creates a new error of `kind` with no content.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            inner: Context::new(kind),
            content: None,
        }
    }

    /// Creates a new error of `kind`, carrying back `content`.
    pub fn with_content(kind: ErrorKind, content: T) -> Self {
        Self {
            inner: Context::new(kind),
            content: Some(content),
        }
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> ErrorKind {
        *self.inner.get_context()
    }

    /// Returns a reference to the content held by the error, if any.
    pub fn content(&self) -> Option<&T> {
        self.content.as_ref()
    }

    /// Takes the content held by the error, if any.
    pub fn take_content(&mut self) -> Option<T> {
        self.content.take()
    }
}

impl<T> Fail for Error<T>
where
    T: 'static + Send + Sync + Debug,
{
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl<T> Display for Error<T>
where
    T: 'static + Send + Sync + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

/// Gives context to an [`Error`].
///
/// This error type is non-exhaustive in spirit: a `match` on `ErrorKind`
/// should always carry a wildcard arm, since the taxonomy may grow.
///
/// Every variant documents whether the engine recovers from it locally
/// (logs and carries on, per the correlator's best-effort contract) or
/// surfaces it to the host as fatal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Fail, Hash)]
pub enum ErrorKind {
    /// The `key(...)` template failed to evaluate against a message.
    ///
    /// Locally recovered: the message is forwarded unmodified and no
    /// context is created or touched for it.
    #[fail(display = "context key template failed to evaluate")]
    TemplateFailed,
    /// Inserting a new context into the store, or scheduling its expiry
    /// timer, failed (for instance, a resource limit was hit).
    ///
    /// Locally recovered: a diagnostic is logged, correlation is dropped
    /// for that message, and the message is forwarded unmodified.
    #[fail(display = "failed to allocate a correlation context")]
    AllocFailure,
    /// The persisted correlation state could not be decoded on `init`.
    ///
    /// Locally recovered: the engine starts with an empty store and logs a
    /// warning; no contexts survive the restart in this case.
    #[fail(display = "persisted correlation state is corrupt")]
    PersistCorrupt,
    /// No `timeout(...)` was configured.
    ///
    /// Fatal: surfaced to the host, which must refuse to start the stage.
    #[fail(display = "correlate() requires a timeout")]
    MissingTimeout,
    /// An unrecognized scope name was configured.
    ///
    /// Fatal: surfaced to the host, which must refuse to start the stage.
    #[fail(display = "invalid scope: {}", name)]
    InvalidScope {
        /// The offending scope name, as configured.
        name: &'static str,
    },
    /// The downstream emitter reported failure while accepting a synthetic
    /// message produced on context expiry.
    ///
    /// Locally recovered: the core treats emission as fire-and-forget, so
    /// this is logged and the context is removed regardless.
    #[fail(display = "downstream emitter rejected a synthetic message")]
    DownstreamFailed,
}
