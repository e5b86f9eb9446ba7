#![doc(html_root_url = "https://docs.rs/correlate/0.1")]

//! *correlate* - a stateful log-correlation engine.
//!
//! Groups incoming messages into time-bounded contexts keyed by a
//! user-supplied expression, and emits a synthetic summary message once a
//! context has seen no new messages for its configured timeout. A direct
//! descendant of syslog-ng's `correllate()` parser, rebuilt around an
//! explicit handle/arena store in place of the original's hand-rolled
//! refcounted pointers.
//!
//! The engine itself ([`Correlator`]) is generic over the host's message
//! type and its three collaborators — [`TemplateEvaluator`],
//! [`SyntheticBuilder`] and [`Emitter`] — so it never depends on a concrete
//! log message format or pipeline.
//!
//! ```
//! use correlate::{Correlator, CorrelatorConfigBuilder, Scope};
//!
//! let config = CorrelatorConfigBuilder::new()
//!     .scope("host")
//!     .timeout_s(60)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.scope(), Scope::Host);
//! ```

pub use failure;

mod clock;
mod config;
mod context;
mod engine;
mod error;
mod key;
mod message;
mod persist;
mod store;
mod tick;

pub use clock::{MockClock, SystemClock, VirtualClock, WallClock};
pub use config::{CorrelatorConfig, CorrelatorConfigBuilder};
pub use context::CorrelationContext;
pub use engine::Correlator;
pub use error::{Error, ErrorKind};
pub use key::{CorrelationKey, Scope};
pub use message::{Emitter, LogMessage, SyntheticBuilder, TemplateEvaluator};
pub use persist::{PersistedContext, PersistedState, PersistenceStore, PERSIST_NAME};
pub use store::CorrelationStore;
pub use tick::{ManualTicker, ThreadTicker, TickSource};

/// A "prelude" for users of the *correlate* crate.
///
/// ```
/// use correlate::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Emitter, LogMessage, SyntheticBuilder, TemplateEvaluator, TickSource, WallClock};
}
