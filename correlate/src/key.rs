//! [`CorrelationKey`] and [`Scope`]: how messages are grouped into contexts.

use crate::{error::ErrorKind, message::LogMessage, Error};

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Which intrinsic message fields are mixed into a [`CorrelationKey`]
/// alongside the user-supplied key string.
///
/// Mirrors `RCS_PROCESS`/`RCS_HOST`/`RCS_PROGRAM`/`RCS_GLOBAL` in the
/// original correlation parser. Two messages whose `key(...)` template
/// expands to the same string can still land in different contexts if
/// their scope-derived fields differ.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Mixes in host, program and pid: only messages from the exact same
    /// process instance share a context.
    Process,
    /// Mixes in the source host only.
    Host,
    /// Mixes in the program name only.
    Program,
    /// No extra fields; the key string alone determines the context.
    Global,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Global
    }
}

impl FromStr for Scope {
    type Err = Error<()>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(Scope::Process),
            "host" => Ok(Scope::Host),
            "program" => Ok(Scope::Program),
            "global" => Ok(Scope::Global),
            _ => Err(Error::new(ErrorKind::InvalidScope {
                name: "unrecognized scope",
            })),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Scope::Process => "process",
            Scope::Host => "host",
            Scope::Program => "program",
            Scope::Global => "global",
        };
        f.write_str(name)
    }
}

/// The immutable, composite identity of a correlation context.
///
/// Equality and hashing depend only on `scope`, `key_string` and whatever
/// `scope` says to mix in — never on anything else about the message that
/// produced it. Built once, at first-message time, via [`CorrelationKey::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    scope: Scope,
    key_string: String,
    /// The scope-derived identifiers, already folded into one comparable
    /// string (or absent, for [`Scope::Global`]).
    extra: Option<String>,
}

impl CorrelationKey {
    /// Composes a key for `msg` under `scope`, given the already-evaluated
    /// `key_string` (the `key(...)` template's output).
    pub fn new<M: LogMessage>(scope: Scope, key_string: String, msg: &M) -> Self {
        let extra = match scope {
            Scope::Global => None,
            Scope::Host => Some(msg.host().to_owned()),
            Scope::Program => Some(msg.program().to_owned()),
            Scope::Process => Some(format!(
                "{}\u{1}{}\u{1}{}",
                msg.host(),
                msg.program(),
                msg.pid().unwrap_or("")
            )),
        };
        Self {
            scope,
            key_string,
            extra,
        }
    }

    /// Rebuilds a key from its already-computed parts, bypassing
    /// [`new`](Self::new)'s scope-derivation logic. Used when restoring
    /// persisted state, where `extra` was already folded once and there is
    /// no live message to re-derive it from.
    pub fn from_parts(scope: Scope, key_string: String, extra: Option<String>) -> Self {
        Self {
            scope,
            key_string,
            extra,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn key_string(&self) -> &str {
        &self.key_string
    }

    /// The scope-derived identifiers folded into this key, if any. Exposed
    /// for persisting a key in a form [`from_parts`](Self::from_parts) can
    /// later rebuild exactly, without needing the original message.
    pub fn extra(&self) -> Option<&str> {
        self.extra.as_deref()
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.key_string)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone)]
    struct Msg {
        host: String,
        program: String,
    }

    impl LogMessage for Msg {
        fn ts_event(&self) -> i64 {
            0
        }
        fn host(&self) -> &str {
            &self.host
        }
        fn program(&self) -> &str {
            &self.program
        }
        fn set_context_id(&mut self, _id: &str) {}
        fn write_protect(&mut self) {}
    }

    #[test]
    fn global_scope_ignores_host() {
        let a = Msg {
            host: "a".into(),
            program: "p".into(),
        };
        let b = Msg {
            host: "b".into(),
            program: "p".into(),
        };
        let ka = CorrelationKey::new(Scope::Global, "k".into(), &a);
        let kb = CorrelationKey::new(Scope::Global, "k".into(), &b);
        assert_eq!(ka, kb);
    }

    #[test]
    fn host_scope_distinguishes_hosts() {
        let a = Msg {
            host: "a".into(),
            program: "p".into(),
        };
        let b = Msg {
            host: "b".into(),
            program: "p".into(),
        };
        let ka = CorrelationKey::new(Scope::Host, "k".into(), &a);
        let kb = CorrelationKey::new(Scope::Host, "k".into(), &b);
        assert_ne!(ka, kb);
    }

    #[test]
    fn scope_from_str_rejects_unknown() {
        assert!("bogus".parse::<Scope>().is_err());
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
    }
}
