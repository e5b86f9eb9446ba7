//! [`CorrelatorConfig`]: the user-facing knobs from spec.md §6, assembled
//! through a builder the way `libzmq`'s socket configs are.

use crate::error::{Error, ErrorKind};
use crate::key::Scope;

use serde::{Deserialize, Serialize};

use std::str::FromStr;

/// The validated configuration of one [`crate::engine::Correlator`].
///
/// Built exclusively through [`CorrelatorConfigBuilder::build`], which is
/// the only place `timeout` and `scope` are checked — every other field of
/// the engine trusts a `CorrelatorConfig` to already be valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    key: Option<String>,
    scope: Scope,
    timeout_s: u64,
    prefix: Option<String>,
    synthetic_message: Option<String>,
}

impl CorrelatorConfig {
    /// The `key(...)` template string, evaluated once per message by a
    /// [`crate::message::TemplateEvaluator`]. `None` means the engine
    /// passes every message through unmodified (spec.md §3's "no key
    /// configured" case).
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// The inactivity timeout, in whole seconds, after which an open
    /// context with no new messages is expired.
    pub fn timeout_s(&self) -> u64 {
        self.timeout_s
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn synthetic_message(&self) -> Option<&str> {
        self.synthetic_message.as_deref()
    }
}

/// Accumulates [`CorrelatorConfig`] fields before validation.
#[derive(Debug, Default, Clone)]
pub struct CorrelatorConfigBuilder {
    key: Option<String>,
    scope: Option<String>,
    timeout_s: Option<u64>,
    prefix: Option<String>,
    synthetic_message: Option<String>,
}

impl CorrelatorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key<S: Into<String>>(&mut self, key: S) -> &mut Self {
        self.key = Some(key.into());
        self
    }

    pub fn scope<S: Into<String>>(&mut self, scope: S) -> &mut Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn timeout_s(&mut self, timeout_s: u64) -> &mut Self {
        self.timeout_s = Some(timeout_s);
        self
    }

    pub fn prefix<S: Into<String>>(&mut self, prefix: S) -> &mut Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn synthetic_message<S: Into<String>>(&mut self, template: S) -> &mut Self {
        self.synthetic_message = Some(template.into());
        self
    }

    /// Validates and freezes the configuration.
    ///
    /// `timeout` is required: without it there is no deadline to schedule a
    /// context's expiry against. `scope`, when given, must name a known
    /// [`Scope`] variant. Both failures are local, recoverable
    /// configuration errors (spec.md §7) the caller is expected to report
    /// and refuse to start the engine over.
    pub fn build(&self) -> Result<CorrelatorConfig, Error<()>> {
        let timeout_s = self
            .timeout_s
            .ok_or_else(|| Error::new(ErrorKind::MissingTimeout))?;

        let scope = match &self.scope {
            Some(s) => Scope::from_str(s)?,
            None => Scope::default(),
        };

        Ok(CorrelatorConfig {
            key: self.key.clone(),
            scope,
            timeout_s,
            prefix: self.prefix.clone(),
            synthetic_message: self.synthetic_message.clone(),
        })
    }
}
