//! Limit key generation.

use std::fmt;

/// Scope used for the per-identity global window.
pub const GLOBAL_SCOPE: &str = "_global";

/// A key that identifies one limiter entry: who is calling and what they
/// are calling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    /// API key, user id or network address
    pub identity: String,
    /// Endpoint name, or [`GLOBAL_SCOPE`]
    pub scope: String,
}

impl LimitKey {
    pub fn new(identity: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            scope: scope.into(),
        }
    }

    /// The key of the global window for an identity.
    pub fn global(identity: impl Into<String>) -> Self {
        Self::new(identity, GLOBAL_SCOPE)
    }

    /// Whether this is a global-window key.
    pub fn is_global(&self) -> bool {
        self.scope == GLOBAL_SCOPE
    }

}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.identity, self.scope)
    }
}
