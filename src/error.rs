//! Error types for Turnstile.
//!
//! Two families live here. `TurnstileError` covers loading and wiring
//! (configuration files, policy YAML, I/O). `AdmissionError` is what the
//! admission pipeline produces per request: either a structured
//! [`Rejection`] or a failure of the external store.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Main error type for configuration and setup.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Policy file could not be parsed
    #[error("Policy error: {0}")]
    Policy(String),

    /// A background task ended abnormally
    #[error("Background task error: {0}")]
    Task(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile setup operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

/// HTTP-style class of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Caller exceeded a rate limit (429).
    RateLimited,
    /// Caller is banned or the account is deleted (403).
    Forbidden,
    /// Caller identity does not resolve to a user (404).
    NotFound,
}

impl StatusClass {
    /// The HTTP status code this class maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            StatusClass::RateLimited => 429,
            StatusClass::Forbidden => 403,
            StatusClass::NotFound => 404,
        }
    }

    /// Whether the caller can succeed by simply retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusClass::RateLimited)
    }
}

/// The pipeline stage that produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    IdentityResolved,
    EndpointLimitChecked,
    GlobalLimitChecked,
    BanChecked,
    HandlerInvoked,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::IdentityResolved => "identity_resolved",
            Stage::EndpointLimitChecked => "endpoint_limit_checked",
            Stage::GlobalLimitChecked => "global_limit_checked",
            Stage::BanChecked => "ban_checked",
            Stage::HandlerInvoked => "handler_invoked",
        };
        f.write_str(name)
    }
}

/// A structured, caller-facing rejection.
///
/// For rate-limit rejections `retry_after_secs` is always set and the same
/// number is embedded in `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub status: StatusClass,
    /// The check that rejected (the stage that would have been reached next).
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl Rejection {
    pub fn rate_limited(stage: Stage, message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self {
            status: StatusClass::RateLimited,
            stage,
            message: message.into(),
            retry_after_secs: Some(retry_after_secs),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusClass::Forbidden,
            stage: Stage::BanChecked,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusClass::NotFound,
            stage: Stage::BanChecked,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// HTTP status code for this rejection.
    pub fn status_code(&self) -> u16 {
        self.status.status_code()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code(), self.message)
    }
}

/// Failure reported by the external user/ban store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the query failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The lookup was abandoned before it completed.
    #[error("store lookup cancelled")]
    Cancelled,
}

/// Per-request admission failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// One of the admission checks rejected the request.
    #[error("{0}")]
    Rejected(Rejection),

    /// Bans could not be verified. Retryable, and never treated as a ban.
    #[error("could not verify access: {0}")]
    Store(#[from] StoreError),
}

impl AdmissionError {
    /// The rejection, if this error is one.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AdmissionError::Rejected(rejection) => Some(rejection),
            AdmissionError::Store(_) => None,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdmissionError::Rejected(rejection) => rejection.status.is_retryable(),
            AdmissionError::Store(_) => true,
        }
    }
}

impl From<Rejection> for AdmissionError {
    fn from(rejection: Rejection) -> Self {
        AdmissionError::Rejected(rejection)
    }
}
