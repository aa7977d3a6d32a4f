//! Error types for the pawn-shop admin client.
//!
//! Every fallible operation in the crate returns [`AdminResult`]. Errors are
//! grouped into [`ErrorCategory`] values so a front end can decide how to
//! surface them: a retry affordance for transport failures, inline messages
//! for validation failures, and a redirect to login for authorization
//! failures.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::session::timer::TimerState;

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `field`. The first message recorded wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Convert into `Ok(())` when empty, otherwise a validation error.
    pub fn into_result(self) -> AdminResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AdminError::Validation {
                message: "one or more fields are invalid".to_string(),
                fields: self,
            })
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// How an error should be presented to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network or server failure; offer a retry.
    Transport,
    /// Bad input; show next to the offending field.
    Validation,
    /// Missing or rejected credentials; send the user back to login.
    Authorization,
    /// The requested record does not exist.
    NotFound,
    /// Local configuration, storage or decoding problem.
    Local,
    /// The operation was superseded or cancelled.
    Cancelled,
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("validation failed: {message}")]
    Validation { message: String, fields: FieldErrors },

    #[error("not authenticated: {0}")]
    Unauthorized(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("session expired")]
    SessionExpired,

    #[error("cannot {operation} while timer is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: TimerState,
    },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("storage error: {0}")]
    StorageError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type AdminResult<T> = Result<T, AdminError>;

impl AdminError {
    /// Build a validation error for a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = FieldErrors::new();
        fields.add(field, message.clone());
        AdminError::Validation { message, fields }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AdminError::Network(_)
            | AdminError::Timeout
            | AdminError::Server { .. }
            | AdminError::RateLimited(_) => ErrorCategory::Transport,
            AdminError::Validation { .. } | AdminError::Conflict(_) => ErrorCategory::Validation,
            AdminError::Unauthorized(_)
            | AdminError::Forbidden(_)
            | AdminError::SessionExpired => ErrorCategory::Authorization,
            AdminError::NotFound(_) => ErrorCategory::NotFound,
            AdminError::InvalidTransition { .. }
            | AdminError::ConfigError(_)
            | AdminError::StorageError(_)
            | AdminError::Serialization(_) => ErrorCategory::Local,
            AdminError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether repeating the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdminError::Network(_) | AdminError::Timeout | AdminError::RateLimited(_) => true,
            AdminError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the user has to sign in again before continuing.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AdminError::Unauthorized(_) | AdminError::SessionExpired
        )
    }

    /// Field-level messages, if this is a validation error.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            AdminError::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AdminError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdminError::Timeout
        } else if err.is_decode() {
            AdminError::Server {
                status: err.status().map(|s| s.as_u16()).unwrap_or(200),
                message: format!("malformed response body: {err}"),
            }
        } else {
            AdminError::Network(err.to_string())
        }
    }
}

impl From<config::ConfigError> for AdminError {
    fn from(err: config::ConfigError) -> Self {
        AdminError::ConfigError(err.to_string())
    }
}
