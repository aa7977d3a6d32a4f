//! Decoding of API error responses.
//!
//! The backend reports failures with a uniform JSON body:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "VALIDATION_FAILED",
//!     "message": "Customer could not be saved",
//!     "details": { "fields": { "phone": "must be 10 digits" } }
//!   }
//! }
//! ```
//!
//! [`error_from_response`] turns a status code plus that body into an
//! [`AdminError`]. Bodies that do not follow the format still produce a
//! sensible error derived from the status alone.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{AdminError, FieldErrors};

/// Machine-readable error codes returned by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    /// Request payload failed validation
    ValidationFailed,
    /// Missing, malformed or expired bearer token
    Unauthorized,
    /// Authenticated but not allowed
    Forbidden,
    /// Record does not exist
    NotFound,
    /// Record conflicts with existing data (e.g. duplicate username)
    Conflict,
    /// Too many requests
    RateLimited,
    /// Unexpected server failure
    InternalError,
    /// Backend temporarily unavailable
    ServiceUnavailable,
    /// Unknown error code (forward compatibility)
    #[serde(other)]
    Unknown,
}

impl ApiErrorCode {
    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ApiErrorCode::ValidationFailed => "Some fields are invalid",
            ApiErrorCode::Unauthorized => "Please sign in again",
            ApiErrorCode::Forbidden => "You do not have permission to do that",
            ApiErrorCode::NotFound => "Record not found",
            ApiErrorCode::Conflict => "Record already exists",
            ApiErrorCode::RateLimited => "Too many requests, try again shortly",
            ApiErrorCode::InternalError => "Internal server error",
            ApiErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ApiErrorCode::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default_message())
    }
}

/// The inner error body of an API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: ApiErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// API error response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

impl ApiErrorResponse {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_fields(message: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        let map: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v)))
            .collect();
        Self {
            error: ApiErrorBody {
                code: ApiErrorCode::ValidationFailed,
                message: message.into(),
                details: Some(serde_json::json!({ "fields": map })),
            },
        }
    }
}

/// Pull per-field messages out of `details.fields`, or `details.field` +
/// message for single-field errors.
fn field_errors(body: &ApiErrorBody) -> FieldErrors {
    let mut fields = FieldErrors::new();
    let Some(details) = &body.details else {
        return fields;
    };

    if let Some(map) = details.get("fields").and_then(|f| f.as_object()) {
        for (name, message) in map {
            let text = match message {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Array(items) => items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.to_string(),
            };
            fields.add(name.clone(), text);
        }
    } else if let Some(name) = details.get("field").and_then(|f| f.as_str()) {
        fields.add(name, body.message.clone());
    }

    fields
}

/// Convert a non-success response into an [`AdminError`].
pub fn error_from_response(status: StatusCode, body: &str) -> AdminError {
    let parsed = serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .map(|r| r.error);

    let message = parsed
        .as_ref()
        .map(|b| b.message.clone())
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string()
        });

    let code = parsed.as_ref().map(|b| b.code);

    match (status, code) {
        (_, Some(ApiErrorCode::ValidationFailed))
        | (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, _) => {
            let fields = parsed.as_ref().map(field_errors).unwrap_or_default();
            AdminError::Validation { message, fields }
        }
        (StatusCode::UNAUTHORIZED, _) | (_, Some(ApiErrorCode::Unauthorized)) => {
            AdminError::Unauthorized(message)
        }
        (StatusCode::FORBIDDEN, _) | (_, Some(ApiErrorCode::Forbidden)) => {
            AdminError::Forbidden(message)
        }
        (StatusCode::NOT_FOUND, _) | (_, Some(ApiErrorCode::NotFound)) => {
            AdminError::NotFound(message)
        }
        (StatusCode::CONFLICT, _) | (_, Some(ApiErrorCode::Conflict)) => {
            AdminError::Conflict(message)
        }
        (StatusCode::TOO_MANY_REQUESTS, _) | (_, Some(ApiErrorCode::RateLimited)) => {
            AdminError::RateLimited(message)
        }
        _ => AdminError::Server {
            status: status.as_u16(),
            message,
        },
    }
}
