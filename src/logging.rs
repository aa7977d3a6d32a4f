//! Structured logging for the admin client.
//!
//! Session lifecycle changes go through [`log_session_event`] so they share one
//! span layout; everything else uses plain `tracing` macros. Binaries call
//! [`init_logging`] once at startup.

use std::str::FromStr;

use tracing::{info, info_span, warn, Level};
use uuid::Uuid;

use crate::config::LoggingConfig;
use crate::errors::{AdminError, AdminResult};

/// Session lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials accepted, session started
    LoggedIn,
    /// Session restored from storage
    Restored,
    /// Explicit logout
    LoggedOut,
    /// Warning countdown became visible
    WarningShown,
    /// User chose to stay signed in
    Extended,
    /// Inactivity timeout fired
    TimedOut,
    /// Stored token was rejected or had expired
    Rejected,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionEvent::LoggedIn => "logged_in",
            SessionEvent::Restored => "restored",
            SessionEvent::LoggedOut => "logged_out",
            SessionEvent::WarningShown => "warning_shown",
            SessionEvent::Extended => "extended",
            SessionEvent::TimedOut => "timed_out",
            SessionEvent::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Log a session state change.
///
/// # Arguments
///
/// * `event` - The type of session event
/// * `username` - The user the session belongs to
/// * `details` - Optional additional details about the event
pub fn log_session_event(event: SessionEvent, username: &str, details: Option<&str>) {
    let span = info_span!(
        "session_event",
        event = %event,
        username = %username,
    );
    let _enter = span.enter();

    match event {
        SessionEvent::TimedOut | SessionEvent::Rejected => {
            if let Some(d) = details {
                warn!(reason = %d, "Session event occurred");
            } else {
                warn!("Session event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "Session event occurred");
            } else {
                info!("Session event occurred");
            }
        }
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parse a configured level name.
pub fn parse_level(level: &str) -> AdminResult<Level> {
    Level::from_str(level.trim())
        .map_err(|_| AdminError::ConfigError(format!("unknown log level '{level}'")))
}

/// Install the global `tracing` subscriber.
///
/// Does nothing when logging is disabled. Calling it twice is harmless; the
/// second subscriber is rejected and the first stays in place.
pub fn init_logging(config: &LoggingConfig) -> AdminResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let level = parse_level(&config.level)?;
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_valid_uuid() {
        let id = generate_request_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        assert!(parse_level("chatty").is_err());
    }

    #[test]
    fn disabled_logging_is_noop() {
        let config = LoggingConfig::default();
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(SessionEvent::TimedOut.to_string(), "timed_out");
        assert_eq!(SessionEvent::WarningShown.to_string(), "warning_shown");
    }
}
