//! Session lifecycle.
//!
//! - `timer`   → inactivity timer with warning countdown
//! - `context` → login, restore, logout and timeout handling

pub mod context;
pub mod timer;

pub use context::{token_expired, token_expiry, SessionContext, SessionNotice, SESSION_KEY};
pub use timer::{
    ActivityEvent, ActivityKind, ActivityOutcome, DebounceConfig, IgnoreReason, InactivityTimer,
    PointerButton, TimerCallbacks, TimerConfig, TimerSnapshot, TimerState,
};
