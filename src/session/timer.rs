//! Inactivity timer with a final warning countdown.
//!
//! ```text
//!   Idle ──start──▶ Active ──(timeout - lead)──▶ Warning ──(timeout)──▶ Expired
//!                    ▲  │ activity                  │
//!                    │  └───────┘                   │ extend_session
//!                    └──────────────────────────────┘
//! ```
//!
//! `stop()` returns to `Idle` from any state. `Expired` is terminal until the
//! timer is stopped and started again.
//!
//! Each armed countdown runs as one Tokio task tagged with a generation
//! number. Re-arming aborts the previous task and bumps the generation, and a
//! task that wakes with a stale generation does nothing, so a timeout can fire
//! late but never early and never twice. Callbacks run with no lock held and
//! may call back into the timer.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::config::SessionConfig;
use crate::errors::{AdminError, AdminResult};

/// Interval of the countdown callback while the warning is visible.
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

pub type Callback = Arc<dyn Fn() + Send + Sync>;
pub type RemainingCallback = Arc<dyn Fn(Duration) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Active,
    Warning,
    Expired,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimerState::Idle => "idle",
            TimerState::Active => "active",
            TimerState::Warning => "warning",
            TimerState::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Per-kind debounce windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Pointer movement and scrolling
    pub continuous: Duration,
    /// Clicks, key presses and touches
    pub discrete: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            continuous: Duration::from_millis(1000),
            discrete: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Total inactivity period before `on_timeout`
    pub timeout: Duration,
    /// Length of the final warning countdown
    pub warning_lead: Duration,
    pub enabled: bool,
    /// Let a trusted key press, primary click or touch end the warning.
    /// Pointer movement and scrolling never do.
    pub activity_exits_warning: bool,
    pub debounce: DebounceConfig,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for TimerConfig {
    fn from(session: &SessionConfig) -> Self {
        Self {
            timeout: session.timeout(),
            warning_lead: session.warning_lead(),
            enabled: session.timer_enabled,
            activity_exits_warning: session.activity_exits_warning,
            debounce: DebounceConfig::default(),
        }
    }
}

/// Callbacks invoked by the timer. All are optional.
#[derive(Clone, Default)]
pub struct TimerCallbacks {
    on_timeout: Option<Callback>,
    on_warning: Option<RemainingCallback>,
    on_activity: Option<Callback>,
    on_countdown: Option<RemainingCallback>,
}

impl TimerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once when the countdown reaches zero.
    pub fn on_timeout(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(f));
        self
    }

    /// Called once when the warning countdown begins, with the time left.
    pub fn on_warning(mut self, f: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.on_warning = Some(Arc::new(f));
        self
    }

    /// Called whenever user activity restarts the countdown.
    pub fn on_activity(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_activity = Some(Arc::new(f));
        self
    }

    /// Called every second while the warning is visible.
    pub fn on_countdown(mut self, f: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.on_countdown = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for TimerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerCallbacks")
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_warning", &self.on_warning.is_some())
            .field("on_activity", &self.on_activity.is_some())
            .field("on_countdown", &self.on_countdown.is_some())
            .finish()
    }
}

/// Mouse button, numbered as in DOM `MouseEvent.button`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Auxiliary,
    Secondary,
    Other(u16),
}

impl From<u16> for PointerButton {
    fn from(code: u16) -> Self {
        match code {
            0 => PointerButton::Primary,
            1 => PointerButton::Auxiliary,
            2 => PointerButton::Secondary,
            other => PointerButton::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    PointerMove,
    PointerDown(PointerButton),
    KeyDown,
    Scroll,
    Touch,
}

impl ActivityKind {
    fn is_continuous(&self) -> bool {
        matches!(self, ActivityKind::PointerMove | ActivityKind::Scroll)
    }

    fn slot(&self) -> usize {
        match self {
            ActivityKind::PointerMove => 0,
            ActivityKind::PointerDown(_) => 1,
            ActivityKind::KeyDown => 2,
            ActivityKind::Scroll => 3,
            ActivityKind::Touch => 4,
        }
    }
}

const ACTIVITY_SLOTS: usize = 5;

/// A low-level input event offered to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    /// False for events dispatched by script rather than the user agent.
    pub trusted: bool,
}

impl ActivityEvent {
    pub fn trusted(kind: ActivityKind) -> Self {
        Self {
            kind,
            trusted: true,
        }
    }

    pub fn synthetic(kind: ActivityKind) -> Self {
        Self {
            kind,
            trusted: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Timer is idle or expired.
    NotRunning,
    Untrusted,
    NonPrimaryButton,
    Debounced,
    /// The warning is visible and this event may not dismiss it.
    WarningLocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    Reset,
    Ignored(IgnoreReason),
}

/// Point-in-time view of the timer for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub remaining: Duration,
    pub warning_visible: bool,
    pub last_activity: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    state: TimerState,
    generation: u64,
    deadline: Option<Instant>,
    last_activity: Option<Instant>,
    warning_reported: bool,
    last_counted: [Option<Instant>; ACTIVITY_SLOTS],
    countdown: Option<JoinHandle<()>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: TimerState::Idle,
            generation: 0,
            deadline: None,
            last_activity: None,
            warning_reported: false,
            last_counted: [None; ACTIVITY_SLOTS],
            countdown: None,
        }
    }

    fn cancel_countdown(&mut self) {
        if let Some(handle) = self.countdown.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    fn remaining(&self, now: Instant) -> Duration {
        match (self.state, self.deadline) {
            (TimerState::Active | TimerState::Warning, Some(deadline)) => {
                deadline.saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        }
    }
}

struct Shared {
    config: TimerConfig,
    callbacks: TimerCallbacks,
    runtime: Handle,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transition `Active` → `Warning` if `generation` is still current.
    /// Returns the time left when the warning should be reported.
    fn enter_warning(&self, generation: u64) -> Option<Duration> {
        let mut inner = self.lock();
        if inner.generation != generation || inner.state != TimerState::Active {
            return None;
        }
        inner.state = TimerState::Warning;
        if inner.warning_reported {
            return None;
        }
        inner.warning_reported = true;
        Some(inner.remaining(Instant::now()))
    }

    fn countdown_tick(&self, generation: u64) -> Option<Duration> {
        let inner = self.lock();
        if inner.generation != generation || inner.state != TimerState::Warning {
            return None;
        }
        Some(inner.remaining(Instant::now()))
    }

    /// Transition to `Expired` if `generation` is still current.
    fn expire(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation
            || !matches!(inner.state, TimerState::Active | TimerState::Warning)
        {
            return false;
        }
        inner.state = TimerState::Expired;
        inner.deadline = None;
        // This task is the countdown; dropping the handle detaches it.
        inner.countdown = None;
        true
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = inner.countdown.take() {
            handle.abort();
        }
    }
}

/// Automatic-logout timer. Cloning yields another handle to the same timer.
#[derive(Clone)]
pub struct InactivityTimer {
    shared: Arc<Shared>,
}

impl fmt::Debug for InactivityTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InactivityTimer")
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .finish()
    }
}

impl InactivityTimer {
    /// Create an idle timer bound to the current Tokio runtime.
    pub fn new(config: TimerConfig, callbacks: TimerCallbacks) -> AdminResult<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            AdminError::ConfigError("inactivity timer requires a Tokio runtime".to_string())
        })?;
        if config.enabled && config.timeout.is_zero() {
            return Err(AdminError::ConfigError(
                "inactivity timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                callbacks,
                runtime,
                inner: Mutex::new(Inner::new()),
            }),
        })
    }

    pub fn config(&self) -> &TimerConfig {
        &self.shared.config
    }

    pub fn state(&self) -> TimerState {
        self.shared.lock().state
    }

    pub fn remaining(&self) -> Duration {
        self.shared.lock().remaining(Instant::now())
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let inner = self.shared.lock();
        TimerSnapshot {
            state: inner.state,
            remaining: inner.remaining(Instant::now()),
            warning_visible: inner.state == TimerState::Warning,
            last_activity: inner.last_activity,
        }
    }

    /// Begin the countdown. Does nothing if the timer is disabled or already
    /// started; only `stop()` makes it startable again.
    pub fn start(&self) {
        if !self.shared.config.enabled {
            debug!("Inactivity timer disabled; not starting");
            return;
        }

        let mut inner = self.shared.lock();
        if inner.state != TimerState::Idle {
            trace!(state = %inner.state, "Inactivity timer already started");
            return;
        }

        let now = Instant::now();
        inner.last_activity = Some(now);
        inner.last_counted = [None; ACTIVITY_SLOTS];
        self.arm(&mut inner, now);
        debug!(timeout_secs = self.shared.config.timeout.as_secs(), "Inactivity timer started");
    }

    /// Cancel any pending countdown and return to `Idle`.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.cancel_countdown();
        inner.state = TimerState::Idle;
        inner.deadline = None;
        inner.warning_reported = false;
        inner.last_counted = [None; ACTIVITY_SLOTS];
        debug!("Inactivity timer stopped");
    }

    /// Restart the countdown from the full duration. Only valid while `Active`.
    pub fn reset(&self) -> AdminResult<()> {
        let mut inner = self.shared.lock();
        if inner.state != TimerState::Active {
            return Err(AdminError::InvalidTransition {
                operation: "reset",
                state: inner.state,
            });
        }
        self.arm(&mut inner, Instant::now());
        Ok(())
    }

    /// Dismiss the warning and restart the countdown. Only valid while
    /// `Warning`.
    pub fn extend_session(&self) -> AdminResult<()> {
        {
            let mut inner = self.shared.lock();
            if inner.state != TimerState::Warning {
                return Err(AdminError::InvalidTransition {
                    operation: "extend session",
                    state: inner.state,
                });
            }
            let now = Instant::now();
            inner.last_activity = Some(now);
            self.arm(&mut inner, now);
        }
        info!("Session extended from warning");
        if let Some(cb) = &self.shared.callbacks.on_activity {
            cb();
        }
        Ok(())
    }

    /// Offer an input event. Qualifying events restart the countdown.
    pub fn record_activity(&self, event: ActivityEvent) -> ActivityOutcome {
        let outcome = {
            let mut inner = self.shared.lock();
            let now = Instant::now();
            match self.filter(&inner, event, now) {
                Some(reason) => ActivityOutcome::Ignored(reason),
                None => {
                    inner.last_counted[event.kind.slot()] = Some(now);
                    inner.last_activity = Some(now);
                    self.arm(&mut inner, now);
                    ActivityOutcome::Reset
                }
            }
        };

        match outcome {
            ActivityOutcome::Reset => {
                trace!(kind = ?event.kind, "Activity reset inactivity timer");
                if let Some(cb) = &self.shared.callbacks.on_activity {
                    cb();
                }
            }
            ActivityOutcome::Ignored(reason) => {
                trace!(kind = ?event.kind, ?reason, "Activity ignored");
            }
        }
        outcome
    }

    fn filter(&self, inner: &Inner, event: ActivityEvent, now: Instant) -> Option<IgnoreReason> {
        if !matches!(inner.state, TimerState::Active | TimerState::Warning) {
            return Some(IgnoreReason::NotRunning);
        }
        if !event.trusted {
            return Some(IgnoreReason::Untrusted);
        }
        if let ActivityKind::PointerDown(button) = event.kind {
            if button != PointerButton::Primary {
                return Some(IgnoreReason::NonPrimaryButton);
            }
        }
        if inner.state == TimerState::Warning
            && (!self.shared.config.activity_exits_warning || event.kind.is_continuous())
        {
            return Some(IgnoreReason::WarningLocked);
        }

        let window = if event.kind.is_continuous() {
            self.shared.config.debounce.continuous
        } else {
            self.shared.config.debounce.discrete
        };
        if let Some(last) = inner.last_counted[event.kind.slot()] {
            if now.saturating_duration_since(last) < window {
                return Some(IgnoreReason::Debounced);
            }
        }
        None
    }

    /// Replace any running countdown with a fresh one ending `timeout` after
    /// `now`. Leaves the timer `Active`.
    fn arm(&self, inner: &mut Inner, now: Instant) {
        inner.cancel_countdown();

        let config = &self.shared.config;
        let deadline = now + config.timeout;
        let warning_at = deadline
            .checked_sub(config.warning_lead.min(config.timeout))
            .unwrap_or(now);

        inner.state = TimerState::Active;
        inner.deadline = Some(deadline);
        inner.warning_reported = false;

        let generation = inner.generation;
        let shared = Arc::downgrade(&self.shared);
        inner.countdown = Some(self.shared.runtime.spawn(run_countdown(
            shared,
            generation,
            warning_at,
            deadline,
        )));
    }
}

async fn run_countdown(shared: Weak<Shared>, generation: u64, warning_at: Instant, deadline: Instant) {
    sleep_until(warning_at).await;

    {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match shared.enter_warning(generation) {
            Some(remaining) => {
                debug!(remaining_secs = remaining.as_secs(), "Inactivity warning shown");
                if let Some(cb) = &shared.callbacks.on_warning {
                    cb(remaining);
                }
            }
            None if shared.lock().generation != generation => return,
            None => {}
        }
    }

    let expiry = sleep_until(deadline);
    tokio::pin!(expiry);
    let mut ticker = interval_at(warning_at + COUNTDOWN_TICK, COUNTDOWN_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = &mut expiry => {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                if shared.expire(generation) {
                    info!("Inactivity timeout reached");
                    if let Some(cb) = &shared.callbacks.on_timeout {
                        cb();
                    }
                }
                return;
            }
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                match shared.countdown_tick(generation) {
                    Some(remaining) => {
                        if let Some(cb) = &shared.callbacks.on_countdown {
                            cb(remaining);
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(600);
    const LEAD: Duration = Duration::from_secs(60);

    #[derive(Default)]
    struct Counters {
        timeouts: AtomicUsize,
        warnings: AtomicUsize,
        activity: AtomicUsize,
        ticks: AtomicUsize,
    }

    fn config() -> TimerConfig {
        TimerConfig {
            timeout: TIMEOUT,
            warning_lead: LEAD,
            enabled: true,
            activity_exits_warning: false,
            debounce: DebounceConfig::default(),
        }
    }

    fn timer_with(config: TimerConfig) -> (InactivityTimer, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let (t, w, a, c) = (
            counters.clone(),
            counters.clone(),
            counters.clone(),
            counters.clone(),
        );
        let callbacks = TimerCallbacks::new()
            .on_timeout(move || {
                t.timeouts.fetch_add(1, Ordering::SeqCst);
            })
            .on_warning(move |_| {
                w.warnings.fetch_add(1, Ordering::SeqCst);
            })
            .on_activity(move || {
                a.activity.fetch_add(1, Ordering::SeqCst);
            })
            .on_countdown(move |_| {
                c.ticks.fetch_add(1, Ordering::SeqCst);
            });
        (InactivityTimer::new(config, callbacks).unwrap(), counters)
    }

    fn new_timer() -> (InactivityTimer, Arc<Counters>) {
        timer_with(config())
    }

    async fn wait(d: Duration) {
        tokio::time::sleep(d).await;
    }

    fn key() -> ActivityEvent {
        ActivityEvent::trusted(ActivityKind::KeyDown)
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_exactly_once_without_activity() {
        let (timer, counters) = new_timer();
        timer.start();

        wait(TIMEOUT + Duration::from_secs(5)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
        assert_eq!(timer.state(), TimerState::Expired);

        wait(TIMEOUT * 2).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_fire_early() {
        let (timer, counters) = new_timer();
        timer.start();

        wait(TIMEOUT - Duration::from_millis(10)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
        assert_eq!(timer.state(), TimerState::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent() {
        let (timer, counters) = new_timer();
        timer.start();
        wait(Duration::from_secs(300)).await;

        // A second start must not push the deadline back.
        timer.start();
        assert_eq!(timer.remaining(), TIMEOUT - Duration::from_secs(300));

        wait(Duration::from_secs(301)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn trusted_activity_resets_to_full_duration() {
        let (timer, counters) = new_timer();
        timer.start();
        wait(Duration::from_secs(400)).await;

        assert_eq!(timer.record_activity(key()), ActivityOutcome::Reset);
        assert_eq!(timer.remaining(), TIMEOUT);
        assert_eq!(counters.activity.load(Ordering::SeqCst), 1);

        // The original deadline passes without a timeout.
        wait(Duration::from_secs(300)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
        assert_eq!(timer.state(), TimerState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn untrusted_activity_never_resets() {
        let (timer, counters) = new_timer();
        timer.start();
        wait(Duration::from_secs(400)).await;

        for kind in [
            ActivityKind::KeyDown,
            ActivityKind::PointerMove,
            ActivityKind::PointerDown(PointerButton::Primary),
            ActivityKind::Scroll,
            ActivityKind::Touch,
        ] {
            assert_eq!(
                timer.record_activity(ActivityEvent::synthetic(kind)),
                ActivityOutcome::Ignored(IgnoreReason::Untrusted)
            );
        }
        assert_eq!(timer.remaining(), Duration::from_secs(200));

        wait(Duration::from_secs(201)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.activity.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_primary_buttons_are_ignored() {
        let (timer, _) = new_timer();
        timer.start();

        for code in [1u16, 2, 3, 4] {
            let event = ActivityEvent::trusted(ActivityKind::PointerDown(PointerButton::from(code)));
            assert_eq!(
                timer.record_activity(event),
                ActivityOutcome::Ignored(IgnoreReason::NonPrimaryButton)
            );
        }

        let primary = ActivityEvent::trusted(ActivityKind::PointerDown(PointerButton::from(0)));
        assert_eq!(timer.record_activity(primary), ActivityOutcome::Reset);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_is_debounced_per_kind() {
        let (timer, counters) = new_timer();
        timer.start();
        let mv = ActivityEvent::trusted(ActivityKind::PointerMove);

        assert_eq!(timer.record_activity(mv), ActivityOutcome::Reset);
        wait(Duration::from_millis(500)).await;
        assert_eq!(
            timer.record_activity(mv),
            ActivityOutcome::Ignored(IgnoreReason::Debounced)
        );
        // A different kind has its own window.
        assert_eq!(timer.record_activity(key()), ActivityOutcome::Reset);

        wait(Duration::from_millis(300)).await;
        assert_eq!(timer.record_activity(key()), ActivityOutcome::Reset);
        assert_eq!(
            timer.record_activity(mv),
            ActivityOutcome::Ignored(IgnoreReason::Debounced)
        );

        wait(Duration::from_millis(300)).await;
        assert_eq!(timer.record_activity(mv), ActivityOutcome::Reset);
        assert_eq!(counters.activity.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_is_reported_once() {
        let (timer, counters) = new_timer();
        timer.start();

        wait(TIMEOUT - LEAD + Duration::from_secs(1)).await;
        assert_eq!(timer.state(), TimerState::Warning);
        assert!(timer.snapshot().warning_visible);
        assert_eq!(counters.warnings.load(Ordering::SeqCst), 1);

        wait(LEAD).await;
        assert_eq!(counters.warnings.load(Ordering::SeqCst), 1);
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
        assert!(counters.ticks.load(Ordering::SeqCst) >= 50);
    }

    #[tokio::test(start_paused = true)]
    async fn extended_session_warns_again_on_next_countdown() {
        let (timer, counters) = new_timer();
        timer.start();

        wait(TIMEOUT - LEAD + Duration::from_secs(1)).await;
        assert_eq!(counters.warnings.load(Ordering::SeqCst), 1);
        timer.extend_session().unwrap();
        assert_eq!(timer.state(), TimerState::Active);
        assert!(!timer.snapshot().warning_visible);

        // Still one warning until the new countdown reaches its lead.
        wait(TIMEOUT - LEAD - Duration::from_secs(1)).await;
        assert_eq!(counters.warnings.load(Ordering::SeqCst), 1);

        wait(Duration::from_secs(2)).await;
        assert_eq!(timer.state(), TimerState::Warning);
        assert_eq!(counters.warnings.load(Ordering::SeqCst), 2);

        wait(LEAD).await;
        assert_eq!(counters.warnings.load(Ordering::SeqCst), 2);
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_movement_does_not_dismiss_warning() {
        let (timer, counters) = new_timer();
        timer.start();
        wait(TIMEOUT - LEAD + Duration::from_secs(1)).await;
        assert_eq!(timer.state(), TimerState::Warning);

        for _ in 0..10 {
            assert_eq!(
                timer.record_activity(ActivityEvent::trusted(ActivityKind::PointerMove)),
                ActivityOutcome::Ignored(IgnoreReason::WarningLocked)
            );
            wait(Duration::from_secs(2)).await;
        }
        assert_eq!(timer.state(), TimerState::Warning);

        wait(LEAD).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn extend_session_leaves_warning() {
        let (timer, counters) = new_timer();
        timer.start();
        wait(TIMEOUT - Duration::from_secs(10)).await;
        assert_eq!(timer.state(), TimerState::Warning);

        timer.extend_session().unwrap();
        assert_eq!(timer.state(), TimerState::Active);
        assert_eq!(timer.remaining(), TIMEOUT);
        assert_eq!(counters.activity.load(Ordering::SeqCst), 1);

        wait(Duration::from_secs(20)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn key_press_can_dismiss_warning_when_configured() {
        let mut config = config();
        config.activity_exits_warning = true;
        let (timer, _) = timer_with(config);
        timer.start();
        wait(TIMEOUT - Duration::from_secs(10)).await;

        assert_eq!(
            timer.record_activity(ActivityEvent::trusted(ActivityKind::Scroll)),
            ActivityOutcome::Ignored(IgnoreReason::WarningLocked)
        );
        assert_eq!(timer.record_activity(key()), ActivityOutcome::Reset);
        assert_eq!(timer.state(), TimerState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_timeout_from_every_state() {
        // Active
        let (timer, counters) = new_timer();
        timer.start();
        wait(Duration::from_secs(30)).await;
        timer.stop();
        wait(TIMEOUT * 2).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
        assert_eq!(timer.state(), TimerState::Idle);

        // Warning
        let (timer, counters) = new_timer();
        timer.start();
        wait(TIMEOUT - Duration::from_secs(5)).await;
        assert_eq!(timer.state(), TimerState::Warning);
        timer.stop();
        wait(TIMEOUT * 2).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);

        // Idle
        let (timer, counters) = new_timer();
        timer.stop();
        wait(TIMEOUT * 2).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_and_extend_are_state_checked() {
        let (timer, _) = new_timer();
        assert!(matches!(
            timer.reset(),
            Err(AdminError::InvalidTransition { state: TimerState::Idle, .. })
        ));

        timer.start();
        assert!(matches!(
            timer.extend_session(),
            Err(AdminError::InvalidTransition { state: TimerState::Active, .. })
        ));
        wait(Duration::from_secs(100)).await;
        timer.reset().unwrap();
        assert_eq!(timer.remaining(), TIMEOUT);

        wait(TIMEOUT - Duration::from_secs(5)).await;
        assert!(matches!(
            timer.reset(),
            Err(AdminError::InvalidTransition { state: TimerState::Warning, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_is_terminal_until_restarted() {
        let (timer, counters) = new_timer();
        timer.start();
        wait(TIMEOUT + Duration::from_secs(1)).await;
        assert_eq!(timer.state(), TimerState::Expired);

        assert_eq!(
            timer.record_activity(key()),
            ActivityOutcome::Ignored(IgnoreReason::NotRunning)
        );
        timer.start();
        assert_eq!(timer.state(), TimerState::Expired);

        timer.stop();
        timer.start();
        assert_eq!(timer.state(), TimerState::Active);
        wait(TIMEOUT + Duration::from_secs(1)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 2);
        assert_eq!(counters.warnings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_timer_never_starts() {
        let mut config = config();
        config.enabled = false;
        let (timer, counters) = timer_with(config);
        timer.start();
        assert_eq!(timer.state(), TimerState::Idle);

        wait(TIMEOUT * 2).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_may_stop_the_timer() {
        let holder: Arc<Mutex<Option<InactivityTimer>>> = Arc::new(Mutex::new(None));
        let h = holder.clone();
        let callbacks = TimerCallbacks::new().on_warning(move |_| {
            if let Some(timer) = h.lock().unwrap().as_ref() {
                timer.stop();
            }
        });
        let timer = InactivityTimer::new(config(), callbacks).unwrap();
        *holder.lock().unwrap() = Some(timer.clone());

        timer.start();
        wait(TIMEOUT + Duration::from_secs(1)).await;
        assert_eq!(timer.state(), TimerState::Idle);
        holder.lock().unwrap().take();
    }

    #[test]
    fn new_outside_runtime_is_an_error() {
        let result = InactivityTimer::new(config(), TimerCallbacks::new());
        assert!(matches!(result, Err(AdminError::ConfigError(_))));
    }
}
