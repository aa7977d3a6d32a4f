//! Authenticated session: token, signed-in user, storage and the inactivity
//! timer, tied together.
//!
//! The session is persisted under the `session` storage key so it survives a
//! restart, and everything in storage (session and cached reports) is wiped
//! when the session ends for any reason.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiClient, AuthService, CustomerService, ReportsService, UserService};
use crate::cache::ReportCache;
use crate::config::{AdminConfig, CacheConfig};
use crate::errors::{AdminError, AdminResult};
use crate::fetch::{ReportFetcher, RetryPolicy};
use crate::logging::{log_session_event, SessionEvent};
use crate::models::{DashboardSummary, InventoryReport, User};
use crate::session::timer::{
    ActivityEvent, ActivityOutcome, InactivityTimer, TimerCallbacks, TimerConfig,
};
use crate::storage::SessionStorage;

/// Storage key of the persisted session.
pub const SESSION_KEY: &str = "session";

/// Capacity of the notice channel; slow subscribers skip older notices.
const NOTICE_CAPACITY: usize = 32;

/// Session changes published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    LoggedIn(User),
    WarningShown { remaining: Duration },
    Countdown { remaining: Duration },
    Extended,
    TimedOut,
    LoggedOut,
    /// The server rejected the session token
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    token: String,
    user: User,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: Option<i64>,
}

/// Expiry time carried in a JWT-style bearer token, if it can be read.
///
/// The signature is not checked; the server does that. This only lets the
/// client discard a session that has obviously run out.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: TokenClaims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// Whether `token` carries an expiry at or before `now`. Tokens without a
/// readable expiry are left for the server to judge.
pub fn token_expired(token: &str, now: DateTime<Utc>) -> bool {
    token_expiry(token).is_some_and(|exp| exp <= now)
}

/// State shared with the timer callbacks.
#[derive(Debug)]
struct SessionState {
    api: ApiClient,
    storage: SessionStorage,
    cache: ReportCache,
    user: RwLock<Option<User>>,
    notices: broadcast::Sender<SessionNotice>,
    /// Bumped each time a session is persisted
    generation: AtomicU64,
    /// Serialises writes and wipes of the session files
    files: Mutex<()>,
}

impl SessionState {
    fn new(api: ApiClient, storage: SessionStorage, cache: &CacheConfig) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            api,
            cache: ReportCache::new(storage.child("reports"), cache),
            storage,
            user: RwLock::new(None),
            notices,
            generation: AtomicU64::new(0),
            files: Mutex::new(()),
        }
    }

    fn user(&self) -> Option<User> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_user(&self, user: Option<User>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    fn username(&self) -> String {
        self.user()
            .map(|u| u.username)
            .unwrap_or_else(|| "-".to_string())
    }

    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    /// Drop credentials from memory. Storage is cleared separately.
    fn forget(&self) {
        self.api.clear_token();
        self.set_user(None);
    }

    async fn persist(&self, token: &str, user: &User) -> AdminResult<()> {
        let stored = StoredSession {
            token: token.to_string(),
            user: user.clone(),
            saved_at: Utc::now(),
        };
        let raw = serde_json::to_string(&stored)?;

        let _files = self.files.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.storage.save(SESSION_KEY, &raw).await
    }

    async fn wipe_storage(&self) -> AdminResult<()> {
        let _files = self.files.lock().await;
        self.remove_files().await
    }

    /// Wipe storage unless a session was persisted after `generation`.
    async fn wipe_if_current(&self, generation: u64) -> AdminResult<bool> {
        let _files = self.files.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Ok(false);
        }
        self.remove_files().await?;
        Ok(true)
    }

    async fn remove_files(&self) -> AdminResult<()> {
        self.cache.clear().await?;
        self.storage.clear().await
    }

    /// Inactivity timeout: drop credentials now, wipe storage in the
    /// background. A login that persists before the wipe runs keeps its files.
    fn expire(self: Arc<Self>) -> JoinHandle<()> {
        let generation = self.generation.load(Ordering::SeqCst);
        log_session_event(SessionEvent::TimedOut, &self.username(), None);
        self.forget();
        self.notify(SessionNotice::TimedOut);
        tokio::spawn(async move {
            match self.wipe_if_current(generation).await {
                Ok(true) => debug!("Session storage wiped after timeout"),
                Ok(false) => debug!("Newer session persisted; storage kept"),
                Err(e) => warn!(error = %e, "Could not wipe session storage after timeout"),
            }
        })
    }
}

pub struct SessionContext {
    state: Arc<SessionState>,
    auth: AuthService,
    timer: InactivityTimer,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user", &self.state.user().map(|u| u.username))
            .field("timer", &self.timer)
            .finish()
    }
}

impl SessionContext {
    /// Build a context from configuration. Must be called inside a Tokio
    /// runtime.
    pub fn new(config: &AdminConfig) -> AdminResult<Self> {
        let storage = SessionStorage::new(config.session.resolve_storage_dir());
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: &AdminConfig, storage: SessionStorage) -> AdminResult<Self> {
        let api = ApiClient::new(&config.api)?;
        let state = Arc::new(SessionState::new(api.clone(), storage, &config.cache));
        let timer = InactivityTimer::new(
            TimerConfig::from(&config.session),
            timer_callbacks(&state),
        )?;

        Ok(Self {
            state,
            auth: AuthService::new(api),
            timer,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.state.api
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn customers(&self) -> CustomerService {
        CustomerService::new(self.state.api.clone())
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.state.api.clone())
    }

    pub fn reports(&self) -> ReportsService {
        ReportsService::new(self.state.api.clone())
    }

    pub fn cache(&self) -> &ReportCache {
        &self.state.cache
    }

    pub fn inventory_fetcher(&self) -> ReportFetcher<InventoryReport> {
        ReportFetcher::new(self.reports(), self.state.cache.clone(), self.retry.clone())
    }

    pub fn dashboard_fetcher(&self) -> ReportFetcher<DashboardSummary> {
        ReportFetcher::new(self.reports(), self.state.cache.clone(), self.retry.clone())
    }

    pub fn timer(&self) -> &InactivityTimer {
        &self.timer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.state.notices.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.user()
    }

    /// Signed in with a token that has not visibly expired.
    pub fn is_authenticated(&self) -> bool {
        self.state.user().is_some()
            && self
                .state
                .api
                .token()
                .is_some_and(|t| !token_expired(&t, Utc::now()))
    }

    pub async fn login(&self, username: &str, password: &str) -> AdminResult<User> {
        let response = self.auth.login(username, password).await?;

        self.state.api.set_token(response.token.clone());
        self.state.set_user(Some(response.user.clone()));
        self.state.persist(&response.token, &response.user).await?;

        self.timer.stop();
        self.timer.start();

        log_session_event(SessionEvent::LoggedIn, &response.user.username, None);
        self.state.notify(SessionNotice::LoggedIn(response.user.clone()));
        Ok(response.user)
    }

    /// Resume a persisted session.
    ///
    /// Returns `Ok(None)` when nothing is stored, the stored token has
    /// expired, or the server rejects it; in those cases storage is wiped.
    /// If the server cannot be reached the stored user is trusted.
    pub async fn restore(&self) -> AdminResult<Option<User>> {
        let Some(raw) = self.state.storage.load(SESSION_KEY).await? else {
            return Ok(None);
        };
        let stored: StoredSession = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored session");
                self.state.wipe_storage().await?;
                return Ok(None);
            }
        };

        if token_expired(&stored.token, Utc::now()) {
            log_session_event(SessionEvent::Rejected, &stored.user.username, Some("token expired"));
            self.state.wipe_storage().await?;
            return Ok(None);
        }

        self.state.api.set_token(stored.token.clone());
        let user = match self.auth.current_user().await {
            Ok(user) => user,
            Err(e) if e.requires_login() => {
                log_session_event(SessionEvent::Rejected, &stored.user.username, Some("token rejected"));
                self.state.forget();
                self.state.wipe_storage().await?;
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "Could not verify stored session; continuing offline");
                stored.user
            }
        };

        self.state.set_user(Some(user.clone()));
        self.state.persist(&stored.token, &user).await?;
        self.timer.stop();
        self.timer.start();

        log_session_event(SessionEvent::Restored, &user.username, None);
        Ok(Some(user))
    }

    /// End the session. The server is told on a best-effort basis; local
    /// state is always cleared.
    pub async fn logout(&self) -> AdminResult<()> {
        if self.state.api.has_token() {
            if let Err(e) = self.auth.logout().await {
                warn!(error = %e, "Server logout failed; clearing local session anyway");
            }
        }
        let username = self.state.username();
        self.end(SessionNotice::LoggedOut).await?;
        log_session_event(SessionEvent::LoggedOut, &username, None);
        Ok(())
    }

    /// Dismiss the timeout warning.
    pub fn extend_session(&self) -> AdminResult<()> {
        self.timer.extend_session()?;
        log_session_event(SessionEvent::Extended, &self.state.username(), None);
        self.state.notify(SessionNotice::Extended);
        Ok(())
    }

    pub fn record_activity(&self, event: ActivityEvent) -> ActivityOutcome {
        self.timer.record_activity(event)
    }

    /// Inspect a failed request; if the server no longer accepts the session,
    /// end it. Returns the error unchanged.
    pub async fn check_error(&self, err: AdminError) -> AdminError {
        if err.requires_login() && self.state.user().is_some() {
            log_session_event(SessionEvent::Rejected, &self.state.username(), Some(err.to_string().as_str()));
            if let Err(e) = self.end(SessionNotice::Rejected).await {
                warn!(error = %e, "Could not clear rejected session");
            }
        }
        err
    }

    async fn end(&self, notice: SessionNotice) -> AdminResult<()> {
        self.timer.stop();
        self.state.forget();
        self.state.wipe_storage().await?;
        self.state.notify(notice);
        Ok(())
    }
}

fn timer_callbacks(state: &Arc<SessionState>) -> TimerCallbacks {
    let on_warning = Arc::downgrade(state);
    let on_countdown = Arc::downgrade(state);
    let on_timeout = Arc::downgrade(state);

    TimerCallbacks::new()
        .on_warning(move |remaining| {
            if let Some(state) = on_warning.upgrade() {
                log_session_event(
                    SessionEvent::WarningShown,
                    &state.username(),
                    Some(format!("{}s remaining", remaining.as_secs()).as_str()),
                );
                state.notify(SessionNotice::WarningShown { remaining });
            }
        })
        .on_countdown(move |remaining| {
            if let Some(state) = on_countdown.upgrade() {
                state.notify(SessionNotice::Countdown { remaining });
            }
        })
        .on_timeout(move || {
            if let Some(state) = on_timeout.upgrade() {
                state.expire();
            }
        })
}
