//! In-memory stand-in for the shop backend.
//!
//! Serves every endpoint the client uses, backed by seeded data held in
//! memory. Used by the integration tests and the `pawnshop_sim` binary for
//! local development.
//!
//! Logins use the seeded accounts (see [`seed`]); every account's password is
//! [`SIM_PASSWORD`]. Tokens are unsigned JWT-shaped strings carrying `sub`,
//! `role` and `exp`.

pub mod handlers;
pub mod seed;

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, info_span, warn, Instrument};

use crate::api::{ApiErrorCode, ApiErrorResponse};
use crate::logging::{generate_request_id, REQUEST_ID_HEADER};
use crate::models::{Customer, Loan, Role, User};

pub use seed::SIM_PASSWORD;

/// Lifetime of issued tokens, in seconds.
pub const TOKEN_LIFETIME_SECS: i64 = 8 * 60 * 60;

/// Claims carried in a sim token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: u64,
    pub role: Role,
    pub exp: i64,
}

/// Error returned by handlers, rendered in the standard error body.
#[derive(Debug)]
pub struct SimError {
    status: StatusCode,
    body: ApiErrorResponse,
}

impl SimError {
    pub fn new(status: StatusCode, code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorResponse::new(code, message),
        }
    }

    pub fn fields(message: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ApiErrorResponse::with_fields(message, fields),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ApiErrorCode::Unauthorized, message)
    }

    pub fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            ApiErrorCode::Forbidden,
            "Your role does not allow this",
        )
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ApiErrorCode::NotFound,
            format!("{what} not found"),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ApiErrorCode::Conflict, message)
    }
}

impl IntoResponse for SimError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Clone)]
pub(crate) struct Account {
    pub user: User,
    pub password: String,
}

/// Everything the sim knows.
#[derive(Debug)]
pub(crate) struct SimData {
    pub accounts: BTreeMap<u64, Account>,
    pub customers: BTreeMap<u64, Customer>,
    pub loans: Vec<Loan>,
    pub revoked: HashSet<String>,
    pub next_user_id: u64,
    pub next_customer_id: u64,
}

/// Shared sim state. Cloning yields another handle to the same data.
#[derive(Debug, Clone)]
pub struct SimState {
    data: Arc<Mutex<SimData>>,
    fail_next: Arc<AtomicU32>,
}

impl Default for SimState {
    fn default() -> Self {
        Self::seeded()
    }
}

impl SimState {
    /// State populated with the demo accounts, customers and loans.
    pub fn seeded() -> Self {
        Self {
            data: Arc::new(Mutex::new(seed::data(Utc::now().date_naive()))),
            fail_next: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Answer the next `n` requests with `503 Service Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn data(&self) -> MutexGuard<'_, SimData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume one injected failure, if any are pending.
    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn issue_token(&self, user: &User) -> String {
        let claims = Claims {
            sub: user.id,
            role: user.role,
            exp: Utc::now().timestamp() + TOKEN_LIFETIME_SECS,
        };
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        // Claims only hold integers and a role name.
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
        format!("{header}.{payload}.sim")
    }

    /// Check the bearer token and return the caller's account.
    pub(crate) fn authorize(&self, headers: &HeaderMap) -> SimResult<User> {
        let token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| SimError::unauthorized("Missing bearer token"))?;

        let claims = decode_claims(token).ok_or_else(|| SimError::unauthorized("Malformed token"))?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(SimError::unauthorized("Token expired"));
        }

        let data = self.data();
        if data.revoked.contains(token) {
            return Err(SimError::unauthorized("Token revoked"));
        }
        match data.accounts.get(&claims.sub) {
            Some(account) if account.user.active => Ok(account.user.clone()),
            _ => Err(SimError::unauthorized("Account disabled")),
        }
    }
}

fn decode_claims(token: &str) -> Option<Claims> {
    let mut parts = token.split('.');
    let (_, payload, _) = (parts.next()?, parts.next()?, parts.next()?);
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

async fn inject_failures(State(state): State<SimState>, request: Request, next: Next) -> Response {
    if state.take_failure() {
        warn!(path = %request.uri().path(), "Injected failure");
        return SimError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::ServiceUnavailable,
            "Injected failure",
        )
        .into_response();
    }
    next.run(request).await
}

async fn log_requests(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let start = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    span.in_scope(|| info!(status = response.status().as_u16(), elapsed_ms, "Request completed"));
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Build the sim router.
///
/// # Routes
///
/// - `POST /api/auth/login`, `POST /api/auth/logout`, `GET /api/auth/me`,
///   `POST /api/auth/password`
/// - `GET|POST /api/customers`, `GET|PUT|DELETE /api/customers/:id`,
///   `GET /api/customers/:id/loans`
/// - `GET|POST /api/users`, `GET|PUT /api/users/:id`,
///   `PATCH /api/users/:id/status`, `POST /api/users/:id/reset-password`
/// - `GET /api/reports/inventory`, `GET /api/reports/dashboard`,
///   `GET /api/reports/collections?from=&to=`
pub fn router(state: SimState) -> Router {
    Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/me", get(handlers::me))
        .route("/api/auth/password", post(handlers::change_password))
        .route(
            "/api/customers",
            get(handlers::list_customers).post(handlers::create_customer),
        )
        .route(
            "/api/customers/:id",
            get(handlers::get_customer)
                .put(handlers::update_customer)
                .delete(handlers::delete_customer),
        )
        .route("/api/customers/:id/loans", get(handlers::customer_loans))
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/api/users/:id",
            get(handlers::get_user).put(handlers::update_user),
        )
        .route("/api/users/:id/status", patch(handlers::set_user_status))
        .route(
            "/api/users/:id/reset-password",
            post(handlers::reset_password),
        )
        .route("/api/reports/inventory", get(handlers::inventory_report))
        .route("/api/reports/dashboard", get(handlers::dashboard_report))
        .route(
            "/api/reports/collections",
            get(handlers::collections_report),
        )
        .layer(middleware::from_fn_with_state(state.clone(), inject_failures))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Serve `state` on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, state: SimState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

/// Bind `addr` and serve in a background task. Returns the bound address,
/// which differs from `addr` when port 0 was requested.
pub async fn spawn(addr: SocketAddr, state: SimState) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = serve(listener, state).await {
            warn!(error = %e, "Sim server stopped");
        }
    });
    info!(%local, "Sim server listening");
    Ok(local)
}
