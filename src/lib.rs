//! pawnshop-admin - client SDK for the pawn shop administration API
//!
//! Services for the REST API, a session context with an inactivity
//! auto-logout timer, a session-scoped report cache with a retrying loader,
//! and view-models for the dashboard, reports and user management pages.
//!
//! # Features
//!
//! - `sim` - In-memory axum backend implementing the API. Enabled by default;
//!   used by the integration tests and the `pawnshop_sim` binary.
//!
//! # Example
//!
//! ```no_run
//! use pawnshop_admin::config::AdminConfig;
//! use pawnshop_admin::session::SessionContext;
//! use pawnshop_admin::views::DashboardView;
//!
//! # async fn run() -> pawnshop_admin::errors::AdminResult<()> {
//! let config = AdminConfig::load()?;
//! let ctx = SessionContext::new(&config)?;
//! ctx.login("admin", "pawnshop123").await?;
//!
//! let view = DashboardView::load(&ctx.dashboard_fetcher(), &ctx.inventory_fetcher(), false).await?;
//! for card in &view.cards {
//!     println!("{}: {}", card.title, card.value);
//! }
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;

// Client
pub mod api;
pub mod cache;
pub mod fetch;
pub mod session;
pub mod storage;

// Presentation
pub mod export;
pub mod format;
pub mod views;

// Simulated backend (requires "sim" feature)
#[cfg(feature = "sim")]
pub mod sim;
