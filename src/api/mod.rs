//! REST API client layer.
//!
//! - `client`    → authenticated HTTP client shared by every service
//! - `errors`    → API error body decoding
//! - `auth`      → login, logout, current user, password change
//! - `customers` → customer records and their loans
//! - `users`     → staff account management
//! - `reports`   → inventory, collections and dashboard reports

pub mod auth;
pub mod client;
pub mod customers;
pub mod errors;
pub mod reports;
pub mod users;

pub use auth::AuthService;
pub use client::ApiClient;
pub use customers::CustomerService;
pub use errors::{error_from_response, ApiErrorBody, ApiErrorCode, ApiErrorResponse};
pub use reports::ReportsService;
pub use users::UserService;
