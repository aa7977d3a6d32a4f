use serde::Serialize;
use tracing::info;

use crate::api::client::ApiClient;
use crate::errors::{AdminError, AdminResult};
use crate::models::{LoginRequest, LoginResponse, User};

#[derive(Debug, Serialize)]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// Authentication endpoints.
#[derive(Debug, Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn client(&self) -> &ApiClient {
        &self.api
    }

    /// Exchange credentials for a bearer token.
    ///
    /// The token is *not* installed on the client; the session context decides
    /// when to do that.
    pub async fn login(&self, username: &str, password: &str) -> AdminResult<LoginResponse> {
        if username.trim().is_empty() {
            return Err(AdminError::field("username", "Username is required"));
        }
        if password.is_empty() {
            return Err(AdminError::field("password", "Password is required"));
        }

        let request = LoginRequest {
            username: username.trim().to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self.api.post("/api/auth/login", &request).await?;
        info!(username = %response.user.username, role = %response.user.role, "Login accepted");
        Ok(response)
    }

    /// Invalidate the current token on the server.
    pub async fn logout(&self) -> AdminResult<()> {
        self.api.post_empty("/api/auth/logout").await
    }

    /// The user the current token belongs to.
    pub async fn current_user(&self) -> AdminResult<User> {
        self.api.get("/api/auth/me").await
    }

    pub async fn change_password(&self, current: &str, new: &str) -> AdminResult<()> {
        if new.len() < 8 {
            return Err(AdminError::field(
                "new_password",
                "Password must be at least 8 characters",
            ));
        }
        if new == current {
            return Err(AdminError::field(
                "new_password",
                "New password must differ from the current one",
            ));
        }

        let body = ChangePasswordRequest {
            current_password: current,
            new_password: new,
        };
        let _: serde_json::Value = self.api.post("/api/auth/password", &body).await?;
        Ok(())
    }
}
