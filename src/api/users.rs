use serde::Serialize;
use tracing::info;

use crate::api::client::ApiClient;
use crate::errors::AdminResult;
use crate::models::{NewUser, PasswordReset, User, UserUpdate};

#[derive(Debug, Serialize)]
struct StatusChange {
    active: bool,
}

/// Staff account management. Most endpoints require the admin role.
#[derive(Debug, Clone)]
pub struct UserService {
    api: ApiClient,
}

impl UserService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> AdminResult<Vec<User>> {
        self.api.get("/api/users").await
    }

    pub async fn get(&self, id: u64) -> AdminResult<User> {
        self.api.get(&format!("/api/users/{id}")).await
    }

    pub async fn create(&self, user: &NewUser) -> AdminResult<User> {
        let created: User = self.api.post("/api/users", user).await?;
        info!(user_id = created.id, username = %created.username, "Created staff account");
        Ok(created)
    }

    pub async fn update(&self, id: u64, update: &UserUpdate) -> AdminResult<User> {
        self.api.put(&format!("/api/users/{id}"), update).await
    }

    /// Activate or deactivate an account.
    pub async fn set_active(&self, id: u64, active: bool) -> AdminResult<User> {
        let user: User = self
            .api
            .patch(&format!("/api/users/{id}/status"), &StatusChange { active })
            .await?;
        info!(user_id = id, active, "Changed staff account status");
        Ok(user)
    }

    /// Issue a temporary password for the account.
    pub async fn reset_password(&self, id: u64) -> AdminResult<PasswordReset> {
        let empty = serde_json::json!({});
        self.api
            .post(&format!("/api/users/{id}/reset-password"), &empty)
            .await
    }
}
