use tracing::info;

use crate::api::UserService;
use crate::errors::{AdminError, AdminResult};
use crate::export::{users_table, CsvTable};
use crate::models::{PasswordReset, User};
use crate::views::UserForm;

/// Staff account management. Users are never cached; every mutation
/// re-fetches the list.
#[derive(Debug, Clone)]
pub struct UserManagementView {
    service: UserService,
    users: Vec<User>,
}

impl UserManagementView {
    pub async fn load(service: UserService) -> AdminResult<Self> {
        let users = service.list().await?;
        Ok(Self { service, users })
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn find(&self, id: u64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub async fn refresh(&mut self) -> AdminResult<()> {
        self.users = self.service.list().await?;
        Ok(())
    }

    pub async fn create(&mut self, form: &UserForm) -> AdminResult<User> {
        let new = form.validate_new()?;
        let created = self.service.create(&new).await?;
        info!(id = created.id, username = %created.username, "Created user");
        self.refresh().await?;
        Ok(created)
    }

    /// Apply the edits in `form` to user `id`. Nothing is sent if nothing
    /// changed.
    pub async fn update(&mut self, id: u64, form: &UserForm) -> AdminResult<User> {
        let original = self.lookup(id)?;
        let update = form.validate_update(&original)?;
        if update.full_name.is_none() && update.email.is_none() && update.role.is_none() {
            return Ok(original);
        }

        let updated = self.service.update(id, &update).await?;
        info!(id, "Updated user");
        self.refresh().await?;
        Ok(updated)
    }

    /// Flip the active flag of user `id`.
    pub async fn toggle_active(&mut self, id: u64) -> AdminResult<User> {
        let original = self.lookup(id)?;
        let updated = self.service.set_active(id, !original.active).await?;
        info!(id, active = updated.active, "Changed user status");
        self.refresh().await?;
        Ok(updated)
    }

    pub async fn reset_password(&self, id: u64) -> AdminResult<PasswordReset> {
        self.lookup(id)?;
        let reset = self.service.reset_password(id).await?;
        info!(id, "Password reset issued");
        Ok(reset)
    }

    pub fn table(&self) -> CsvTable {
        users_table(&self.users)
    }

    fn lookup(&self, id: u64) -> AdminResult<User> {
        self.find(id)
            .cloned()
            .ok_or_else(|| AdminError::NotFound(format!("user {id}")))
    }
}
