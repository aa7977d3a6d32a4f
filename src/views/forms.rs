//! Form input validation.
//!
//! Forms hold raw text as typed. `validate_*` checks every field, collects
//! one message per offending field, and only then builds the request payload,
//! so the page can show all problems at once.

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{AdminError, AdminResult, FieldErrors};
use crate::models::{Customer, CustomerUpdate, NewCustomer, NewUser, Role, User, UserUpdate};

/// Minimum length for a new password.
pub const MIN_PASSWORD_LEN: usize = 8;

static USERNAME: OnceLock<Option<Regex>> = OnceLock::new();
static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
static PHONE: OnceLock<Option<Regex>> = OnceLock::new();

fn is_match(cell: &'static OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

/// 3-32 characters: lowercase letters, digits, `.` and `_`, starting with a letter.
pub fn validate_username(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("Username is required".to_string());
    }
    if is_match(&USERNAME, r"^[a-z][a-z0-9._]{2,31}$", value) {
        Ok(())
    } else {
        Err("Use 3-32 lowercase letters, digits, '.' or '_', starting with a letter".to_string())
    }
}

pub fn validate_email(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("Email is required".to_string());
    }
    if is_match(&EMAIL, r"^[^@\s]+@[^@\s]+\.[^@\s]+$", value.trim()) {
        Ok(())
    } else {
        Err("Enter a valid email address".to_string())
    }
}

/// Digits with optional `+`, spaces, dashes, dots and parentheses; 7 to 15 digits.
pub fn validate_phone(value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("Phone is required".to_string());
    }
    let digits = value.chars().filter(char::is_ascii_digit).count();
    if is_match(&PHONE, r"^\+?[0-9(][0-9 ().-]*$", value) && (7..=15).contains(&digits) {
        Ok(())
    } else {
        Err("Enter a phone number with 7 to 15 digits".to_string())
    }
}

pub fn validate_required(value: &str, label: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{label} is required"))
    } else {
        Ok(())
    }
}

fn check(errors: &mut FieldErrors, field: &str, result: Result<(), String>) {
    if let Err(message) = result {
        errors.add(field, message);
    }
}

fn finish(errors: FieldErrors) -> AdminResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AdminError::Validation {
            message: "Please correct the highlighted fields".to_string(),
            fields: errors,
        })
    }
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Value for a partial update: `Some` only when it differs from `current`.
fn changed(value: &str, current: &str) -> Option<String> {
    let value = value.trim();
    (value != current).then(|| value.to_string())
}

/// Create/edit form for a staff account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserForm {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: String,
    /// Only used when creating an account
    pub password: String,
}

impl UserForm {
    /// Pre-fill the form for editing.
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            password: String::new(),
        }
    }

    fn check_common(&self, errors: &mut FieldErrors) -> Option<Role> {
        check(errors, "full_name", validate_required(&self.full_name, "Full name"));
        check(errors, "email", validate_email(&self.email));
        let role = Role::parse(&self.role);
        if role.is_none() {
            errors.add("role", "Choose admin, manager or clerk");
        }
        role
    }

    pub fn validate_new(&self) -> AdminResult<NewUser> {
        let mut errors = FieldErrors::new();
        check(&mut errors, "username", validate_username(&self.username));
        let role = self.check_common(&mut errors);
        if self.password.len() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
            );
        }
        finish(errors)?;

        Ok(NewUser {
            username: self.username.clone(),
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            role: role.unwrap_or(Role::Clerk),
            password: self.password.clone(),
        })
    }

    /// Validate an edit of `original`. Only changed fields are sent; the
    /// username cannot be changed.
    pub fn validate_update(&self, original: &User) -> AdminResult<UserUpdate> {
        let mut errors = FieldErrors::new();
        if self.username != original.username {
            errors.add("username", "Username cannot be changed");
        }
        let role = self.check_common(&mut errors);
        finish(errors)?;

        Ok(UserUpdate {
            full_name: changed(&self.full_name, &original.full_name),
            email: changed(&self.email, &original.email),
            role: role.filter(|r| *r != original.role),
        })
    }
}

/// Create/edit form for a customer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerForm {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub id_type: String,
    pub id_number: String,
    pub address: String,
}

impl CustomerForm {
    pub fn from_customer(customer: &Customer) -> Self {
        Self {
            first_name: customer.first_name.clone(),
            last_name: customer.last_name.clone(),
            phone: customer.phone.clone(),
            email: customer.email.clone().unwrap_or_default(),
            id_type: customer.id_type.clone().unwrap_or_default(),
            id_number: customer.id_number.clone().unwrap_or_default(),
            address: customer.address.clone().unwrap_or_default(),
        }
    }

    fn check(&self) -> AdminResult<()> {
        let mut errors = FieldErrors::new();
        check(&mut errors, "first_name", validate_required(&self.first_name, "First name"));
        check(&mut errors, "last_name", validate_required(&self.last_name, "Last name"));
        check(&mut errors, "phone", validate_phone(&self.phone));
        if !self.email.trim().is_empty() {
            check(&mut errors, "email", validate_email(&self.email));
        }
        if self.id_number.trim().is_empty() != self.id_type.trim().is_empty() {
            errors.add("id_number", "ID type and number go together");
        }
        finish(errors)
    }

    pub fn validate_new(&self) -> AdminResult<NewCustomer> {
        self.check()?;
        Ok(NewCustomer {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: optional(&self.email),
            id_type: optional(&self.id_type),
            id_number: optional(&self.id_number),
            address: optional(&self.address),
        })
    }

    pub fn validate_update(&self, original: &Customer) -> AdminResult<CustomerUpdate> {
        self.check()?;
        Ok(CustomerUpdate {
            first_name: changed(&self.first_name, &original.first_name),
            last_name: changed(&self.last_name, &original.last_name),
            phone: changed(&self.phone, &original.phone),
            email: changed(&self.email, original.email.as_deref().unwrap_or_default()),
            address: changed(&self.address, original.address.as_deref().unwrap_or_default()),
        })
    }
}
