use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A pawn-shop customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Kind of identification presented, e.g. "drivers_license"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub active_loans: u32,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Listing filter for customers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for CustomerQuery {
    fn default() -> Self {
        Self {
            search: None,
            page: 1,
            page_size: 25,
        }
    }
}

impl CustomerQuery {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Renewed,
    Redeemed,
    Forfeited,
    Overdue,
    #[serde(other)]
    Unknown,
}

impl LoanStatus {
    /// Whether principal is still outstanding.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            LoanStatus::Active | LoanStatus::Renewed | LoanStatus::Overdue
        )
    }
}

/// A pawn loan (ticket) held against a customer's item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: u64,
    pub customer_id: u64,
    pub ticket_number: String,
    pub item_description: String,
    pub principal: f64,
    /// Monthly interest rate as a percentage
    pub interest_rate: f64,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
    pub status: LoanStatus,
}

impl Loan {
    /// Whole days past due as of `today`, zero when not overdue or closed.
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if !self.status.is_open() || today <= self.due_on {
            return 0;
        }
        (today - self.due_on).num_days()
    }
}
