//! Data transfer objects exchanged with the REST API.
//!
//! These are plain shapes; the records they describe are owned by the backend.

pub mod customer;
pub mod reports;
pub mod user;

pub use customer::{Customer, CustomerQuery, CustomerUpdate, Loan, LoanStatus, NewCustomer};
pub use reports::{
    CollectionsAnalytics, DailyCollection, DashboardSummary, InventoryCategory, InventoryReport,
};
pub use user::{LoginRequest, LoginResponse, NewUser, PasswordReset, Role, User, UserUpdate};

use serde::{Deserialize, Serialize};

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    /// Number of pages needed for `total` items.
    pub fn page_count(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        let size = u64::from(self.page_size);
        u32::try_from(self.total.div_ceil(size)).unwrap_or(u32::MAX)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count()
    }
}
