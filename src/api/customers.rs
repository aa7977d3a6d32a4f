use tracing::debug;

use crate::api::client::ApiClient;
use crate::errors::AdminResult;
use crate::models::{Customer, CustomerQuery, CustomerUpdate, Loan, NewCustomer, Page};

/// Customer records and their pawn loans.
#[derive(Debug, Clone)]
pub struct CustomerService {
    api: ApiClient,
}

impl CustomerService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self, query: &CustomerQuery) -> AdminResult<Page<Customer>> {
        debug!(search = ?query.search, page = query.page, "Listing customers");
        self.api.get_with_query("/api/customers", query).await
    }

    pub async fn get(&self, id: u64) -> AdminResult<Customer> {
        self.api.get(&format!("/api/customers/{id}")).await
    }

    pub async fn create(&self, customer: &NewCustomer) -> AdminResult<Customer> {
        self.api.post("/api/customers", customer).await
    }

    pub async fn update(&self, id: u64, update: &CustomerUpdate) -> AdminResult<Customer> {
        self.api.put(&format!("/api/customers/{id}"), update).await
    }

    pub async fn delete(&self, id: u64) -> AdminResult<()> {
        self.api.delete(&format!("/api/customers/{id}")).await
    }

    /// All loans, open and closed, held by the customer.
    pub async fn loans(&self, id: u64) -> AdminResult<Vec<Loan>> {
        self.api.get(&format!("/api/customers/{id}/loans")).await
    }
}
