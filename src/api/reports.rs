use chrono::NaiveDate;
use serde::Serialize;

use crate::api::client::ApiClient;
use crate::errors::{AdminError, AdminResult};
use crate::models::{CollectionsAnalytics, DashboardSummary, InventoryReport};

#[derive(Debug, Serialize)]
struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

/// Analytics endpoints.
#[derive(Debug, Clone)]
pub struct ReportsService {
    api: ApiClient,
}

impl ReportsService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn inventory(&self) -> AdminResult<InventoryReport> {
        self.api.get("/api/reports/inventory").await
    }

    pub async fn dashboard(&self) -> AdminResult<DashboardSummary> {
        self.api.get("/api/reports/dashboard").await
    }

    /// Collections between `from` and `to`, both inclusive.
    pub async fn collections(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AdminResult<CollectionsAnalytics> {
        if from > to {
            return Err(AdminError::field(
                "to",
                "End date must not be before start date",
            ));
        }
        self.api
            .get_with_query("/api/reports/collections", &DateRange { from, to })
            .await
    }
}
