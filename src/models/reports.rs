//! Report payloads. Inventory and dashboard snapshots are cached, so they
//! carry a structural check that the cache runs on every read.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CachedReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryCategory {
    pub name: String,
    pub item_count: u64,
    pub appraised_value: f64,
}

/// Point-in-time snapshot of pledged and forfeited stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReport {
    pub generated_at: DateTime<Utc>,
    pub total_items: u64,
    pub total_appraised_value: f64,
    pub categories: Vec<InventoryCategory>,
}

impl CachedReport for InventoryReport {
    const CACHE_KEY: &'static str = "inventory_report";

    fn validate(&self) -> Result<(), String> {
        if !self.total_appraised_value.is_finite() || self.total_appraised_value < 0.0 {
            return Err("total_appraised_value is not a valid amount".to_string());
        }
        let mut counted = 0u64;
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err("category with empty name".to_string());
            }
            if !category.appraised_value.is_finite() {
                return Err(format!("category '{}' has invalid value", category.name));
            }
            counted = counted.saturating_add(category.item_count);
        }
        if counted != self.total_items {
            return Err(format!(
                "category item counts ({counted}) do not add up to total_items ({})",
                self.total_items
            ));
        }
        Ok(())
    }
}

/// Headline numbers for the dashboard page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub active_loans: u64,
    pub loans_due_today: u64,
    pub overdue_loans: u64,
    pub total_principal_out: f64,
    pub collections_today: f64,
    pub new_customers_this_month: u64,
    /// Collections on the same weekday a week earlier, for trend display
    #[serde(default)]
    pub collections_last_week: Option<f64>,
}

impl CachedReport for DashboardSummary {
    const CACHE_KEY: &'static str = "dashboard_summary";

    fn validate(&self) -> Result<(), String> {
        if !self.total_principal_out.is_finite() || !self.collections_today.is_finite() {
            return Err("summary amounts must be finite".to_string());
        }
        if self.overdue_loans > self.active_loans {
            return Err("overdue_loans exceeds active_loans".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCollection {
    pub date: NaiveDate,
    pub collected: f64,
    pub payments: u32,
}

/// Collections performance over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionsAnalytics {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Amount due in the period
    pub expected: f64,
    pub collected: f64,
    pub overdue_count: u64,
    pub overdue_amount: f64,
    #[serde(default)]
    pub daily: Vec<DailyCollection>,
}
