use tracing::warn;

use crate::errors::AdminResult;
use crate::fetch::{Fetched, ReportFetcher};
use crate::format::{format_compact, format_currency, format_percent, safe_ratio};
use crate::models::{DashboardSummary, InventoryReport};
use crate::views::{MetricCard, Trend, CURRENCY};

/// Landing page: loan book summary plus inventory value.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub summary: Fetched<DashboardSummary>,
    pub inventory: Option<Fetched<InventoryReport>>,
    /// Why inventory is missing, when it is
    pub inventory_error: Option<String>,
    pub cards: Vec<MetricCard>,
}

impl DashboardView {
    /// Load the summary and the inventory report concurrently.
    ///
    /// A failed summary fails the page. A failed inventory report only drops
    /// its card.
    pub async fn load(
        summary: &ReportFetcher<DashboardSummary>,
        inventory: &ReportFetcher<InventoryReport>,
        refresh: bool,
    ) -> AdminResult<Self> {
        let (summary, inventory) = tokio::join!(summary.load(refresh), inventory.load(refresh));
        let summary = summary?;

        let (inventory, inventory_error) = match inventory {
            Ok(fetched) => (Some(fetched), None),
            Err(e) => {
                warn!(error = %e, "Dashboard inventory unavailable");
                (None, Some(e.to_string()))
            }
        };

        let cards = dashboard_cards(&summary.data, inventory.as_ref());
        Ok(Self {
            summary,
            inventory,
            inventory_error,
            cards,
        })
    }
}

pub fn dashboard_cards(
    summary: &DashboardSummary,
    inventory: Option<&Fetched<InventoryReport>>,
) -> Vec<MetricCard> {
    let overdue_rate = safe_ratio(summary.overdue_loans as f64, summary.active_loans as f64) * 100.0;
    let mut cards = vec![
        MetricCard::new("Active Loans", format_compact(summary.active_loans as f64)).detail(
            format!(
                "{} overdue ({})",
                summary.overdue_loans,
                format_percent(overdue_rate, 1)
            ),
        ),
        MetricCard::new("Due Today", summary.loans_due_today.to_string()),
        MetricCard::new(
            "Principal Outstanding",
            format_currency(summary.total_principal_out, CURRENCY),
        ),
        MetricCard::new(
            "Collections Today",
            format_currency(summary.collections_today, CURRENCY),
        )
        .trend(
            summary
                .collections_last_week
                .and_then(|prev| Trend::between(prev, summary.collections_today)),
        ),
        MetricCard::new(
            "New Customers",
            summary.new_customers_this_month.to_string(),
        )
        .detail("this month"),
    ];

    if let Some(fetched) = inventory {
        let report = &fetched.data;
        let mut detail = format!("{} items", report.total_items);
        if fetched.stale {
            detail.push_str(&format!(
                " · as of {}",
                fetched.fetched_at.format("%H:%M")
            ));
        }
        cards.push(
            MetricCard::new(
                "Inventory Value",
                format_currency(report.total_appraised_value, CURRENCY),
            )
            .detail(detail),
        );
    }
    cards
}
