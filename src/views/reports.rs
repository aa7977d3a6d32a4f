use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, Utc};

use crate::api::ReportsService;
use crate::errors::AdminResult;
use crate::export::{collections_table, export_filename, inventory_table, CsvTable};
use crate::fetch::{Fetched, ReportFetcher};
use crate::format::{format_compact, format_currency, format_percent, safe_ratio};
use crate::models::{CollectionsAnalytics, InventoryReport};
use crate::views::{MetricCard, CURRENCY};

/// Days covered by the collections report when no range is chosen.
pub const DEFAULT_RANGE_DAYS: i64 = 30;

/// The last [`DEFAULT_RANGE_DAYS`] days up to and including `today`.
pub fn default_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(DEFAULT_RANGE_DAYS - 1), today)
}

#[derive(Debug, Clone)]
pub struct CollectionsSection {
    pub analytics: CollectionsAnalytics,
    pub cards: Vec<MetricCard>,
    pub table: CsvTable,
}

impl CollectionsSection {
    pub async fn load(reports: &ReportsService, from: NaiveDate, to: NaiveDate) -> AdminResult<Self> {
        let analytics = reports.collections(from, to).await?;
        Ok(Self::from_analytics(analytics))
    }

    pub fn from_analytics(analytics: CollectionsAnalytics) -> Self {
        let rate = safe_ratio(analytics.collected, analytics.expected) * 100.0;
        let cards = vec![
            MetricCard::new("Collected", format_currency(analytics.collected, CURRENCY))
                .detail(format!("of {} expected", format_currency(analytics.expected, CURRENCY))),
            MetricCard::new("Collection Rate", format_percent(rate, 1)),
            MetricCard::new("Overdue", analytics.overdue_count.to_string())
                .detail(format_currency(analytics.overdue_amount, CURRENCY)),
        ];
        let table = collections_table(&analytics);
        Self {
            analytics,
            cards,
            table,
        }
    }

    /// Write the daily table as `collections-<end date>.csv` under `dir`.
    pub async fn export_to(&self, dir: &Path) -> AdminResult<PathBuf> {
        let path = dir.join(export_filename("collections", self.analytics.period_end));
        self.table.write_to(&path).await?;
        Ok(path)
    }
}

#[derive(Debug, Clone)]
pub struct InventorySection {
    pub report: Fetched<InventoryReport>,
    pub cards: Vec<MetricCard>,
    pub table: CsvTable,
}

impl InventorySection {
    pub async fn load(fetcher: &ReportFetcher<InventoryReport>, refresh: bool) -> AdminResult<Self> {
        Ok(Self::from_fetched(fetcher.load(refresh).await?))
    }

    pub fn from_fetched(report: Fetched<InventoryReport>) -> Self {
        let data = &report.data;
        let mut value_card =
            MetricCard::new("Appraised Value", format_currency(data.total_appraised_value, CURRENCY));
        if report.stale {
            value_card = value_card.detail(format!(
                "cached {}",
                report.fetched_at.format("%Y-%m-%d %H:%M")
            ));
        }
        let cards = vec![
            MetricCard::new("Items", format_compact(data.total_items as f64)),
            value_card,
            MetricCard::new("Categories", data.categories.len().to_string()),
        ];
        let table = inventory_table(data);
        Self {
            report,
            cards,
            table,
        }
    }

    pub async fn export_to(&self, dir: &Path) -> AdminResult<PathBuf> {
        let path = dir.join(export_filename("inventory", Utc::now().date_naive()));
        self.table.write_to(&path).await?;
        Ok(path)
    }
}

/// Reports page: collections for a date range next to the inventory report.
#[derive(Debug, Clone)]
pub struct ReportsView {
    pub collections: CollectionsSection,
    pub inventory: InventorySection,
}

impl ReportsView {
    pub async fn load(
        reports: &ReportsService,
        inventory: &ReportFetcher<InventoryReport>,
        from: NaiveDate,
        to: NaiveDate,
        refresh: bool,
    ) -> AdminResult<Self> {
        let (collections, inventory) = tokio::join!(
            CollectionsSection::load(reports, from, to),
            InventorySection::load(inventory, refresh)
        );
        Ok(Self {
            collections: collections?,
            inventory: inventory?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DataSource;
    use crate::models::{DailyCollection, InventoryCategory};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    #[test]
    fn default_range_spans_thirty_days() {
        let (from, to) = default_range(day(30));
        assert_eq!(from, day(1));
        assert_eq!(to, day(30));
    }

    #[test]
    fn collection_cards() {
        let section = CollectionsSection::from_analytics(CollectionsAnalytics {
            period_start: day(1),
            period_end: day(2),
            expected: 2_000.0,
            collected: 1_500.0,
            overdue_count: 3,
            overdue_amount: 500.0,
            daily: vec![
                DailyCollection { date: day(1), collected: 700.0, payments: 4 },
                DailyCollection { date: day(2), collected: 800.0, payments: 5 },
            ],
        });

        assert_eq!(section.cards[0].value, "$1,500.00");
        assert_eq!(section.cards[1].value, "75.0%");
        assert_eq!(section.cards[2].detail.as_deref(), Some("$500.00"));
        assert_eq!(section.table.len(), 2);
    }

    #[test]
    fn zero_expected_reads_as_zero_rate() {
        let section = CollectionsSection::from_analytics(CollectionsAnalytics {
            period_start: day(1),
            period_end: day(1),
            expected: 0.0,
            collected: 0.0,
            overdue_count: 0,
            overdue_amount: 0.0,
            daily: vec![],
        });
        assert_eq!(section.cards[1].value, "0.0%");
        assert!(section.table.is_empty());
    }

    #[test]
    fn inventory_cards_and_table() {
        let section = InventorySection::from_fetched(Fetched {
            data: InventoryReport {
                generated_at: Utc::now(),
                total_items: 3,
                total_appraised_value: 400.0,
                categories: vec![
                    InventoryCategory { name: "Tools".into(), item_count: 1, appraised_value: 100.0 },
                    InventoryCategory { name: "Gold".into(), item_count: 2, appraised_value: 300.0 },
                ],
            },
            source: DataSource::Network,
            fetched_at: Utc::now(),
            stale: false,
        });

        assert_eq!(section.cards[0].value, "3");
        assert_eq!(section.cards[1].detail, None);
        assert_eq!(section.table.rows[1], vec!["Gold", "2", "300.00", "75.0"]);
    }
}
