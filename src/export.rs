//! CSV export of report tables and record listings.
//!
//! Cells that a spreadsheet would evaluate as a formula are prefixed with a
//! single quote. Plain negative numbers are left alone so amounts stay
//! numeric.

use std::borrow::Cow;
use std::path::Path;

use chrono::NaiveDate;
use tokio::fs;
use tracing::info;

use crate::errors::AdminResult;
use crate::format::{safe_number, safe_ratio};
use crate::models::{CollectionsAnalytics, Customer, InventoryReport, User};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_csv_string(&self) -> String {
        let mut out = String::new();
        for line in std::iter::once(&self.headers).chain(self.rows.iter()) {
            let cells: Vec<Cow<'_, str>> = line.iter().map(|c| escape_cell(c)).collect();
            out.push_str(&cells.join(","));
            out.push_str("\r\n");
        }
        out
    }

    /// Write the table to `path`, creating parent directories.
    pub async fn write_to(&self, path: &Path) -> AdminResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, self.to_csv_string()).await?;
        info!(path = %path.display(), rows = self.rows.len(), "Exported CSV");
        Ok(())
    }
}

fn is_plain_negative_number(cell: &str) -> bool {
    let Some(rest) = cell.strip_prefix('-') else {
        return false;
    };
    !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_digit() || c == '.')
        && rest.parse::<f64>().is_ok()
}

fn escape_cell(cell: &str) -> Cow<'_, str> {
    let mut value = Cow::Borrowed(cell);

    let risky = cell.starts_with(['=', '+', '-', '@', '\t', '\r']);
    if risky && !is_plain_negative_number(cell) {
        value = Cow::Owned(format!("'{cell}"));
    }

    if value.contains([',', '"', '\n', '\r']) {
        value = Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")));
    }
    value
}

/// File name such as `inventory-2026-03-01.csv`.
pub fn export_filename(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}-{}.csv", date.format("%Y-%m-%d"))
}

fn amount(value: f64) -> String {
    format!("{:.2}", safe_number(value))
}

pub fn inventory_table(report: &InventoryReport) -> CsvTable {
    let mut table = CsvTable::new(["Category", "Items", "Appraised Value", "Share of Value (%)"]);
    for category in &report.categories {
        let share = safe_ratio(category.appraised_value, report.total_appraised_value) * 100.0;
        table.push_row([
            category.name.clone(),
            category.item_count.to_string(),
            amount(category.appraised_value),
            format!("{share:.1}"),
        ]);
    }
    table
}

pub fn collections_table(analytics: &CollectionsAnalytics) -> CsvTable {
    let mut table = CsvTable::new(["Date", "Collected", "Payments"]);
    for day in &analytics.daily {
        table.push_row([
            day.date.format("%Y-%m-%d").to_string(),
            amount(day.collected),
            day.payments.to_string(),
        ]);
    }
    table
}

pub fn customers_table(customers: &[Customer]) -> CsvTable {
    let mut table = CsvTable::new([
        "ID",
        "First Name",
        "Last Name",
        "Phone",
        "Email",
        "Active Loans",
        "Customer Since",
    ]);
    for c in customers {
        table.push_row([
            c.id.to_string(),
            c.first_name.clone(),
            c.last_name.clone(),
            c.phone.clone(),
            c.email.clone().unwrap_or_default(),
            c.active_loans.to_string(),
            c.created_at.format("%Y-%m-%d").to_string(),
        ]);
    }
    table
}

pub fn users_table(users: &[User]) -> CsvTable {
    let mut table = CsvTable::new([
        "ID",
        "Username",
        "Full Name",
        "Email",
        "Role",
        "Active",
        "Last Login",
    ]);
    for u in users {
        table.push_row([
            u.id.to_string(),
            u.username.clone(),
            u.full_name.clone(),
            u.email.clone(),
            u.role.to_string(),
            if u.active { "yes" } else { "no" }.to_string(),
            u.last_login_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailyCollection, InventoryCategory, Role};
    use chrono::Utc;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(escape_cell("plain"), "plain");
        assert_eq!(escape_cell("a,b"), "\"a,b\"");
        assert_eq!(escape_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_cell("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn neutralizes_formulas() {
        assert_eq!(escape_cell("=SUM(A1:A2)"), "'=SUM(A1:A2)");
        assert_eq!(escape_cell("+1"), "'+1");
        assert_eq!(escape_cell("@cmd"), "'@cmd");
        assert_eq!(escape_cell("-2+3"), "'-2+3");
        assert_eq!(escape_cell("\tx"), "'\tx");
        assert_eq!(escape_cell("=1,2"), "\"'=1,2\"");
    }

    #[test]
    fn keeps_negative_numbers_numeric() {
        assert_eq!(escape_cell("-42"), "-42");
        assert_eq!(escape_cell("-42.50"), "-42.50");
        assert_eq!(escape_cell("-"), "'-");
    }

    #[test]
    fn renders_header_and_rows() {
        let mut table = CsvTable::new(["Name", "Amount"]);
        table.push_row(["Ring, gold", "120.00"]);
        assert_eq!(
            table.to_csv_string(),
            "Name,Amount\r\n\"Ring, gold\",120.00\r\n"
        );
    }

    #[test]
    fn inventory_share_handles_zero_total() {
        let report = InventoryReport {
            generated_at: Utc::now(),
            total_items: 1,
            total_appraised_value: 0.0,
            categories: vec![InventoryCategory {
                name: "Misc".into(),
                item_count: 1,
                appraised_value: 0.0,
            }],
        };
        let table = inventory_table(&report);
        assert_eq!(table.rows[0], vec!["Misc", "1", "0.00", "0.0"]);
    }

    #[test]
    fn collections_rows_follow_daily_entries() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let analytics = CollectionsAnalytics {
            period_start: day,
            period_end: day,
            expected: 100.0,
            collected: 80.0,
            overdue_count: 1,
            overdue_amount: 20.0,
            daily: vec![DailyCollection { date: day, collected: 80.0, payments: 3 }],
        };
        let table = collections_table(&analytics);
        assert_eq!(table.headers, vec!["Date", "Collected", "Payments"]);
        assert_eq!(table.rows, vec![vec!["2026-03-02", "80.00", "3"]]);
    }

    #[test]
    fn users_table_formats_flags() {
        let users = vec![User {
            id: 1,
            username: "=admin".into(),
            full_name: "Ada Admin".into(),
            email: "ada@example.com".into(),
            role: Role::Admin,
            active: false,
            last_login_at: None,
        }];
        let csv = users_table(&users).to_csv_string();
        assert!(csv.contains("1,'=admin,Ada Admin,ada@example.com,admin,no,\r\n"));
    }

    #[test]
    fn filename_includes_date() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();
        assert_eq!(export_filename("inventory", day), "inventory-2026-01-09.csv");
    }

    #[tokio::test]
    async fn write_to_creates_directories() {
        let dir = std::env::temp_dir()
            .join("pawnshop-admin-tests")
            .join(uuid::Uuid::new_v4().to_string());
        let path = dir.join("nested").join("out.csv");
        let mut table = CsvTable::new(["A"]);
        table.push_row(["1"]);

        table.write_to(&path).await.unwrap();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, "A\r\n1\r\n");
    }
}
