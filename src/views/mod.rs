//! Page view-models.
//!
//! Each view composes the services into display-ready values: metric cards
//! with formatted numbers, tables that double as CSV exports, and forms that
//! validate before anything is sent.

pub mod dashboard;
pub mod forms;
pub mod reports;
pub mod users;

pub use dashboard::DashboardView;
pub use forms::{CustomerForm, UserForm};
pub use reports::{CollectionsSection, InventorySection, ReportsView};
pub use users::UserManagementView;

use crate::format::percent_change;

/// Currency symbol used on every page.
pub const CURRENCY: &str = "$";

/// Changes smaller than this, in percent, are shown as flat.
const FLAT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trend {
    Up(f64),
    Down(f64),
    Flat,
}

impl Trend {
    /// Trend from `previous` to `current`, if there is a usable baseline.
    pub fn between(previous: f64, current: f64) -> Option<Trend> {
        let change = percent_change(previous, current)?;
        Some(if change.abs() < FLAT_THRESHOLD {
            Trend::Flat
        } else if change > 0.0 {
            Trend::Up(change)
        } else {
            Trend::Down(change.abs())
        })
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up(p) => write!(f, "▲ {p:.1}%"),
            Trend::Down(p) => write!(f, "▼ {p:.1}%"),
            Trend::Flat => f.write_str("no change"),
        }
    }
}

/// One headline number.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCard {
    pub title: String,
    pub value: String,
    pub detail: Option<String>,
    pub trend: Option<Trend>,
}

impl MetricCard {
    pub fn new(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            detail: None,
            trend: None,
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn trend(mut self, trend: Option<Trend>) -> Self {
        self.trend = trend;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_direction() {
        assert_eq!(Trend::between(100.0, 120.0), Some(Trend::Up(20.0)));
        assert_eq!(Trend::between(100.0, 75.0), Some(Trend::Down(25.0)));
        assert_eq!(Trend::between(100.0, 100.2), Some(Trend::Flat));
        assert_eq!(Trend::between(0.0, 50.0), None);
    }

    #[test]
    fn trend_display() {
        assert_eq!(Trend::Up(12.34).to_string(), "▲ 12.3%");
        assert_eq!(Trend::Flat.to_string(), "no change");
    }
}
