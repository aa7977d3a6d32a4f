//! Demo data for the sim.
//!
//! | username  | role    | active |
//! |-----------|---------|--------|
//! | `admin`   | admin   | yes    |
//! | `manager` | manager | yes    |
//! | `clerk`   | clerk   | yes    |
//! | `former`  | clerk   | no     |

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate, TimeZone, Utc};

use crate::models::{Customer, InventoryCategory, Loan, LoanStatus, Role, User};
use crate::sim::{Account, SimData};

/// Password of every seeded account.
pub const SIM_PASSWORD: &str = "pawnshop123";

fn account(id: u64, username: &str, full_name: &str, role: Role, active: bool) -> (u64, Account) {
    let user = User {
        id,
        username: username.to_string(),
        full_name: full_name.to_string(),
        email: format!("{username}@example.com"),
        role,
        active,
        last_login_at: None,
    };
    (
        id,
        Account {
            user,
            password: SIM_PASSWORD.to_string(),
        },
    )
}

fn customer(id: u64, first: &str, last: &str, phone: &str, since: NaiveDate) -> (u64, Customer) {
    let created_at = since
        .and_hms_opt(10, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(Utc::now);
    (
        id,
        Customer {
            id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            phone: phone.to_string(),
            email: None,
            id_type: Some("drivers_license".to_string()),
            id_number: Some(format!("D{:07}", id * 7919)),
            address: None,
            created_at,
            active_loans: 0,
        },
    )
}

fn loan(
    id: u64,
    customer_id: u64,
    item: &str,
    principal: f64,
    issued_on: NaiveDate,
    due_on: NaiveDate,
    status: LoanStatus,
) -> Loan {
    Loan {
        id,
        customer_id,
        ticket_number: format!("T-{:05}", 10_000 + id),
        item_description: item.to_string(),
        principal,
        interest_rate: 0.2,
        issued_on,
        due_on,
        status,
    }
}

pub(crate) fn data(today: NaiveDate) -> SimData {
    let days = Duration::days;

    let accounts = BTreeMap::from([
        account(1, "admin", "Alex Admin", Role::Admin, true),
        account(2, "manager", "Morgan Manager", Role::Manager, true),
        account(3, "clerk", "Casey Clerk", Role::Clerk, true),
        account(4, "former", "Frankie Former", Role::Clerk, false),
    ]);

    let mut customers = BTreeMap::from([
        customer(1, "Maria", "Gonzalez", "555-201-3344", today - days(400)),
        customer(2, "Dwayne", "Carter", "555-883-1200", today - days(95)),
        customer(3, "Priya", "Raman", "(555) 410-7781", today - days(12)),
        customer(4, "Tom", "O'Neil", "555-660-0098", today - days(2)),
    ]);

    let loans = vec![
        loan(1, 1, "14k gold chain", 350.0, today - days(25), today + days(5), LoanStatus::Active),
        loan(2, 1, "Cordless drill set", 80.0, today - days(40), today - days(10), LoanStatus::Overdue),
        loan(3, 2, "Electric guitar", 420.0, today - days(30), today, LoanStatus::Active),
        loan(4, 2, "Gaming console", 150.0, today - days(90), today - days(60), LoanStatus::Redeemed),
        loan(5, 3, "Laptop", 500.0, today - days(10), today + days(20), LoanStatus::Renewed),
        loan(6, 4, "Diamond ring", 1_200.0, today - days(2), today + days(28), LoanStatus::Active),
    ];

    for loan in loans.iter().filter(|l| l.status.is_open()) {
        if let Some(c) = customers.get_mut(&loan.customer_id) {
            c.active_loans += 1;
        }
    }

    SimData {
        accounts,
        customers,
        loans,
        revoked: HashSet::new(),
        next_user_id: 5,
        next_customer_id: 5,
    }
}

pub(crate) fn inventory_categories() -> Vec<InventoryCategory> {
    [
        ("Jewelry", 42, 18_500.0),
        ("Electronics", 31, 9_200.5),
        ("Tools", 18, 2_700.0),
        ("Musical Instruments", 7, 3_400.0),
    ]
    .into_iter()
    .map(|(name, item_count, appraised_value)| InventoryCategory {
        name: name.to_string(),
        item_count,
        appraised_value,
    })
    .collect()
}

/// Amount collected and payment count on `date`. Deterministic so reports
/// are stable across calls.
pub(crate) fn daily_collection(date: NaiveDate) -> (f64, u32) {
    use chrono::Datelike;
    // Nine-day cycle so the same weekday differs from one week to the next.
    let n = date.num_days_from_ce().rem_euclid(9) as u32;
    (400.0 + f64::from(n) * 75.0, 3 + n % 4)
}
