//! Endpoint handlers for the sim router.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::models::{
    CollectionsAnalytics, Customer, CustomerUpdate, DailyCollection, DashboardSummary,
    InventoryReport, Loan, LoanStatus, LoginRequest, LoginResponse, NewCustomer, NewUser, Page,
    PasswordReset, Role, User, UserUpdate,
};
use crate::sim::{seed, Account, SimError, SimResult, SimState};
use crate::views::forms::{validate_email, validate_phone, validate_username, MIN_PASSWORD_LEN};

/// Longest collections range served, in days.
const MAX_RANGE_DAYS: i64 = 366;

const MAX_PAGE_SIZE: u32 = 100;

fn require(user: &User, allowed: impl Fn(&Role) -> bool) -> SimResult<()> {
    if allowed(&user.role) {
        Ok(())
    } else {
        Err(SimError::forbidden())
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

// --- auth ---

pub async fn login(
    State(state): State<SimState>,
    Json(request): Json<LoginRequest>,
) -> SimResult<Json<LoginResponse>> {
    let mut missing = Vec::new();
    if request.username.trim().is_empty() {
        missing.push(("username", "Username is required"));
    }
    if request.password.is_empty() {
        missing.push(("password", "Password is required"));
    }
    if !missing.is_empty() {
        return Err(SimError::fields("Missing credentials", &missing));
    }

    let user = {
        let mut data = state.data();
        let account = data
            .accounts
            .values_mut()
            .find(|a| a.user.username == request.username.trim())
            .filter(|a| a.password == request.password && a.user.active)
            .ok_or_else(|| SimError::unauthorized("Invalid username or password"))?;
        account.user.last_login_at = Some(Utc::now());
        account.user.clone()
    };

    info!(username = %user.username, "Sim login");
    Ok(Json(LoginResponse {
        token: state.issue_token(&user),
        user,
    }))
}

pub async fn logout(State(state): State<SimState>, headers: HeaderMap) -> SimResult<StatusCode> {
    state.authorize(&headers)?;
    if let Some(token) = bearer(&headers) {
        state.data().revoked.insert(token.to_string());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<SimState>, headers: HeaderMap) -> SimResult<Json<User>> {
    Ok(Json(state.authorize(&headers)?))
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    current_password: String,
    new_password: String,
}

pub async fn change_password(
    State(state): State<SimState>,
    headers: HeaderMap,
    Json(change): Json<PasswordChange>,
) -> SimResult<Json<Value>> {
    let user = state.authorize(&headers)?;
    if change.new_password.len() < MIN_PASSWORD_LEN {
        return Err(SimError::fields(
            "Password too short",
            &[("new_password", "Password must be at least 8 characters")],
        ));
    }

    let mut data = state.data();
    let account = data
        .accounts
        .get_mut(&user.id)
        .ok_or_else(|| SimError::not_found("User"))?;
    if account.password != change.current_password {
        return Err(SimError::fields(
            "Current password is incorrect",
            &[("current_password", "Current password is incorrect")],
        ));
    }
    account.password = change.new_password;
    Ok(Json(json!({ "status": "ok" })))
}

// --- customers ---

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    search: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

fn matches_search(customer: &Customer, term: &str) -> bool {
    let term = term.to_lowercase();
    customer.full_name().to_lowercase().contains(&term)
        || customer.phone.contains(&term)
        || customer
            .email
            .as_deref()
            .is_some_and(|e| e.to_lowercase().contains(&term))
}

pub async fn list_customers(
    State(state): State<SimState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> SimResult<Json<Page<Customer>>> {
    state.authorize(&headers)?;
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(25).clamp(1, MAX_PAGE_SIZE);
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let data = state.data();
    let matching: Vec<&Customer> = data
        .customers
        .values()
        .filter(|c| search.map_or(true, |term| matches_search(c, term)))
        .collect();

    let skip = (page as usize - 1) * page_size as usize;
    Ok(Json(Page {
        total: matching.len() as u64,
        items: matching
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .cloned()
            .collect(),
        page,
        page_size,
    }))
}

fn check_customer(first: &str, last: &str, phone: &str, email: Option<&str>) -> SimResult<()> {
    let mut fields: Vec<(&str, String)> = Vec::new();
    if first.trim().is_empty() {
        fields.push(("first_name", "First name is required".to_string()));
    }
    if last.trim().is_empty() {
        fields.push(("last_name", "Last name is required".to_string()));
    }
    if let Err(m) = validate_phone(phone) {
        fields.push(("phone", m));
    }
    if let Some(Err(m)) = email.filter(|e| !e.is_empty()).map(validate_email) {
        fields.push(("email", m));
    }

    if fields.is_empty() {
        return Ok(());
    }
    let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
    Err(SimError::fields("Customer could not be saved", &pairs))
}

fn phone_taken(customers: impl Iterator<Item = Customer>, phone: &str, except: Option<u64>) -> bool {
    let digits = |p: &str| p.chars().filter(char::is_ascii_digit).collect::<String>();
    let wanted = digits(phone);
    customers
        .filter(|c| Some(c.id) != except)
        .any(|c| digits(&c.phone) == wanted)
}

pub async fn create_customer(
    State(state): State<SimState>,
    headers: HeaderMap,
    Json(new): Json<NewCustomer>,
) -> SimResult<(StatusCode, Json<Customer>)> {
    state.authorize(&headers)?;
    check_customer(&new.first_name, &new.last_name, &new.phone, new.email.as_deref())?;

    let mut data = state.data();
    if phone_taken(data.customers.values().cloned(), &new.phone, None) {
        return Err(SimError::conflict("A customer with this phone number exists"));
    }

    let id = data.next_customer_id;
    data.next_customer_id += 1;
    let customer = Customer {
        id,
        first_name: new.first_name.trim().to_string(),
        last_name: new.last_name.trim().to_string(),
        phone: new.phone.trim().to_string(),
        email: new.email,
        id_type: new.id_type,
        id_number: new.id_number,
        address: new.address,
        created_at: Utc::now(),
        active_loans: 0,
    };
    data.customers.insert(id, customer.clone());
    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn get_customer(
    State(state): State<SimState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> SimResult<Json<Customer>> {
    state.authorize(&headers)?;
    let data = state.data();
    data.customers
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| SimError::not_found("Customer"))
}

pub async fn update_customer(
    State(state): State<SimState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(update): Json<CustomerUpdate>,
) -> SimResult<Json<Customer>> {
    state.authorize(&headers)?;
    let mut data = state.data();
    let mut customer = data
        .customers
        .get(&id)
        .cloned()
        .ok_or_else(|| SimError::not_found("Customer"))?;

    if let Some(v) = update.first_name {
        customer.first_name = v;
    }
    if let Some(v) = update.last_name {
        customer.last_name = v;
    }
    if let Some(v) = update.phone {
        customer.phone = v;
    }
    if let Some(v) = update.email {
        customer.email = (!v.is_empty()).then_some(v);
    }
    if let Some(v) = update.address {
        customer.address = (!v.is_empty()).then_some(v);
    }
    check_customer(
        &customer.first_name,
        &customer.last_name,
        &customer.phone,
        customer.email.as_deref(),
    )?;
    if phone_taken(data.customers.values().cloned(), &customer.phone, Some(id)) {
        return Err(SimError::conflict("A customer with this phone number exists"));
    }

    data.customers.insert(id, customer.clone());
    Ok(Json(customer))
}

pub async fn delete_customer(
    State(state): State<SimState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> SimResult<StatusCode> {
    let user = state.authorize(&headers)?;
    require(&user, |r| matches!(r, Role::Admin | Role::Manager))?;

    let mut data = state.data();
    let customer = data
        .customers
        .get(&id)
        .ok_or_else(|| SimError::not_found("Customer"))?;
    if customer.active_loans > 0 {
        return Err(SimError::conflict("Customer has open loans"));
    }
    data.customers.remove(&id);
    data.loans.retain(|l| l.customer_id != id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn customer_loans(
    State(state): State<SimState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> SimResult<Json<Vec<Loan>>> {
    state.authorize(&headers)?;
    let data = state.data();
    if !data.customers.contains_key(&id) {
        return Err(SimError::not_found("Customer"));
    }
    Ok(Json(
        data.loans
            .iter()
            .filter(|l| l.customer_id == id)
            .cloned()
            .collect(),
    ))
}

// --- users ---

fn admin(state: &SimState, headers: &HeaderMap) -> SimResult<User> {
    let user = state.authorize(headers)?;
    require(&user, Role::can_manage_users)?;
    Ok(user)
}

fn find_account(accounts: &mut BTreeMap<u64, Account>, id: u64) -> SimResult<&mut Account> {
    accounts.get_mut(&id).ok_or_else(|| SimError::not_found("User"))
}

pub async fn list_users(
    State(state): State<SimState>,
    headers: HeaderMap,
) -> SimResult<Json<Vec<User>>> {
    admin(&state, &headers)?;
    let data = state.data();
    Ok(Json(data.accounts.values().map(|a| a.user.clone()).collect()))
}

pub async fn get_user(
    State(state): State<SimState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> SimResult<Json<User>> {
    admin(&state, &headers)?;
    let mut data = state.data();
    Ok(Json(find_account(&mut data.accounts, id)?.user.clone()))
}

pub async fn create_user(
    State(state): State<SimState>,
    headers: HeaderMap,
    Json(new): Json<NewUser>,
) -> SimResult<(StatusCode, Json<User>)> {
    admin(&state, &headers)?;

    let mut fields: Vec<(&str, String)> = Vec::new();
    if let Err(m) = validate_username(&new.username) {
        fields.push(("username", m));
    }
    if let Err(m) = validate_email(&new.email) {
        fields.push(("email", m));
    }
    if new.full_name.trim().is_empty() {
        fields.push(("full_name", "Full name is required".to_string()));
    }
    if new.role == Role::Unknown {
        fields.push(("role", "Unknown role".to_string()));
    }
    if new.password.len() < MIN_PASSWORD_LEN {
        fields.push(("password", "Password must be at least 8 characters".to_string()));
    }
    if !fields.is_empty() {
        let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        return Err(SimError::fields("User could not be saved", &pairs));
    }

    let mut data = state.data();
    if data.accounts.values().any(|a| a.user.username == new.username) {
        return Err(SimError::conflict("Username is already taken"));
    }

    let id = data.next_user_id;
    data.next_user_id += 1;
    let user = User {
        id,
        username: new.username,
        full_name: new.full_name.trim().to_string(),
        email: new.email.trim().to_string(),
        role: new.role,
        active: true,
        last_login_at: None,
    };
    data.accounts.insert(
        id,
        Account {
            user: user.clone(),
            password: new.password,
        },
    );
    info!(id, username = %user.username, "Sim user created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<SimState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(update): Json<UserUpdate>,
) -> SimResult<Json<User>> {
    admin(&state, &headers)?;
    if let Some(Err(m)) = update.email.as_deref().map(validate_email) {
        return Err(SimError::fields("User could not be saved", &[("email", m.as_str())]));
    }
    if update.full_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(SimError::fields(
            "User could not be saved",
            &[("full_name", "Full name is required")],
        ));
    }

    let mut data = state.data();
    let account = find_account(&mut data.accounts, id)?;
    if let Some(v) = update.full_name {
        account.user.full_name = v.trim().to_string();
    }
    if let Some(v) = update.email {
        account.user.email = v.trim().to_string();
    }
    if let Some(v) = update.role {
        account.user.role = v;
    }
    Ok(Json(account.user.clone()))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    active: bool,
}

pub async fn set_user_status(
    State(state): State<SimState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(change): Json<StatusChange>,
) -> SimResult<Json<User>> {
    let caller = admin(&state, &headers)?;
    if caller.id == id && !change.active {
        return Err(SimError::fields(
            "You cannot deactivate your own account",
            &[("active", "You cannot deactivate your own account")],
        ));
    }

    let mut data = state.data();
    let account = find_account(&mut data.accounts, id)?;
    account.user.active = change.active;
    Ok(Json(account.user.clone()))
}

pub async fn reset_password(
    State(state): State<SimState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> SimResult<Json<PasswordReset>> {
    admin(&state, &headers)?;
    let temporary_password: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();

    let mut data = state.data();
    find_account(&mut data.accounts, id)?.password = temporary_password.clone();
    Ok(Json(PasswordReset { temporary_password }))
}

// --- reports ---

fn reporter(state: &SimState, headers: &HeaderMap) -> SimResult<User> {
    let user = state.authorize(headers)?;
    require(&user, Role::can_view_reports)?;
    Ok(user)
}

pub async fn inventory_report(
    State(state): State<SimState>,
    headers: HeaderMap,
) -> SimResult<Json<InventoryReport>> {
    reporter(&state, &headers)?;
    let categories = seed::inventory_categories();
    Ok(Json(InventoryReport {
        generated_at: Utc::now(),
        total_items: categories.iter().map(|c| c.item_count).sum(),
        total_appraised_value: categories.iter().map(|c| c.appraised_value).sum(),
        categories,
    }))
}

fn is_overdue(loan: &Loan, today: NaiveDate) -> bool {
    loan.status == LoanStatus::Overdue || (loan.status.is_open() && loan.due_on < today)
}

pub async fn dashboard_report(
    State(state): State<SimState>,
    headers: HeaderMap,
) -> SimResult<Json<DashboardSummary>> {
    // The dashboard is visible to every role.
    state.authorize(&headers)?;
    let today = Utc::now().date_naive();
    let data = state.data();
    let open: Vec<&Loan> = data.loans.iter().filter(|l| l.status.is_open()).collect();

    let month_start = today.with_day(1).unwrap_or(today);
    Ok(Json(DashboardSummary {
        active_loans: open.len() as u64,
        loans_due_today: open.iter().filter(|l| l.due_on == today).count() as u64,
        overdue_loans: open.iter().filter(|l| is_overdue(l, today)).count() as u64,
        total_principal_out: open.iter().map(|l| l.principal).sum(),
        collections_today: seed::daily_collection(today).0,
        new_customers_this_month: data
            .customers
            .values()
            .filter(|c| c.created_at.date_naive() >= month_start)
            .count() as u64,
        collections_last_week: Some(seed::daily_collection(today - chrono::Duration::days(7)).0),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    from: NaiveDate,
    to: NaiveDate,
}

pub async fn collections_report(
    State(state): State<SimState>,
    headers: HeaderMap,
    Query(range): Query<RangeQuery>,
) -> SimResult<Json<CollectionsAnalytics>> {
    reporter(&state, &headers)?;
    if range.from > range.to {
        return Err(SimError::fields(
            "Invalid date range",
            &[("to", "End date must not be before start date")],
        ));
    }
    if (range.to - range.from).num_days() >= MAX_RANGE_DAYS {
        return Err(SimError::fields(
            "Invalid date range",
            &[("from", "Range may not exceed one year")],
        ));
    }

    let daily: Vec<DailyCollection> = range
        .from
        .iter_days()
        .take_while(|d| *d <= range.to)
        .map(|date| {
            let (collected, payments) = seed::daily_collection(date);
            DailyCollection {
                date,
                collected,
                payments,
            }
        })
        .collect();
    let collected: f64 = daily.iter().map(|d| d.collected).sum();

    let today = Utc::now().date_naive();
    let data = state.data();
    let overdue: Vec<&Loan> = data.loans.iter().filter(|l| is_overdue(l, today)).collect();

    Ok(Json(CollectionsAnalytics {
        period_start: range.from,
        period_end: range.to,
        expected: (collected * 1.2 * 100.0).round() / 100.0,
        collected,
        overdue_count: overdue.len() as u64,
        overdue_amount: overdue.iter().map(|l| l.principal).sum(),
        daily,
    }))
}
