//! Command-line front end for the pawn shop admin API.
//!
//! The session is persisted between invocations, so `login` once and then
//! run the other commands:
//!
//! ```text
//! pawnshop_admin login admin --password pawnshop123
//! pawnshop_admin dashboard
//! pawnshop_admin reports collections --from 2026-09-01 --to 2026-09-30 --csv ./out
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

use pawnshop_admin::config::AdminConfig;
use pawnshop_admin::errors::{AdminError, AdminResult};
use pawnshop_admin::export::{customers_table, export_filename};
use pawnshop_admin::format::{format_currency, format_percent, safe_ratio};
use pawnshop_admin::logging::init_logging;
use pawnshop_admin::models::{CustomerQuery, User};
use pawnshop_admin::session::SessionContext;
use pawnshop_admin::views::reports::default_range;
use pawnshop_admin::views::{
    CollectionsSection, DashboardView, InventorySection, MetricCard, UserManagementView, CURRENCY,
};

#[derive(Debug, Parser)]
#[command(name = "pawnshop_admin", about = "Pawn shop administration", version)]
struct Cli {
    /// Override the API base URL
    #[arg(long, global = true, env = "PAWNSHOP_API_URL")]
    api_url: Option<String>,

    /// Enable log output at this level
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and remember the session
    Login {
        username: String,
        #[arg(long, env = "PAWNSHOP_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and clear stored session data
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Loan book summary and inventory value
    Dashboard {
        /// Bypass the report cache
        #[arg(long)]
        refresh: bool,
    },
    /// Search and list customers
    Customers {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Write the listed customers to a CSV file in this directory
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Show one customer and their loans
    Customer { id: u64 },
    /// List staff accounts (admin only)
    Users {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    #[command(subcommand)]
    Reports(ReportCommand),
}

#[derive(Debug, Subcommand)]
enum ReportCommand {
    /// Inventory by category
    Inventory {
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Collections for a date range (default: last 30 days)
    Collections {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn print_cards(cards: &[MetricCard]) {
    for card in cards {
        let mut line = format!("{:<22} {:>14}", card.title, card.value);
        if let Some(detail) = &card.detail {
            line.push_str(&format!("  {detail}"));
        }
        if let Some(trend) = &card.trend {
            line.push_str(&format!("  {trend}"));
        }
        println!("{line}");
    }
}

fn print_user(user: &User) {
    println!(
        "{} ({}) <{}> role={} active={}",
        user.full_name, user.username, user.email, user.role, user.active
    );
}

async fn signed_in(ctx: &SessionContext) -> AdminResult<User> {
    ctx.restore().await?.ok_or(AdminError::SessionExpired)
}

async fn run(cli: Cli, ctx: &SessionContext) -> AdminResult<()> {
    match cli.command {
        Command::Login { username, password } => {
            let user = ctx.login(&username, &password).await?;
            print!("Signed in as ");
            print_user(&user);
        }
        Command::Logout => {
            if ctx.restore().await?.is_some() {
                ctx.logout().await?;
            }
            println!("Signed out");
        }
        Command::Whoami => print_user(&signed_in(ctx).await?),
        Command::Dashboard { refresh } => {
            signed_in(ctx).await?;
            let view = DashboardView::load(&ctx.dashboard_fetcher(), &ctx.inventory_fetcher(), refresh)
                .await?;
            print_cards(&view.cards);
            if let Some(reason) = view.inventory_error {
                println!("(inventory unavailable: {reason})");
            }
        }
        Command::Customers { search, page, csv } => {
            signed_in(ctx).await?;
            let mut query = search.map(CustomerQuery::search).unwrap_or_default();
            query.page = page;
            let result = ctx.customers().list(&query).await?;
            for c in &result.items {
                println!("{:>5}  {:<28} {:<16} loans={}", c.id, c.full_name(), c.phone, c.active_loans);
            }
            println!("page {} of {} ({} customers)", result.page, result.page_count(), result.total);
            if let Some(dir) = csv {
                let path = dir.join(export_filename("customers", Utc::now().date_naive()));
                customers_table(&result.items).write_to(&path).await?;
                println!("Wrote {}", path.display());
            }
        }
        Command::Customer { id } => {
            signed_in(ctx).await?;
            let service = ctx.customers();
            let (customer, loans) = tokio::try_join!(service.get(id), service.loans(id))?;
            println!("{} <{}>", customer.full_name(), customer.phone);
            let today = Utc::now().date_naive();
            for loan in loans {
                let overdue = loan.days_overdue(today);
                println!(
                    "  {}  {:<24} {:>12}  due {}  {:?}{}",
                    loan.ticket_number,
                    loan.item_description,
                    format_currency(loan.principal, CURRENCY),
                    loan.due_on,
                    loan.status,
                    if overdue > 0 { format!(" ({overdue} days overdue)") } else { String::new() },
                );
            }
        }
        Command::Users { csv } => {
            signed_in(ctx).await?;
            let view = UserManagementView::load(ctx.users()).await?;
            for user in view.users() {
                print!("{:>4}  ", user.id);
                print_user(user);
            }
            if let Some(dir) = csv {
                let path = dir.join(export_filename("users", Utc::now().date_naive()));
                view.table().write_to(&path).await?;
                println!("Wrote {}", path.display());
            }
        }
        Command::Reports(ReportCommand::Inventory { refresh, csv }) => {
            signed_in(ctx).await?;
            let section = InventorySection::load(&ctx.inventory_fetcher(), refresh).await?;
            print_cards(&section.cards);
            for category in &section.report.data.categories {
                println!(
                    "  {:<22} {:>6} {:>14}",
                    category.name,
                    category.item_count,
                    format_currency(category.appraised_value, CURRENCY)
                );
            }
            if let Some(dir) = csv {
                println!("Wrote {}", section.export_to(&dir).await?.display());
            }
        }
        Command::Reports(ReportCommand::Collections { from, to, csv }) => {
            signed_in(ctx).await?;
            let (default_from, default_to) = default_range(Utc::now().date_naive());
            let section = CollectionsSection::load(
                &ctx.reports(),
                from.unwrap_or(default_from),
                to.unwrap_or(default_to),
            )
            .await?;
            print_cards(&section.cards);
            let analytics = &section.analytics;
            println!(
                "{} to {}: {} of expected",
                analytics.period_start,
                analytics.period_end,
                format_percent(safe_ratio(analytics.collected, analytics.expected) * 100.0, 1)
            );
            if let Some(dir) = csv {
                println!("Wrote {}", section.export_to(&dir).await?.display());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AdminConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(level) = &cli.log {
        config.logging.enabled = true;
        config.logging.level = level.clone();
    }
    // A short-lived command never idles long enough to time out.
    config.session.timer_enabled = false;

    if let Err(e) = config.validate().and_then(|()| init_logging(&config.logging)) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let ctx = match SessionContext::new(&config) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli, &ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let e = ctx.check_error(e).await;
            if e.requires_login() {
                eprintln!("{e}. Run `pawnshop_admin login <username>` first.");
            } else if let Some(fields) = e.field_errors() {
                eprintln!("{e}");
                for (field, message) in fields.iter() {
                    eprintln!("  {field}: {message}");
                }
            } else {
                eprintln!("{e}");
            }
            ExitCode::FAILURE
        }
    }
}
