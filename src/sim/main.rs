//! Standalone sim backend for local development.
//!
//! ```text
//! pawnshop_sim --port 8080
//! ```

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use pawnshop_admin::config::LoggingConfig;
use pawnshop_admin::logging::init_logging;
use pawnshop_admin::sim::{self, SimState, SIM_PASSWORD};

#[derive(Debug, Parser)]
#[command(name = "pawnshop_sim", about = "In-memory pawn shop backend", version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1", env = "PAWNSHOP_SIM_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, short, default_value_t = 8080, env = "PAWNSHOP_SIM_PORT")]
    port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Fail this many requests with 503 after startup
    #[arg(long, default_value_t = 0)]
    fail_first: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let logging = LoggingConfig {
        enabled: true,
        level: args.log_level.clone(),
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let addr = SocketAddr::new(args.host, args.port);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    let state = SimState::seeded();
    state.fail_next(args.fail_first);
    info!(%addr, password = SIM_PASSWORD, "Sim backend listening; users: admin, manager, clerk");

    match sim::serve(listener, state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Sim server stopped");
            ExitCode::FAILURE
        }
    }
}
