//! Shared helpers: a sim backend on an ephemeral port and a matching config.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;

use pawnshop_admin::config::AdminConfig;
use pawnshop_admin::session::SessionContext;
use pawnshop_admin::sim::{self, SimState};
use pawnshop_admin::storage::SessionStorage;

pub use pawnshop_admin::sim::SIM_PASSWORD;

pub struct TestServer {
    pub state: SimState,
    pub addr: SocketAddr,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Config pointing at this server with fast retries and a private
    /// storage directory.
    pub fn config(&self) -> AdminConfig {
        let mut config = AdminConfig::default();
        config.api.base_url = self.url();
        config.api.timeout_secs = 5;
        config.retry.max_attempts = 3;
        config.retry.base_delay_ms = 10;
        config.retry.max_delay_ms = 50;
        config.session.storage_dir = Some(temp_dir());
        config
    }

    /// A session context with its own storage directory.
    pub fn context(&self) -> SessionContext {
        self.context_with(&self.config())
    }

    pub fn context_with(&self, config: &AdminConfig) -> SessionContext {
        SessionContext::new(config).expect("context")
    }

    /// A context already signed in as `username`.
    pub async fn signed_in(&self, username: &str) -> SessionContext {
        let ctx = self.context();
        ctx.login(username, SIM_PASSWORD).await.expect("login");
        ctx
    }
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
        .join("pawnshop-admin-it")
        .join(uuid::Uuid::new_v4().to_string())
}

pub fn storage() -> SessionStorage {
    SessionStorage::new(temp_dir())
}

/// Spin up a seeded sim backend on a random port.
pub async fn spawn_sim() -> TestServer {
    let state = SimState::seeded();
    let addr = sim::spawn(SocketAddr::from(([127, 0, 0, 1], 0)), state.clone())
        .await
        .expect("failed to bind");
    TestServer { state, addr }
}
