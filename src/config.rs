//! Configuration system for the admin client.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `pawnshop.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `PAWNSHOP_API_URL` - Base URL of the REST API
//! - `PAWNSHOP_API_TIMEOUT_SECS` - Per-request timeout in seconds
//! - `PAWNSHOP_SESSION_TIMEOUT_SECS` - Inactivity timeout in seconds
//! - `PAWNSHOP_SESSION_WARNING_SECS` - Warning lead time in seconds
//! - `PAWNSHOP_SESSION_TIMER_ENABLED` - Enable the inactivity timer
//! - `PAWNSHOP_SESSION_DIR` - Directory for session-scoped storage
//! - `PAWNSHOP_CACHE_TTL_SECS` - Report cache time-to-live in seconds
//! - `PAWNSHOP_CACHE_STALE_SECS` - Age after which a cache entry is stale
//! - `PAWNSHOP_RETRY_MAX_ATTEMPTS` - Attempts per fetch, including the first
//! - `PAWNSHOP_LOGGING_ENABLED` - Enable logging output
//! - `PAWNSHOP_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::{AdminError, AdminResult};

/// Global configuration singleton.
static CONFIG: OnceLock<AdminConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// REST API connection settings
    pub api: ApiConfig,
    /// Session and inactivity timer settings
    pub session: SessionConfig,
    /// Report cache settings
    pub cache: CacheConfig,
    /// Retry/backoff settings for report fetching
    pub retry: RetryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// REST API connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 15,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session and inactivity timer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Total inactivity period before automatic logout, in seconds
    pub timeout_secs: u64,
    /// How long before the timeout the warning countdown starts, in seconds
    pub warning_secs: u64,
    /// Whether the inactivity timer runs at all
    pub timer_enabled: bool,
    /// Whether a trusted key press or click ends the warning countdown
    pub activity_exits_warning: bool,
    /// Storage directory; defaults to the platform cache directory
    pub storage_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 900,
            warning_secs: 60,
            timer_enabled: true,
            activity_exits_warning: false,
            storage_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn warning_lead(&self) -> Duration {
        Duration::from_secs(self.warning_secs)
    }

    /// Resolve the session storage directory.
    ///
    /// Returns platform-specific paths when not configured:
    /// - Windows: `%LOCALAPPDATA%\pawnshop-admin\session\`
    /// - macOS: `~/Library/Caches/pawnshop-admin/session/`
    /// - Linux: `~/.cache/pawnshop-admin/session/`
    pub fn resolve_storage_dir(&self) -> PathBuf {
        match &self.storage_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .unwrap_or_else(env::temp_dir)
                .join("pawnshop-admin")
                .join("session"),
        }
    }
}

/// Report cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this are discarded, in seconds
    pub ttl_secs: u64,
    /// Entries older than this are only used when the network fails, in seconds
    pub stale_after_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            stale_after_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Retry/backoff settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per fetch, including the first
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl AdminConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `pawnshop.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> AdminResult<Self> {
        let defaults = AdminConfig::default();

        let builder = Config::builder()
            // Start with defaults
            .set_default("api.base_url", defaults.api.base_url)?
            .set_default("api.timeout_secs", defaults.api.timeout_secs)?
            .set_default("session.timeout_secs", defaults.session.timeout_secs)?
            .set_default("session.warning_secs", defaults.session.warning_secs)?
            .set_default("session.timer_enabled", defaults.session.timer_enabled)?
            .set_default(
                "session.activity_exits_warning",
                defaults.session.activity_exits_warning,
            )?
            .set_default("cache.ttl_secs", defaults.cache.ttl_secs)?
            .set_default("cache.stale_after_secs", defaults.cache.stale_after_secs)?
            .set_default("retry.max_attempts", defaults.retry.max_attempts)?
            .set_default("retry.base_delay_ms", defaults.retry.base_delay_ms)?
            .set_default("retry.max_delay_ms", defaults.retry.max_delay_ms)?
            .set_default("logging.enabled", defaults.logging.enabled)?
            .set_default("logging.level", defaults.logging.level)?
            // Load from pawnshop.toml (optional)
            .add_source(config::File::with_name("pawnshop").required(false))
            // Override with environment variables
            .set_override_option("api.base_url", env::var("PAWNSHOP_API_URL").ok())?
            .set_override_option(
                "api.timeout_secs",
                env_parse::<i64>("PAWNSHOP_API_TIMEOUT_SECS"),
            )?
            .set_override_option(
                "session.timeout_secs",
                env_parse::<i64>("PAWNSHOP_SESSION_TIMEOUT_SECS"),
            )?
            .set_override_option(
                "session.warning_secs",
                env_parse::<i64>("PAWNSHOP_SESSION_WARNING_SECS"),
            )?
            .set_override_option(
                "session.timer_enabled",
                env_parse::<bool>("PAWNSHOP_SESSION_TIMER_ENABLED"),
            )?
            .set_override_option("session.storage_dir", env::var("PAWNSHOP_SESSION_DIR").ok())?
            .set_override_option(
                "cache.ttl_secs",
                env_parse::<i64>("PAWNSHOP_CACHE_TTL_SECS"),
            )?
            .set_override_option(
                "cache.stale_after_secs",
                env_parse::<i64>("PAWNSHOP_CACHE_STALE_SECS"),
            )?
            .set_override_option(
                "retry.max_attempts",
                env_parse::<i64>("PAWNSHOP_RETRY_MAX_ATTEMPTS"),
            )?
            .set_override_option(
                "logging.enabled",
                env_parse::<bool>("PAWNSHOP_LOGGING_ENABLED"),
            )?
            .set_override_option("logging.level", env::var("PAWNSHOP_LOG_LEVEL").ok())?;

        let settings = builder
            .build()
            .map_err(|e| AdminError::ConfigError(format!("failed to build config: {e}")))?;

        let config: AdminConfig = settings
            .try_deserialize()
            .map_err(|e| AdminError::ConfigError(format!("failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AdminResult<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AdminError::ConfigError(format!(
                "api.base_url must start with http:// or https://, got '{url}'"
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(AdminError::ConfigError(
                "api.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.session.timeout_secs == 0 {
            return Err(AdminError::ConfigError(
                "session.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.session.warning_secs >= self.session.timeout_secs {
            return Err(AdminError::ConfigError(format!(
                "session.warning_secs ({}) must be less than session.timeout_secs ({})",
                self.session.warning_secs, self.session.timeout_secs
            )));
        }

        if self.cache.ttl_secs == 0 {
            return Err(AdminError::ConfigError(
                "cache.ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.cache.stale_after_secs > self.cache.ttl_secs {
            return Err(AdminError::ConfigError(
                "cache.stale_after_secs cannot exceed cache.ttl_secs".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(AdminError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(AdminError::ConfigError(
                "retry.base_delay_ms cannot exceed retry.max_delay_ms".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(AdminError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> AdminResult<&'static AdminConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = AdminConfig::load()?;

    // Another thread may have won the race; either value is valid.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| AdminError::ConfigError("configuration was not initialised".to_string()))
}
