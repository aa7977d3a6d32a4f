//! Cache-first report loading with retry, cancellation and stale fallback.
//!
//! A [`ReportFetcher`] owns one report type. Each `load` supersedes the
//! previous one: the older load is cancelled and returns
//! [`AdminError::Cancelled`], so a slow response can never overwrite a newer
//! one. Progress is published on a `watch` channel for anything rendering a
//! spinner or an error banner.

pub mod retry;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ReportsService;
use crate::cache::{CacheEntry, CacheLookup, CachedReport, ReportCache};
use crate::errors::{AdminError, AdminResult};
use crate::models::{DashboardSummary, InventoryReport};

pub use retry::RetryPolicy;

/// Something that can produce a fresh `R` from the network.
pub trait ReportSource<R>: Send + Sync {
    fn fetch_report(&self) -> impl Future<Output = AdminResult<R>> + Send;
}

impl ReportSource<InventoryReport> for ReportsService {
    fn fetch_report(&self) -> impl Future<Output = AdminResult<InventoryReport>> + Send {
        self.inventory()
    }
}

impl ReportSource<DashboardSummary> for ReportsService {
    fn fetch_report(&self) -> impl Future<Output = AdminResult<DashboardSummary>> + Send {
        self.dashboard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Cache,
    Network,
}

/// Progress of the current load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading { attempt: u32 },
    Loaded { source: DataSource, stale: bool },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<R> {
    pub data: R,
    pub source: DataSource,
    /// When the data was obtained from the network
    pub fetched_at: DateTime<Utc>,
    /// True when served from an aged cache entry because the network failed
    pub stale: bool,
}

impl<R> Fetched<R> {
    fn from_cache(entry: CacheEntry<R>, stale: bool) -> Self {
        Self {
            data: entry.report,
            source: DataSource::Cache,
            fetched_at: entry.stored_at,
            stale,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    token: CancellationToken,
}

pub struct ReportFetcher<R, S = ReportsService> {
    source: S,
    cache: ReportCache,
    policy: RetryPolicy,
    next_id: AtomicU64,
    inflight: Mutex<Option<InFlight>>,
    status: watch::Sender<FetchStatus>,
    _report: PhantomData<fn() -> R>,
}

impl<R, S> std::fmt::Debug for ReportFetcher<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportFetcher")
            .field("policy", &self.policy)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl<R, S> ReportFetcher<R, S>
where
    R: CachedReport,
    S: ReportSource<R>,
{
    pub fn new(source: S, cache: ReportCache, policy: RetryPolicy) -> Self {
        let (status, _) = watch::channel(FetchStatus::Idle);
        Self {
            source,
            cache,
            policy,
            next_id: AtomicU64::new(1),
            inflight: Mutex::new(None),
            status,
            _report: PhantomData,
        }
    }

    pub fn status(&self) -> FetchStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchStatus> {
        self.status.subscribe()
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    /// Load the report, serving a fresh cache entry unless `refresh` is set.
    pub async fn load(&self, refresh: bool) -> AdminResult<Fetched<R>> {
        let (id, token) = self.begin();
        let result = self.load_inner(&token, refresh).await;
        self.finish(id, &result);
        result
    }

    /// Cancel the load in progress, if any.
    pub fn cancel(&self) {
        if let Some(current) = self.lock_inflight().take() {
            current.token.cancel();
            self.status.send_replace(FetchStatus::Idle);
            debug!(key = R::CACHE_KEY, "Report load cancelled");
        }
    }

    /// Drop the cached copy so the next load goes to the network.
    pub async fn invalidate(&self) -> AdminResult<()> {
        self.cache.invalidate::<R>().await
    }

    fn lock_inflight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.lock_inflight().replace(InFlight {
            id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            debug!(key = R::CACHE_KEY, "Superseding in-flight report load");
            previous.token.cancel();
        }
        (id, token)
    }

    fn finish(&self, id: u64, result: &AdminResult<Fetched<R>>) {
        {
            let mut inflight = self.lock_inflight();
            if inflight.as_ref().map(|f| f.id) != Some(id) {
                return;
            }
            inflight.take();
        }

        let status = match result {
            Ok(fetched) => FetchStatus::Loaded {
                source: fetched.source,
                stale: fetched.stale,
            },
            Err(AdminError::Cancelled) => return,
            Err(err) => FetchStatus::Failed {
                message: err.to_string(),
            },
        };
        self.status.send_replace(status);
    }

    async fn load_inner(&self, token: &CancellationToken, refresh: bool) -> AdminResult<Fetched<R>> {
        if !refresh {
            match self.cache.read::<R>().await {
                Ok(CacheLookup::Fresh(entry)) => {
                    debug!(key = R::CACHE_KEY, "Serving report from cache");
                    return Ok(Fetched::from_cache(entry, false));
                }
                Ok(_) => {}
                Err(e) => warn!(key = R::CACHE_KEY, error = %e, "Report cache unreadable"),
            }
        }

        let status = &self.status;
        let result = self
            .policy
            .run(
                token,
                |attempt| {
                    status.send_replace(FetchStatus::Loading { attempt });
                },
                || self.source.fetch_report(),
            )
            .await
            .and_then(|report| {
                // Cancelled after the response arrived; a newer load owns the cache.
                if token.is_cancelled() {
                    return Err(AdminError::Cancelled);
                }
                report.validate().map_err(|reason| AdminError::Server {
                    status: 200,
                    message: format!("malformed report: {reason}"),
                })?;
                Ok(report)
            });

        match result {
            Ok(report) => {
                let fetched_at = match self.cache.write(&report).await {
                    Ok(stored_at) => stored_at,
                    Err(e) => {
                        warn!(key = R::CACHE_KEY, error = %e, "Could not cache report");
                        Utc::now()
                    }
                };
                info!(key = R::CACHE_KEY, "Report loaded from network");
                Ok(Fetched {
                    data: report,
                    source: DataSource::Network,
                    fetched_at,
                    stale: false,
                })
            }
            Err(err) if matches!(err, AdminError::Cancelled) || err.requires_login() => Err(err),
            Err(err) => self.fall_back(err).await,
        }
    }

    async fn fall_back(&self, err: AdminError) -> AdminResult<Fetched<R>> {
        match self.cache.read::<R>().await {
            Ok(CacheLookup::Fresh(entry)) => {
                warn!(key = R::CACHE_KEY, error = %err, "Network failed; using cached report");
                Ok(Fetched::from_cache(entry, false))
            }
            Ok(CacheLookup::Stale(entry)) => {
                warn!(
                    key = R::CACHE_KEY,
                    error = %err,
                    stored_at = %entry.stored_at,
                    "Network failed; using stale cached report"
                );
                Ok(Fetched::from_cache(entry, true))
            }
            _ => Err(err),
        }
    }
}
