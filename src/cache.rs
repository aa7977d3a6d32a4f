//! Short-lived cache of report payloads in session storage.
//!
//! Each report type is stored under one fixed key, wrapped in an envelope
//! that records when it was written. Reads classify the entry by age:
//!
//! - younger than `stale_after`: [`CacheLookup::Fresh`]
//! - younger than `ttl`: [`CacheLookup::Stale`], usable as a fallback
//! - anything else: [`CacheLookup::Miss`]
//!
//! Entries that are expired, written by a different format version, stored
//! under the wrong key, undecodable, or that fail the report's own
//! structural check are deleted on read and reported as a miss.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::errors::AdminResult;
use crate::storage::SessionStorage;

/// Envelope format version. Bump when the envelope layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Tolerated clock skew, in seconds, for entries that claim to come from the future.
const MAX_FUTURE_SKEW_SECS: i64 = 30;

/// A report payload that may be cached.
pub trait CachedReport: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Fixed storage key for this report type.
    const CACHE_KEY: &'static str;

    /// Structural check run on every cache read.
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    key: String,
    stored_at: DateTime<Utc>,
    payload: T,
}

/// A report read back from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<R> {
    pub report: R,
    pub stored_at: DateTime<Utc>,
}

impl<R> CacheEntry<R> {
    /// Age of the entry relative to `now`, zero if it lies in the future.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<R> {
    Fresh(CacheEntry<R>),
    Stale(CacheEntry<R>),
    Miss,
}

impl<R> CacheLookup<R> {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookup::Miss)
    }
}

/// TTL cache over [`SessionStorage`].
#[derive(Debug, Clone)]
pub struct ReportCache {
    storage: SessionStorage,
    ttl: Duration,
    stale_after: Duration,
}

impl ReportCache {
    pub fn new(storage: SessionStorage, config: &CacheConfig) -> Self {
        Self {
            storage,
            ttl: config.ttl(),
            stale_after: config.stale_after().min(config.ttl()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Read the cached `R`, classifying it by age.
    pub async fn read<R: CachedReport>(&self) -> AdminResult<CacheLookup<R>> {
        self.read_at(Utc::now()).await
    }

    pub(crate) async fn read_at<R: CachedReport>(
        &self,
        now: DateTime<Utc>,
    ) -> AdminResult<CacheLookup<R>> {
        let Some(raw) = self.storage.load(R::CACHE_KEY).await? else {
            return Ok(CacheLookup::Miss);
        };

        let entry = match decode::<R>(&raw) {
            Ok(entry) => entry,
            Err(reason) => {
                warn!(key = R::CACHE_KEY, %reason, "Discarding corrupt cache entry");
                self.storage.remove(R::CACHE_KEY).await?;
                return Ok(CacheLookup::Miss);
            }
        };

        if entry.stored_at > now + chrono::Duration::seconds(MAX_FUTURE_SKEW_SECS) {
            warn!(key = R::CACHE_KEY, stored_at = %entry.stored_at, "Discarding future-dated cache entry");
            self.storage.remove(R::CACHE_KEY).await?;
            return Ok(CacheLookup::Miss);
        }

        let age = entry.age_at(now);
        if age >= self.ttl {
            debug!(key = R::CACHE_KEY, age_secs = age.as_secs(), "Cache entry expired");
            self.storage.remove(R::CACHE_KEY).await?;
            return Ok(CacheLookup::Miss);
        }

        if age >= self.stale_after {
            debug!(key = R::CACHE_KEY, age_secs = age.as_secs(), "Cache entry is stale");
            Ok(CacheLookup::Stale(entry))
        } else {
            Ok(CacheLookup::Fresh(entry))
        }
    }

    /// Store `report` stamped with the current time.
    pub async fn write<R: CachedReport>(&self, report: &R) -> AdminResult<DateTime<Utc>> {
        self.write_at(report, Utc::now()).await
    }

    pub(crate) async fn write_at<R: CachedReport>(
        &self,
        report: &R,
        stored_at: DateTime<Utc>,
    ) -> AdminResult<DateTime<Utc>> {
        let envelope = Envelope {
            version: CACHE_FORMAT_VERSION,
            key: R::CACHE_KEY.to_string(),
            stored_at,
            payload: report,
        };
        let json = serde_json::to_string(&envelope)?;
        self.storage.save(R::CACHE_KEY, &json).await?;
        Ok(stored_at)
    }

    /// Drop the cached `R`, if any.
    pub async fn invalidate<R: CachedReport>(&self) -> AdminResult<()> {
        self.storage.remove(R::CACHE_KEY).await
    }

    /// Drop a cache entry by key.
    pub async fn invalidate_key(&self, key: &str) -> AdminResult<()> {
        self.storage.remove(key).await
    }

    /// Drop every cached report.
    pub async fn clear(&self) -> AdminResult<()> {
        self.storage.clear().await
    }
}

fn decode<R: CachedReport>(raw: &str) -> Result<CacheEntry<R>, String> {
    let envelope: Envelope<R> =
        serde_json::from_str(raw).map_err(|e| format!("undecodable entry: {e}"))?;

    if envelope.version != CACHE_FORMAT_VERSION {
        return Err(format!(
            "format version {} (expected {CACHE_FORMAT_VERSION})",
            envelope.version
        ));
    }
    if envelope.key != R::CACHE_KEY {
        return Err(format!("stored under key '{}'", envelope.key));
    }
    envelope.payload.validate()?;

    Ok(CacheEntry {
        report: envelope.payload,
        stored_at: envelope.stored_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InventoryCategory, InventoryReport};
    use crate::storage::test_storage;

    fn cache() -> ReportCache {
        let config = CacheConfig {
            ttl_secs: 300,
            stale_after_secs: 60,
        };
        ReportCache::new(test_storage(), &config)
    }

    fn report() -> InventoryReport {
        InventoryReport {
            generated_at: Utc::now(),
            total_items: 2,
            total_appraised_value: 500.0,
            categories: vec![InventoryCategory {
                name: "Tools".to_string(),
                item_count: 2,
                appraised_value: 500.0,
            }],
        }
    }

    #[tokio::test]
    async fn empty_cache_misses() {
        let cache = cache();
        let lookup = cache.read::<InventoryReport>().await.unwrap();
        assert!(lookup.is_miss());
    }

    #[tokio::test]
    async fn new_entry_is_fresh() {
        let cache = cache();
        let report = report();
        cache.write(&report).await.unwrap();

        match cache.read::<InventoryReport>().await.unwrap() {
            CacheLookup::Fresh(entry) => assert_eq!(entry.report, report),
            other => panic!("expected fresh entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn entry_between_stale_and_ttl_is_stale() {
        let cache = cache();
        let now = Utc::now();
        cache
            .write_at(&report(), now - chrono::Duration::seconds(120))
            .await
            .unwrap();

        let lookup = cache.read_at::<InventoryReport>(now).await.unwrap();
        assert!(matches!(lookup, CacheLookup::Stale(_)));
    }

    #[tokio::test]
    async fn expired_entry_is_discarded() {
        let cache = cache();
        let now = Utc::now();
        cache
            .write_at(&report(), now - chrono::Duration::seconds(301))
            .await
            .unwrap();

        assert!(cache.read_at::<InventoryReport>(now).await.unwrap().is_miss());
        // Deleted, not just skipped
        assert!(cache
            .storage
            .load(InventoryReport::CACHE_KEY)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn future_dated_entry_is_discarded() {
        let cache = cache();
        let now = Utc::now();
        cache
            .write_at(&report(), now + chrono::Duration::minutes(10))
            .await
            .unwrap();

        assert!(cache.read_at::<InventoryReport>(now).await.unwrap().is_miss());
    }

    #[tokio::test]
    async fn corrupt_entry_is_discarded() {
        let cache = cache();
        cache
            .storage
            .save(InventoryReport::CACHE_KEY, "{not json")
            .await
            .unwrap();

        assert!(cache.read::<InventoryReport>().await.unwrap().is_miss());
        assert!(cache
            .storage
            .load(InventoryReport::CACHE_KEY)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn wrong_shape_is_discarded() {
        let cache = cache();
        let raw = serde_json::json!({
            "version": CACHE_FORMAT_VERSION,
            "key": InventoryReport::CACHE_KEY,
            "stored_at": Utc::now(),
            "payload": { "rows": [] }
        });
        cache
            .storage
            .save(InventoryReport::CACHE_KEY, &raw.to_string())
            .await
            .unwrap();

        assert!(cache.read::<InventoryReport>().await.unwrap().is_miss());
    }

    #[tokio::test]
    async fn failed_structural_check_is_discarded() {
        let cache = cache();
        let mut bad = report();
        bad.total_items = 99;
        cache.write(&bad).await.unwrap();

        assert!(cache.read::<InventoryReport>().await.unwrap().is_miss());
    }

    #[tokio::test]
    async fn clear_removes_all_reports() {
        let cache = cache();
        cache.write(&report()).await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.read::<InventoryReport>().await.unwrap().is_miss());
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = cache();
        cache.write(&report()).await.unwrap();
        cache.invalidate::<InventoryReport>().await.unwrap();
        assert!(cache.read::<InventoryReport>().await.unwrap().is_miss());
    }
}
