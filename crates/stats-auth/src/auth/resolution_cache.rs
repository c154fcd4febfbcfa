//! Write-through cache of issuer to health authority resolutions.
//!
//! Both outcomes of a directory lookup are cached: a found record and an
//! explicit not-found marker, so unknown issuers do not hit the store on
//! every request. Any other lookup error is handed back to the caller and
//! not stored, so the next request retries the store.
//!
//! # Concurrency
//!
//! Loads are single-flight per issuer: concurrent callers for the same
//! uncached issuer share one loader run and observe the same result. Distinct
//! issuers load in parallel.
//!
//! # Staleness
//!
//! Entries expire after the configured TTL. This bounds how long a newly
//! registered authority stays invisible and how long a removed one stays
//! trusted. Key validity is not cached here; callers re-check it on read.

use crate::models::HealthAuthority;
use crate::observability::metrics;
use crate::repositories::DirectoryError;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Cached result of resolving one issuer.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The issuer belongs to this authority.
    Found(Arc<HealthAuthority>),

    /// The directory has no authority for the issuer.
    NotFound,
}

/// Issuer-keyed resolution cache with TTL expiry and a capacity bound.
pub struct ResolutionCache {
    cache: Cache<String, Resolution>,
    ttl: Duration,
}

impl ResolutionCache {
    /// Create a cache whose entries live for `ttl`, holding at most `max_capacity` issuers.
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache, ttl }
    }

    /// Configured entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve `issuer`, running `loader` only on a miss.
    ///
    /// `loader` is a lazy future; on a hit it is dropped without being polled.
    /// A `DirectoryError::NotFound` from the loader is stored as
    /// [`Resolution::NotFound`]. Any other error is returned and not stored.
    ///
    /// # Errors
    ///
    /// Returns the loader's non-not-found error to every caller that waited on it.
    pub async fn resolve<F>(&self, issuer: &str, loader: F) -> Result<Resolution, DirectoryError>
    where
        F: Future<Output = Result<HealthAuthority, DirectoryError>>,
    {
        let init = async move {
            match loader.await {
                Ok(authority) => Ok(Resolution::Found(Arc::new(authority))),
                Err(DirectoryError::NotFound) => Ok(Resolution::NotFound),
                Err(e) => Err(e),
            }
        };

        let entry = self
            .cache
            .entry_by_ref(issuer)
            .or_try_insert_with(init)
            .await
            .map_err(|e: Arc<DirectoryError>| (*e).clone())?;

        let hit = !entry.is_fresh();
        metrics::record_ha_cache_lookup(hit);
        if hit {
            tracing::trace!(target: "stats_auth.cache", "Health authority cache hit");
        } else {
            tracing::debug!(target: "stats_auth.cache", "Health authority cache filled");
        }

        Ok(entry.into_value())
    }

    /// Drop the cached resolution for `issuer`, if any.
    pub async fn invalidate(&self, issuer: &str) {
        self.cache.invalidate(issuer).await;
    }

    /// Whether `issuer` currently has a cached resolution.
    pub fn contains(&self, issuer: &str) -> bool {
        self.cache.contains_key(issuer)
    }

    /// Number of cached issuers after pending maintenance has run.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    fn authority(issuer: &str, id: i64) -> HealthAuthority {
        HealthAuthority {
            id,
            issuer: issuer.to_string(),
            audience: "stats".to_string(),
            keys: vec![],
        }
    }

    /// Loader that counts how many times it is actually polled to completion.
    async fn counted(
        calls: &AtomicUsize,
        result: Result<HealthAuthority, DirectoryError>,
    ) -> Result<HealthAuthority, DirectoryError> {
        calls.fetch_add(1, Ordering::SeqCst);
        result
    }

    #[tokio::test]
    async fn test_hit_does_not_run_loader() {
        let cache = ResolutionCache::new(Duration::from_secs(60), 100);
        let calls = AtomicUsize::new(0);

        let first = cache
            .resolve("iss-1", counted(&calls, Ok(authority("iss-1", 42))))
            .await
            .unwrap();
        assert!(matches!(first, Resolution::Found(ha) if ha.id == 42));

        let second = cache
            .resolve("iss-1", counted(&calls, Ok(authority("iss-1", 99))))
            .await
            .unwrap();
        assert!(matches!(second, Resolution::Found(ha) if ha.id == 42));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_cached() {
        let cache = ResolutionCache::new(Duration::from_secs(60), 100);
        let calls = AtomicUsize::new(0);

        for _ in 0..10 {
            let resolution = cache
                .resolve("unknown", counted(&calls, Err(DirectoryError::NotFound)))
                .await
                .unwrap();
            assert!(matches!(resolution, Resolution::NotFound));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("unknown"));
    }

    #[tokio::test]
    async fn test_transient_error_is_not_cached() {
        let cache = ResolutionCache::new(Duration::from_secs(60), 100);
        let calls = AtomicUsize::new(0);

        let err = cache
            .resolve(
                "iss-1",
                counted(&calls, Err(DirectoryError::Unavailable("down".to_string()))),
            )
            .await
            .unwrap_err();
        assert_eq!(err, DirectoryError::Unavailable("down".to_string()));
        assert!(!cache.contains("iss-1"));

        let resolution = cache
            .resolve("iss-1", counted(&calls, Ok(authority("iss-1", 42))))
            .await
            .unwrap();
        assert!(matches!(resolution, Resolution::Found(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let cache = Arc::new(ResolutionCache::new(Duration::from_secs(60), 100));
        let calls = Arc::new(AtomicUsize::new(0));

        let load = |cache: Arc<ResolutionCache>, calls: Arc<AtomicUsize>| async move {
            cache
                .resolve("iss-1", async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(authority("iss-1", 42))
                })
                .await
        };

        let (a, b, c) = tokio::join!(
            tokio::spawn(load(cache.clone(), calls.clone())),
            tokio::spawn(load(cache.clone(), calls.clone())),
            tokio::spawn(load(cache.clone(), calls.clone())),
        );

        for result in [a, b, c] {
            let resolution = result.unwrap().unwrap();
            assert!(matches!(resolution, Resolution::Found(ha) if ha.id == 42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_transient_error() {
        let cache = Arc::new(ResolutionCache::new(Duration::from_secs(60), 100));
        let calls = Arc::new(AtomicUsize::new(0));

        let load = |cache: Arc<ResolutionCache>, calls: Arc<AtomicUsize>| async move {
            cache
                .resolve("iss-1", async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(DirectoryError::Unavailable("down".to_string()))
                })
                .await
        };

        let (a, b) = tokio::join!(
            tokio::spawn(load(cache.clone(), calls.clone())),
            tokio::spawn(load(cache.clone(), calls.clone())),
        );

        assert!(a.unwrap().is_err());
        assert!(b.unwrap().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.contains("iss-1"));
    }

    #[tokio::test]
    async fn test_distinct_issuers_load_in_parallel() {
        let cache = ResolutionCache::new(Duration::from_secs(60), 100);
        // Both loaders must be in flight at the same time to pass the barrier
        let barrier = Barrier::new(2);

        let (barrier, cache) = (&barrier, &cache);
        let load = move |issuer: &'static str, id: i64| async move {
            cache
                .resolve(issuer, async move {
                    barrier.wait().await;
                    Ok(authority(issuer, id))
                })
                .await
        };

        let joined = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(load("iss-1", 1), load("iss-2", 2))
        })
        .await
        .expect("loads for distinct issuers must not serialize");

        assert!(matches!(joined.0.unwrap(), Resolution::Found(ha) if ha.id == 1));
        assert!(matches!(joined.1.unwrap(), Resolution::Found(ha) if ha.id == 2));
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = ResolutionCache::new(Duration::from_millis(100), 100);
        let calls = AtomicUsize::new(0);

        cache
            .resolve("unknown", counted(&calls, Err(DirectoryError::NotFound)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        cache
            .resolve("unknown", counted(&calls, Err(DirectoryError::NotFound)))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = ResolutionCache::new(Duration::from_secs(60), 100);
        let calls = AtomicUsize::new(0);

        cache
            .resolve("iss-1", counted(&calls, Ok(authority("iss-1", 1))))
            .await
            .unwrap();
        cache.invalidate("iss-1").await;
        let resolution = cache
            .resolve("iss-1", counted(&calls, Ok(authority("iss-1", 2))))
            .await
            .unwrap();

        assert!(matches!(resolution, Resolution::Found(ha) if ha.id == 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_entry_count_and_ttl() {
        let cache = ResolutionCache::new(Duration::from_secs(30), 100);
        assert_eq!(cache.ttl(), Duration::from_secs(30));

        cache
            .resolve("iss-1", async { Ok(authority("iss-1", 1)) })
            .await
            .unwrap();
        cache
            .resolve("iss-2", async { Err(DirectoryError::NotFound) })
            .await
            .unwrap();

        assert_eq!(cache.entry_count().await, 2);
    }
}
