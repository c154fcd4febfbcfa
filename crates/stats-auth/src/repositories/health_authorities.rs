//! Health authority directory.
//!
//! Resolves a token issuer to its health authority record and key set.
//! A missing issuer is reported as [`DirectoryError::NotFound`] so callers can
//! tell "untrusted" apart from "store broken".

use crate::config::Config;
use crate::models::{HealthAuthority, HealthAuthorityKey};
use common::secret::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Directory lookup failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// No health authority is registered for the issuer.
    #[error("health authority not found")]
    NotFound,

    /// The store could not answer (connection, query, timeout).
    #[error("health authority directory unavailable: {0}")]
    Unavailable(String),
}

/// Lookup of health authorities by issuer (enables mocking).
#[async_trait::async_trait]
pub trait HealthAuthorityDirectory: Send + Sync {
    /// Load the authority registered for `issuer`, including all its keys.
    async fn get_by_issuer(&self, issuer: &str) -> Result<HealthAuthority, DirectoryError>;
}

/// PostgreSQL-backed directory.
#[derive(Clone)]
pub struct PgHealthAuthorityDirectory {
    pool: PgPool,
}

impl PgHealthAuthorityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool to `config.database_url`.
    ///
    /// Acquiring a connection is bounded by the directory timeout.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Unavailable` if the database cannot be reached.
    pub async fn connect(config: &Config) -> Result<Self, DirectoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(config.directory_timeout)
            .idle_timeout(Duration::from_secs(600))
            .connect(config.database_url.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!(target: "stats_auth.repositories", error = %e, "Failed to connect to database");
                DirectoryError::Unavailable(format!("Failed to connect to database: {}", e))
            })?;

        tracing::info!(target: "stats_auth.repositories", "Database connection established");
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl HealthAuthorityDirectory for PgHealthAuthorityDirectory {
    #[instrument(skip(self), name = "stats_auth.repositories.get_by_issuer")]
    async fn get_by_issuer(&self, issuer: &str) -> Result<HealthAuthority, DirectoryError> {
        let authority = sqlx::query_as::<_, HealthAuthority>(
            r#"
            SELECT id, iss, aud
            FROM health_authority
            WHERE iss = $1
            "#,
        )
        .bind(issuer)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(target: "stats_auth.repositories", error = %e, "Failed to fetch health authority");
            DirectoryError::Unavailable(format!("Failed to fetch health authority: {}", e))
        })?;

        let Some(mut authority) = authority else {
            return Err(DirectoryError::NotFound);
        };

        authority.keys = sqlx::query_as::<_, HealthAuthorityKey>(
            r#"
            SELECT health_authority_id, version, from_timestamp, thru_timestamp, public_key
            FROM health_authority_key
            WHERE health_authority_id = $1
            ORDER BY from_timestamp DESC, version
            "#,
        )
        .bind(authority.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(target: "stats_auth.repositories", error = %e, "Failed to fetch health authority keys");
            DirectoryError::Unavailable(format!("Failed to fetch health authority keys: {}", e))
        })?;

        tracing::debug!(
            target: "stats_auth.repositories",
            authority_id = authority.id,
            key_count = authority.keys.len(),
            "Loaded health authority"
        );

        Ok(authority)
    }
}

/// Mock directory module for testing.
///
/// In-memory directory that counts lookups and can simulate outages.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    /// Mock health authority directory.
    #[derive(Default)]
    pub struct MockHealthAuthorityDirectory {
        /// Registered authorities keyed by issuer.
        authorities: RwLock<HashMap<String, HealthAuthority>>,
        /// Number of lookups made.
        call_count: AtomicUsize,
        /// Whether every lookup fails with `Unavailable`.
        always_fail: AtomicBool,
        /// Number of upcoming lookups that fail with `Unavailable`.
        failures_remaining: AtomicUsize,
        /// Artificial latency per lookup.
        delay: Option<Duration>,
    }

    impl MockHealthAuthorityDirectory {
        /// Create an empty directory (every issuer is unknown).
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a directory holding the given authorities.
        pub fn with_authorities(authorities: impl IntoIterator<Item = HealthAuthority>) -> Self {
            let map = authorities
                .into_iter()
                .map(|ha| (ha.issuer.clone(), ha))
                .collect();
            Self {
                authorities: RwLock::new(map),
                ..Self::default()
            }
        }

        /// Create a directory whose lookups always fail.
        pub fn failing() -> Self {
            let directory = Self::default();
            directory.always_fail.store(true, Ordering::SeqCst);
            directory
        }

        /// Delay every lookup by `delay` before answering.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Fail the next `count` lookups with `Unavailable`.
        pub fn fail_next(&self, count: usize) {
            self.failures_remaining.store(count, Ordering::SeqCst);
        }

        /// Toggle permanent failure.
        pub fn set_failing(&self, failing: bool) {
            self.always_fail.store(failing, Ordering::SeqCst);
        }

        /// Register or replace an authority.
        pub async fn insert(&self, authority: HealthAuthority) {
            self.authorities
                .write()
                .await
                .insert(authority.issuer.clone(), authority);
        }

        /// Remove an authority.
        pub async fn remove(&self, issuer: &str) {
            self.authorities.write().await.remove(issuer);
        }

        /// Get the number of lookups made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl HealthAuthorityDirectory for MockHealthAuthorityDirectory {
        async fn get_by_issuer(&self, issuer: &str) -> Result<HealthAuthority, DirectoryError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.always_fail.load(Ordering::SeqCst) {
                return Err(DirectoryError::Unavailable(
                    "Mock directory error".to_string(),
                ));
            }

            let consumed_failure = self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if consumed_failure {
                return Err(DirectoryError::Unavailable(
                    "Mock directory transient error".to_string(),
                ));
            }

            self.authorities
                .read()
                .await
                .get(issuer)
                .cloned()
                .ok_or(DirectoryError::NotFound)
        }
    }
}
