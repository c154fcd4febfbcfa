//! Stats token verification.
//!
//! Authenticates a bearer token against the health authority directory and
//! returns the id of the authority that signed it.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only ES256 is accepted; the header `alg` is checked by name before any
//!   cache or directory access
//! - The issuer is untrusted until the signature verifies; it only selects
//!   which key set to try, and its lookup is cached and time-bounded
//! - Keys are re-checked against their validity window on every request
//! - Expiration, not-before and issued-at are validated with clock skew tolerance
//! - Rejections carry a detailed cause for logs; responses stay generic

use crate::auth::claims::StatsClaims;
use crate::auth::resolution_cache::{Resolution, ResolutionCache};
use crate::config::Config;
use crate::errors::StatsAuthError;
use crate::models::HealthAuthority;
use crate::observability::metrics;
use crate::repositories::{DirectoryError, HealthAuthorityDirectory};
use chrono::Utc;
use common::jwt::{inspect_unverified, validate_iat, JwtValidationError};
use common::types::HealthAuthorityId;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Verifies stats tokens issued by registered health authorities.
pub struct StatsTokenVerifier {
    directory: Arc<dyn HealthAuthorityDirectory>,
    cache: ResolutionCache,
    audience: String,
    directory_timeout: Duration,
    clock_skew: Duration,
    expiry_leeway: Duration,
}

impl StatsTokenVerifier {
    /// Create a verifier backed by `directory`, with cache and token settings from `config`.
    pub fn new(directory: Arc<dyn HealthAuthorityDirectory>, config: &Config) -> Self {
        Self {
            directory,
            cache: ResolutionCache::new(config.ha_cache_ttl, config.ha_cache_max_capacity),
            audience: config.stats_audience.clone(),
            directory_timeout: config.directory_timeout,
            clock_skew: config.jwt_clock_skew,
            expiry_leeway: config.jwt_expiry_leeway,
        }
    }

    /// Issuer resolution cache, for operators and tests.
    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Authenticate a stats token and return the issuing authority's id.
    ///
    /// # Checks
    ///
    /// 1. Size, header `alg` (must be ES256), header `kid`, claim set with `iss`
    /// 2. Resolve `iss` to a health authority (cached, including not-found)
    /// 3. Select the first key whose version is `kid` and that is valid now
    /// 4. Verify the signature, `exp`, `nbf` and `iat`
    /// 5. Check that `aud` names the configured stats audience
    ///
    /// # Errors
    ///
    /// Every failure is terminal for the call. See [`StatsAuthError`] for the causes.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, raw_token: &str) -> Result<HealthAuthorityId, StatsAuthError> {
        let start = Instant::now();
        let result = self.authenticate_inner(raw_token).await;
        metrics::record_token_validation(&result, start.elapsed());
        result
    }

    async fn authenticate_inner(&self, raw_token: &str) -> Result<HealthAuthorityId, StatsAuthError> {
        // 1. Inspect without trust
        let unverified = inspect_unverified(raw_token).map_err(|e| {
            match &e {
                JwtValidationError::MissingKid => {
                    tracing::info!(target: "stats_auth.auth.verifier", "Rejected stats token: missing kid");
                }
                JwtValidationError::InvalidKid => {
                    tracing::info!(target: "stats_auth.auth.verifier", "Rejected stats token: invalid kid");
                }
                other => {
                    tracing::debug!(target: "stats_auth.auth.verifier", error = ?other, "Rejected stats token before lookup");
                }
            }
            StatsAuthError::from(e)
        })?;

        // 2. Resolve the issuer
        let authority = self.resolve_authority(&unverified.issuer).await?;

        // 3. Select the signing key
        let key = authority
            .find_valid_key(&unverified.kid, Utc::now())
            .ok_or_else(|| {
                tracing::info!(
                    target: "stats_auth.auth.verifier",
                    kid = %unverified.kid,
                    issuer = %unverified.issuer,
                    "No currently valid key for kid"
                );
                StatsAuthError::KeyNotFound {
                    kid: unverified.kid.clone(),
                    issuer: unverified.issuer.clone(),
                }
            })?;

        let authority_id = authority.authority_id();
        let decoding_key = key.decoding_key().map_err(|e| {
            tracing::error!(
                target: "stats_auth.auth.verifier",
                authority_id = %authority_id,
                version = %key.version,
                error = %e,
                "Stored public key is not a valid P-256 PEM"
            );
            StatsAuthError::KeyNotFound {
                kid: unverified.kid.clone(),
                issuer: unverified.issuer.clone(),
            }
        })?;

        // 4. Verify signature and time claims
        let claims = self.verify_token(raw_token, &decoding_key)?;
        if let Some(iat) = claims.iat {
            validate_iat(iat, self.clock_skew).map_err(|e| {
                tracing::debug!(target: "stats_auth.auth.verifier", error = ?e, "Token iat validation failed");
                StatsAuthError::from(e)
            })?;
        }

        // 5. Audience
        if !claims.has_audience(&self.audience) {
            let got = claims
                .aud
                .as_ref()
                .map_or_else(|| "<none>".to_string(), ToString::to_string);
            tracing::warn!(
                target: "stats_auth.auth.verifier",
                expected = %self.audience,
                got = %got,
                "Stats token audience mismatch"
            );
            return Err(StatsAuthError::AudienceMismatch);
        }

        tracing::debug!(target: "stats_auth.auth.verifier", authority_id = %authority_id, "Stats token validated");
        Ok(authority_id)
    }

    /// Resolve `issuer` through the cache, loading from the directory on a miss.
    async fn resolve_authority(&self, issuer: &str) -> Result<Arc<HealthAuthority>, StatsAuthError> {
        let loader = async {
            let result = tokio::time::timeout(self.directory_timeout, self.directory.get_by_issuer(issuer))
                .await
                .unwrap_or_else(|_| {
                    Err(DirectoryError::Unavailable(format!(
                        "lookup timed out after {}ms",
                        self.directory_timeout.as_millis()
                    )))
                });

            let outcome = match &result {
                Ok(_) => "found",
                Err(DirectoryError::NotFound) => {
                    // Logged once per load; cached not-found hits stay at debug
                    tracing::warn!(target: "stats_auth.auth.verifier", issuer = %issuer, "Unknown stats token issuer");
                    "not_found"
                }
                Err(DirectoryError::Unavailable(_)) => "unavailable",
            };
            metrics::record_directory_lookup(outcome);
            result
        };

        match self.cache.resolve(issuer, loader).await {
            Ok(Resolution::Found(authority)) => Ok(authority),
            Ok(Resolution::NotFound) => {
                tracing::debug!(target: "stats_auth.auth.verifier", "Rejecting token from unknown issuer");
                Err(StatsAuthError::UnknownIssuer(issuer.to_string()))
            }
            Err(e) => {
                tracing::error!(target: "stats_auth.auth.verifier", error = %e, "Health authority lookup failed");
                Err(StatsAuthError::StoreUnavailable(e.to_string()))
            }
        }
    }

    /// Verify the ES256 signature and the `exp`/`nbf` claims.
    fn verify_token(&self, token: &str, key: &DecodingKey) -> Result<StatsClaims, StatsAuthError> {
        let mut validation = Validation::new(Algorithm::ES256);
        validation.leeway = self.expiry_leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Audience is checked after verification so a mismatch can be reported on its own
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let token_data = decode::<StatsClaims>(token, key, &validation).map_err(|e| {
            tracing::debug!(target: "stats_auth.auth.verifier", error = %e, "Token verification failed");
            StatsAuthError::InvalidToken(e.to_string())
        })?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::MockHealthAuthorityDirectory;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::collections::HashMap;

    fn test_config() -> Config {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://localhost/stats".to_string(),
            ),
            ("STATS_AUDIENCE".to_string(), "stats".to_string()),
        ]);
        Config::from_vars(&vars).unwrap()
    }

    fn authority(issuer: &str, id: i64) -> HealthAuthority {
        HealthAuthority {
            id,
            issuer: issuer.to_string(),
            audience: "stats".to_string(),
            keys: vec![],
        }
    }

    /// Unsigned token with arbitrary header and claims; signature is junk.
    fn raw_token(header: serde_json::Value, claims: serde_json::Value) -> String {
        format!(
            "{}.{}.c2lnbmF0dXJl",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    fn verifier(directory: Arc<MockHealthAuthorityDirectory>) -> StatsTokenVerifier {
        StatsTokenVerifier::new(directory, &test_config())
    }

    #[tokio::test]
    async fn test_non_es256_algorithms_never_reach_directory() {
        let directory = Arc::new(MockHealthAuthorityDirectory::with_authorities([authority(
            "iss-1", 42,
        )]));
        let verifier = verifier(directory.clone());

        for alg in ["none", "HS256", "RS256", "ES384", "EdDSA", "es256"] {
            let token = raw_token(
                serde_json::json!({"alg": alg, "kid": "v1"}),
                serde_json::json!({"iss": "iss-1", "aud": "stats", "exp": 4_000_000_000_i64}),
            );
            let err = verifier.authenticate(&token).await.unwrap_err();
            assert!(
                matches!(&err, StatsAuthError::UnsupportedAlgorithm(got) if got == alg),
                "alg {alg}: {err:?}"
            );
        }

        assert_eq!(directory.call_count(), 0);
        assert!(!verifier.cache().contains("iss-1"));
    }

    #[tokio::test]
    async fn test_missing_kid_never_reaches_directory() {
        let directory = Arc::new(MockHealthAuthorityDirectory::new());
        let verifier = verifier(directory.clone());

        let token = raw_token(
            serde_json::json!({"alg": "ES256"}),
            serde_json::json!({"iss": "iss-1", "aud": "stats", "exp": 4_000_000_000_i64}),
        );
        let err = verifier.authenticate(&token).await.unwrap_err();

        assert!(matches!(err, StatsAuthError::MissingKid));
        assert_eq!(directory.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_kid_never_reaches_directory() {
        let directory = Arc::new(MockHealthAuthorityDirectory::new());
        let verifier = verifier(directory.clone());

        for kid in [serde_json::json!(""), serde_json::json!(7)] {
            let token = raw_token(
                serde_json::json!({"alg": "ES256", "kid": kid}),
                serde_json::json!({"iss": "iss-1", "exp": 4_000_000_000_i64}),
            );
            let err = verifier.authenticate(&token).await.unwrap_err();
            assert!(matches!(err, StatsAuthError::InvalidKid));
        }
        assert_eq!(directory.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_issuer_is_malformed_claims() {
        let directory = Arc::new(MockHealthAuthorityDirectory::new());
        let verifier = verifier(directory.clone());

        let token = raw_token(
            serde_json::json!({"alg": "ES256", "kid": "v1"}),
            serde_json::json!({"aud": "stats", "exp": 4_000_000_000_i64}),
        );
        let err = verifier.authenticate(&token).await.unwrap_err();

        assert!(matches!(err, StatsAuthError::MalformedClaims));
        assert_eq!(directory.call_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_token_rejected() {
        let directory = Arc::new(MockHealthAuthorityDirectory::new());
        let verifier = verifier(directory.clone());

        let token = "a".repeat(common::jwt::MAX_JWT_SIZE_BYTES + 1);
        let err = verifier.authenticate(&token).await.unwrap_err();

        assert!(matches!(err, StatsAuthError::TokenTooLarge));
        assert_eq!(directory.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_issuer_is_cached() {
        let directory = Arc::new(MockHealthAuthorityDirectory::new());
        let verifier = verifier(directory.clone());
        let token = raw_token(
            serde_json::json!({"alg": "ES256", "kid": "v1"}),
            serde_json::json!({"iss": "iss-9", "aud": "stats", "exp": 4_000_000_000_i64}),
        );

        for _ in 0..5 {
            let err = verifier.authenticate(&token).await.unwrap_err();
            assert!(matches!(&err, StatsAuthError::UnknownIssuer(iss) if iss == "iss-9"));
        }
        assert_eq!(directory.call_count(), 1);
    }

    /// Captures formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_unknown_issuer_warns_once_per_directory_load() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let directory = Arc::new(MockHealthAuthorityDirectory::new());
        let verifier = verifier(directory.clone());
        let token = raw_token(
            serde_json::json!({"alg": "ES256", "kid": "v1"}),
            serde_json::json!({"iss": "iss-9", "aud": "stats", "exp": 4_000_000_000_i64}),
        );

        for _ in 0..3 {
            let err = verifier.authenticate(&token).await.unwrap_err();
            assert!(matches!(err, StatsAuthError::UnknownIssuer(_)));
        }

        assert_eq!(directory.call_count(), 1);
        assert_eq!(logs.contents().matches("Unknown stats token issuer").count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_is_key_not_found() {
        let directory = Arc::new(MockHealthAuthorityDirectory::with_authorities([authority(
            "iss-1", 42,
        )]));
        let verifier = verifier(directory.clone());
        let token = raw_token(
            serde_json::json!({"alg": "ES256", "kid": "v2"}),
            serde_json::json!({"iss": "iss-1", "aud": "stats", "exp": 4_000_000_000_i64}),
        );

        let err = verifier.authenticate(&token).await.unwrap_err();

        assert!(matches!(
            &err,
            StatsAuthError::KeyNotFound { kid, issuer } if kid == "v2" && issuer == "iss-1"
        ));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_cached() {
        let directory = Arc::new(MockHealthAuthorityDirectory::new());
        directory.fail_next(1);
        let verifier = verifier(directory.clone());
        let token = raw_token(
            serde_json::json!({"alg": "ES256", "kid": "v1"}),
            serde_json::json!({"iss": "iss-1", "aud": "stats", "exp": 4_000_000_000_i64}),
        );

        let first = verifier.authenticate(&token).await.unwrap_err();
        assert!(first.is_store_unavailable());
        assert!(!verifier.cache().contains("iss-1"));

        let second = verifier.authenticate(&token).await.unwrap_err();
        assert!(matches!(second, StatsAuthError::UnknownIssuer(_)));
        assert_eq!(directory.call_count(), 2);
    }

    #[tokio::test]
    async fn test_slow_directory_times_out() {
        let directory = Arc::new(
            MockHealthAuthorityDirectory::with_authorities([authority("iss-1", 42)])
                .with_delay(Duration::from_millis(500)),
        );
        let mut config = test_config();
        config.directory_timeout = Duration::from_millis(20);
        let verifier = StatsTokenVerifier::new(directory.clone(), &config);
        let token = raw_token(
            serde_json::json!({"alg": "ES256", "kid": "v1"}),
            serde_json::json!({"iss": "iss-1", "aud": "stats", "exp": 4_000_000_000_i64}),
        );

        let err = verifier.authenticate(&token).await.unwrap_err();

        assert!(err.is_store_unavailable(), "{err:?}");
        assert!(!verifier.cache().contains("iss-1"));
    }
}
