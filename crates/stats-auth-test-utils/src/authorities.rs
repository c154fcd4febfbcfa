//! Builders for health authority records and verifier setup.

use crate::crypto_fixtures::TestSigningKey;
use crate::test_ids::{
    TEST_AUDIENCE, TEST_AUTHORITY_ID, TEST_DATABASE_URL, TEST_ISSUER,
};
use chrono::{DateTime, Duration, Utc};
use stats_auth::config::Config;
use stats_auth::models::{HealthAuthority, HealthAuthorityKey};
use std::collections::HashMap;

/// Builder for `HealthAuthority` records
///
/// Keys are kept in the order they are added, which is the order the
/// verifier scans them.
pub struct TestAuthorityBuilder {
    id: i64,
    issuer: String,
    audience: String,
    keys: Vec<HealthAuthorityKey>,
}

impl TestAuthorityBuilder {
    /// Authority [`TEST_AUTHORITY_ID`] for [`TEST_ISSUER`] with no keys
    pub fn new() -> Self {
        Self {
            id: TEST_AUTHORITY_ID,
            issuer: TEST_ISSUER.to_string(),
            audience: TEST_AUDIENCE.to_string(),
            keys: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_string();
        self
    }

    /// Add a key with an explicit validity window
    pub fn with_key(
        mut self,
        version: &str,
        public_key_pem: &str,
        valid_from: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.keys.push(HealthAuthorityKey {
            authority_id: self.id,
            version: version.to_string(),
            valid_from,
            valid_until,
            public_key_pem: public_key_pem.to_string(),
        });
        self
    }

    /// Add a key valid since an hour ago with no end
    pub fn with_active_key(self, version: &str, key: &TestSigningKey) -> Self {
        let valid_from = Utc::now() - Duration::hours(1);
        self.with_key(version, &key.public_key_pem, valid_from, None)
    }

    /// Add a key whose window ended a minute ago
    pub fn with_expired_key(self, version: &str, key: &TestSigningKey) -> Self {
        let now = Utc::now();
        self.with_key(
            version,
            &key.public_key_pem,
            now - Duration::hours(2),
            Some(now - Duration::minutes(1)),
        )
    }

    /// Add a key that becomes valid in an hour
    pub fn with_future_key(self, version: &str, key: &TestSigningKey) -> Self {
        let valid_from = Utc::now() + Duration::hours(1);
        self.with_key(version, &key.public_key_pem, valid_from, None)
    }

    pub fn build(self) -> HealthAuthority {
        HealthAuthority {
            id: self.id,
            issuer: self.issuer,
            audience: self.audience,
            keys: self.keys,
        }
    }
}

impl Default for TestAuthorityBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration with test defaults; `overrides` replace or add variables.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        ("DATABASE_URL".to_string(), TEST_DATABASE_URL.to_string()),
        ("STATS_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
    ]);
    for (name, value) in overrides {
        vars.insert((*name).to_string(), (*value).to_string());
    }

    Config::from_vars(&vars).expect("test configuration must be valid")
}
