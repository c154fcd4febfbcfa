//! Health authority directory models.
//!
//! A health authority is a trusted issuer of stats tokens. It owns an ordered
//! set of versioned ES256 public keys; the token `kid` header names one version.

use chrono::{DateTime, Utc};
use common::types::HealthAuthorityId;
use jsonwebtoken::DecodingKey;
use sqlx::FromRow;

/// Health authority record (maps to `health_authority` table).
///
/// `keys` is loaded separately from `health_authority_key` and kept in the
/// order the directory returned them.
#[derive(Debug, Clone, FromRow)]
pub struct HealthAuthority {
    pub id: i64,
    #[sqlx(rename = "iss")]
    pub issuer: String,
    /// Audience the authority registered. Tokens are checked against the
    /// configured stats audience instead, so this is informational.
    #[sqlx(rename = "aud")]
    pub audience: String,
    #[sqlx(skip)]
    pub keys: Vec<HealthAuthorityKey>,
}

impl HealthAuthority {
    /// Typed identifier returned to authenticated callers.
    pub fn authority_id(&self) -> HealthAuthorityId {
        HealthAuthorityId(self.id)
    }

    /// First key, in stored order, whose version is `kid` and that is valid at `now`.
    ///
    /// Versions are unique per authority in the schema; if a duplicate ever
    /// appears the first valid match wins.
    pub fn find_valid_key(&self, kid: &str, now: DateTime<Utc>) -> Option<&HealthAuthorityKey> {
        self.keys
            .iter()
            .find(|key| key.version == kid && key.is_valid_at(now))
    }
}

/// Versioned signing key (maps to `health_authority_key` table).
#[derive(Debug, Clone, FromRow)]
pub struct HealthAuthorityKey {
    #[sqlx(rename = "health_authority_id")]
    pub authority_id: i64,
    pub version: String,
    #[sqlx(rename = "from_timestamp")]
    pub valid_from: DateTime<Utc>,
    /// `None` means the key has no scheduled end.
    #[sqlx(rename = "thru_timestamp")]
    pub valid_until: Option<DateTime<Utc>>,
    /// SubjectPublicKeyInfo PEM of a P-256 public key.
    #[sqlx(rename = "public_key")]
    pub public_key_pem: String,
}

impl HealthAuthorityKey {
    /// Whether the key's activation window contains `now`.
    ///
    /// The window is `[valid_from, valid_until)`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if now < self.valid_from {
            return false;
        }
        match self.valid_until {
            Some(until) => now < until,
            None => true,
        }
    }

    /// Whether the key is usable right now. Never cache the result.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Parse the stored PEM into a verification key.
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        DecodingKey::from_ec_pem(self.public_key_pem.as_bytes())
    }
}
