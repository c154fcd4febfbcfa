//! Builder patterns for stats tokens
//!
//! Provides a fluent API for creating signed (and deliberately broken) stats tokens.

use crate::crypto_fixtures::{FixtureError, TestSigningKey};
use crate::test_ids::{TEST_AUDIENCE, TEST_ISSUER, TEST_KID};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for stats tokens
///
/// Defaults: `iss` = [`TEST_ISSUER`], `aud` = [`TEST_AUDIENCE`],
/// `kid` = [`TEST_KID`], expires in one hour, issued now.
///
/// # Example
/// ```rust,ignore
/// let token = TestStatsTokenBuilder::new()
///     .with_kid("v2")
///     .expires_in(60)
///     .sign(&key)?;
/// ```
pub struct TestStatsTokenBuilder {
    kid: Option<String>,
    iss: Option<String>,
    aud: Option<Value>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: Option<i64>,
    sub: Option<String>,
}

impl TestStatsTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            kid: Some(TEST_KID.to_string()),
            iss: Some(TEST_ISSUER.to_string()),
            aud: Some(json!(TEST_AUDIENCE)),
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            nbf: None,
            iat: Some(now.timestamp()),
            sub: None,
        }
    }

    /// Set the `kid` header
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Omit the `kid` header
    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    /// Set the issuer
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    /// Omit the issuer
    pub fn without_issuer(mut self) -> Self {
        self.iss = None;
        self
    }

    /// Set a single audience
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.aud = Some(json!(audience));
        self
    }

    /// Set an audience array
    pub fn with_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = Some(json!(audiences));
        self
    }

    /// Omit the audience
    pub fn without_audience(mut self) -> Self {
        self.aud = None;
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Omit the expiration
    pub fn without_exp(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = Some(timestamp);
        self
    }

    /// Set the subject
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    /// Build the claims as a JSON value
    pub fn claims(&self) -> Value {
        let mut claims = Map::new();
        if let Some(iss) = &self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        if let Some(aud) = &self.aud {
            claims.insert("aud".to_string(), aud.clone());
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        if let Some(iat) = self.iat {
            claims.insert("iat".to_string(), json!(iat));
        }
        if let Some(sub) = &self.sub {
            claims.insert("sub".to_string(), json!(sub));
        }
        Value::Object(claims)
    }

    /// Sign with ES256 using `key`
    pub fn sign(&self, key: &TestSigningKey) -> Result<String, FixtureError> {
        self.sign_with(Algorithm::ES256, &key.encoding_key())
    }

    /// Sign with an arbitrary algorithm and key (for algorithm confusion tests)
    pub fn sign_with(&self, alg: Algorithm, key: &EncodingKey) -> Result<String, FixtureError> {
        let mut header = Header::new(alg);
        header.kid = self.kid.clone();

        encode(&header, &self.claims(), key).map_err(|e| FixtureError::Signing(e.to_string()))
    }

    /// Token whose header claims `alg` but whose signature is junk
    pub fn unsigned_with_alg(&self, alg: &str) -> String {
        let mut header = json!({"alg": alg, "typ": "JWT"});
        if let Some(kid) = &self.kid {
            header["kid"] = json!(kid);
        }

        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.claims().to_string()),
            URL_SAFE_NO_PAD.encode(b"not-a-signature")
        )
    }
}

impl Default for TestStatsTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
