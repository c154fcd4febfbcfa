//! Stats token claims.
//!
//! Claims are only trusted after the signature has been verified. The `sub`
//! field is redacted in Debug output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `aud` claim: a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `expected` is the audience, or one of them.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Single(aud) => write!(f, "{aud}"),
            Audience::Multiple(auds) => write!(f, "[{}]", auds.join(", ")),
        }
    }
}

/// Claims carried by a stats token.
#[derive(Clone, Serialize, Deserialize)]
pub struct StatsClaims {
    /// Issuer; names the health authority that signed the token.
    pub iss: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration timestamp (Unix epoch seconds). Required.
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Subject - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl fmt::Debug for StatsClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsClaims")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl StatsClaims {
    /// Whether the token was minted for `expected`. A missing `aud` never matches.
    pub fn has_audience(&self, expected: &str) -> bool {
        self.aud
            .as_ref()
            .is_some_and(|aud| aud.contains(expected))
    }
}
