//! JWT utilities shared across the stats authentication crates.
//!
//! This module provides the untrusted first phase of token verification:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Header and issuer inspection before any key is chosen
//! - iat validation logic
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only ES256 (ECDSA P-256 / SHA-256) is accepted; the header `alg` is
//!   compared by name so `none` and HMAC variants never reach key lookup
//! - Nothing returned by [`inspect_unverified`] is trusted until the
//!   signature has been checked with a key chosen by the caller
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{inspect_unverified, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! let unverified = inspect_unverified(token)?;
//! let key = directory_key_for(&unverified.issuer, &unverified.kid)?;
//! // verify signature with `key`, then:
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. A stats token with an ES256 signature and the
/// standard claims is around 400 bytes.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes per NIST SP 800-63B).
///
/// Bounds how far in the future `iat` may be.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Also caps the `exp`/`nbf` leeway.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// The only signing algorithm accepted for stats tokens.
pub const REQUIRED_ALGORITHM: &str = "ES256";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting or validating a JWT.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header `alg` is not [`REQUIRED_ALGORITHM`]. Carries the declared value.
    #[error("The access token is invalid or expired")]
    UnsupportedAlgorithm(String),

    /// Token is missing the `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token `kid` header is present but not a non-empty string.
    #[error("The access token is invalid or expired")]
    InvalidKid,

    /// Payload is not a JSON object with a string `iss` claim.
    #[error("The access token is invalid or expired")]
    MalformedClaims,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Types
// =============================================================================

/// Header and issuer read from a token whose signature has NOT been checked.
///
/// Only used to pick which key to verify with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedToken {
    /// Key version from the `kid` header.
    pub kid: String,

    /// Issuer from the `iss` claim.
    pub issuer: String,
}

// =============================================================================
// Functions
// =============================================================================

/// Decode one base64url segment of a compact JWS into a JSON value.
fn decode_segment(segment: &str, what: &'static str) -> Option<serde_json::Value> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", segment = what, error = %e, "Failed to decode JWT base64");
        })
        .ok()?;

    serde_json::from_slice(&bytes)
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", segment = what, error = %e, "Failed to parse JWT JSON");
        })
        .ok()
}

/// Inspect a JWT without verifying its signature.
///
/// Checks run in a fixed order and the first failure wins:
///
/// 1. Size (`TokenTooLarge`)
/// 2. Three-part structure and header JSON (`MalformedToken`)
/// 3. Header `alg` equals `ES256` (`UnsupportedAlgorithm`)
/// 4. Header `kid` present (`MissingKid`) and a non-empty string (`InvalidKid`)
/// 5. Payload is a JSON object with a string `iss` (`MalformedClaims`)
///
/// # Security
///
/// - The returned values are attacker-controlled until the signature is verified
/// - `issuer` and `kid` may only be used to select a key from a trusted directory
///
/// # Errors
///
/// Returns the `JwtValidationError` variant for the first failed check above.
pub fn inspect_unverified(token: &str) -> Result<UnverifiedToken, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(payload_part), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header = decode_segment(header_part, "header").ok_or(JwtValidationError::MalformedToken)?;

    let alg = header
        .get("alg")
        .and_then(serde_json::Value::as_str)
        .ok_or(JwtValidationError::MalformedToken)?;
    if alg != REQUIRED_ALGORITHM {
        tracing::debug!(target: "common.jwt", alg = %alg, "Token rejected: unsupported signing algorithm");
        return Err(JwtValidationError::UnsupportedAlgorithm(alg.to_string()));
    }

    let kid = match header.get("kid") {
        None => return Err(JwtValidationError::MissingKid),
        Some(value) => value
            .as_str()
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .ok_or(JwtValidationError::InvalidKid)?,
    };

    let issuer = decode_segment(payload_part, "payload")
        .as_ref()
        .and_then(serde_json::Value::as_object)
        .and_then(|claims| claims.get("iss"))
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MalformedClaims)?;

    Ok(UnverifiedToken { kid, issuer })
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens with `iat` more than `clock_skew` in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_iat`] in production code. This variant exists so that
/// boundary conditions can be unit-tested without wall-clock dependence.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds), well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
