//! Stats authentication error types.
//!
//! Every variant is a rejection. Variants keep the detailed cause for
//! server-side logs and audit, but the `IntoResponse` impl sends the same
//! 401 body for all of them so a client cannot probe which check failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::jwt::JwtValidationError;
use serde::Serialize;
use thiserror::Error;

/// Message returned to clients for every rejection.
pub const UNAUTHORIZED_MESSAGE: &str = "The access token is invalid or expired";

/// Rejection reasons for a stats token.
///
/// Grouped by failure class:
/// - `MissingCredentials`: no bearer token on the request
/// - Malformed/unsupported token: `TokenTooLarge`, `MalformedToken`,
///   `UnsupportedAlgorithm`, `MissingKid`, `InvalidKid`, `MalformedClaims`
/// - `UnknownIssuer`: issuer absent from the directory (cached)
/// - `StoreUnavailable`: directory failed for another reason (not cached)
/// - `KeyNotFound`: no currently valid key with the token's `kid`
/// - `InvalidToken`: signature or time claims rejected
/// - `AudienceMismatch`: verified token meant for another audience
#[derive(Debug, Error)]
pub enum StatsAuthError {
    #[error("unauthorized: missing bearer token")]
    MissingCredentials,

    #[error("unauthorized: token exceeds maximum size")]
    TokenTooLarge,

    #[error("unauthorized: malformed token")]
    MalformedToken,

    #[error("unauthorized: unsupported signing method {0}, must be ES256")]
    UnsupportedAlgorithm(String),

    #[error("unauthorized: missing 'kid' header in token")]
    MissingKid,

    #[error("unauthorized: invalid 'kid' field in token")]
    InvalidKid,

    #[error("unauthorized: token does not contain expected claim set")]
    MalformedClaims,

    #[error("unauthorized: issuer not found: {0}")]
    UnknownIssuer(String),

    #[error("unauthorized: error looking up issuer: {0}")]
    StoreUnavailable(String),

    #[error("unauthorized: key not found: kid: {kid} iss: {issuer}")]
    KeyNotFound { kid: String, issuer: String },

    #[error("authentication token invalid: {0}")]
    InvalidToken(String),

    #[error("unauthorized, audience mismatch")]
    AudienceMismatch,
}

impl StatsAuthError {
    /// Bounded label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StatsAuthError::MissingCredentials => "missing_credentials",
            StatsAuthError::TokenTooLarge => "token_too_large",
            StatsAuthError::MalformedToken => "malformed_token",
            StatsAuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            StatsAuthError::MissingKid => "missing_kid",
            StatsAuthError::InvalidKid => "invalid_kid",
            StatsAuthError::MalformedClaims => "malformed_claims",
            StatsAuthError::UnknownIssuer(_) => "unknown_issuer",
            StatsAuthError::StoreUnavailable(_) => "store_unavailable",
            StatsAuthError::KeyNotFound { .. } => "key_not_found",
            StatsAuthError::InvalidToken(_) => "invalid_token",
            StatsAuthError::AudienceMismatch => "audience_mismatch",
        }
    }

    /// True when the rejection says nothing about the token's trust,
    /// only that the directory could not be consulted.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, StatsAuthError::StoreUnavailable(_))
    }
}

impl From<JwtValidationError> for StatsAuthError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge => StatsAuthError::TokenTooLarge,
            JwtValidationError::MalformedToken => StatsAuthError::MalformedToken,
            JwtValidationError::UnsupportedAlgorithm(alg) => {
                StatsAuthError::UnsupportedAlgorithm(alg)
            }
            JwtValidationError::MissingKid => StatsAuthError::MissingKid,
            JwtValidationError::InvalidKid => StatsAuthError::InvalidKid,
            JwtValidationError::MalformedClaims => StatsAuthError::MalformedClaims,
            JwtValidationError::IatTooFarInFuture => {
                StatsAuthError::InvalidToken("issued-at is in the future".to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for StatsAuthError {
    fn into_response(self) -> Response {
        // Log the actual cause server-side; the client only sees 401
        if self.is_store_unavailable() {
            tracing::error!(target: "stats_auth.errors", error = %self, "Stats token rejected: directory unavailable");
        } else {
            tracing::debug!(target: "stats_auth.errors", error = %self, kind = self.kind(), "Stats token rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: "UNAUTHORIZED",
                message: UNAUTHORIZED_MESSAGE,
            },
        };

        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();

        if let Ok(header_value) = "Bearer realm=\"stats\", error=\"invalid_token\"".parse() {
            response
                .headers_mut()
                .insert("WWW-Authenticate", header_value);
        }

        response
    }
}
