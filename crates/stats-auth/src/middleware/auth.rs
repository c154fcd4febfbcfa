//! Authentication middleware for stats upload routes.
//!
//! Extracts the Bearer token from the Authorization header, authenticates it
//! with the [`StatsTokenVerifier`], and injects the resulting
//! [`AuthenticatedAuthority`] into request extensions.

use crate::auth::StatsTokenVerifier;
use crate::errors::StatsAuthError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use common::types::HealthAuthorityId;
use std::sync::Arc;
use tracing::instrument;

/// State for the stats authentication middleware.
#[derive(Clone)]
pub struct StatsAuthState {
    pub verifier: Arc<StatsTokenVerifier>,
}

/// Health authority that signed the request's stats token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedAuthority(pub HealthAuthorityId);

/// Extract the Bearer token from the Authorization header.
fn extract_bearer_token(req: &Request) -> Result<&str, StatsAuthError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "stats_auth.middleware.auth", "Missing Authorization header");
            StatsAuthError::MissingCredentials
        })?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "stats_auth.middleware.auth", "Invalid Authorization header format");
            StatsAuthError::MissingCredentials
        })
}

/// Authentication middleware for stats tokens.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing or rejected
/// - Continues to the next handler with [`AuthenticatedAuthority`] in extensions otherwise
#[instrument(skip_all, name = "stats_auth.middleware.auth")]
pub async fn require_stats_auth(
    State(state): State<Arc<StatsAuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, StatsAuthError> {
    let token = extract_bearer_token(&req)?;

    let authority_id = state.verifier.authenticate(token).await?;

    req.extensions_mut()
        .insert(AuthenticatedAuthority(authority_id));

    Ok(next.run(req).await)
}

/// Extension trait for reading the authenticated authority from a request.
pub trait AuthorityExt {
    /// Returns `None` if the stats auth middleware was not applied.
    fn authority(&self) -> Option<HealthAuthorityId>;
}

impl<B> AuthorityExt for axum::extract::Request<B> {
    fn authority(&self) -> Option<HealthAuthorityId> {
        self.extensions()
            .get::<AuthenticatedAuthority>()
            .map(|authenticated| authenticated.0)
    }
}
