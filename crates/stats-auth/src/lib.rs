//! Stats token authentication.
//!
//! Authenticates the bearer tokens health authorities attach to statistics
//! uploads. A token is accepted only if it is an ES256 JWS signed by a
//! currently valid key of the health authority named by its `iss` claim and
//! carries the configured stats audience. The result is the authority's id.
//!
//! # Architecture
//!
//! ```text
//! middleware/auth.rs -> auth/verifier.rs -> auth/resolution_cache.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Token verification and the issuer resolution cache
//! - `config` - Configuration from environment
//! - `errors` - Rejection reasons with a uniform 401 response
//! - `middleware` - Axum middleware for protected stats routes
//! - `models` - Health authority and key records
//! - `observability` - Prometheus metrics
//! - `repositories` - Health authority directory (PostgreSQL and mock)

pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;

pub use auth::StatsTokenVerifier;
pub use common::types::HealthAuthorityId;
pub use errors::StatsAuthError;
