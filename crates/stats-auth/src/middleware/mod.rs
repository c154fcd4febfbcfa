//! HTTP middleware for stats endpoints.
//!
//! # Components
//!
//! - `auth` - Bearer token authentication for stats uploads

pub mod auth;

pub use auth::{require_stats_auth, AuthenticatedAuthority, AuthorityExt, StatsAuthState};
