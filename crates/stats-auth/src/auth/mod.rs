//! Stats token authentication.
//!
//! # Components
//!
//! - `claims` - Claims carried by a stats token
//! - `resolution_cache` - Issuer to health authority cache, including not-found
//! - `verifier` - ES256 verification against the health authority directory

pub mod claims;
pub mod resolution_cache;
pub mod verifier;

pub use claims::{Audience, StatsClaims};
pub use resolution_cache::{Resolution, ResolutionCache};
pub use verifier::StatsTokenVerifier;
