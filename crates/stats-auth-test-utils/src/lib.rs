//! # Stats Auth Test Utilities
//!
//! Shared test utilities for the stats authentication crate.
//!
//! This crate provides:
//! - ES256 key fixtures (fresh P-256 keypairs with SPKI PEM public keys)
//! - Token builders (TestStatsTokenBuilder)
//! - Health authority builders (TestAuthorityBuilder)
//! - Fixed test IDs and a ready-made configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stats_auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let key = TestSigningKey::generate()?;
//!     let authority = TestAuthorityBuilder::new().with_active_key(TEST_KID, &key).build();
//!     let token = TestStatsTokenBuilder::new().sign(&key)?;
//!     Ok(())
//! }
//! ```

pub mod authorities;
pub mod crypto_fixtures;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use authorities::*;
pub use crypto_fixtures::*;
pub use test_ids::*;
pub use token_builders::*;
