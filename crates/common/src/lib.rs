//! Common utilities and types shared across the stats authentication crates.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, unverified inspection, iat checks)
pub mod jwt;
