//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. `SecretString` implements `Debug` with
//! redaction, so a struct that derives `Debug` and holds a secret is safe to
//! log via `{:?}` or tracing. Secrets are zeroized on drop.
//!
//! Use `SecretString` for:
//! - Database connection URLs (they embed credentials)
//! - Bearer tokens held beyond the request that carried them
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct StoreSettings {
//!     database_url: SecretString,
//! }
//!
//! let settings = StoreSettings {
//!     database_url: SecretString::from("postgresql://stats:hunter2@db/stats"),
//! };
//!
//! assert!(!format!("{settings:?}").contains("hunter2"));
//! let url: &str = settings.database_url.expose_secret();
//! assert!(url.starts_with("postgresql://"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("postgresql://stats:hunter2@db/stats");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("bearer-value");
        assert_eq!(secret.expose_secret(), "bearer-value");
    }

    #[test]
    fn test_deserialize_keeps_value_out_of_debug() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct StoreSettings {
            name: String,
            database_url: SecretString,
        }

        let json = r#"{"name": "stats", "database_url": "postgresql://u:pw-123@h/db"}"#;
        let settings: StoreSettings = serde_json::from_str(json).expect("deserialize");

        assert_eq!(
            settings.database_url.expose_secret(),
            "postgresql://u:pw-123@h/db"
        );

        let debug = format!("{settings:?}");
        assert!(debug.contains("stats"));
        assert!(!debug.contains("pw-123"));
    }
}
