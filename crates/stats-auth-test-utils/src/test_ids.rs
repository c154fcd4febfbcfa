//! Fixed test IDs for deterministic tests

// Health authorities
pub const TEST_AUTHORITY_ID: i64 = 42;
pub const TEST_AUTHORITY_ID_2: i64 = 43;

// Issuers
pub const TEST_ISSUER: &str = "iss-1";
pub const TEST_ISSUER_2: &str = "iss-2";
pub const TEST_ISSUER_UNKNOWN: &str = "iss-9";

// Key versions (matched against the `kid` header)
pub const TEST_KID: &str = "v1";
pub const TEST_KID_2: &str = "v2";

// Audiences
pub const TEST_AUDIENCE: &str = "stats";
pub const TEST_OTHER_AUDIENCE: &str = "exposure-notifications";

// Database URL used in test configuration (never connected to)
pub const TEST_DATABASE_URL: &str = "postgresql://localhost/stats_test";
