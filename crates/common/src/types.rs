//! Common data types for the stats authentication crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a registered health authority.
///
/// Returned to callers after a stats token has been authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthAuthorityId(pub i64);

impl HealthAuthorityId {
    /// Returns the raw database identifier.
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for HealthAuthorityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for HealthAuthorityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
