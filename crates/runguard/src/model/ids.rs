use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one supervised run.
///
/// Ids combine a UTC timestamp prefix with a random suffix so concurrent
/// invocations in the same millisecond cannot collide, and lexicographic
/// order matches chronological order.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Create a new unique run ID.
    #[must_use]
    pub fn new() -> Self {
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self(format!("{stamp}-{suffix}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
