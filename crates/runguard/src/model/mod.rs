pub mod ids;
pub mod policy;
pub mod record;

pub use ids::RunId;
pub use policy::*;
pub use record::*;

use serde::{Deserialize, Serialize};

/// Structured error payload surfaced in records and JSON output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}
