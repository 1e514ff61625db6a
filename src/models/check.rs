use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single target evaluation. `would_alert` reflects what a
/// commit of this result would do under the current state, without
/// committing anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub value: Value,
    pub in_stock: bool,
    pub would_alert: bool,
}
