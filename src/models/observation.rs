use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Last persisted knowledge about a target: created on its first successful
/// check, updated on every committed check thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub last_value: Value,
    pub in_stock: bool,
    pub last_changed_at: Option<DateTime<Utc>>,
    /// Set only when an alert was actually dispatched successfully.
    pub last_alerted_at: Option<DateTime<Utc>>,
}
