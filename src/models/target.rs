use std::time::Duration;

use crate::condition::Expect;
use crate::models::ExtractMethod;

/// One configured watch target, compiled from its raw config record.
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub url: String,
    pub method: ExtractMethod,
    /// CSS selector (dom) or dot/bracket path (json).
    pub rule: String,
    pub expect: Expect,
    pub interval: Duration,
}
