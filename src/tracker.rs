use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{CheckResult, Observation};
use crate::state::Observations;

/// Owns the committed observations and decides which stock transitions are
/// worth an alert.
#[derive(Debug, Default)]
pub struct StateTracker {
    observations: Observations,
}

impl StateTracker {
    pub fn new(observations: Observations) -> Self {
        Self { observations }
    }

    pub fn observation(&self, name: &str) -> Option<&Observation> {
        self.observations.get(name)
    }

    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    /// A transition is alert-worthy only when a previous observation saw the
    /// target out of stock and the fresh verdict sees it in stock. A target
    /// that is in stock on its very first check never alerts.
    pub fn is_alert_worthy(previous: Option<&Observation>, in_stock: bool) -> bool {
        matches!(previous, Some(prev) if !prev.in_stock && in_stock)
    }

    pub fn would_alert(&self, name: &str, in_stock: bool) -> bool {
        Self::is_alert_worthy(self.observation(name), in_stock)
    }

    /// Records a check result. `last_changed_at` moves only when the value
    /// actually changed; `last_alerted_at` moves only when `alerted` is true,
    /// which callers set solely after a successful dispatch. Dry runs and
    /// failed dispatches therefore commit the observation but keep the alert
    /// timestamp untouched.
    pub fn commit(&mut self, name: &str, result: &CheckResult, alerted: bool, now: DateTime<Utc>) {
        let previous = self.observations.get(name);
        let value_changed = previous.is_none_or(|prev| prev.last_value != result.value);
        let last_changed_at = if value_changed {
            Some(now)
        } else {
            previous.and_then(|prev| prev.last_changed_at)
        };
        let last_alerted_at = if alerted {
            Some(now)
        } else {
            previous.and_then(|prev| prev.last_alerted_at)
        };

        self.observations.insert(
            name.to_string(),
            Observation {
                last_value: result.value.clone(),
                in_stock: result.in_stock,
                last_changed_at,
                last_alerted_at,
            },
        );
    }

    /// Garbage collection: drops observations for targets that are no longer
    /// configured.
    pub fn retain_targets(&mut self, names: &HashSet<String>) {
        self.observations.retain(|name, _| names.contains(name));
    }
}
