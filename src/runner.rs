use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, error, info, warn};

use crate::config::RunnerSettings;
use crate::extractor;
use crate::fetcher::{Fetched, Fetcher};
use crate::models::{CheckResult, Observation, Target};
use crate::notify::AlertSink;
use crate::state;
use crate::tracker::StateTracker;
use crate::utils::error::{Result, WatchError};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run one pass over all targets and stop.
    pub once: bool,
    /// Compute and log alerts without dispatching or committing them.
    pub dry_run: bool,
    /// Restrict the run to a single target.
    pub only: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: u64,
    pub checks: u64,
    pub alerts_sent: u64,
    pub check_failures: u64,
    pub alert_failures: u64,
}

impl RunSummary {
    pub fn had_failures(&self) -> bool {
        self.check_failures > 0 || self.alert_failures > 0
    }
}

struct CheckOutcome {
    result: CheckResult,
    alerted: bool,
    alert_failed: bool,
}

/// Drives repeated target evaluation: fetch, extract, evaluate the
/// condition, diff against tracked state, dispatch alerts, persist.
pub struct Runner {
    targets: Vec<Target>,
    fetcher: Fetcher,
    sink: Arc<dyn AlertSink>,
    tracker: StateTracker,
    state_path: PathBuf,
    settings: RunnerSettings,
    last_attempt: HashMap<String, Instant>,
}

impl Runner {
    pub fn new(
        targets: Vec<Target>,
        settings: RunnerSettings,
        sink: Arc<dyn AlertSink>,
        tracker: StateTracker,
        state_path: PathBuf,
    ) -> Result<Self> {
        let fetcher = Fetcher::new(&settings)?;
        Ok(Self {
            targets,
            fetcher,
            sink,
            tracker,
            state_path,
            settings,
            last_attempt: HashMap::new(),
        })
    }

    /// Runs one full check of a target without touching any state.
    pub async fn evaluate(
        &self,
        target: &Target,
        previous: Option<&Observation>,
    ) -> Result<CheckResult> {
        let fetched = self.fetch_with_retry(target).await?;
        let value = extractor::extract(&fetched.body, target.method, &target.rule)?;
        let in_stock = target.expect.matches(&value);
        let would_alert = StateTracker::is_alert_worthy(previous, in_stock);
        Ok(CheckResult {
            value,
            in_stock,
            would_alert,
        })
    }

    /// Evaluates one configured target by name, surfacing any error
    /// directly. Commits nothing and dispatches nothing.
    pub async fn test_target(&self, name: &str) -> Result<CheckResult> {
        let target = self.find_target(name)?;
        self.evaluate(target, self.tracker.observation(name)).await
    }

    /// The main loop. Evaluates due targets pass by pass, persisting state
    /// after each pass, until interrupted (or immediately after the first
    /// pass with `once`).
    pub async fn run(&mut self, options: &RunOptions) -> Result<RunSummary> {
        if let Some(name) = &options.only {
            self.find_target(name)?;
        }

        // GC observations for targets that were removed from the config.
        let configured: HashSet<String> = self.targets.iter().map(|t| t.name.clone()).collect();
        self.tracker.retain_targets(&configured);

        let mut summary = RunSummary::default();
        if self.active_targets(options).next().is_none() {
            warn!("no targets configured, nothing to do");
            return Ok(summary);
        }

        loop {
            self.run_pass(options, &mut summary).await?;
            summary.passes += 1;
            if options.once {
                break;
            }
            let pause = self.next_due_in(options);
            debug!("pass complete, sleeping {}ms", pause.as_millis());
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
            }
        }
        Ok(summary)
    }

    /// One sweep over the currently-due targets. A failing target is logged
    /// and skipped; the rest of the pass continues.
    async fn run_pass(&mut self, options: &RunOptions, summary: &mut RunSummary) -> Result<()> {
        let due: Vec<Target> = self
            .active_targets(options)
            .filter(|t| options.once || self.is_due(t))
            .cloned()
            .collect();
        debug!("{} target(s) due this pass", due.len());

        for target in &due {
            self.last_attempt.insert(target.name.clone(), Instant::now());
            let started = std::time::Instant::now();
            summary.checks += 1;
            match self.check_target(target, options).await {
                Ok(outcome) => {
                    if outcome.alerted {
                        summary.alerts_sent += 1;
                    }
                    if outcome.alert_failed {
                        summary.alert_failures += 1;
                    }
                    info!(
                        "checked '{}' in {}ms: value={} in_stock={} would_alert={}",
                        target.name,
                        started.elapsed().as_millis(),
                        outcome.result.value,
                        outcome.result.in_stock,
                        outcome.result.would_alert,
                    );
                }
                Err(e) => {
                    summary.check_failures += 1;
                    warn!(
                        "check for '{}' failed after {}ms: {}",
                        target.name,
                        started.elapsed().as_millis(),
                        e
                    );
                }
            }
        }

        state::save(&self.state_path, self.tracker.observations())?;
        Ok(())
    }

    async fn check_target(&mut self, target: &Target, options: &RunOptions) -> Result<CheckOutcome> {
        let result = self
            .evaluate(target, self.tracker.observation(&target.name))
            .await?;

        let mut alerted = false;
        let mut alert_failed = false;
        if result.would_alert {
            if options.dry_run {
                info!(
                    "dry run: would alert for '{}' via {}",
                    target.name,
                    self.sink.name()
                );
            } else {
                let message = alert_message(target, &result);
                match self.sink.send(&message).await {
                    Ok(ack) => {
                        alerted = true;
                        info!(
                            "alert sent for '{}' via {} (id {:?})",
                            target.name,
                            self.sink.name(),
                            ack.message_id
                        );
                    }
                    Err(e) => {
                        // The observation still commits below, so a sustained
                        // in-stock state will not retrigger this alert.
                        alert_failed = true;
                        error!("alert dispatch for '{}' failed: {}", target.name, e);
                    }
                }
            }
        }

        self.tracker.commit(&target.name, &result, alerted, Utc::now());
        Ok(CheckOutcome {
            result,
            alerted,
            alert_failed,
        })
    }

    async fn fetch_with_retry(&self, target: &Target) -> Result<Fetched> {
        let attempts = self.settings.retry_attempts.max(1) as usize;
        let strategy =
            FixedInterval::from_millis(self.settings.retry_delay_ms).take(attempts - 1);
        Retry::spawn(strategy, || self.fetcher.fetch(&target.url))
            .await
            .map_err(WatchError::Fetch)
    }

    fn find_target(&self, name: &str) -> Result<&Target> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| WatchError::TargetNotFound {
                name: name.to_string(),
            })
    }

    fn active_targets<'a>(&'a self, options: &'a RunOptions) -> impl Iterator<Item = &'a Target> {
        self.targets
            .iter()
            .filter(move |t| options.only.as_deref().is_none_or(|only| t.name == only))
    }

    fn is_due(&self, target: &Target) -> bool {
        self.last_attempt
            .get(&target.name)
            .is_none_or(|at| at.elapsed() >= target.interval)
    }

    /// Time until the next target comes due, clamped to the configured
    /// floor so near-due targets don't turn the loop into a busy wait.
    fn next_due_in(&self, options: &RunOptions) -> Duration {
        let floor = Duration::from_millis(self.settings.min_sleep_ms.max(1));
        let next = self
            .active_targets(options)
            .map(|t| match self.last_attempt.get(&t.name) {
                Some(at) => t.interval.saturating_sub(at.elapsed()),
                None => Duration::ZERO,
            })
            .min()
            .unwrap_or(floor);
        next.max(floor)
    }
}

fn alert_message(target: &Target, result: &CheckResult) -> String {
    format!(
        "matcha-monitor: '{}' looks in stock ({}) -> {}",
        target.name, result.value, target.url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Expect;
    use crate::models::ExtractMethod;
    use crate::notify::{MockAlertSink, SendAck};
    use serde_json::json;
    use tempfile::TempDir;

    fn test_settings() -> RunnerSettings {
        RunnerSettings {
            request_timeout: 5,
            user_agent: "TestAgent/1.0".to_string(),
            retry_attempts: 1,
            retry_delay_ms: 10,
            min_sleep_ms: 50,
        }
    }

    fn test_target(name: &str, url: &str, interval_secs: u64) -> Target {
        Target {
            name: name.to_string(),
            url: url.to_string(),
            method: ExtractMethod::Json,
            rule: "in_stock".to_string(),
            expect: Expect::parse("bool:true").unwrap(),
            interval: Duration::from_secs(interval_secs),
        }
    }

    fn test_runner(targets: Vec<Target>) -> (Runner, TempDir) {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        let sink = Arc::new(MockAlertSink::new());
        let runner = Runner::new(
            targets,
            test_settings(),
            sink,
            StateTracker::default(),
            state_path,
        )
        .unwrap();
        (runner, dir)
    }

    #[test]
    fn test_find_target_unknown_name() {
        let (runner, _dir) = test_runner(vec![test_target("a", "http://localhost/", 60)]);
        let err = runner.find_target("b").unwrap_err();
        assert!(matches!(err, WatchError::TargetNotFound { .. }));
    }

    #[test]
    fn test_targets_with_no_attempt_are_due() {
        let (runner, _dir) = test_runner(vec![test_target("a", "http://localhost/", 60)]);
        assert!(runner.is_due(&runner.targets[0]));
    }

    #[test]
    fn test_recently_attempted_target_is_not_due() {
        let (mut runner, _dir) = test_runner(vec![test_target("a", "http://localhost/", 60)]);
        runner.last_attempt.insert("a".to_string(), Instant::now());
        assert!(!runner.is_due(&runner.targets[0]));
    }

    #[test]
    fn test_next_due_in_respects_the_floor() {
        let (mut runner, _dir) = test_runner(vec![test_target("a", "http://localhost/", 60)]);
        let options = RunOptions::default();

        // Never attempted: due now, clamped up to the floor.
        assert_eq!(runner.next_due_in(&options), Duration::from_millis(50));

        runner.last_attempt.insert("a".to_string(), Instant::now());
        let pause = runner.next_due_in(&options);
        assert!(pause > Duration::from_secs(50) && pause <= Duration::from_secs(60));
    }

    #[test]
    fn test_only_filter_restricts_active_targets() {
        let (runner, _dir) = test_runner(vec![
            test_target("a", "http://localhost/a", 60),
            test_target("b", "http://localhost/b", 60),
        ]);
        let options = RunOptions {
            only: Some("b".to_string()),
            ..RunOptions::default()
        };
        let names: Vec<_> = runner
            .active_targets(&options)
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn test_alert_message_names_the_target_and_url() {
        let target = test_target("sayaka", "https://example.com/p/1", 60);
        let result = CheckResult {
            value: json!("Add to Cart"),
            in_stock: true,
            would_alert: true,
        };
        let message = alert_message(&target, &result);
        assert!(message.contains("sayaka"));
        assert!(message.contains("https://example.com/p/1"));
    }

    #[tokio::test]
    async fn test_run_with_unknown_only_target_fails_fast() {
        let (mut runner, _dir) = test_runner(vec![test_target("a", "http://localhost/", 60)]);
        let options = RunOptions {
            once: true,
            only: Some("nope".to_string()),
            ..RunOptions::default()
        };
        let err = runner.run(&options).await.unwrap_err();
        assert!(matches!(err, WatchError::TargetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_with_no_targets_is_a_no_op() {
        let (mut runner, dir) = test_runner(vec![]);
        let summary = runner.run(&RunOptions { once: true, ..RunOptions::default() })
            .await
            .unwrap();
        assert_eq!(summary, RunSummary::default());
        assert!(!dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn test_mock_sink_receives_alert_message() {
        let mut sink = MockAlertSink::new();
        sink.expect_name().return_const("mock".to_string());
        sink.expect_send()
            .withf(|message: &str| message.contains("sayaka"))
            .times(1)
            .returning(|_| Ok(SendAck { message_id: None }));

        let dir = TempDir::new().unwrap();
        let runner = Runner::new(
            vec![test_target("sayaka", "http://localhost/", 60)],
            test_settings(),
            Arc::new(sink),
            StateTracker::default(),
            dir.path().join("state.json"),
        )
        .unwrap();

        let result = CheckResult {
            value: json!("Add to Cart"),
            in_stock: true,
            would_alert: true,
        };
        let message = alert_message(&runner.targets[0], &result);
        let ack = runner.sink.send(&message).await.unwrap();
        assert_eq!(ack.message_id, None);
    }
}
