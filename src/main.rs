use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use matcha_monitor::config::{self, RunnerSettings, SmsSettings, TargetRecord};
use matcha_monitor::models::ExtractMethod;
use matcha_monitor::notify::{AlertSink, ConsoleSink, build_sink};
use matcha_monitor::runner::{RunOptions, Runner};
use matcha_monitor::state;
use matcha_monitor::tracker::StateTracker;
use matcha_monitor::utils::error::{ConfigError, WatchError};

const EXIT_CONFIG: u8 = 1;
const EXIT_FATAL: u8 = 2;
const EXIT_PARTIAL: u8 = 3;

/// matcha-monitor: get restock alerts for matcha drops from your favorite
/// provider.
#[derive(Parser)]
#[command(name = "matcha-monitor", version, about)]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "watch.toml")]
    config: PathBuf,

    /// Path to the state file.
    #[arg(long, global = true, default_value = "state.json")]
    state: PathBuf,

    /// Enable debug logs.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a starter config and .env.example.
    Init {
        /// Overwrite existing files if present.
        #[arg(long)]
        force: bool,
    },
    /// Add a target to the config.
    Add {
        name: String,
        url: String,
        /// "dom" (CSS selector) or "json" (dot/bracket path).
        #[arg(long, default_value = "dom")]
        method: String,
        /// CSS selector (dom) or JSON path (json).
        #[arg(long, default_value = "")]
        rule: String,
        /// Condition, e.g. text:'add to cart' or bool:true.
        #[arg(long, default_value = "")]
        expect: String,
        /// e.g. "45s", "2m".
        #[arg(long, default_value = "60s")]
        interval: String,
    },
    /// Remove a target from the config.
    Remove { name: String },
    /// List configured targets and their last observations.
    List,
    /// Check a single target once and print the result.
    Test { name: String },
    /// Poll all targets on their intervals.
    Run {
        /// Run one pass and exit.
        #[arg(long)]
        once: bool,
        /// Do everything except send SMS.
        #[arg(long)]
        dry_run: bool,
        /// Run for a single target.
        #[arg(long, value_name = "name")]
        only: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    debug!("using config at {}", cli.config.display());

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            report(&e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn setup_logging(verbose: bool) {
    let default_directive = if verbose {
        "matcha_monitor=debug"
    } else {
        "matcha_monitor=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<ExitCode, WatchError> {
    match cli.command {
        Command::Init { force } => init(&cli.config, force),
        Command::Add {
            name,
            url,
            method,
            rule,
            expect,
            interval,
        } => add(&cli.config, name, url, method, rule, expect, interval),
        Command::Remove { name } => remove(&cli.config, &name),
        Command::List => list(&cli.config, &cli.state),
        Command::Test { name } => test(&cli.config, &cli.state, &name).await,
        Command::Run {
            once,
            dry_run,
            only,
        } => {
            run(&cli.config, &cli.state, RunOptions {
                once,
                dry_run,
                only,
            })
            .await
        }
    }
}

fn init(config_path: &Path, force: bool) -> Result<ExitCode, WatchError> {
    match config::init_scaffold(config_path, force) {
        Ok(scaffold) => {
            println!(
                "Created {} and {}",
                scaffold.config.display(),
                scaffold.env_example.display()
            );
            println!("Next: open the config, add a target, then run `matcha-monitor test <name>`.");
            Ok(ExitCode::SUCCESS)
        }
        Err(ConfigError::AlreadyExists { path }) => {
            eprintln!("{path} already exists. Use --force to overwrite.");
            Ok(ExitCode::from(EXIT_CONFIG))
        }
        Err(e) => Err(e.into()),
    }
}

#[allow(clippy::too_many_arguments)]
fn add(
    config_path: &Path,
    name: String,
    url: String,
    method: String,
    rule: String,
    expect: String,
    interval: String,
) -> Result<ExitCode, WatchError> {
    let method: ExtractMethod = method
        .parse()
        .map_err(|message| ConfigError::InvalidTarget {
            name: name.clone(),
            message,
        })?;
    let mut config = config::load(config_path)?;
    config.add_target(TargetRecord {
        name: name.clone(),
        url: url.clone(),
        method,
        rule,
        expect,
        interval,
    })?;
    config::save(&config, config_path)?;
    println!("Added '{name}' -> {url}");
    Ok(ExitCode::SUCCESS)
}

fn remove(config_path: &Path, name: &str) -> Result<ExitCode, WatchError> {
    let mut config = config::load(config_path)?;
    if !config.remove_target(name) {
        eprintln!("Target '{name}' not found.");
        return Ok(ExitCode::from(EXIT_CONFIG));
    }
    config::save(&config, config_path)?;
    println!("Removed '{name}'");
    Ok(ExitCode::SUCCESS)
}

fn list(config_path: &Path, state_path: &Path) -> Result<ExitCode, WatchError> {
    let config = config::load(config_path)?;
    let observations = state::load(state_path)?;

    if config.targets.is_empty() {
        println!("No targets configured. Use `matcha-monitor add <name> <url>`.");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<28} {:<6} {:<8} {:<13} Last Change",
        "Name", "Method", "Interval", "Last Value"
    );
    println!("{}", "-".repeat(78));
    for record in &config.targets {
        let observation = observations.get(&record.name);
        let last_value = observation.map_or("-".to_string(), |o| o.last_value.to_string());
        let last_change = observation
            .and_then(|o| o.last_changed_at)
            .map_or("-".to_string(), |at| {
                at.format("%Y-%m-%d %H:%M:%S").to_string()
            });
        println!(
            "{:<28} {:<6} {:<8} {:<13} {}",
            record.name, record.method, record.interval, last_value, last_change
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn test(config_path: &Path, state_path: &Path, name: &str) -> Result<ExitCode, WatchError> {
    // The sink is never invoked by a test check.
    let runner = build_runner(config_path, state_path, Arc::new(ConsoleSink::new()))?;
    let result = runner.test_target(name).await?;
    println!(
        "value={} in_stock={} would_alert={}",
        result.value, result.in_stock, result.would_alert
    );
    Ok(ExitCode::SUCCESS)
}

async fn run(
    config_path: &Path,
    state_path: &Path,
    options: RunOptions,
) -> Result<ExitCode, WatchError> {
    let sms = SmsSettings::from_env()?;
    if sms.is_none() && !options.dry_run {
        warn!("no SMS credentials configured, alerts will only be logged");
    }
    let mut runner = build_runner(config_path, state_path, build_sink(sms))?;
    let summary = runner.run(&options).await?;

    println!(
        "{} pass(es), {} check(s), {} alert(s) sent, {} check failure(s), {} alert failure(s)",
        summary.passes,
        summary.checks,
        summary.alerts_sent,
        summary.check_failures,
        summary.alert_failures
    );
    if summary.had_failures() {
        Ok(ExitCode::from(EXIT_PARTIAL))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn build_runner(
    config_path: &Path,
    state_path: &Path,
    sink: Arc<dyn AlertSink>,
) -> Result<Runner, WatchError> {
    let config = config::load(config_path)?;
    let targets = config.compile()?;
    let settings = RunnerSettings::from_env()?;
    let tracker = StateTracker::new(state::load(state_path)?);
    Runner::new(targets, settings, sink, tracker, state_path.to_path_buf())
}

fn report(error: &WatchError) {
    if let WatchError::Config(ConfigError::Missing { path }) = error {
        eprintln!("No config at {path}. Run `matcha-monitor init` first.");
    } else {
        eprintln!("Error: {error}");
    }
}

fn exit_code_for(error: &WatchError) -> u8 {
    match error {
        WatchError::Config(_) | WatchError::TargetNotFound { .. } => EXIT_CONFIG,
        _ => EXIT_FATAL,
    }
}
