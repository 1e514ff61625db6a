use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use config::{Config, Environment};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::condition::Expect;
use crate::extractor;
use crate::models::{ExtractMethod, Target};
use crate::utils::error::ConfigError;

/// Raw serialized form of one watch target, as stored in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetRecord {
    pub name: String,
    pub url: String,
    pub method: ExtractMethod,
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub expect: String,
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_interval() -> String {
    "60s".to_string()
}

/// The on-disk target list. Order is preserved so `list` shows targets the
/// way the user wrote them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchConfig {
    #[serde(default)]
    pub targets: Vec<TargetRecord>,
}

impl WatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for record in &self.targets {
            record.validate()?;
            if !seen.insert(record.name.as_str()) {
                return Err(ConfigError::DuplicateTarget {
                    name: record.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn add_target(&mut self, record: TargetRecord) -> Result<(), ConfigError> {
        record.validate()?;
        if self.targets.iter().any(|t| t.name == record.name) {
            return Err(ConfigError::DuplicateTarget { name: record.name });
        }
        self.targets.push(record);
        Ok(())
    }

    /// Returns false when no target with that name was configured.
    pub fn remove_target(&mut self, name: &str) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t.name != name);
        self.targets.len() != before
    }

    /// Compiles the raw records into runtime targets, parsing intervals and
    /// expect expressions once so malformed values fail here rather than
    /// mid-run.
    pub fn compile(&self) -> Result<Vec<Target>, ConfigError> {
        self.validate()?;
        self.targets.iter().map(TargetRecord::compile).collect()
    }
}

impl TargetRecord {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidTarget {
            name: self.name.clone(),
            message,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if Url::parse(&self.url).is_err() {
            return Err(invalid(format!("invalid URL '{}'", self.url)));
        }
        extractor::validate_rule(self.method, &self.rule).map_err(|e| invalid(e.to_string()))?;
        Expect::parse(&self.expect)?;
        parse_interval(&self.interval)?;
        Ok(())
    }

    pub fn compile(&self) -> Result<Target, ConfigError> {
        self.validate()?;
        Ok(Target {
            name: self.name.clone(),
            url: self.url.clone(),
            method: self.method,
            rule: self.rule.clone(),
            expect: Expect::parse(&self.expect)?,
            interval: parse_interval(&self.interval)?,
        })
    }
}

pub fn load(path: &Path) -> Result<WatchConfig, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing {
                path: display(path),
            });
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: display(path),
                source: e,
            });
        }
    };
    let config: WatchConfig = toml::from_str(&raw).map_err(|e| ConfigError::Decode {
        path: display(path),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

pub fn save(config: &WatchConfig, path: &Path) -> Result<(), ConfigError> {
    let encoded = toml::to_string_pretty(config).map_err(ConfigError::Encode)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, encoded).map_err(|e| ConfigError::Write {
        path: display(&tmp),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| ConfigError::Write {
        path: display(path),
        source: e,
    })
}

static INTERVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*([smh])$").expect("interval pattern is valid"));

/// Parses interval strings like "45s", "2m" or "1h".
pub fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidInterval {
        value: raw.to_string(),
    };
    let captures = INTERVAL_RE.captures(raw.trim()).ok_or_else(invalid)?;
    let amount: u64 = captures[1].parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }
    let unit_secs = match &captures[2] {
        "s" => 1,
        "m" => 60,
        _ => 3600,
    };
    Ok(Duration::from_secs(amount * unit_secs))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaffold {
    pub config: PathBuf,
    pub env_example: PathBuf,
}

const STARTER_CONFIG: &str = r#"# matcha-monitor targets.
#
# method   "dom" (CSS selector) or "json" (dot/bracket path)
# rule     what to extract from the response
# expect   condition turning the extracted value into an in-stock verdict:
#            text:'add to cart'   case-insensitive containment
#            bool:true            truthiness must match
#            (empty)              any truthy value counts as in stock
# interval how often to poll, e.g. "45s", "2m", "1h"

# [[targets]]
# name = "ippodo-sayaka"
# url = "https://example.com/products/sayaka"
# method = "dom"
# rule = ".product-form button"
# expect = "text:'add to cart'"
# interval = "60s"
"#;

const ENV_EXAMPLE: &str = "# Copy to .env and fill in to enable SMS alerts.
MATCHA_SMS_ACCOUNT_SID=
MATCHA_SMS_AUTH_TOKEN=
MATCHA_SMS_FROM_NUMBER=+15550001111
MATCHA_SMS_TO_NUMBER=+15552223333

# Optional runner tuning.
# MATCHA_REQUEST_TIMEOUT=10
# MATCHA_RETRY_ATTEMPTS=3
# MATCHA_RETRY_DELAY_MS=1000
";

/// Creates a starter config file and a `.env.example` next to it.
pub fn init_scaffold(path: &Path, force: bool) -> Result<Scaffold, ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: display(path),
        });
    }
    fs::write(path, STARTER_CONFIG).map_err(|e| ConfigError::Write {
        path: display(path),
        source: e,
    })?;

    let env_example = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(".env.example"),
        _ => PathBuf::from(".env.example"),
    };
    fs::write(&env_example, ENV_EXAMPLE).map_err(|e| ConfigError::Write {
        path: display(&env_example),
        source: e,
    })?;

    Ok(Scaffold {
        config: path.to_path_buf(),
        env_example,
    })
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Runner tuning, overridable through MATCHA_* environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Total fetch attempts per check, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Floor for the between-pass sleep, so near-due targets don't busy-loop.
    #[serde(default = "default_min_sleep_ms")]
    pub min_sleep_ms: u64,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "matcha-monitor/0.1".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_min_sleep_ms() -> u64 {
    500
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            min_sleep_ms: default_min_sleep_ms(),
        }
    }
}

impl RunnerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings: Self = Config::builder()
            .add_source(Environment::with_prefix("MATCHA").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidSettings(
                "request_timeout must be greater than 0".into(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::InvalidSettings(
                "retry_attempts must be greater than 0".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidSettings(
                "user_agent must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// SMS credentials, read from MATCHA_SMS_* environment variables (usually
/// via a .env file).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmsSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub to_number: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    "https://api.twilio.com".to_string()
}

impl SmsSettings {
    /// Returns `None` when no MATCHA_SMS_* variables are set at all;
    /// partially configured credentials are an error.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let source = Config::builder()
            .add_source(Environment::with_prefix("MATCHA_SMS"))
            .build()?;
        let raw: HashMap<String, String> = source.clone().try_deserialize()?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(source.try_deserialize()?))
    }
}
