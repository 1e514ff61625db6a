use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("unexpected HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("DNS lookup failed: {message}")]
    Dns { message: String },

    #[error("failed to build HTTP client: {message}")]
    Client { message: String },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no element matches selector '{selector}'")]
    NoMatch { selector: String },

    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("path '{path}' not found in document")]
    PathNotFound { path: String },

    #[error("path '{path}' resolves to a non-leaf value")]
    NonLeaf { path: String },

    #[error("invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("invalid JSON document: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConditionError {
    #[error("invalid expect expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("state file {path} is not valid JSON: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no config file at {path}")]
    Missing { path: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("config file {path} is not valid TOML: {source}")]
    Decode {
        path: String,
        source: toml::de::Error,
    },

    #[error("failed to encode config: {0}")]
    Encode(#[source] toml::ser::Error),

    #[error("{path} already exists")]
    AlreadyExists { path: String },

    #[error("target '{name}' is already configured")]
    DuplicateTarget { name: String },

    #[error("invalid target '{name}': {message}")]
    InvalidTarget { name: String, message: String },

    #[error("invalid interval '{value}': expected forms like \"45s\", \"2m\" or \"1h\"")]
    InvalidInterval { value: String },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("environment configuration error: {0}")]
    Env(#[from] config::ConfigError),

    #[error(transparent)]
    Condition(#[from] ConditionError),
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("alert transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("alert rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("condition failed: {0}")]
    Condition(#[from] ConditionError),

    #[error("no target named '{name}' is configured")]
    TargetNotFound { name: String },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("alert dispatch failed: {0}")]
    Send(#[from] SendError),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WatchError>;
