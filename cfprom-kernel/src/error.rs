//! Error taxonomy of the collector
//!
//! One enum per concern; `anyhow` is only used at the binary edge.

use std::path::PathBuf;

/// Failures of a remote call against the platform API
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Failures of a monitoring step, tagged with the step that failed
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("could not establish a session: {0}")]
    Authentication(#[source] PlatformError),
    #[error("could not load the inventory: {0}")]
    Inventory(#[source] PlatformError),
    #[error("could not fetch stats of {app}: {source}")]
    Stats {
        app: String,
        #[source]
        source: PlatformError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum HostContextError {
    #[error("not running in Cloud Foundry (VCAP_APPLICATION is not set)")]
    Missing,
    #[error("invalid VCAP_APPLICATION: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("ERROR: missing username an/or password")]
    MissingCredentials,
    #[error(transparent)]
    HostContext(#[from] HostContextError),
    #[error("monitoring loop is not running")]
    LoopUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid listen address: {0}")]
    ListenAddress(String),
    #[error("{0} must be a positive number of seconds")]
    Interval(&'static str),
    #[error("{var} is not a number: {value}")]
    InvalidNumber { var: &'static str, value: String },
}
