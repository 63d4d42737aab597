//! Process configuration
//!
//! Layers, lowest to highest precedence: defaults, YAML file
//! (`CFPROM_CONFIG` or `./cfprom.yaml`), environment, command line.

use crate::error::ConfigError;
use crate::host::HostContext;
use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_API: &str = "https://api.bosh-lite.com";
const DEFAULT_CONFIG_FILE: &str = "cfprom.yaml";

/// Cloud Foundry usage exporter
#[derive(Parser, Debug, Default)]
#[command(name = "cfprom-kernel", version, about)]
pub struct Cli {
    /// The address to listen on for HTTP requests [default: :8080]
    #[arg(long)]
    pub listen_address: Option<String>,

    /// Path to a YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Contents of the optional YAML file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub listen_address: Option<String>,
    pub cf_api: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub gate_username: Option<String>,
    pub gate_password: Option<String>,
    pub collect_interval_secs: Option<u64>,
    pub refresh_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Clone)]
pub struct Settings {
    pub listen_address: String,
    pub cf_api: Option<String>,
    pub username: String,
    pub password: String,
    pub gate_username: String,
    /// Shared secret of the auth gate; `None` disables the gate
    pub gate_password: Option<String>,
    pub collect_interval_secs: u64,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: ":8080".into(),
            cf_api: None,
            username: String::new(),
            password: String::new(),
            gate_username: "cfprom".into(),
            gate_password: None,
            collect_interval_secs: 15,
            refresh_interval_secs: 15 * 60,
            request_timeout_secs: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("listen_address", &self.listen_address)
            .field("cf_api", &self.cf_api)
            .field("username", &self.username)
            .field("gate_enabled", &self.gate_password.is_some())
            .field("collect_interval_secs", &self.collect_interval_secs)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_secs(var: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { var, value })
}

impl Settings {
    /// Load from the real file system and process environment
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let file = match cli.config.clone().or_else(|| env("CFPROM_CONFIG").map(PathBuf::from)) {
            Some(path) => Some(read_file(&path)?),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Some(read_file(Path::new(DEFAULT_CONFIG_FILE))?),
            None => None,
        };
        Self::from_sources(cli, file, env)
    }

    pub fn from_sources<F>(cli: &Cli, file: Option<FileSettings>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();

        if let Some(f) = file {
            if let Some(v) = non_empty(f.listen_address) {
                s.listen_address = v;
            }
            s.cf_api = non_empty(f.cf_api).or(s.cf_api);
            if let Some(v) = f.username {
                s.username = v;
            }
            if let Some(v) = f.password {
                s.password = v;
            }
            if let Some(v) = non_empty(f.gate_username) {
                s.gate_username = v;
            }
            s.gate_password = non_empty(f.gate_password).or(s.gate_password);
            s.collect_interval_secs = f.collect_interval_secs.unwrap_or(s.collect_interval_secs);
            s.refresh_interval_secs = f.refresh_interval_secs.unwrap_or(s.refresh_interval_secs);
            s.request_timeout_secs = f.request_timeout_secs.or(s.request_timeout_secs);
        }

        if let Some(v) = non_empty(env("CF_API")) {
            s.cf_api = Some(v);
        }
        if let Some(v) = non_empty(env("CF_USERNAME")) {
            s.username = v;
        }
        if let Some(v) = non_empty(env("CF_PASSWORD")) {
            s.password = v;
        }
        if let Some(v) = env("PASSWORD") {
            // an empty PASSWORD explicitly disables the gate
            s.gate_password = non_empty(Some(v));
        }
        if let Some(v) = non_empty(env("CFPROM_COLLECT_INTERVAL")) {
            s.collect_interval_secs = parse_secs("CFPROM_COLLECT_INTERVAL", v)?;
        }
        if let Some(v) = non_empty(env("CFPROM_REFRESH_INTERVAL")) {
            s.refresh_interval_secs = parse_secs("CFPROM_REFRESH_INTERVAL", v)?;
        }
        if let Some(v) = non_empty(env("CFPROM_REQUEST_TIMEOUT")) {
            s.request_timeout_secs = Some(parse_secs("CFPROM_REQUEST_TIMEOUT", v)?);
        }

        if let Some(v) = non_empty(cli.listen_address.clone()) {
            s.listen_address = v;
        }

        if s.collect_interval_secs == 0 {
            return Err(ConfigError::Interval("collect interval"));
        }
        if s.refresh_interval_secs == 0 {
            return Err(ConfigError::Interval("refresh interval"));
        }
        if s.request_timeout_secs == Some(0) {
            return Err(ConfigError::Interval("request timeout"));
        }

        Ok(s)
    }

    /// Accepts Go-style `:8080` (all interfaces) as well as `host:port`
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self.listen_address.trim();
        let candidate = match raw.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => raw.to_string(),
        };
        candidate
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::ListenAddress(raw.to_string()))
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Configured endpoint, else the one the platform advertises, else the default
    pub fn resolve_api_endpoint(&self, host: &dyn HostContext) -> String {
        if let Some(api) = &self.cf_api {
            return api.clone();
        }
        match host.current().ok().and_then(|identity| identity.api_endpoint) {
            Some(api) => api,
            None => {
                warn!("No CF API configured or advertised, using {}", DEFAULT_API);
                DEFAULT_API.to_string()
            }
        }
    }
}

fn read_file(path: &Path) -> Result<FileSettings, ConfigError> {
    let txt = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if txt.trim().is_empty() {
        return Ok(FileSettings::default());
    }
    let file = serde_yaml::from_str(&txt).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Loaded configuration file {}", path.display());
    Ok(file)
}
