use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything needed to monitor one space. Replaced as a whole on reconfiguration.
#[derive(Clone, PartialEq, Eq)]
pub struct Configuration {
    pub api_endpoint: String,
    pub username: String,
    pub password: String,
    pub space_id: String,
    /// Guid of the app running this collector, never collected
    pub self_app_id: String,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("api_endpoint", &self.api_endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("space_id", &self.space_id)
            .field("self_app_id", &self.self_app_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSummary {
    pub guid: String,
    pub name: String,
    pub space_guid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceSummary {
    pub name: String,
    pub org_guid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgSummary {
    pub name: String,
}

/// Usage of one running instance; cpu is a fraction of one core
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceStats {
    pub cpu: f64,
    pub mem: u64,
}

/// Org/space names shared by every app of the monitored space
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayNames {
    pub org: String,
    pub space: String,
}

/// One gauge sample per instance, last write wins
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub org: String,
    pub space: String,
    pub app: String,
    pub instance_index: String,
    pub cpu_percent: f64,
    pub mem_bytes: f64,
}

impl MetricSample {
    pub fn new(names: &DisplayNames, app: &str, instance_index: &str, stats: &InstanceStats) -> Self {
        Self {
            org: names.org.clone(),
            space: names.space.clone(),
            app: app.to_string(),
            instance_index: instance_index.to_string(),
            cpu_percent: stats.cpu * 100.0,
            mem_bytes: stats.mem as f64,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl BootstrapRequest {
    pub fn is_valid(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapStatus {
    pub bootstrapped: bool,
    pub status: String,
}

impl BootstrapStatus {
    pub fn initial() -> Self {
        Self { bootstrapped: false, status: "OK".into() }
    }

    pub fn ok() -> Self {
        Self { bootstrapped: true, status: "OK".into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { bootstrapped: false, status: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_scales_cpu_to_percent() {
        let names = DisplayNames { org: "o".into(), space: "s".into() };
        let sample = MetricSample::new(&names, "A", "1", &InstanceStats { cpu: 0.25, mem: 2048 });
        assert_eq!(sample.cpu_percent, 25.0);
        assert_eq!(sample.mem_bytes, 2048.0);
        assert_eq!(sample.instance_index, "1");
    }

    #[test]
    fn test_configuration_debug_hides_password() {
        let cfg = Configuration {
            api_endpoint: "https://api.example".into(),
            username: "admin".into(),
            password: "hunter2".into(),
            space_id: "s".into(),
            self_app_id: "me".into(),
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("admin"));
    }

    #[test]
    fn test_bootstrap_request_validation() {
        let req: BootstrapRequest = serde_json::from_str(r#"{"username":"","password":"x"}"#).unwrap();
        assert!(!req.is_valid());
        let req: BootstrapRequest = serde_json::from_str(r#"{"password":"x"}"#).unwrap();
        assert!(!req.is_valid());
        let req: BootstrapRequest = serde_json::from_str(r#"{"username":"u","password":"x"}"#).unwrap();
        assert!(req.is_valid());
    }
}
