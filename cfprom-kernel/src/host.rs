//! Hosting context: who are we and which space do we run in
//!
//! Under Cloud Foundry the identity comes from `VCAP_APPLICATION`.
//! `FixedHostContext` stands in for it in tests and local runs.

use crate::error::HostContextError;
use serde::Deserialize;

/// Identity of the collector's own app as seen by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub app_id: String,
    pub space_id: String,
    pub org_id: Option<String>,
    /// API endpoint advertised by the platform, if any
    pub api_endpoint: Option<String>,
}

pub trait HostContext: Send + Sync {
    fn current(&self) -> Result<HostIdentity, HostContextError>;
}

#[derive(Debug, Deserialize)]
struct VcapApplication {
    application_id: String,
    space_id: String,
    #[serde(default)]
    organization_id: Option<String>,
    #[serde(default)]
    cf_api: Option<String>,
}

/// Reads the identity from the `VCAP_APPLICATION` environment variable
#[derive(Debug, Clone)]
pub struct VcapHostContext {
    var: String,
}

impl VcapHostContext {
    pub fn new() -> Self {
        Self { var: "VCAP_APPLICATION".into() }
    }
}

#[cfg(test)]
impl VcapHostContext {
    /// Read from another variable
    pub fn from_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for VcapHostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl HostContext for VcapHostContext {
    fn current(&self) -> Result<HostIdentity, HostContextError> {
        let raw = std::env::var(&self.var).map_err(|_| HostContextError::Missing)?;
        parse_vcap_application(&raw)
    }
}

pub fn parse_vcap_application(raw: &str) -> Result<HostIdentity, HostContextError> {
    let vcap: VcapApplication = serde_json::from_str(raw)?;
    Ok(HostIdentity {
        app_id: vcap.application_id,
        space_id: vcap.space_id,
        org_id: vcap.organization_id,
        api_endpoint: vcap.cf_api.filter(|api| !api.is_empty()),
    })
}

/// Always answers with the same identity, or always fails
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct FixedHostContext {
    identity: Option<HostIdentity>,
}

#[cfg(test)]
impl FixedHostContext {
    pub fn new(identity: HostIdentity) -> Self {
        Self { identity: Some(identity) }
    }

    /// A context that behaves like running outside the platform
    pub fn absent() -> Self {
        Self { identity: None }
    }
}

#[cfg(test)]
impl HostContext for FixedHostContext {
    fn current(&self) -> Result<HostIdentity, HostContextError> {
        self.identity.clone().ok_or(HostContextError::Missing)
    }
}
