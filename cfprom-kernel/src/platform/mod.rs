//! Platform session: login plus the read-only calls the monitor needs
//!
//! `Platform` is the seam between the monitoring loop and the remote API;
//! `cf::CfClient` talks to a real Cloud Controller over HTTP.

pub mod cf;

use crate::error::PlatformError;
use crate::models::{AppSummary, Configuration, InstanceStats, OrgSummary, SpaceSummary};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

pub use cf::CfClient;

/// Authenticated handle bound to one configuration.
/// Dropped, never closed, when replaced.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    api: String,
    token: String,
}

impl Session {
    pub(crate) fn new(api: impl Into<String>, token: impl Into<String>) -> Self {
        let api: String = api.into();
        Self {
            api: api.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn api(&self) -> &str {
        &self.api
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("api", &self.api).finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Platform: Send + Sync {
    async fn authenticate(&self, config: &Configuration) -> Result<Session, PlatformError>;

    /// Apps of one space, in the order the platform lists them
    async fn list_apps(&self, session: &Session, space_id: &str) -> Result<Vec<AppSummary>, PlatformError>;

    async fn get_app(&self, session: &Session, app_id: &str) -> Result<AppSummary, PlatformError>;

    async fn get_space(&self, session: &Session, space_id: &str) -> Result<SpaceSummary, PlatformError>;

    async fn get_org(&self, session: &Session, org_id: &str) -> Result<OrgSummary, PlatformError>;

    /// Usage per instance index; instances that report no usage are left out
    async fn get_stats(
        &self,
        session: &Session,
        app_id: &str,
    ) -> Result<BTreeMap<String, InstanceStats>, PlatformError>;
}
