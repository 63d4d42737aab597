//! Bootstrap gateway: runtime (re)configuration of the monitored account
//!
//! Validates credentials, resolves the hosting context, hands a new
//! `Configuration` to the monitoring loop and remembers that it did.

use crate::error::BootstrapError;
use crate::host::HostContext;
use crate::models::{BootstrapRequest, BootstrapStatus, Configuration};
use crate::monitor::Event;
use crate::state::{new_state, snapshot, Shared};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct BootstrapGateway {
    api_endpoint: String,
    host: Arc<dyn HostContext>,
    intake: mpsc::UnboundedSender<Event>,
    status: Shared<BootstrapStatus>,
}

impl BootstrapGateway {
    pub fn new(api_endpoint: impl Into<String>, host: Arc<dyn HostContext>, intake: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            host,
            intake,
            status: new_state(BootstrapStatus::initial()),
        }
    }

    pub fn status(&self) -> BootstrapStatus {
        snapshot(&self.status)
    }

    /// Missing credentials are rejected before anything else happens;
    /// the stored status only changes once the loop has the configuration.
    pub fn bootstrap(&self, request: BootstrapRequest) -> Result<BootstrapStatus, BootstrapError> {
        if !request.is_valid() {
            warn!("Bootstrap rejected: missing username and/or password");
            return Err(BootstrapError::MissingCredentials);
        }

        let identity = self.host.current()?;
        let config = Configuration {
            api_endpoint: self.api_endpoint.clone(),
            username: request.username,
            password: request.password,
            space_id: identity.space_id,
            self_app_id: identity.app_id,
        };

        info!(
            user = %config.username,
            space = %config.space_id,
            org = identity.org_id.as_deref().unwrap_or("-"),
            "Bootstrap accepted, reconfiguring"
        );
        self.intake
            .send(Event::Configure(config))
            .map_err(|_| BootstrapError::LoopUnavailable)?;

        let mut status = self.status.lock();
        *status = BootstrapStatus::ok();
        Ok(status.clone())
    }
}
