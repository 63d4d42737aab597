//! In-process fake platform for tests
//!
//! Answers every `Platform` call from memory and records it, so the
//! monitoring loop can be driven without HTTP.

use crate::error::PlatformError;
use crate::models::{AppSummary, Configuration, InstanceStats, OrgSummary, SpaceSummary};
use crate::platform::{Platform, Session};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub const FAKE_API: &str = "https://api.fake.test";
pub const FAKE_USER: &str = "admin";
pub const FAKE_PASSWORD: &str = "secret";
pub const FAKE_SPACE: &str = "space-1";
pub const FAKE_SELF: &str = "self";

#[derive(Default)]
struct FakeState {
    accounts: HashMap<String, String>,
    orgs: HashMap<String, String>,
    spaces: HashMap<String, (String, String)>,
    apps: Vec<AppSummary>,
    stats: HashMap<String, BTreeMap<String, InstanceStats>>,
    failing_stats: HashSet<String>,
    failing_listing: bool,
    calls: Vec<String>,
    logins: usize,
}

/// Fake platform, cloneable handle over shared state
#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<FakeState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// `demo-org/dev` with `self` (1 instance) listed first, then `A` (2 instances)
    pub fn standard() -> Self {
        let fake = Self::new();
        fake.add_account(FAKE_USER, FAKE_PASSWORD);
        fake.add_org("org-1", "demo-org");
        fake.add_space(FAKE_SPACE, "dev", "org-1");
        fake.add_app(FAKE_SELF, "cfprom", FAKE_SPACE, &[(0.01, 1_000)]);
        fake.add_app("A", "A", FAKE_SPACE, &[(0.125, 2_000), (0.5, 3_000)]);
        fake
    }

    pub fn add_account(&self, username: &str, password: &str) {
        self.state.lock().accounts.insert(username.into(), password.into());
    }

    pub fn add_org(&self, guid: &str, name: &str) {
        self.state.lock().orgs.insert(guid.into(), name.into());
    }

    pub fn add_space(&self, guid: &str, name: &str, org_guid: &str) {
        self.state.lock().spaces.insert(guid.into(), (name.into(), org_guid.into()));
    }

    /// Adds an app whose instances report `(cpu fraction, mem bytes)`
    pub fn add_app(&self, guid: &str, name: &str, space_guid: &str, instances: &[(f64, u64)]) {
        let mut st = self.state.lock();
        st.apps.retain(|a| a.guid != guid);
        st.apps.push(AppSummary {
            guid: guid.into(),
            name: name.into(),
            space_guid: space_guid.into(),
        });
        let stats = instances
            .iter()
            .enumerate()
            .map(|(i, (cpu, mem))| (i.to_string(), InstanceStats { cpu: *cpu, mem: *mem }))
            .collect();
        st.stats.insert(guid.into(), stats);
    }

    pub fn remove_app(&self, guid: &str) {
        self.state.lock().apps.retain(|a| a.guid != guid);
    }

    pub fn set_cpu(&self, guid: &str, index: &str, cpu: f64) {
        if let Some(instance) = self.state.lock().stats.get_mut(guid).and_then(|s| s.get_mut(index)) {
            instance.cpu = cpu;
        }
    }

    pub fn fail_stats(&self, guid: &str) {
        self.state.lock().failing_stats.insert(guid.into());
    }

    pub fn fail_listing(&self, failing: bool) {
        self.state.lock().failing_listing = failing;
    }

    /// Calls received, e.g. "stats A"
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn logins(&self) -> usize {
        self.state.lock().logins
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

/// A configuration for the standard fixture
pub fn fake_config(password: &str) -> Configuration {
    Configuration {
        api_endpoint: FAKE_API.into(),
        username: FAKE_USER.into(),
        password: password.into(),
        space_id: FAKE_SPACE.into(),
        self_app_id: FAKE_SELF.into(),
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn authenticate(&self, config: &Configuration) -> Result<Session, PlatformError> {
        self.record(format!("login {}", config.username));
        let mut st = self.state.lock();
        match st.accounts.get(&config.username) {
            Some(p) if *p == config.password => {
                st.logins += 1;
                Ok(Session::new(&config.api_endpoint, format!("token-{}", st.logins)))
            }
            _ => Err(PlatformError::Auth("Bad credentials".into())),
        }
    }

    async fn list_apps(&self, _session: &Session, space_id: &str) -> Result<Vec<AppSummary>, PlatformError> {
        self.record(format!("list {space_id}"));
        let st = self.state.lock();
        if st.failing_listing {
            return Err(PlatformError::Status { status: 503, url: "/v2/apps".into() });
        }
        Ok(st.apps.iter().filter(|a| a.space_guid == space_id).cloned().collect())
    }

    async fn get_app(&self, _session: &Session, app_id: &str) -> Result<AppSummary, PlatformError> {
        self.record(format!("app {app_id}"));
        self.state
            .lock()
            .apps
            .iter()
            .find(|a| a.guid == app_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(app_id.into()))
    }

    async fn get_space(&self, _session: &Session, space_id: &str) -> Result<SpaceSummary, PlatformError> {
        self.record(format!("space {space_id}"));
        self.state
            .lock()
            .spaces
            .get(space_id)
            .map(|(name, org)| SpaceSummary { name: name.clone(), org_guid: org.clone() })
            .ok_or_else(|| PlatformError::NotFound(space_id.into()))
    }

    async fn get_org(&self, _session: &Session, org_id: &str) -> Result<OrgSummary, PlatformError> {
        self.record(format!("org {org_id}"));
        self.state
            .lock()
            .orgs
            .get(org_id)
            .map(|name| OrgSummary { name: name.clone() })
            .ok_or_else(|| PlatformError::NotFound(org_id.into()))
    }

    async fn get_stats(
        &self,
        _session: &Session,
        app_id: &str,
    ) -> Result<BTreeMap<String, InstanceStats>, PlatformError> {
        self.record(format!("stats {app_id}"));
        let st = self.state.lock();
        if st.failing_stats.contains(app_id) {
            return Err(PlatformError::Status { status: 500, url: format!("/v2/apps/{app_id}/stats") });
        }
        Ok(st.stats.get(app_id).cloned().unwrap_or_default())
    }
}
