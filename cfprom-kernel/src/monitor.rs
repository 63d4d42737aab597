/*!
Monitoring loop: one task owns the platform session and the inventory.

Three event sources feed a single intake: reconfiguration (bootstrap or
startup), the refresh timer (re-login + reload inventory) and the collect
timer (fetch stats, write gauges). Events are handled one at a time, so a
slow remote call delays the events queued behind it.

`plan` decides what an event means for the current state without touching
the network; `Monitor::handle` runs the remote calls and applies the outcome.
*/

use crate::error::MonitorError;
use crate::health::HealthTracker;
use crate::models::{AppSummary, Configuration, DisplayNames, MetricSample};
use crate::platform::{Platform, Session};
use crate::sink::MetricSink;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub enum Event {
    Configure(Configuration),
    Refresh,
    Collect,
}

/// Session, inventory and names obtained with one configuration
#[derive(Debug, Clone)]
pub struct Active {
    pub config: Configuration,
    pub session: Session,
    pub apps: Vec<AppSummary>,
    pub names: DisplayNames,
}

#[derive(Debug, Default)]
pub enum MonitorState {
    #[default]
    Unconfigured,
    Configured(Active),
}

impl MonitorState {
    #[cfg(test)]
    pub fn active(&self) -> Option<&Active> {
        match self {
            MonitorState::Configured(active) => Some(active),
            MonitorState::Unconfigured => None,
        }
    }

    /// A rejected attempt never replaces working state
    pub fn apply(&mut self, outcome: Result<Active, MonitorError>) {
        if let Ok(active) = outcome {
            *self = MonitorState::Configured(active);
        }
    }
}

/// Everything a collect pass needs, detached from the state
#[derive(Debug, Clone)]
pub struct CollectPlan {
    pub session: Session,
    pub names: DisplayNames,
    pub apps: Vec<AppSummary>,
}

#[derive(Debug)]
pub enum Action {
    /// Establish a session with a newly received configuration
    Login(Configuration),
    /// Re-establish the session with the active configuration
    Relogin(Configuration),
    Collect(CollectPlan),
    Skip(&'static str),
}

pub fn plan(state: &MonitorState, event: Event) -> Action {
    match (state, event) {
        (_, Event::Configure(config)) => Action::Login(config),
        (MonitorState::Unconfigured, Event::Refresh) => Action::Skip("No configuration available during refresh"),
        (MonitorState::Configured(active), Event::Refresh) => Action::Relogin(active.config.clone()),
        (MonitorState::Unconfigured, Event::Collect) => Action::Skip("Not logged in, skipping collection"),
        (MonitorState::Configured(active), Event::Collect) => Action::Collect(CollectPlan {
            session: active.session.clone(),
            names: active.names.clone(),
            apps: active
                .apps
                .iter()
                .filter(|app| app.guid != active.config.self_app_id)
                .cloned()
                .collect(),
        }),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectReport {
    pub apps: usize,
    pub samples: usize,
    pub failures: usize,
}

pub struct Monitor<P: Platform> {
    platform: P,
    sink: MetricSink,
    health: HealthTracker,
    state: MonitorState,
}

impl<P: Platform> Monitor<P> {
    pub fn new(platform: P, sink: MetricSink, health: HealthTracker) -> Self {
        Self {
            platform,
            sink,
            health,
            state: MonitorState::Unconfigured,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Process events until every sender is gone
    pub async fn run(mut self, mut intake: mpsc::UnboundedReceiver<Event>) {
        info!("Monitoring loop started");
        while let Some(event) = intake.recv().await {
            self.handle(event).await;
        }
        info!("Event intake closed, monitoring loop stopped");
    }

    pub async fn handle(&mut self, event: Event) {
        match plan(&self.state, event) {
            Action::Login(config) => {
                info!("Logging in after receiving configuration");
                let outcome = self.establish(config).await;
                self.settle(outcome);
            }
            Action::Relogin(config) => {
                info!("Refreshing login");
                let outcome = self.establish(config).await;
                self.settle(outcome);
            }
            Action::Collect(plan) => {
                let started = Instant::now();
                let report = self.collect(&plan).await;
                let elapsed = started.elapsed();
                info!("Fetching stats of {} apps took {:?}", report.apps, elapsed);
                self.health.record_collection(elapsed, report.samples, report.failures);
            }
            Action::Skip(reason) => debug!("{}", reason),
        }
    }

    fn settle(&mut self, outcome: Result<Active, MonitorError>) {
        match &outcome {
            Ok(active) => {
                info!(
                    space = %active.config.space_id,
                    org = %active.names.org,
                    space_name = %active.names.space,
                    apps = active.apps.len(),
                    "Inventory loaded"
                );
                self.health.mark_configured(&active.config.space_id, active.apps.len());
            }
            Err(e) => {
                error!("{}; keeping previous state", e);
                if matches!(e, MonitorError::Authentication(_)) {
                    self.health.record_auth_failure();
                }
            }
        }
        self.state.apply(outcome);
    }

    async fn establish(&self, config: Configuration) -> Result<Active, MonitorError> {
        let session = self
            .platform
            .authenticate(&config)
            .await
            .map_err(MonitorError::Authentication)?;

        info!("Fetching apps in space: {}", config.space_id);
        let apps = self
            .platform
            .list_apps(&session, &config.space_id)
            .await
            .map_err(MonitorError::Inventory)?;

        // All apps of a space share org/space: names come from the first one.
        let names = match apps.first() {
            Some(first) => self.resolve_names(&session, first).await?,
            None => {
                warn!("No apps in space {}, org/space names left empty", config.space_id);
                DisplayNames::default()
            }
        };

        Ok(Active { config, session, apps, names })
    }

    async fn resolve_names(&self, session: &Session, first: &AppSummary) -> Result<DisplayNames, MonitorError> {
        let app = self
            .platform
            .get_app(session, &first.guid)
            .await
            .map_err(MonitorError::Inventory)?;
        let space = self
            .platform
            .get_space(session, &app.space_guid)
            .await
            .map_err(MonitorError::Inventory)?;
        let org = self
            .platform
            .get_org(session, &space.org_guid)
            .await
            .map_err(MonitorError::Inventory)?;

        Ok(DisplayNames { org: org.name, space: space.name })
    }

    async fn collect(&self, plan: &CollectPlan) -> CollectReport {
        let mut report = CollectReport { apps: plan.apps.len(), ..Default::default() };

        for app in &plan.apps {
            match self.platform.get_stats(&plan.session, &app.guid).await {
                Ok(stats) => {
                    for (index, usage) in &stats {
                        self.sink.upsert(&MetricSample::new(&plan.names, &app.name, index, usage));
                        report.samples += 1;
                    }
                }
                Err(source) => {
                    let err = MonitorError::Stats { app: app.name.clone(), source };
                    warn!(guid = %app.guid, "{}", err);
                    report.failures += 1;
                }
            }
        }

        report
    }
}

/// Periodic sources of `Refresh` and `Collect`. Each fires one period
/// after start and then every period, until the intake is closed.
pub fn spawn_timers(
    intake: mpsc::UnboundedSender<Event>,
    collect_every: Duration,
    refresh_every: Duration,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let collect = spawn_ticker(intake.clone(), collect_every, || Event::Collect);
    let refresh = spawn_ticker(intake, refresh_every, || Event::Refresh);
    (collect, refresh)
}

fn spawn_ticker(
    intake: mpsc::UnboundedSender<Event>,
    period: Duration,
    make: fn() -> Event,
) -> JoinHandle<()> {
    task::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            if intake.send(make()).is_err() {
                debug!("Intake closed, stopping timer");
                break;
            }
        }
    })
}
