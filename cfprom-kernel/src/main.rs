/**
 * CFPROM KERNEL - Point d'entrée du collecteur Cloud Foundry -> Prometheus
 *
 * RÔLE : Câblage des modules : config, host context, client CF, boucle de monitoring,
 * timers, gateway de bootstrap et serveur HTTP.
 *
 * ARCHITECTURE : une tâche possède la session et l'inventaire, alimentée par une file
 * d'événements (bootstrap + timers). Les gauges sont lues par /metrics.
 */

mod bootstrap;
mod config;
mod error;
mod health;
mod host;
mod http;
mod models;
mod monitor;
mod platform;
mod sink;
mod state;
#[cfg(test)]
mod testkit;

use crate::bootstrap::BootstrapGateway;
use crate::config::{Cli, Settings};
use crate::health::HealthTracker;
use crate::host::{HostContext, VcapHostContext};
use crate::http::{AppState, AuthGate};
use crate::models::Configuration;
use crate::monitor::{spawn_timers, Event, Monitor};
use crate::platform::CfClient;
use crate::sink::MetricSink;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cfprom_kernel=info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli).context("loading configuration")?;
    let addr = settings.socket_addr()?;
    info!(?settings, "Starting cfprom");

    let host: Arc<dyn HostContext> = Arc::new(VcapHostContext::new());
    let api_endpoint = settings.resolve_api_endpoint(host.as_ref());

    let sink = MetricSink::new().context("registering gauges")?;
    let health = HealthTracker::new();
    let client = CfClient::new(settings.request_timeout()).context("building CF client")?;

    // boucle de monitoring + timers
    let (intake, events) = mpsc::unbounded_channel();
    tokio::spawn(Monitor::new(client, sink.clone(), health.clone()).run(events));
    spawn_timers(intake.clone(), settings.collect_interval(), settings.refresh_interval());

    // configuration initiale depuis l'environnement
    match host.current() {
        Ok(identity) if settings.has_credentials() => {
            let config = Configuration {
                api_endpoint: api_endpoint.clone(),
                username: settings.username.clone(),
                password: settings.password.clone(),
                space_id: identity.space_id,
                self_app_id: identity.app_id,
            };
            intake
                .send(Event::Configure(config))
                .context("monitoring loop stopped before start")?;
        }
        Ok(_) => info!("No CF credentials in the environment, waiting for POST /bootstrap"),
        Err(e) => warn!("{}; waiting for POST /bootstrap", e),
    }

    let gateway = BootstrapGateway::new(api_endpoint, host, intake);
    let gate = AuthGate::new(settings.gate_username.clone(), settings.gate_password.clone());
    if !gate.is_enabled() {
        warn!("PASSWORD not set, /metrics and /bootstrap are not protected");
    }

    let app = http::build_router(AppState { sink, gateway, health, gate });

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
