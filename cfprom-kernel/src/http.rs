/**
 * HTTP surface of the collector
 *
 * ROUTES :
 * - GET  /health     état du collecteur (jamais protégé)
 * - GET  /metrics    exposition Prometheus (texte 0.0.4)
 * - GET  /bootstrap  dernier statut de bootstrap
 * - POST /bootstrap  reconfiguration {"username","password"}
 *
 * SÉCURITÉ :
 * - /metrics et /bootstrap passent par l'Auth Gate quand un secret est configuré
 * - Basic auth (utilisateur fixe + secret) ou paramètre de requête `p`
 * - Comparaison en temps constant, échec -> 401 "access denied"
 */

use crate::bootstrap::BootstrapGateway;
use crate::error::BootstrapError;
use crate::health::{CollectorHealth, HealthTracker};
use crate::models::{BootstrapRequest, BootstrapStatus};
use crate::sink::MetricSink;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use subtle::ConstantTimeEq;
use tracing::{error, warn};

/// Shared secret check in front of the gated routes
#[derive(Clone)]
pub struct AuthGate {
    username: String,
    secret: Option<String>,
}

impl AuthGate {
    /// An absent or empty secret disables the gate
    pub fn new(username: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub fn allows(&self, headers: &HeaderMap, uri: &Uri) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            return true;
        };

        if let Some((user, password)) = basic_credentials(headers) {
            if user == self.username && same(&password, secret) {
                return true;
            }
        }

        query_secret(uri).is_some_and(|p| same(&p, secret))
    }
}

/// First non-empty value of the `p` query parameter; later repeats are ignored
fn query_secret(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "p")
        .map(|(_, value)| value.into_owned())
        .filter(|p| !p.is_empty())
}

fn same(given: &str, expected: &str) -> bool {
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

async fn require_secret(State(gate): State<AuthGate>, req: Request, next: Next) -> Response {
    if gate.allows(req.headers(), req.uri()) {
        return next.run(req).await;
    }
    warn!("Rejected {} {}: missing or wrong secret", req.method(), req.uri().path());
    (StatusCode::UNAUTHORIZED, "access denied").into_response()
}

#[derive(Clone)]
pub struct AppState {
    pub sink: MetricSink,
    pub gateway: BootstrapGateway,
    pub health: HealthTracker,
    pub gate: AuthGate,
}

pub fn build_router(app_state: AppState) -> Router {
    let gate = app_state.gate.clone();
    let gated = Router::new()
        .route("/metrics", get(metrics))
        .route("/bootstrap", get(get_bootstrap).post(post_bootstrap))
        .route_layer(middleware::from_fn_with_state(gate, require_secret));

    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .with_state(app_state)
}

// GET /health
async fn health(State(app): State<AppState>) -> Json<CollectorHealth> {
    Json(app.health.get_health())
}

// GET /metrics
async fn metrics(State(app): State<AppState>) -> Response {
    match app.sink.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// GET /bootstrap
async fn get_bootstrap(State(app): State<AppState>) -> Json<BootstrapStatus> {
    Json(app.gateway.status())
}

// POST /bootstrap
async fn post_bootstrap(State(app): State<AppState>, body: Bytes) -> Response {
    let request: BootstrapRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed bootstrap request: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    match app.gateway.bootstrap(request) {
        Ok(status) => Json(status).into_response(),
        Err(e @ BootstrapError::MissingCredentials) => Json(BootstrapStatus::error(e.to_string())).into_response(),
        Err(e) => {
            error!("Bootstrap failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FixedHostContext, HostContext, HostIdentity};
    use crate::models::{DisplayNames, InstanceStats, MetricSample};
    use crate::monitor::Event;
    use axum::http::HeaderValue;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const SECRET: &str = "s";

    fn identity() -> HostIdentity {
        HostIdentity {
            app_id: "self".into(),
            space_id: "space-1".into(),
            org_id: None,
            api_endpoint: None,
        }
    }

    fn app_state(secret: Option<&str>, host: Arc<dyn HostContext>) -> (AppState, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = AppState {
            sink: MetricSink::new().unwrap(),
            gateway: BootstrapGateway::new("https://api", host, tx),
            health: HealthTracker::new(),
            gate: AuthGate::new("cfprom", secret.map(String::from)),
        };
        (state, rx)
    }

    async fn serve(state: AppState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn basic(user: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(format!("{user}:{password}")));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn test_gate_checks() {
        let gate = AuthGate::new("cfprom", Some(SECRET.into()));
        let bare: Uri = "/metrics".parse().unwrap();

        assert!(!gate.allows(&HeaderMap::new(), &bare));
        assert!(gate.allows(&basic("cfprom", SECRET), &bare));
        assert!(!gate.allows(&basic("cfprom", "wrong"), &bare));
        assert!(!gate.allows(&basic("someone", SECRET), &bare));
        assert!(gate.allows(&HeaderMap::new(), &"/metrics?p=s".parse().unwrap()));
        assert!(!gate.allows(&HeaderMap::new(), &"/metrics?p=".parse().unwrap()));
        assert!(!gate.allows(&HeaderMap::new(), &"/metrics?p=x".parse().unwrap()));
        // a wrong header does not hide a good query parameter
        assert!(gate.allows(&basic("cfprom", "wrong"), &"/metrics?p=s".parse().unwrap()));
    }

    #[test]
    fn test_first_query_secret_wins() {
        let gate = AuthGate::new("cfprom", Some(SECRET.into()));

        assert!(gate.allows(&HeaderMap::new(), &"/metrics?p=s&p=x".parse().unwrap()));
        assert!(!gate.allows(&HeaderMap::new(), &"/metrics?p=x&p=s".parse().unwrap()));
        assert!(!gate.allows(&HeaderMap::new(), &"/metrics?p=&p=s".parse().unwrap()));
        assert!(gate.allows(&HeaderMap::new(), &"/metrics?other=1&p=s".parse().unwrap()));
        assert_eq!(query_secret(&"/bootstrap?p=a%20b".parse().unwrap()).as_deref(), Some("a b"));
    }

    #[test]
    fn test_gate_disabled() {
        for gate in [AuthGate::new("cfprom", None), AuthGate::new("cfprom", Some(String::new()))] {
            assert!(!gate.is_enabled());
            assert!(gate.allows(&HeaderMap::new(), &"/metrics".parse().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_metrics_requires_secret() {
        let (state, _rx) = app_state(Some(SECRET), Arc::new(FixedHostContext::new(identity())));
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let resp = client.get(format!("{base}/metrics")).send().await.unwrap();
        assert_eq!(resp.status(), 401);
        assert_eq!(resp.text().await.unwrap(), "access denied");

        let resp = client.get(format!("{base}/bootstrap")).send().await.unwrap();
        assert_eq!(resp.status(), 401);

        let resp = client
            .get(format!("{base}/metrics"))
            .basic_auth("cfprom", Some(SECRET))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = client.get(format!("{base}/metrics?p={SECRET}")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let (state, _rx) = app_state(None, Arc::new(FixedHostContext::new(identity())));
        let names = DisplayNames { org: "demo-org".into(), space: "dev".into() };
        state
            .sink
            .upsert(&MetricSample::new(&names, "A", "0", &InstanceStats { cpu: 0.125, mem: 256 }));
        let base = serve(state).await;

        let resp = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"));
        let body = resp.text().await.unwrap();
        assert!(body.contains("# TYPE cpu_usage gauge"));
        assert!(body.contains("# TYPE mem_usage gauge"));
        assert!(body.contains("app=\"A\""));
        assert!(body.contains("12.5"));
    }

    #[tokio::test]
    async fn test_bootstrap_flow() {
        let (state, mut rx) = app_state(Some(SECRET), Arc::new(FixedHostContext::new(identity())));
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let status: BootstrapStatus = client
            .get(format!("{base}/bootstrap?p={SECRET}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status, BootstrapStatus::initial());

        let status: BootstrapStatus = client
            .post(format!("{base}/bootstrap?p={SECRET}"))
            .json(&serde_json::json!({ "username": "admin" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(!status.bootstrapped);
        assert_eq!(status.status, "ERROR: missing username an/or password");
        assert!(rx.try_recv().is_err());

        let resp = client
            .post(format!("{base}/bootstrap?p={SECRET}"))
            .json(&serde_json::json!({ "username": "admin", "password": "secret" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.json::<BootstrapStatus>().await.unwrap(), BootstrapStatus::ok());
        assert!(matches!(rx.try_recv().unwrap(), Event::Configure(c) if c.username == "admin"));

        let status: BootstrapStatus = client
            .get(format!("{base}/bootstrap?p={SECRET}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status, BootstrapStatus::ok());
    }

    #[tokio::test]
    async fn test_malformed_bootstrap_body() {
        let (state, mut rx) = app_state(None, Arc::new(FixedHostContext::new(identity())));
        let base = serve(state).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/bootstrap"))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        assert!(!resp.text().await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_outside_platform() {
        let (state, mut rx) = app_state(None, Arc::new(FixedHostContext::absent()));
        let base = serve(state).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/bootstrap"))
            .json(&serde_json::json!({ "username": "admin", "password": "secret" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_health_is_never_gated() {
        let (state, _rx) = app_state(Some(SECRET), Arc::new(FixedHostContext::new(identity())));
        state.health.mark_configured("space-1", 2);
        let base = serve(state).await;

        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let health: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(health["configured"], true);
        assert_eq!(health["apps_tracked"], 2);
    }
}
