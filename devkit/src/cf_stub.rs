/*!
Stub Cloud Controller pour développement sans plateforme

Permet de développer et tester le collecteur sans Cloud Foundry réel.
Sert en HTTP (axum, port éphémère) le sous-ensemble de l'API v2 utilisé:
- `/v2/info` + `/oauth/token` (grant password)
- `/v2/apps?q=space_guid:...` paginé, `/v2/apps/:guid`, `/v2/apps/:guid/stats`
- `/v2/spaces/:guid`, `/v2/organizations/:guid`

Toutes les requêtes reçues sont enregistrées pour les assertions de tests.
*/

use crate::payloads::{CfPayloadBuilder, InstanceUsage};
use anyhow::Result;
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Application hébergée par le stub
#[derive(Debug, Clone)]
pub struct StubApp {
    pub guid: String,
    pub name: String,
    pub space_guid: String,
    pub instances: BTreeMap<String, Option<InstanceUsage>>,
}

impl StubApp {
    pub fn new(guid: impl Into<String>, name: impl Into<String>, space_guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            space_guid: space_guid.into(),
            instances: BTreeMap::new(),
        }
    }

    pub fn with_instance(mut self, index: u32, cpu: f64, mem: u64) -> Self {
        self.instances.insert(index.to_string(), Some(InstanceUsage::new(cpu, mem)));
        self
    }

    /// Instance arrêtée: présente dans `/stats` mais sans usage
    pub fn with_down_instance(mut self, index: u32) -> Self {
        self.instances.insert(index.to_string(), None);
        self
    }
}

#[derive(Default)]
struct StubState {
    base_url: String,
    users: HashMap<String, String>,
    tokens: HashSet<String>,
    orgs: HashMap<String, String>,
    spaces: HashMap<String, (String, String)>,
    apps: Vec<StubApp>,
    failing_stats: HashSet<String>,
    page_size: usize,
    requests: Vec<String>,
    logins: usize,
}

type SharedStub = Arc<Mutex<StubState>>;

/// Cloud Controller en mémoire servi sur 127.0.0.1
#[derive(Clone)]
pub struct StubCloudController {
    state: SharedStub,
    base_url: String,
}

impl StubCloudController {
    /// Démarre le serveur sur un port libre
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let state: SharedStub = Arc::new(Mutex::new(StubState {
            base_url: base_url.clone(),
            page_size: 50,
            ..Default::default()
        }));

        let app = build_router(state.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[stub-cc] server stopped: {}", e);
            }
        });

        log::info!("🧪 [STUB] Cloud Controller listening on {}", base_url);
        Ok(Self { state, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn add_user(&self, username: &str, password: &str) {
        self.state.lock().users.insert(username.to_string(), password.to_string());
    }

    pub fn add_org(&self, guid: &str, name: &str) {
        self.state.lock().orgs.insert(guid.to_string(), name.to_string());
    }

    pub fn add_space(&self, guid: &str, name: &str, org_guid: &str) {
        self.state
            .lock()
            .spaces
            .insert(guid.to_string(), (name.to_string(), org_guid.to_string()));
    }

    /// Ajoute ou remplace une application (même guid)
    pub fn add_app(&self, app: StubApp) {
        let mut st = self.state.lock();
        st.apps.retain(|a| a.guid != app.guid);
        st.apps.push(app);
    }

    pub fn remove_app(&self, guid: &str) {
        self.state.lock().apps.retain(|a| a.guid != guid);
    }

    /// Met à jour l'usage d'une instance (`None` = instance DOWN)
    pub fn set_usage(&self, app_guid: &str, index: u32, usage: Option<InstanceUsage>) {
        let mut st = self.state.lock();
        if let Some(app) = st.apps.iter_mut().find(|a| a.guid == app_guid) {
            app.instances.insert(index.to_string(), usage);
        }
    }

    /// Fait échouer (HTTP 500) les appels `/stats` d'une application
    pub fn fail_stats(&self, app_guid: &str, failing: bool) {
        let mut st = self.state.lock();
        if failing {
            st.failing_stats.insert(app_guid.to_string());
        } else {
            st.failing_stats.remove(app_guid);
        }
    }

    pub fn set_page_size(&self, size: usize) {
        self.state.lock().page_size = size.max(1);
    }

    /// Requêtes reçues, format "METHOD /path"
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    /// Nombre de logins réussis
    pub fn login_count(&self) -> usize {
        self.state.lock().logins
    }
}

fn build_router(state: SharedStub) -> Router {
    Router::new()
        .route("/v2/info", get(info))
        .route("/oauth/token", post(token))
        .route("/v2/apps", get(list_apps))
        .route("/v2/apps/{guid}", get(get_app))
        .route("/v2/apps/{guid}/stats", get(get_stats))
        .route("/v2/spaces/{guid}", get(get_space))
        .route("/v2/organizations/{guid}", get(get_org))
        .with_state(state)
}

fn record(state: &SharedStub, line: String) {
    state.lock().requests.push(line);
}

fn authorized(st: &StubState, headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .map(|(scheme, token)| scheme.eq_ignore_ascii_case("bearer") && st.tokens.contains(token))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(CfPayloadBuilder::error(10002, "Authentication error", "CF-NotAuthenticated")),
    )
        .into_response()
}

fn not_found(kind: &str, guid: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(CfPayloadBuilder::error(
            100004,
            &format!("The {kind} could not be found: {guid}"),
            "CF-NotFound",
        )),
    )
        .into_response()
}

// GET /v2/info
async fn info(State(state): State<SharedStub>) -> Json<serde_json::Value> {
    record(&state, "GET /v2/info".into());
    let base = state.lock().base_url.clone();
    Json(CfPayloadBuilder::info(&base))
}

// POST /oauth/token (grant password)
async fn token(State(state): State<SharedStub>, Form(form): Form<HashMap<String, String>>) -> Response {
    record(&state, "POST /oauth/token".into());
    let mut st = state.lock();

    let grant_ok = form.get("grant_type").map(String::as_str) == Some("password");
    let user = form.get("username").cloned().unwrap_or_default();
    let pass = form.get("password").cloned().unwrap_or_default();
    let creds_ok = st.users.get(&user).map(|p| *p == pass).unwrap_or(false);

    if !grant_ok || !creds_ok {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized", "error_description": "Bad credentials"})),
        )
            .into_response();
    }

    let access_token = uuid::Uuid::new_v4().to_string();
    st.tokens.insert(access_token.clone());
    st.logins += 1;
    Json(CfPayloadBuilder::token(&access_token)).into_response()
}

// GET /v2/apps?q=space_guid:<guid>&page=N
async fn list_apps(
    State(state): State<SharedStub>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    record(&state, "GET /v2/apps".into());
    let st = state.lock();
    if !authorized(&st, &headers) {
        return unauthorized();
    }

    let space_filter = params
        .get("q")
        .and_then(|q| q.strip_prefix("space_guid:"))
        .map(str::to_string);
    let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1).max(1);

    let matching: Vec<&StubApp> = st
        .apps
        .iter()
        .filter(|a| space_filter.as_deref().map(|s| a.space_guid == s).unwrap_or(true))
        .collect();

    let total_results = matching.len();
    let total_pages = total_results.div_ceil(st.page_size).max(1);
    let resources = matching
        .iter()
        .skip((page - 1) * st.page_size)
        .take(st.page_size)
        .map(|a| CfPayloadBuilder::app_resource(&a.guid, &a.name, &a.space_guid))
        .collect();

    let next_url = (page < total_pages).then(|| {
        let q = space_filter.as_deref().map(|s| format!("q=space_guid:{s}&")).unwrap_or_default();
        format!("/v2/apps?{q}page={}&results-per-page={}", page + 1, st.page_size)
    });

    Json(CfPayloadBuilder::page(resources, total_results, total_pages, next_url)).into_response()
}

// GET /v2/apps/{guid}
async fn get_app(State(state): State<SharedStub>, headers: HeaderMap, Path(guid): Path<String>) -> Response {
    record(&state, format!("GET /v2/apps/{guid}"));
    let st = state.lock();
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    match st.apps.iter().find(|a| a.guid == guid) {
        Some(a) => Json(CfPayloadBuilder::app_resource(&a.guid, &a.name, &a.space_guid)).into_response(),
        None => not_found("app", &guid),
    }
}

// GET /v2/apps/{guid}/stats
async fn get_stats(State(state): State<SharedStub>, headers: HeaderMap, Path(guid): Path<String>) -> Response {
    record(&state, format!("GET /v2/apps/{guid}/stats"));
    let st = state.lock();
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    if st.failing_stats.contains(&guid) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(CfPayloadBuilder::error(10001, "An unknown error occurred.", "UnknownError")),
        )
            .into_response();
    }
    match st.apps.iter().find(|a| a.guid == guid) {
        Some(a) => Json(CfPayloadBuilder::app_stats(&a.instances)).into_response(),
        None => not_found("app", &guid),
    }
}

// GET /v2/spaces/{guid}
async fn get_space(State(state): State<SharedStub>, headers: HeaderMap, Path(guid): Path<String>) -> Response {
    record(&state, format!("GET /v2/spaces/{guid}"));
    let st = state.lock();
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    match st.spaces.get(&guid) {
        Some((name, org)) => Json(CfPayloadBuilder::space_resource(&guid, name, org)).into_response(),
        None => not_found("space", &guid),
    }
}

// GET /v2/organizations/{guid}
async fn get_org(State(state): State<SharedStub>, headers: HeaderMap, Path(guid): Path<String>) -> Response {
    record(&state, format!("GET /v2/organizations/{guid}"));
    let st = state.lock();
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    match st.orgs.get(&guid) {
        Some(name) => Json(CfPayloadBuilder::org_resource(&guid, name)).into_response(),
        None => not_found("organization", &guid),
    }
}
