/**
 * CLOUD CONTROLLER CLIENT - v2 API over HTTP
 *
 * ROLE :
 * Implements `Platform` against a Cloud Foundry Cloud Controller.
 *
 * OPERATION :
 * - login: GET /v2/info -> token_endpoint, then password grant on /oauth/token
 * - apps by space: GET /v2/apps?q=space_guid:<guid>, following next_url
 * - naming: GET /v2/apps/<guid>, /v2/spaces/<guid>, /v2/organizations/<guid>
 * - usage: GET /v2/apps/<guid>/stats (instances without stats report zero usage)
 *
 * No timeout unless one is configured; a stuck call blocks the caller.
 */

use super::{Platform, Session};
use crate::error::PlatformError;
use crate::models::{AppSummary, Configuration, InstanceStats, OrgSummary, SpaceSummary};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Info {
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OAuthError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next_url: Option<String>,
    resources: Vec<Resource<T>>,
}

#[derive(Debug, Deserialize)]
struct Resource<T> {
    metadata: Metadata,
    entity: T,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct AppEntity {
    name: String,
    #[serde(default)]
    space_guid: String,
}

#[derive(Debug, Deserialize)]
struct SpaceEntity {
    name: String,
    organization_guid: String,
}

#[derive(Debug, Deserialize)]
struct OrgEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct InstanceEntry {
    #[serde(default)]
    state: String,
    #[serde(default)]
    stats: Option<InstanceStatsBlock>,
}

#[derive(Debug, Deserialize)]
struct InstanceStatsBlock {
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    mem: f64,
}

impl From<Resource<AppEntity>> for AppSummary {
    fn from(r: Resource<AppEntity>) -> Self {
        AppSummary {
            guid: r.metadata.guid,
            name: r.entity.name,
            space_guid: r.entity.space_guid,
        }
    }
}

/// HTTP client for the Cloud Controller v2 API
#[derive(Debug, Clone)]
pub struct CfClient {
    http: reqwest::Client,
}

impl CfClient {
    pub fn new(timeout: Option<Duration>) -> Result<Self, PlatformError> {
        let mut builder = reqwest::Client::builder().user_agent(concat!("cfprom/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self { http: builder.build()? })
    }

    fn get(&self, session: &Session, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", session.api(), path))
            .bearer_auth(session.token())
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, PlatformError> {
        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify(e, operation))?;

        let status = response.status();
        let url = response.url().to_string();
        if status == StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(url));
        }
        if !status.is_success() {
            return Err(PlatformError::Status { status: status.as_u16(), url });
        }

        let body = response.bytes().await.map_err(|e| classify(e, operation))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn classify(err: reqwest::Error, operation: &'static str) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Timeout { operation }
    } else {
        PlatformError::Http(err)
    }
}

fn describe_oauth_error(body: &str, status: StatusCode) -> String {
    match serde_json::from_str::<OAuthError>(body) {
        Ok(e) if !e.error_description.is_empty() => e.error_description,
        Ok(e) if !e.error.is_empty() => e.error,
        _ => status.to_string(),
    }
}

#[async_trait]
impl Platform for CfClient {
    async fn authenticate(&self, config: &Configuration) -> Result<Session, PlatformError> {
        let api = config.api_endpoint.trim_end_matches('/');
        let info: Info = self.fetch(self.http.get(format!("{api}/v2/info")), "info").await?;

        let token_url = format!("{}/oauth/token", info.token_endpoint.trim_end_matches('/'));
        debug!(%token_url, user = %config.username, "requesting token");

        let response = self
            .http
            .post(&token_url)
            .basic_auth("cf", Some(""))
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "password"),
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify(e, "login"))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN
        ) {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Auth(describe_oauth_error(&body, status)));
        }
        if !status.is_success() {
            return Err(PlatformError::Status { status: status.as_u16(), url: token_url });
        }

        let body = response.bytes().await.map_err(|e| classify(e, "login"))?;
        let token: TokenResponse = serde_json::from_slice(&body)?;
        Ok(Session::new(api, token.access_token))
    }

    async fn list_apps(&self, session: &Session, space_id: &str) -> Result<Vec<AppSummary>, PlatformError> {
        let first = Url::parse_with_params(
            &format!("{}/v2/apps", session.api()),
            &[("q", format!("space_guid:{space_id}"))],
        )
        .map_err(|e| PlatformError::InvalidUrl(e.to_string()))?;

        let mut apps = Vec::new();
        let mut next = Some(first.to_string());
        while let Some(url) = next.take() {
            let page: Page<AppEntity> = self
                .fetch(self.http.get(&url).bearer_auth(session.token()), "list apps")
                .await?;
            apps.extend(page.resources.into_iter().map(AppSummary::from));
            next = page
                .next_url
                .filter(|n| !n.is_empty())
                .map(|n| format!("{}{}", session.api(), n));
        }
        Ok(apps)
    }

    async fn get_app(&self, session: &Session, app_id: &str) -> Result<AppSummary, PlatformError> {
        let resource: Resource<AppEntity> = self
            .fetch(self.get(session, &format!("/v2/apps/{app_id}")), "get app")
            .await?;
        Ok(resource.into())
    }

    async fn get_space(&self, session: &Session, space_id: &str) -> Result<SpaceSummary, PlatformError> {
        let resource: Resource<SpaceEntity> = self
            .fetch(self.get(session, &format!("/v2/spaces/{space_id}")), "get space")
            .await?;
        Ok(SpaceSummary {
            name: resource.entity.name,
            org_guid: resource.entity.organization_guid,
        })
    }

    async fn get_org(&self, session: &Session, org_id: &str) -> Result<OrgSummary, PlatformError> {
        let resource: Resource<OrgEntity> = self
            .fetch(self.get(session, &format!("/v2/organizations/{org_id}")), "get org")
            .await?;
        Ok(OrgSummary { name: resource.entity.name })
    }

    async fn get_stats(
        &self,
        session: &Session,
        app_id: &str,
    ) -> Result<BTreeMap<String, InstanceStats>, PlatformError> {
        let entries: BTreeMap<String, InstanceEntry> = self
            .fetch(self.get(session, &format!("/v2/apps/{app_id}/stats")), "get stats")
            .await?;

        Ok(entries
            .into_iter()
            .map(|(index, entry)| {
                let usage = match entry.stats {
                    Some(block) => InstanceStats {
                        cpu: block.usage.cpu,
                        mem: block.usage.mem.max(0.0) as u64,
                    },
                    None => {
                        debug!(app = %app_id, %index, state = %entry.state, "instance has no stats, reporting zero usage");
                        InstanceStats { cpu: 0.0, mem: 0 }
                    }
                };
                (index, usage)
            })
            .collect())
    }
}
