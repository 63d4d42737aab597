/*!
Builders de payloads Cloud Controller v2

Produit les documents JSON tels que renvoyés par l'API v2:
- ressources `{metadata, entity}` pour apps, spaces et organizations
- pages paginées (`next_url`, `resources`)
- réponses `/v2/apps/:guid/stats` indexées par numéro d'instance
*/

use serde_json::{json, Value};

/// Usage d'une instance tel que publié par `/stats`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceUsage {
    pub cpu: f64,
    pub mem: u64,
}

impl InstanceUsage {
    pub fn new(cpu: f64, mem: u64) -> Self {
        Self { cpu, mem }
    }
}

/// Helper pour créer des documents conformes à l'API v2
pub struct CfPayloadBuilder;

impl CfPayloadBuilder {
    /// Document `/v2/info`; le token endpoint pointe vers le même serveur
    pub fn info(base_url: &str) -> Value {
        json!({
            "name": "cfprom-devkit",
            "api_version": "2.164.0",
            "authorization_endpoint": base_url,
            "token_endpoint": base_url,
        })
    }

    /// Réponse OAuth du grant `password`
    pub fn token(access_token: &str) -> Value {
        json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 599,
            "scope": "cloud_controller.read",
        })
    }

    pub fn app_resource(guid: &str, name: &str, space_guid: &str) -> Value {
        json!({
            "metadata": {
                "guid": guid,
                "url": format!("/v2/apps/{guid}"),
            },
            "entity": {
                "name": name,
                "space_guid": space_guid,
                "space_url": format!("/v2/spaces/{space_guid}"),
                "state": "STARTED",
            }
        })
    }

    pub fn space_resource(guid: &str, name: &str, org_guid: &str) -> Value {
        json!({
            "metadata": {
                "guid": guid,
                "url": format!("/v2/spaces/{guid}"),
            },
            "entity": {
                "name": name,
                "organization_guid": org_guid,
                "organization_url": format!("/v2/organizations/{org_guid}"),
            }
        })
    }

    pub fn org_resource(guid: &str, name: &str) -> Value {
        json!({
            "metadata": {
                "guid": guid,
                "url": format!("/v2/organizations/{guid}"),
            },
            "entity": {
                "name": name,
                "status": "active",
            }
        })
    }

    /// Page de résultats; `next_url` est relatif comme sur un vrai Cloud Controller
    pub fn page(resources: Vec<Value>, total_results: usize, total_pages: usize, next_url: Option<String>) -> Value {
        json!({
            "total_results": total_results,
            "total_pages": total_pages,
            "prev_url": Value::Null,
            "next_url": next_url,
            "resources": resources,
        })
    }

    /// Réponse `/stats`; une instance `None` est rapportée DOWN sans bloc `stats`
    pub fn app_stats<'a, I>(instances: I) -> Value
    where
        I: IntoIterator<Item = (&'a String, &'a Option<InstanceUsage>)>,
    {
        let mut out = serde_json::Map::new();
        for (index, usage) in instances {
            let entry = match usage {
                Some(u) => json!({
                    "state": "RUNNING",
                    "stats": {
                        "name": "app",
                        "mem_quota": 1_073_741_824u64,
                        "usage": {
                            "cpu": u.cpu,
                            "mem": u.mem,
                            "disk": 0,
                            "time": "2018-01-01T00:00:00Z",
                        }
                    }
                }),
                None => json!({
                    "state": "DOWN",
                    "since": 1_514_764_800,
                }),
            };
            out.insert(index.clone(), entry);
        }
        Value::Object(out)
    }

    /// Enveloppe d'erreur v2
    pub fn error(code: u32, description: &str, error_code: &str) -> Value {
        json!({
            "code": code,
            "description": description,
            "error_code": error_code,
        })
    }
}
