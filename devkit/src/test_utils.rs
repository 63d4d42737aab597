/*!
Test Harness pour le collecteur cfprom

Facilite l'écriture de tests avec:
- Un Cloud Controller stub pré-peuplé (org, space, app "self" + app cible)
- Des attentes bornées dans le temps sur les requêtes reçues
- Des statistiques sur le trafic observé
*/

use crate::cf_stub::{StubApp, StubCloudController};
use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;

pub const HARNESS_USER: &str = "admin";
pub const HARNESS_PASSWORD: &str = "admin-secret";
pub const HARNESS_ORG_GUID: &str = "org-guid";
pub const HARNESS_ORG_NAME: &str = "demo-org";
pub const HARNESS_SPACE_GUID: &str = "space-guid";
pub const HARNESS_SPACE_NAME: &str = "dev";
/// Guid de l'application qui héberge le collecteur lui-même
pub const HARNESS_SELF_GUID: &str = "self";
pub const HARNESS_APP_GUID: &str = "app-a";
pub const HARNESS_APP_NAME: &str = "A";

/// Harness de test complet autour du stub
pub struct TestHarness {
    pub cloud: StubCloudController,
}

impl TestHarness {
    /// Démarre un stub vide (aucun utilisateur, aucune app)
    pub async fn empty() -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests
        Ok(Self {
            cloud: StubCloudController::start().await?,
        })
    }

    /// Démarre un stub avec le jeu de données standard:
    /// `self` (1 instance) puis `A` (2 instances) dans `demo-org/dev`
    pub async fn start() -> Result<Self> {
        let harness = Self::empty().await?;
        let cloud = &harness.cloud;

        cloud.add_user(HARNESS_USER, HARNESS_PASSWORD);
        cloud.add_org(HARNESS_ORG_GUID, HARNESS_ORG_NAME);
        cloud.add_space(HARNESS_SPACE_GUID, HARNESS_SPACE_NAME, HARNESS_ORG_GUID);
        cloud.add_app(
            StubApp::new(HARNESS_SELF_GUID, "cfprom", HARNESS_SPACE_GUID).with_instance(0, 0.01, 64 * 1024 * 1024),
        );
        cloud.add_app(
            StubApp::new(HARNESS_APP_GUID, HARNESS_APP_NAME, HARNESS_SPACE_GUID)
                .with_instance(0, 0.125, 256 * 1024 * 1024)
                .with_instance(1, 0.5, 512 * 1024 * 1024),
        );

        log::info!("📚 Seeded stub Cloud Controller with default fixture");
        Ok(harness)
    }

    pub fn api_url(&self) -> String {
        self.cloud.base_url().to_string()
    }

    /// Attend qu'une condition devienne vraie (polling 20ms)
    pub async fn wait_until<F>(&self, timeout_ms: u64, mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        log::warn!("⏰ Timeout after {}ms waiting for condition", timeout_ms);
        condition()
    }

    /// Attend qu'une requête précise ait été reçue par le stub
    pub async fn wait_for_request(&self, request: &str, timeout_ms: u64) -> bool {
        let cloud = self.cloud.clone();
        self.wait_until(timeout_ms, || cloud.requests().iter().any(|r| r == request))
            .await
    }

    /// Assert qu'une requête a été reçue
    pub fn assert_requested(&self, request: &str) -> Result<()> {
        if self.cloud.requests().iter().any(|r| r == request) {
            return Ok(());
        }
        anyhow::bail!("Expected request not received: {}", request);
    }

    /// Assert qu'une requête n'a jamais été reçue
    pub fn assert_not_requested(&self, request: &str) -> Result<()> {
        if self.cloud.requests().iter().any(|r| r == request) {
            anyhow::bail!("Unexpected request received: {}", request);
        }
        Ok(())
    }

    /// Stats sur les requêtes collectées
    pub fn get_stats(&self) -> TestStats {
        let requests = self.cloud.requests();
        let mut request_counts = HashMap::new();

        for r in &requests {
            *request_counts.entry(r.clone()).or_insert(0) += 1;
        }

        TestStats {
            total_requests: requests.len(),
            request_counts,
            logins: self.cloud.login_count(),
        }
    }

    /// Reset le journal des requêtes pour une nouvelle phase de test
    pub fn reset(&self) {
        self.cloud.clear_requests();
        log::info!("🧹 Test harness reset");
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub total_requests: usize,
    pub request_counts: HashMap<String, usize>,
    pub logins: usize,
}

impl TestStats {
    pub fn count(&self, request: &str) -> usize {
        self.request_counts.get(request).copied().unwrap_or(0)
    }
}
