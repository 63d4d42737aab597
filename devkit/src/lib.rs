/*!
# CFPROM DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le développement du collecteur avec:
- Stub Cloud Controller (API v2 + token endpoint) pour tests sans plateforme
- Builders de payloads v2
- Harness de test avec jeu de données standard
*/

pub mod cf_stub;
pub mod payloads;
pub mod test_utils;

pub use cf_stub::{StubApp, StubCloudController};
pub use payloads::{CfPayloadBuilder, InstanceUsage};
pub use test_utils::TestHarness;
