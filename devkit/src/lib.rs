/*!
# Factory DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests de la console sans backend réel:
- Serveur WebSocket de snapshots scriptable
- Mock du backend REST avec enregistrement et pannes injectables
- Constructeurs JSON de snapshots au format du backend
*/

pub mod backend_stub;
pub mod fixtures;
pub mod ws_stub;

pub use backend_stub::{BackendStub, Failure, RecordedRequest};
pub use fixtures::{sample_factory, FactoryMessageBuilder, SnapshotBuilder};
pub use ws_stub::WsStub;

/// Init du logging pour les tests (idempotent)
pub fn init_test_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}
