use crate::models::Snapshot;
use std::sync::Arc;

/// Détient le dernier snapshot ; chaque apply le remplace en entier
#[derive(Debug, Default)]
pub struct SnapshotStore {
    latest: Option<Arc<Snapshot>>,
    revision: u64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remplace le snapshot détenu et retourne le handle partagé
    pub fn apply(&mut self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.latest = Some(snapshot.clone());
        self.revision += 1;
        snapshot
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.clone()
    }

    /// Nombre de snapshots appliqués depuis le démarrage
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
