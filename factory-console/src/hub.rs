/**
 * FACTORY HUB - Propriétaire de l'état de la console
 *
 * RÔLE :
 * Point unique où vivent les snapshots temps réel, les surcouches d'alertes
 * locales, la sélection machine, l'autonomie et le chat assistant. Tout le
 * reste (tâche de connexion, command dispatcher, API de vue) passe par
 * l'API de mutation ci-dessous.
 *
 * FLUX :
 * trame brute -> décodage -> remplacement store -> sync alertes
 * -> re-résolution sélection -> broadcast HubEvent (signal de re-rendu)
 *
 * VERROUILLAGE :
 * Un mutex parking_lot, sections critiques courtes, jamais tenu sur un await.
 */

use crate::alerts::{AlertFilter, AlertReconciler};
use crate::chat::{ChatLog, ChatMessage};
use crate::models::{Alert, Machine, Snapshot};
use crate::selection::{Resolution, SelectionPolicy, SelectionTracker};
use crate::store::SnapshotStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notifications de changement pour les abonnés
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Connection(bool),
    SnapshotApplied { revision: u64 },
    MessageDropped,
    AlertsChanged,
    SelectionChanged,
    AutonomyChanged(Option<bool>),
    ChatUpdated,
    Reloaded,
}

/// Compteurs du hub pour /status et les logs
#[derive(Debug, Clone, Serialize)]
pub struct HubStatus {
    pub connected: bool,
    pub revision: u64,
    pub dropped_messages: u64,
    pub active_alerts: usize,
    pub selected_machine: Option<String>,
    pub selection_stale: bool,
    pub autonomy_enabled: Option<bool>,
}

#[derive(Debug, Default)]
struct Autonomy {
    enabled: Option<bool>,
    // incrémenté à chaque bascule locale ; protège des réponses REST tardives
    generation: u64,
}

#[derive(Debug)]
struct HubState {
    store: SnapshotStore,
    alerts: AlertReconciler,
    selection: SelectionTracker,
    filter: AlertFilter,
    connected: bool,
    autonomy: Autonomy,
    chat: ChatLog,
    dropped_messages: u64,
}

impl HubState {
    fn new(policy: SelectionPolicy) -> Self {
        Self {
            store: SnapshotStore::new(),
            alerts: AlertReconciler::new(),
            selection: SelectionTracker::new(policy),
            filter: AlertFilter::default(),
            connected: false,
            autonomy: Autonomy::default(),
            chat: ChatLog::new(),
            dropped_messages: 0,
        }
    }
}

#[derive(Clone)]
pub struct FactoryHub {
    inner: Arc<Mutex<HubState>>,
    events: broadcast::Sender<HubEvent>,
}

impl FactoryHub {
    pub fn new(policy: SelectionPolicy) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(HubState::new(policy))),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: HubEvent) {
        // aucun abonné : ok
        let _ = self.events.send(event);
    }

    // ============ FLUX TEMPS RÉEL ============

    /// Décode et applique une trame brute. Une trame indécodable est loggée
    /// et ignorée ; le snapshot détenu reste intact.
    pub fn apply_message(&self, raw: &str) -> Option<u64> {
        match serde_json::from_str::<Snapshot>(raw) {
            Ok(snapshot) => Some(self.apply_snapshot(snapshot)),
            Err(e) => {
                self.inner.lock().dropped_messages += 1;
                warn!("dropping undecodable snapshot: {e}");
                self.emit(HubEvent::MessageDropped);
                None
            }
        }
    }

    /// Remplace le snapshot et recalcule l'état dérivé ; retourne la révision
    pub fn apply_snapshot(&self, snapshot: Snapshot) -> u64 {
        let (revision, alerts_synced, resolution, autonomy) = {
            let mut st = self.inner.lock();
            let snapshot = st.store.apply(snapshot);

            let alerts_synced = match &snapshot.alerts {
                Some(alerts) => {
                    st.alerts.sync(alerts);
                    true
                }
                None => false,
            };
            let resolution = st.selection.refresh(&snapshot);

            let autonomy = match snapshot.autonomy_enabled {
                Some(enabled) if st.autonomy.enabled != Some(enabled) => {
                    st.autonomy.enabled = Some(enabled);
                    Some(enabled)
                }
                _ => None,
            };
            (st.store.revision(), alerts_synced, resolution, autonomy)
        };

        debug!("snapshot #{revision} applied");
        self.emit(HubEvent::SnapshotApplied { revision });
        if alerts_synced {
            self.emit(HubEvent::AlertsChanged);
        }
        if matches!(resolution, Resolution::Refreshed | Resolution::Cleared) {
            self.emit(HubEvent::SelectionChanged);
        }
        if let Some(enabled) = autonomy {
            self.emit(HubEvent::AutonomyChanged(Some(enabled)));
        }
        revision
    }

    pub fn set_connected(&self, connected: bool) {
        let changed = {
            let mut st = self.inner.lock();
            let changed = st.connected != connected;
            st.connected = connected;
            changed
        };
        if changed {
            self.emit(HubEvent::Connection(connected));
        }
    }

    pub fn connected(&self) -> bool {
        self.inner.lock().connected
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.lock().store.latest()
    }

    pub fn revision(&self) -> u64 {
        self.inner.lock().store.revision()
    }

    // ============ ALERTES ============

    pub fn resolve_alert(&self, id: &str) -> bool {
        let found = self.inner.lock().alerts.resolve(id);
        if found {
            self.emit(HubEvent::AlertsChanged);
        }
        found
    }

    pub fn clear_alerts(&self) {
        self.inner.lock().alerts.clear_all();
        self.emit(HubEvent::AlertsChanged);
    }

    /// Ajoute une alerte locale en tête. Son id est suffixé s'il entre en
    /// collision avec un id visible ; l'id final est retourné.
    pub fn add_alert(&self, mut alert: Alert) -> String {
        {
            let mut st = self.inner.lock();
            if st.alerts.contains(&alert.id) {
                let base = alert.id.clone();
                let mut n = 1;
                while st.alerts.contains(&format!("{base}-{n}")) {
                    n += 1;
                }
                alert.id = format!("{base}-{n}");
            }
            st.alerts.add(alert.clone());
        }
        self.emit(HubEvent::AlertsChanged);
        alert.id
    }

    /// Tout ce qui est détenu, alertes résolues comprises
    pub fn all_alerts(&self) -> Vec<Alert> {
        self.inner.lock().alerts.all().to_vec()
    }

    /// Alertes non résolues passées par `filter`, ou par le filtre stocké
    pub fn visible_alerts(&self, filter: Option<&AlertFilter>) -> Vec<Alert> {
        let st = self.inner.lock();
        let filter = filter.unwrap_or(&st.filter);
        st.alerts.filtered(filter).cloned().collect()
    }

    pub fn active_alert_count(&self) -> usize {
        self.inner.lock().alerts.active_count()
    }

    pub fn filter(&self) -> AlertFilter {
        self.inner.lock().filter.clone()
    }

    pub fn set_filter(&self, filter: AlertFilter) {
        self.inner.lock().filter = filter;
        self.emit(HubEvent::AlertsChanged);
    }

    // ============ SÉLECTION ============

    pub fn select(&self, machine: Option<Machine>) {
        self.inner.lock().selection.select(machine);
        self.emit(HubEvent::SelectionChanged);
    }

    /// Sélection par id dans le dernier snapshot ; false si absent
    pub fn select_by_id(&self, id: &str) -> bool {
        let found = {
            let mut st = self.inner.lock();
            let machine = st
                .store
                .latest()
                .and_then(|snap| snap.find_machine(id).cloned());
            match machine {
                Some(m) => {
                    st.selection.select(Some(m));
                    true
                }
                None => false,
            }
        };
        if found {
            self.emit(HubEvent::SelectionChanged);
        }
        found
    }

    pub fn selected(&self) -> Option<Machine> {
        self.inner.lock().selection.selected().cloned()
    }

    pub fn selection_is_stale(&self) -> bool {
        self.inner.lock().selection.is_stale()
    }

    // ============ AUTONOMIE ============

    pub fn autonomy(&self) -> Option<bool> {
        self.inner.lock().autonomy.enabled
    }

    /// Bascule optimiste. Retourne la génération et la valeur précédente.
    pub fn begin_autonomy_toggle(&self, enabled: bool) -> (u64, Option<bool>) {
        let ticket = {
            let mut st = self.inner.lock();
            let previous = st.autonomy.enabled;
            st.autonomy.enabled = Some(enabled);
            st.autonomy.generation += 1;
            (st.autonomy.generation, previous)
        };
        self.emit(HubEvent::AutonomyChanged(Some(enabled)));
        ticket
    }

    /// Annule une bascule ratée sauf si une plus récente l'a remplacée
    pub fn revert_autonomy(&self, generation: u64, previous: Option<bool>) -> bool {
        let reverted = {
            let mut st = self.inner.lock();
            if st.autonomy.generation == generation {
                st.autonomy.enabled = previous;
                true
            } else {
                false
            }
        };
        if reverted {
            self.emit(HubEvent::AutonomyChanged(previous));
        }
        reverted
    }

    pub fn autonomy_generation(&self) -> u64 {
        self.inner.lock().autonomy.generation
    }

    /// Applique une valeur lue sauf si une bascule a eu lieu depuis la requête
    pub fn apply_fetched_autonomy(&self, generation: u64, enabled: bool) -> bool {
        let applied = {
            let mut st = self.inner.lock();
            if st.autonomy.generation == generation {
                st.autonomy.enabled = Some(enabled);
                true
            } else {
                false
            }
        };
        if applied {
            self.emit(HubEvent::AutonomyChanged(Some(enabled)));
        }
        applied
    }

    // ============ CHAT ============

    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().chat.messages().to_vec()
    }

    pub fn begin_chat(&self, text: &str) {
        self.inner.lock().chat.begin_exchange(text);
        self.emit(HubEvent::ChatUpdated);
    }

    pub fn complete_chat(&self, reply: impl Into<String>) {
        self.inner.lock().chat.complete_exchange(reply);
        self.emit(HubEvent::ChatUpdated);
    }

    // ============ CYCLE DE VIE ============

    /// Rechargement complet : tout l'état local revient à l'initial.
    /// Le flag de connexion suit le socket et reste tel quel.
    pub fn reload(&self) {
        {
            let mut st = self.inner.lock();
            let policy = st.selection.policy();
            let connected = st.connected;
            *st = HubState::new(policy);
            st.connected = connected;
        }
        info!("console state reloaded");
        self.emit(HubEvent::Reloaded);
    }

    pub fn status(&self) -> HubStatus {
        let st = self.inner.lock();
        HubStatus {
            connected: st.connected,
            revision: st.store.revision(),
            dropped_messages: st.dropped_messages,
            active_alerts: st.alerts.active_count(),
            selected_machine: st.selection.selected_id().map(str::to_string),
            selection_stale: st.selection.is_stale(),
            autonomy_enabled: st.autonomy.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, MachineStatus, Severity};
    use serde_json::json;

    fn frame(alerts: serde_json::Value, status: &str) -> String {
        json!({
            "timestamp": 1700000000.0,
            "lines": [{
                "id": "L1",
                "name": "Line 1",
                "product_type": "Smart Watch X1",
                "machines": [{ "id": "M1", "name": "Cutter", "type": "Cutter", "status": status }]
            }],
            "inventory": [],
            "alerts": alerts,
            "orders": [],
            "financials": { "revenue": 10.0, "costs": 4.0, "profit": 6.0 }
        })
        .to_string()
    }

    fn alert_json(id: &str, severity: &str, resolved: bool) -> serde_json::Value {
        json!({
            "id": id, "machineId": "M1", "type": "temperature", "severity": severity,
            "message": "Temperature high", "timestamp": 1.0, "resolved": resolved
        })
    }

    #[test]
    fn test_local_resolution_does_not_survive_next_snapshot() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        hub.apply_message(&frame(json!([alert_json("a1", "critical", false)]), "RUNNING"));

        assert!(hub.resolve_alert("a1"));
        assert!(hub.visible_alerts(None).is_empty());

        // le backend la signale toujours non résolue
        hub.apply_message(&frame(json!([alert_json("a1", "critical", false)]), "RUNNING"));
        let visible = hub.visible_alerts(None);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "a1");
        assert!(!visible[0].resolved);
    }

    #[test]
    fn test_visible_equals_snapshot_minus_backend_resolved() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        hub.apply_message(&frame(json!([alert_json("a1", "high", false)]), "RUNNING"));
        hub.resolve_alert("a1");

        hub.apply_message(&frame(
            json!([alert_json("a1", "high", true), alert_json("a2", "low", false)]),
            "RUNNING",
        ));
        let ids: Vec<String> = hub.visible_alerts(None).into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a2"]);
    }

    #[test]
    fn test_malformed_message_keeps_snapshot() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        hub.apply_message(&frame(json!([]), "RUNNING"));
        let before = serde_json::to_string(&*hub.snapshot().unwrap()).unwrap();

        assert_eq!(hub.apply_message("not json"), None);

        let after = serde_json::to_string(&*hub.snapshot().unwrap()).unwrap();
        assert_eq!(before, after);
        assert_eq!(hub.revision(), 1);
        assert_eq!(hub.status().dropped_messages, 1);
    }

    #[test]
    fn test_odd_field_types_do_not_drop_the_snapshot() {
        let hub = FactoryHub::new(SelectionPolicy::RetainStale);
        hub.apply_message(&frame(json!([]), "RUNNING"));
        assert!(hub.select_by_id("M1"));

        let mut odd = alert_json("a1", "high", false);
        odd["suggested_action"] = json!(["Reduce speed", "Inspect blade"]);
        odd["root_cause"] = json!({ "component": "blade" });
        assert_eq!(hub.apply_message(&frame(json!([odd]), "ERROR")), Some(2));

        assert_eq!(hub.selected().unwrap().status, MachineStatus::Error);
        let visible = hub.visible_alerts(None);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].severity, Severity::High);
        assert_eq!(visible[0].suggested_action, None);
        assert_eq!(visible[0].root_cause, None);

        let nulls = r#"{"timestamp": 3, "alerts": [{"id": "a2", "message": null, "severity": null, "count": 2.0}]}"#;
        assert_eq!(hub.apply_message(nulls), Some(3));
        let visible = hub.visible_alerts(None);
        assert_eq!(visible[0].id, "a2");
        assert_eq!(visible[0].message, "");
        assert_eq!(visible[0].severity, Severity::Unknown);
        assert_eq!(visible[0].count, Some(2));
        assert_eq!(hub.status().dropped_messages, 0);
    }

    #[test]
    fn test_non_object_root_is_dropped() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        assert_eq!(hub.apply_message("[1, 2, 3]"), None);
        assert_eq!(hub.apply_message("42"), None);
        assert_eq!(hub.apply_message("null"), None);
        assert_eq!(hub.revision(), 0);
        assert_eq!(hub.status().dropped_messages, 3);
    }

    #[test]
    fn test_selection_follows_snapshots() {
        let hub = FactoryHub::new(SelectionPolicy::RetainStale);
        hub.apply_message(&frame(json!([]), "RUNNING"));
        assert!(hub.select_by_id("M1"));
        assert_eq!(hub.selected().unwrap().status, MachineStatus::Running);

        hub.apply_message(&frame(json!([]), "ERROR"));
        let selected = hub.selected().unwrap();
        assert_eq!(selected.id, "M1");
        assert_eq!(selected.status, MachineStatus::Error);
        assert!(!hub.select_by_id("ghost"));
    }

    #[test]
    fn test_snapshot_without_alerts_keeps_visible_list() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        hub.apply_message(&frame(json!([alert_json("a1", "low", false)]), "RUNNING"));
        hub.apply_message(r#"{"timestamp": 2.0}"#);
        assert_eq!(hub.visible_alerts(None).len(), 1);
        assert!(hub.snapshot().unwrap().lines.is_empty());
    }

    #[test]
    fn test_add_alert_disambiguates_ids() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        let mk = |id: &str| Alert {
            id: id.into(),
            machine_id: "M1".into(),
            alert_type: AlertType::System,
            severity: Severity::Medium,
            message: "Failed".into(),
            timestamp: 0.0,
            count: None,
            resolved: false,
            suggested_action: None,
            root_cause: None,
        };
        assert_eq!(hub.add_alert(mk("1700")), "1700");
        assert_eq!(hub.add_alert(mk("1700")), "1700-1");
        assert_eq!(hub.all_alerts()[0].id, "1700-1");
    }

    #[test]
    fn test_autonomy_revert_guarded_by_generation() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        let (first, prev_first) = hub.begin_autonomy_toggle(false);
        let (_second, _) = hub.begin_autonomy_toggle(true);

        // la première requête échoue tard : ne doit pas annuler la bascule récente
        assert!(!hub.revert_autonomy(first, prev_first));
        assert_eq!(hub.autonomy(), Some(true));

        let gen = hub.autonomy_generation();
        hub.begin_autonomy_toggle(false);
        assert!(!hub.apply_fetched_autonomy(gen, true));
        assert_eq!(hub.autonomy(), Some(false));
    }

    #[test]
    fn test_reload_resets_local_state() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        hub.set_connected(true);
        hub.apply_message(&frame(json!([alert_json("a1", "low", false)]), "RUNNING"));
        hub.select_by_id("M1");
        hub.begin_chat("hi");

        hub.reload();
        assert!(hub.snapshot().is_none());
        assert!(hub.all_alerts().is_empty());
        assert!(hub.selected().is_none());
        assert_eq!(hub.chat_messages().len(), 1);
        assert!(hub.connected());
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        let mut rx = hub.subscribe();

        hub.set_connected(true);
        hub.set_connected(true);
        hub.apply_message(&frame(json!([]), "IDLE"));

        assert_eq!(rx.recv().await.unwrap(), HubEvent::Connection(true));
        assert_eq!(rx.recv().await.unwrap(), HubEvent::SnapshotApplied { revision: 1 });
        assert_eq!(rx.recv().await.unwrap(), HubEvent::AlertsChanged);
    }
}
