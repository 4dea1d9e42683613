use crate::models::{Machine, Snapshot};
use serde::{Deserialize, Serialize};

/// Comportement quand la machine sélectionnée manque au nouveau snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Garde le dernier objet connu
    #[default]
    RetainStale,
    /// Efface la sélection
    Clear,
}

/// Résultat de la re-résolution de la sélection sur un snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    NothingSelected,
    Refreshed,
    RetainedStale,
    Cleared,
}

/// Suit la machine inspectée par id au fil des snapshots
#[derive(Debug, Default)]
pub struct SelectionTracker {
    policy: SelectionPolicy,
    selected: Option<Machine>,
    stale: bool,
}

impl SelectionTracker {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            selected: None,
            stale: false,
        }
    }

    pub fn select(&mut self, machine: Option<Machine>) {
        self.selected = machine;
        self.stale = false;
    }

    pub fn selected(&self) -> Option<&Machine> {
        self.selected.as_ref()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_ref().map(|m| m.id.as_str())
    }

    /// Vrai quand l'objet détenu n'existe plus dans le dernier snapshot
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn refresh(&mut self, snapshot: &Snapshot) -> Resolution {
        let Some(id) = self.selected_id() else {
            return Resolution::NothingSelected;
        };

        match snapshot.find_machine(id) {
            Some(fresh) => {
                self.selected = Some(fresh.clone());
                self.stale = false;
                Resolution::Refreshed
            }
            None => match self.policy {
                SelectionPolicy::RetainStale => {
                    self.stale = true;
                    Resolution::RetainedStale
                }
                SelectionPolicy::Clear => {
                    self.select(None);
                    Resolution::Cleared
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MachineStatus;
    use serde_json::json;

    fn snapshot_with(machines: serde_json::Value) -> Snapshot {
        serde_json::from_value(json!({
            "timestamp": 1,
            "lines": [{ "id": "L1", "name": "Line 1", "machines": machines }]
        }))
        .unwrap()
    }

    #[test]
    fn test_refresh_picks_up_changed_fields() {
        let before = snapshot_with(json!([{ "id": "M1", "type": "Cutter", "status": "RUNNING" }]));
        let after = snapshot_with(json!([{ "id": "M1", "type": "Cutter", "status": "ERROR" }]));

        let mut tracker = SelectionTracker::new(SelectionPolicy::RetainStale);
        tracker.select(before.find_machine("M1").cloned());
        assert_eq!(tracker.refresh(&after), Resolution::Refreshed);

        let selected = tracker.selected().unwrap();
        assert_eq!(selected.id, "M1");
        assert_eq!(selected.status, MachineStatus::Error);
    }

    #[test]
    fn test_missing_machine_retained_when_policy_says_so() {
        let before = snapshot_with(json!([{ "id": "M1", "type": "Cutter", "status": "RUNNING" }]));
        let after = snapshot_with(json!([{ "id": "M2", "type": "Packer", "status": "IDLE" }]));

        let mut tracker = SelectionTracker::new(SelectionPolicy::RetainStale);
        tracker.select(before.find_machine("M1").cloned());
        assert_eq!(tracker.refresh(&after), Resolution::RetainedStale);
        assert_eq!(tracker.selected_id(), Some("M1"));
        assert!(tracker.is_stale());
    }

    #[test]
    fn test_missing_machine_cleared_when_policy_says_so() {
        let before = snapshot_with(json!([{ "id": "M1", "type": "Cutter", "status": "RUNNING" }]));
        let after = snapshot_with(json!([]));

        let mut tracker = SelectionTracker::new(SelectionPolicy::Clear);
        tracker.select(before.find_machine("M1").cloned());
        assert_eq!(tracker.refresh(&after), Resolution::Cleared);
        assert!(tracker.selected().is_none());
    }

    #[test]
    fn test_nothing_selected_is_untouched() {
        let snap = snapshot_with(json!([{ "id": "M1", "type": "Cutter", "status": "RUNNING" }]));
        let mut tracker = SelectionTracker::default();
        assert_eq!(tracker.refresh(&snap), Resolution::NothingSelected);
        assert!(tracker.selected().is_none());
    }
}
