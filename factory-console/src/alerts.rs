//! Réconciliation et filtrage des alertes
//!
//! La liste visible reflète le tableau `alerts` du dernier snapshot. Les
//! changements locaux (résolution, effacement, alertes générées localement)
//! sont des surcouches qui durent jusqu'au snapshot suivant : le backend
//! fait autorité, une alerte résolue ici revient non résolue tant que le
//! backend ne l'a pas résolue lui aussi.

use crate::models::{Alert, AlertType, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: f64,
    pub to: f64,
}

/// Filtre par appartenance : OU dans un champ, ET entre champs, vide = tout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertFilter {
    pub severity: BTreeSet<Severity>,
    #[serde(rename = "type")]
    pub alert_type: BTreeSet<AlertType>,
    #[serde(rename = "machineId")]
    pub machine_id: BTreeSet<String>,
    #[serde(rename = "timeRange", skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        if !self.severity.is_empty() && !self.severity.contains(&alert.severity) {
            return false;
        }
        if !self.alert_type.is_empty() && !self.alert_type.contains(&alert.alert_type) {
            return false;
        }
        if !self.machine_id.is_empty() && !self.machine_id.contains(&alert.machine_id) {
            return false;
        }
        if let Some(range) = self.time_range {
            if alert.timestamp < range.from || alert.timestamp > range.to {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.severity.is_empty()
            && self.alert_type.is_empty()
            && self.machine_id.is_empty()
            && self.time_range.is_none()
    }

    /// Compteur du badge à côté du bouton filtre (entrées sévérité + type)
    pub fn restriction_count(&self) -> usize {
        self.severity.len() + self.alert_type.len()
    }

    pub fn toggle_severity(&mut self, severity: Severity) {
        if !self.severity.remove(&severity) {
            self.severity.insert(severity);
        }
    }

    pub fn toggle_type(&mut self, alert_type: AlertType) {
        if !self.alert_type.remove(&alert_type) {
            self.alert_type.insert(alert_type);
        }
    }
}

#[derive(Debug, Default)]
pub struct AlertReconciler {
    visible: Vec<Alert>,
}

impl AlertReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reprend tel quel le tableau d'alertes du snapshot
    pub fn sync(&mut self, alerts: &[Alert]) {
        self.visible = alerts.to_vec();
    }

    /// Marque une alerte résolue localement. Retourne false si l'id est inconnu.
    pub fn resolve(&mut self, id: &str) -> bool {
        match self.visible.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Vide la liste jusqu'au prochain snapshot ; le backend n'est pas prévenu
    pub fn clear_all(&mut self) {
        self.visible.clear();
    }

    /// Ajoute en tête une alerte générée localement
    pub fn add(&mut self, alert: Alert) {
        self.visible.insert(0, alert);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.visible.iter().any(|a| a.id == id)
    }

    /// Tout ce qui est détenu, alertes résolues comprises
    pub fn all(&self) -> &[Alert] {
        &self.visible
    }

    /// Vue filtrée ; les alertes résolues n'en font jamais partie
    pub fn filtered<'a>(&'a self, filter: &'a AlertFilter) -> impl Iterator<Item = &'a Alert> + 'a {
        self.visible
            .iter()
            .filter(move |a| !a.resolved && filter.matches(a))
    }

    pub fn active_count(&self) -> usize {
        self.visible.iter().filter(|a| !a.resolved).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str, severity: Severity, alert_type: AlertType) -> Alert {
        Alert {
            id: id.into(),
            machine_id: "M1".into(),
            alert_type,
            severity,
            message: format!("alert {id}"),
            timestamp: 1_000.0,
            count: None,
            resolved: false,
            suggested_action: None,
            root_cause: None,
        }
    }

    fn sample() -> Vec<Alert> {
        vec![
            alert("a1", Severity::Critical, AlertType::Temperature),
            alert("a2", Severity::High, AlertType::Vibration),
            alert("a3", Severity::Low, AlertType::System),
        ]
    }

    fn ids<'a>(it: impl Iterator<Item = &'a Alert>) -> Vec<&'a str> {
        it.map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_severity_filter_selects_subset() {
        let mut rec = AlertReconciler::new();
        rec.sync(&sample());

        let mut filter = AlertFilter::default();
        filter.severity.insert(Severity::Critical);
        assert_eq!(ids(rec.filtered(&filter)), vec!["a1"]);
    }

    #[test]
    fn test_empty_filter_excludes_only_resolved() {
        let mut rec = AlertReconciler::new();
        rec.sync(&sample());
        rec.resolve("a2");

        let filter = AlertFilter::default();
        assert!(filter.is_empty());
        assert_eq!(ids(rec.filtered(&filter)), vec!["a1", "a3"]);
        assert_eq!(rec.active_count(), 2);
    }

    #[test]
    fn test_or_within_field_and_across_fields() {
        let mut rec = AlertReconciler::new();
        rec.sync(&sample());

        let mut filter = AlertFilter::default();
        filter.severity.insert(Severity::Critical);
        filter.severity.insert(Severity::Low);
        assert_eq!(ids(rec.filtered(&filter)), vec!["a1", "a3"]);

        filter.alert_type.insert(AlertType::System);
        assert_eq!(ids(rec.filtered(&filter)), vec!["a3"]);
    }

    #[test]
    fn test_machine_and_time_range_filters() {
        let mut alerts = sample();
        alerts[1].machine_id = "M2".into();
        alerts[2].timestamp = 5_000.0;
        let mut rec = AlertReconciler::new();
        rec.sync(&alerts);

        let mut filter = AlertFilter::default();
        filter.machine_id.insert("M1".into());
        filter.time_range = Some(TimeRange { from: 0.0, to: 2_000.0 });
        assert_eq!(ids(rec.filtered(&filter)), vec!["a1"]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut once = AlertReconciler::new();
        once.sync(&sample());
        assert!(once.resolve("a1"));

        let mut twice = AlertReconciler::new();
        twice.sync(&sample());
        twice.resolve("a1");
        assert!(twice.resolve("a1"));

        assert_eq!(once.all(), twice.all());
    }

    #[test]
    fn test_resolve_unknown_id_is_noop() {
        let mut rec = AlertReconciler::new();
        rec.sync(&sample());
        assert!(!rec.resolve("nope"));
        assert_eq!(rec.all(), sample().as_slice());
    }

    #[test]
    fn test_add_prepends_and_clear_empties() {
        let mut rec = AlertReconciler::new();
        rec.sync(&sample());
        rec.add(alert("local", Severity::Medium, AlertType::System));
        assert_eq!(rec.all()[0].id, "local");
        assert!(rec.contains("local"));

        rec.clear_all();
        assert!(rec.all().is_empty());
    }

    #[test]
    fn test_local_resolution_lost_on_next_sync() {
        // confiance backend : le tableau suivant l'emporte sur une résolution locale
        let mut rec = AlertReconciler::new();
        rec.sync(&sample());
        rec.resolve("a1");
        rec.sync(&sample());
        assert!(!rec.all()[0].resolved);
    }

    #[test]
    fn test_toggle_helpers_and_badge_count() {
        let mut filter = AlertFilter::default();
        filter.toggle_severity(Severity::High);
        filter.toggle_type(AlertType::Power);
        assert_eq!(filter.restriction_count(), 2);
        filter.toggle_severity(Severity::High);
        assert_eq!(filter.restriction_count(), 1);
        assert!(filter.severity.is_empty());
    }
}
