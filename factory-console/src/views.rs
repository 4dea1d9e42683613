//! Projections en lecture seule d'un snapshot pour la couche de rendu.

use crate::error::ValidationError;
use crate::models::{InventoryItem, Machine, MachineKind, MachineStatus, Order, Priority, Snapshot, StockStatus};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============ MACHINES ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEntry {
    pub label: &'static str,
    pub value: Option<f64>,
    pub unit: &'static str,
    /// Valeur au-delà de son seuil d'alerte
    pub alert: bool,
}

impl MetricEntry {
    fn new(label: &'static str, value: Option<f64>, unit: &'static str) -> Self {
        Self { label, value, unit, alert: false }
    }

    fn above(mut self, threshold: f64) -> Self {
        self.alert = self.value.is_some_and(|v| v > threshold);
        self
    }
}

fn wear_entry(machine: &Machine) -> MetricEntry {
    MetricEntry::new("Wear", Some(machine.wear_level.unwrap_or(0.0) * 100.0), "%").above(80.0)
}

/// Métriques de la carte machine, selon le type
pub fn display_metrics(machine: &Machine) -> Vec<MetricEntry> {
    match &machine.kind {
        MachineKind::Cutter { speed, .. } => vec![
            MetricEntry::new("Temp", machine.temperature, "°C").above(90.0),
            MetricEntry::new("Vib", machine.vibration, "Hz").above(5.0),
            MetricEntry::new("Speed", *speed, "rpm"),
            wear_entry(machine),
        ],
        MachineKind::RobotArm { load, current, cycles, .. } => vec![
            MetricEntry::new("Load", *load, "kg"),
            MetricEntry::new("Current", *current, "A"),
            MetricEntry::new("Cycles", Some(cycles.unwrap_or(0.0)), ""),
            wear_entry(machine),
        ],
        MachineKind::Conveyor { speed, load_count, .. } => vec![
            MetricEntry::new("Speed", *speed, "m/s"),
            MetricEntry::new("Load", Some(load_count.unwrap_or(0.0)), ""),
            wear_entry(machine),
        ],
        MachineKind::Inspector { pass_rate, .. } => vec![
            MetricEntry::new("Rate", *pass_rate, "%"),
            wear_entry(machine),
        ],
        MachineKind::Packer { jam_rate, .. } => vec![
            MetricEntry::new("Jam Rate", Some(jam_rate.unwrap_or(0.0)), "%").above(1.0),
            wear_entry(machine),
        ],
        MachineKind::Generic { .. } => vec![
            MetricEntry::new("Temp", machine.temperature, "°C").above(90.0),
            wear_entry(machine),
        ],
    }
}

/// Métrique d'efficacité explicite, si la machine en remonte une non nulle
pub fn efficiency_metric(machine: &Machine) -> Option<f64> {
    let kind_value = match &machine.kind {
        MachineKind::RobotArm { efficiency, .. } | MachineKind::Packer { efficiency, .. } => *efficiency,
        _ => None,
    };
    kind_value
        .or_else(|| machine.metric("efficiency"))
        .filter(|e| *e > 0.0)
}

/// Proxy d'efficacité par machine (pourcentage)
pub fn efficiency_proxy(machine: &Machine) -> f64 {
    match &machine.kind {
        MachineKind::Cutter { speed, .. } => speed.unwrap_or(0.0) / 3000.0 * 100.0,
        MachineKind::Conveyor { speed, .. } => speed.unwrap_or(0.0) / 1.2 * 100.0,
        _ => efficiency_metric(machine).unwrap_or(0.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBand {
    Good,
    Warning,
    Critical,
}

impl HealthBand {
    /// Score absent = 100
    pub fn of(score: Option<f64>) -> Self {
        let score = score.unwrap_or(100.0);
        if score > 80.0 {
            HealthBand::Good
        } else if score > 50.0 {
            HealthBand::Warning
        } else {
            HealthBand::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UtilizationBucket {
    Running,
    Idle,
    Error,
    Maintenance,
}

impl From<MachineStatus> for UtilizationBucket {
    fn from(status: MachineStatus) -> Self {
        match status {
            MachineStatus::Running => UtilizationBucket::Running,
            s if s.is_fault() => UtilizationBucket::Error,
            MachineStatus::Repairing => UtilizationBucket::Maintenance,
            _ => UtilizationBucket::Idle,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Utilization {
    pub running: usize,
    pub idle: usize,
    pub error: usize,
    pub maintenance: usize,
    /// Efficacité moyenne arrondie, 0 si aucune machine ne compte
    pub avg_efficiency: u32,
}

pub fn utilization(snapshot: &Snapshot) -> Utilization {
    let mut out = Utilization::default();
    let (mut total, mut counted) = (0.0, 0usize);

    for machine in snapshot.machines() {
        match UtilizationBucket::from(machine.status) {
            UtilizationBucket::Running => out.running += 1,
            UtilizationBucket::Idle => out.idle += 1,
            UtilizationBucket::Error => out.error += 1,
            UtilizationBucket::Maintenance => out.maintenance += 1,
        }

        if let Some(eff) = efficiency_metric(machine) {
            total += eff;
            counted += 1;
        } else if machine.status == MachineStatus::Running {
            total += 100.0;
            counted += 1;
        }
    }

    if counted > 0 {
        out.avg_efficiency = (total / counted as f64).round() as u32;
    }
    out
}

// ============ COMMANDES ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSort {
    #[default]
    Due,
    Progress,
    Quantity,
    Status,
}

fn due_key(due: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(due)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(due, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(due, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Recherche insensible à la casse sur client, produit et id, puis tri.
/// Échéance croissante (illisible en dernier), avancement et quantité
/// décroissants, statut par libellé.
pub fn search_orders<'a>(orders: &'a [Order], query: &str, sort: OrderSort) -> Vec<&'a Order> {
    let needle = query.to_lowercase();
    let mut result: Vec<&Order> = orders
        .iter()
        .filter(|o| {
            needle.is_empty()
                || o.customer.to_lowercase().contains(&needle)
                || o.product.to_lowercase().contains(&needle)
                || o.id.to_lowercase().contains(&needle)
        })
        .collect();

    match sort {
        OrderSort::Due => result.sort_by(|a, b| match (due_key(&a.due), due_key(&b.due)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        OrderSort::Progress => result.sort_by(|a, b| b.progress.total_cmp(&a.progress)),
        OrderSort::Quantity => result.sort_by(|a, b| b.quantity.cmp(&a.quantity)),
        OrderSort::Status => result.sort_by(|a, b| a.status.label().cmp(b.status.label())),
    }
    result
}

/// Contenu du formulaire de commande avant envoi
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrderDraft {
    #[serde(default)]
    pub customer: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub due: String,
    #[serde(default)]
    pub priority: Priority,
}

impl OrderDraft {
    /// Première règle en échec : client, puis quantité, puis échéance
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.customer.trim().is_empty() {
            return Err(ValidationError::MissingCustomer);
        }
        if self.quantity <= 0 {
            return Err(ValidationError::InvalidQuantity);
        }
        if self.due.trim().is_empty() {
            return Err(ValidationError::MissingDueDate);
        }
        Ok(())
    }
}

// ============ INVENTAIRE ============

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventorySummary {
    pub total_value: f64,
    pub low: usize,
    pub critical: usize,
}

pub fn inventory_summary(items: &[InventoryItem]) -> InventorySummary {
    InventorySummary {
        total_value: items.iter().map(|i| i.total_value).sum(),
        low: items.iter().filter(|i| i.status == StockStatus::Low).count(),
        critical: items.iter().filter(|i| i.status == StockStatus::Critical).count(),
    }
}

/// Articles LOW ou CRITICAL, les critiques d'abord
pub fn needs_attention(items: &[InventoryItem]) -> Vec<&InventoryItem> {
    let mut out: Vec<&InventoryItem> = items
        .iter()
        .filter(|i| matches!(i.status, StockStatus::Low | StockStatus::Critical))
        .collect();
    out.sort_by_key(|i| i.status != StockStatus::Critical);
    out
}
