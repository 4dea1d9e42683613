//! Modèle filaire du snapshot usine poussé par le backend.
//!
//! Chaque message du canal temps réel est un [`Snapshot`] complet. Le
//! backend est souple sur les champs envoyés, le décodage l'est aussi :
//! collections absentes = vides, agrégats absents = `None`, chaîne d'enum
//! inconnue = variante fourre-tout. Une feuille `null` ou d'un type
//! inattendu se lit "pas de donnée" (voir [`lenient`]) ; seuls un texte non
//! JSON ou une racine non objet font rejeter un message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// État complet de l'usine à un instant (un message temps réel)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, deserialize_with = "lenient::value")]
    pub timestamp: f64,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub lines: Vec<Line>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub inventory: Vec<InventoryItem>,
    /// `None` quand le message ne porte aucune liste d'alertes
    #[serde(default, deserialize_with = "lenient::opt_seq", skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Vec<Alert>>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub orders: Vec<Order>,
    #[serde(default, deserialize_with = "lenient::value")]
    pub financials: Option<Financials>,
    #[serde(default, deserialize_with = "lenient::value")]
    pub kpi: Option<Kpi>,
    #[serde(default, deserialize_with = "lenient::value", skip_serializing_if = "Option::is_none")]
    pub autonomy_enabled: Option<bool>,
}

impl Snapshot {
    /// Toutes les machines des lignes, dans l'ordre reçu
    pub fn machines(&self) -> impl Iterator<Item = &Machine> {
        self.lines.iter().flat_map(|line| line.machines.iter())
    }

    /// Première machine portant cet id, lignes parcourues dans l'ordre
    pub fn find_machine(&self, id: &str) -> Option<&Machine> {
        self.machines().find(|m| m.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(default, deserialize_with = "lenient::value")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub product_type: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub current_order: Option<Order>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub machines: Vec<Machine>,
}

/// État de fonctionnement remonté par le backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Running,
    Idle,
    Error,
    Offline,
    WaitingForRepair,
    Repairing,
    /// Tout autre statut (ex. `STARVED`) ; traité comme idle
    #[default]
    #[serde(other)]
    Unknown,
}

impl MachineStatus {
    pub fn is_fault(self) -> bool {
        matches!(self, MachineStatus::Error | MachineStatus::WaitingForRepair)
    }
}

/// Métriques propres au type, résolues depuis le champ `type`
#[derive(Debug, Clone, PartialEq)]
pub enum MachineKind {
    Cutter {
        speed: Option<f64>,
        speed_setting: Option<f64>,
        tool_wear: Option<f64>,
    },
    RobotArm {
        load: Option<f64>,
        current: Option<f64>,
        efficiency: Option<f64>,
        cycles: Option<f64>,
    },
    Conveyor {
        speed: Option<f64>,
        target_speed: Option<f64>,
        load: Option<f64>,
        load_count: Option<f64>,
    },
    Inspector {
        pass_rate: Option<f64>,
        pass_count: Option<f64>,
        fail_count: Option<f64>,
    },
    Packer {
        jam_rate: Option<f64>,
        packed_count: Option<f64>,
        efficiency: Option<f64>,
    },
    /// Type de machine inconnu du client
    Generic { type_name: String },
}

impl MachineKind {
    pub fn type_name(&self) -> &str {
        match self {
            MachineKind::Cutter { .. } => "Cutter",
            MachineKind::RobotArm { .. } => "RobotArm",
            MachineKind::Conveyor { .. } => "Conveyor",
            MachineKind::Inspector { .. } => "Inspector",
            MachineKind::Packer { .. } => "Packer",
            MachineKind::Generic { type_name } => type_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, deserialize_with = "lenient::value")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub wear: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub status: String,
}

/// Une machine d'une ligne de production
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMachine", into = "RawMachine")]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub kind: MachineKind,
    pub status: MachineStatus,
    pub error_code: Option<String>,
    pub last_fault: Option<String>,
    pub health_score: Option<f64>,
    pub maint_due_hours: Option<f64>,
    pub wear_level: Option<f64>,
    pub power: Option<f64>,
    pub oee: Option<f64>,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    /// Map de métriques imbriquée telle que reçue (valeurs non numériques possibles)
    pub metrics: HashMap<String, Value>,
    pub parts: Vec<Part>,
}

impl Machine {
    /// Valeur numérique d'une métrique imbriquée, si présente et numérique
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(Value::as_f64)
    }
}

// Forme filaire à plat : le backend duplique les métriques en clés de premier niveau.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawMachine {
    #[serde(deserialize_with = "lenient::value")]
    id: String,
    #[serde(deserialize_with = "lenient::value")]
    name: String,
    #[serde(rename = "type", deserialize_with = "lenient::value")]
    machine_type: String,
    #[serde(deserialize_with = "lenient::value")]
    status: MachineStatus,
    #[serde(deserialize_with = "lenient::value")]
    error_code: Option<String>,
    #[serde(deserialize_with = "lenient::value")]
    last_fault: Option<String>,
    #[serde(deserialize_with = "lenient::value")]
    health_score: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    maint_due_hours: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    wear_level: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    power: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    oee: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    temperature: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    vibration: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    speed: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    speed_setting: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    tool_wear: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    target_speed: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    load: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    load_count: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    current: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    efficiency: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    cycles: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    pass_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    pass_count: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    fail_count: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    jam_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    packed_count: Option<f64>,
    #[serde(deserialize_with = "lenient::value")]
    metrics: HashMap<String, Value>,
    #[serde(deserialize_with = "lenient::seq")]
    parts: Vec<Part>,
}

impl RawMachine {
    fn pick(&self, flat: Option<f64>, key: &str) -> Option<f64> {
        flat.or_else(|| self.metrics.get(key).and_then(Value::as_f64))
    }

    fn kind(&self) -> MachineKind {
        match self.machine_type.as_str() {
            "Cutter" => MachineKind::Cutter {
                speed: self.pick(self.speed, "speed"),
                speed_setting: self.pick(self.speed_setting, "speed_setting"),
                tool_wear: self.pick(self.tool_wear, "tool_wear"),
            },
            "RobotArm" | "Robot Arm" => MachineKind::RobotArm {
                load: self.pick(self.load, "load"),
                current: self.pick(self.current, "current"),
                efficiency: self.pick(self.efficiency, "efficiency"),
                cycles: self.pick(self.cycles, "cycles"),
            },
            "Conveyor" => MachineKind::Conveyor {
                speed: self.pick(self.speed, "speed"),
                target_speed: self.pick(self.target_speed, "target_speed"),
                load: self.pick(self.load, "load"),
                load_count: self.pick(self.load_count, "load_count"),
            },
            "Inspector" => MachineKind::Inspector {
                pass_rate: self.pick(self.pass_rate, "pass_rate"),
                pass_count: self.pick(self.pass_count, "pass_count"),
                fail_count: self.pick(self.fail_count, "fail_count"),
            },
            "Packer" => MachineKind::Packer {
                jam_rate: self.pick(self.jam_rate, "jam_rate"),
                packed_count: self.pick(self.packed_count, "packed_count"),
                efficiency: self.pick(self.efficiency, "efficiency"),
            },
            other => MachineKind::Generic {
                type_name: other.to_string(),
            },
        }
    }
}

impl From<RawMachine> for Machine {
    fn from(raw: RawMachine) -> Self {
        let kind = raw.kind();
        let temperature = raw.pick(raw.temperature, "temperature");
        let vibration = raw.pick(raw.vibration, "vibration");
        Machine {
            id: raw.id,
            name: raw.name,
            kind,
            status: raw.status,
            error_code: raw.error_code,
            last_fault: raw.last_fault,
            health_score: raw.health_score,
            maint_due_hours: raw.maint_due_hours,
            wear_level: raw.wear_level,
            power: raw.power,
            oee: raw.oee,
            temperature,
            vibration,
            metrics: raw.metrics,
            parts: raw.parts,
        }
    }
}

impl From<Machine> for RawMachine {
    fn from(m: Machine) -> Self {
        let mut raw = RawMachine {
            id: m.id,
            name: m.name,
            machine_type: m.kind.type_name().to_string(),
            status: m.status,
            error_code: m.error_code,
            last_fault: m.last_fault,
            health_score: m.health_score,
            maint_due_hours: m.maint_due_hours,
            wear_level: m.wear_level,
            power: m.power,
            oee: m.oee,
            temperature: m.temperature,
            vibration: m.vibration,
            metrics: m.metrics,
            parts: m.parts,
            ..RawMachine::default()
        };
        match m.kind {
            MachineKind::Cutter { speed, speed_setting, tool_wear } => {
                raw.speed = speed;
                raw.speed_setting = speed_setting;
                raw.tool_wear = tool_wear;
            }
            MachineKind::RobotArm { load, current, efficiency, cycles } => {
                raw.load = load;
                raw.current = current;
                raw.efficiency = efficiency;
                raw.cycles = cycles;
            }
            MachineKind::Conveyor { speed, target_speed, load, load_count } => {
                raw.speed = speed;
                raw.target_speed = target_speed;
                raw.load = load;
                raw.load_count = load_count;
            }
            MachineKind::Inspector { pass_rate, pass_count, fail_count } => {
                raw.pass_rate = pass_rate;
                raw.pass_count = pass_count;
                raw.fail_count = fail_count;
            }
            MachineKind::Packer { jam_rate, packed_count, efficiency } => {
                raw.jam_rate = jam_rate;
                raw.packed_count = packed_count;
                raw.efficiency = efficiency;
            }
            MachineKind::Generic { .. } => {}
        }
        raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Vibration,
    System,
    Blockage,
    Temperature,
    Power,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    #[serde(alias = "warning")]
    Medium,
    Low,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Alerte, venue d'un snapshot ou générée localement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default, deserialize_with = "lenient::value")]
    pub id: String,
    #[serde(rename = "machineId", default, deserialize_with = "lenient::value")]
    pub machine_id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::value")]
    pub alert_type: AlertType,
    #[serde(default, deserialize_with = "lenient::value")]
    pub severity: Severity,
    #[serde(default, deserialize_with = "lenient::value")]
    pub message: String,
    /// Millisecondes depuis l'epoch
    #[serde(default, deserialize_with = "lenient::value")]
    pub timestamp: f64,
    #[serde(default, deserialize_with = "lenient::opt_count", skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, deserialize_with = "lenient::value")]
    pub resolved: bool,
    // texte libre produit par l'assistant du backend, toute autre forme est ignorée
    #[serde(default, deserialize_with = "lenient::value", skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(default, deserialize_with = "lenient::value", skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Production,
    Assembly,
    Testing,
    Ready,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Production => "Production",
            OrderStatus::Assembly => "Assembly",
            OrderStatus::Testing => "Testing",
            OrderStatus::Ready => "Ready",
            OrderStatus::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default, deserialize_with = "lenient::value")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub customer: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub product: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub quantity: u32,
    /// 0 à 100
    #[serde(default, deserialize_with = "lenient::value")]
    pub progress: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub status: OrderStatus,
    /// Date ISO
    #[serde(default, deserialize_with = "lenient::value")]
    pub due: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub priority: Priority,
    #[serde(rename = "createdAt", default, deserialize_with = "lenient::value", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::seq", skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, deserialize_with = "lenient::value", skip_serializing_if = "Option::is_none")]
    pub workstation: Option<String>,
    #[serde(rename = "lastEvent", default, deserialize_with = "lenient::value", skip_serializing_if = "Option::is_none")]
    pub last_event: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_count", skip_serializing_if = "Option::is_none")]
    pub fulfilled: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StockStatus {
    #[default]
    Ok,
    Low,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(default, deserialize_with = "lenient::value")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub unit: String,
    #[serde(default, deserialize_with = "lenient::value")]
    pub safety_stock: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub reorder_point: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub status: StockStatus,
    #[serde(default, deserialize_with = "lenient::value")]
    pub trend: Trend,
    #[serde(default, deserialize_with = "lenient::value")]
    pub cost_per_unit: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub total_value: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub last_updated: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    #[serde(default, deserialize_with = "lenient::value")]
    pub revenue: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub costs: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub profit: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub cash: Option<f64>,
    #[serde(default, deserialize_with = "lenient::value")]
    pub assets: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    #[serde(default, deserialize_with = "lenient::value")]
    pub total_output: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub avg_cycle_time: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub energy_usage: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub defect_rate: f64,
    #[serde(default, deserialize_with = "lenient::value")]
    pub avg_efficiency: Option<f64>,
}

/// Décodeurs de champ qui n'échouent jamais sur du JSON valide : `null` ou
/// une valeur d'un type inattendu donne la valeur par défaut du champ.
pub mod lenient {
    use serde::de::{DeserializeOwned, Deserializer};
    use serde::Deserialize;
    use serde_json::Value;

    pub fn value<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let raw = Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(raw).unwrap_or_default())
    }

    /// Éléments indécodables ignorés ; un non-tableau donne une liste vide
    pub fn seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(opt_seq(deserializer)?.unwrap_or_default())
    }

    /// Comme [`seq`], mais tout non-tableau donne `None`
    pub fn opt_seq<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value(item).ok())
                    .collect(),
            ),
            _ => None,
        })
    }

    /// Compteur positif ; les flottants sont tronqués (`3.0` et `3.7` donnent 3)
    pub fn count<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_count(deserializer)?.unwrap_or_default())
    }

    pub fn opt_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Ok(raw
            .as_f64()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n.min(u32::MAX as f64) as u32))
    }
}
