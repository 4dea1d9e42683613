/*!
Constructeurs JSON de snapshots usine

Produit des messages au format exact poussé par le backend sur
`/ws/realtime` (machines à plat + map `metrics` imbriquée, alertes en
`machineId`, timestamps en millisecondes pour les alertes).
*/

use serde_json::{json, Map, Value};

/// Messages unitaires (machines, alertes, commandes, stock)
pub struct FactoryMessageBuilder;

impl FactoryMessageBuilder {
    /// Machine minimale; les métriques vont à plat ET dans `metrics`
    pub fn machine<S: Into<String>>(id: S, machine_type: &str, status: &str) -> Value {
        let id = id.into();
        json!({
            "id": id,
            "name": format!("{machine_type} {id}"),
            "type": machine_type,
            "status": status,
            "health_score": 100.0,
            "wear_level": 0.0,
            "metrics": {}
        })
    }

    /// Ajoute une métrique numérique aux deux emplacements
    pub fn with_metric(mut machine: Value, key: &str, value: f64) -> Value {
        if let Some(obj) = machine.as_object_mut() {
            obj.insert(key.to_string(), json!(value));
            if let Some(metrics) = obj.entry("metrics").or_insert_with(|| Value::Object(Map::new())).as_object_mut() {
                metrics.insert(key.to_string(), json!(value));
            }
        }
        machine
    }

    pub fn alert<S: Into<String>>(id: S, machine_id: &str, alert_type: &str, severity: &str) -> Value {
        json!({
            "id": id.into(),
            "machineId": machine_id,
            "type": alert_type,
            "severity": severity,
            "message": format!("{alert_type} anomaly on {machine_id}"),
            "timestamp": chrono::Utc::now().timestamp_millis() as f64,
            "count": 1,
            "resolved": false
        })
    }

    pub fn order<S: Into<String>>(id: S, customer: &str, due: &str, progress: f64) -> Value {
        json!({
            "id": id.into(),
            "customer": customer,
            "product": "Smart Watch X1",
            "quantity": 100,
            "progress": progress,
            "status": "Production",
            "due": due,
            "priority": "Medium",
            "createdAt": chrono::Utc::now().to_rfc3339()
        })
    }

    pub fn inventory_item<S: Into<String>>(id: S, quantity: f64, status: &str, cost_per_unit: f64) -> Value {
        json!({
            "id": id.into(),
            "name": "Aluminum Case",
            "category": "Raw Material",
            "quantity": quantity,
            "unit": "pcs",
            "safety_stock": 50.0,
            "reorder_point": 100.0,
            "status": status,
            "trend": "flat",
            "cost_per_unit": cost_per_unit,
            "total_value": quantity * cost_per_unit,
            "last_updated": chrono::Utc::now().timestamp() as f64
        })
    }
}

struct LineFixture {
    id: String,
    name: String,
    machines: Vec<Value>,
}

/// Snapshot complet construit pas à pas
pub struct SnapshotBuilder {
    timestamp: f64,
    lines: Vec<LineFixture>,
    alerts: Option<Vec<Value>>,
    inventory: Vec<Value>,
    orders: Vec<Value>,
    financials: Option<Value>,
    kpi: Option<Value>,
    autonomy_enabled: Option<bool>,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp() as f64,
            lines: Vec::new(),
            alerts: Some(Vec::new()),
            inventory: Vec::new(),
            orders: Vec::new(),
            financials: None,
            kpi: None,
            autonomy_enabled: None,
        }
    }

    pub fn timestamp(mut self, ts: f64) -> Self {
        self.timestamp = ts;
        self
    }

    pub fn line<S: Into<String>>(mut self, id: S, name: &str) -> Self {
        self.lines.push(LineFixture {
            id: id.into(),
            name: name.to_string(),
            machines: Vec::new(),
        });
        self
    }

    /// Ajoute la machine à la dernière ligne (crée `L1` si aucune)
    pub fn machine(mut self, machine: Value) -> Self {
        if self.lines.is_empty() {
            self = self.line("L1", "Line 1");
        }
        if let Some(line) = self.lines.last_mut() {
            line.machines.push(machine);
        }
        self
    }

    pub fn alert(mut self, alert: Value) -> Self {
        self.alerts.get_or_insert_with(Vec::new).push(alert);
        self
    }

    /// Message sans champ `alerts` du tout
    pub fn without_alerts(mut self) -> Self {
        self.alerts = None;
        self
    }

    pub fn order(mut self, order: Value) -> Self {
        self.orders.push(order);
        self
    }

    pub fn inventory_item(mut self, item: Value) -> Self {
        self.inventory.push(item);
        self
    }

    pub fn financials(mut self, revenue: f64, costs: f64) -> Self {
        self.financials = Some(json!({ "revenue": revenue, "costs": costs, "profit": revenue - costs }));
        self
    }

    pub fn kpi(mut self, total_output: f64, defect_rate: f64) -> Self {
        self.kpi = Some(json!({
            "total_output": total_output,
            "avg_cycle_time": 12.5,
            "energy_usage": 340.0,
            "defect_rate": defect_rate
        }));
        self
    }

    pub fn autonomy(mut self, enabled: bool) -> Self {
        self.autonomy_enabled = Some(enabled);
        self
    }

    pub fn build(self) -> Value {
        let lines: Vec<Value> = self
            .lines
            .into_iter()
            .map(|l| {
                json!({
                    "id": l.id,
                    "name": l.name,
                    "product_type": "Smart Watch X1",
                    "machines": l.machines
                })
            })
            .collect();

        let mut snap = json!({
            "timestamp": self.timestamp,
            "lines": lines,
            "inventory": self.inventory,
            "orders": self.orders,
        });
        if let Some(obj) = snap.as_object_mut() {
            if let Some(alerts) = self.alerts {
                obj.insert("alerts".into(), Value::Array(alerts));
            }
            if let Some(f) = self.financials {
                obj.insert("financials".into(), f);
            }
            if let Some(k) = self.kpi {
                obj.insert("kpi".into(), k);
            }
            if let Some(a) = self.autonomy_enabled {
                obj.insert("autonomy_enabled".into(), Value::Bool(a));
            }
        }
        snap
    }

    pub fn to_json(self) -> String {
        self.build().to_string()
    }
}

/// Usine de démo: une ligne de cinq machines, une alerte, une commande
pub fn sample_factory() -> Value {
    let m = FactoryMessageBuilder::machine;
    let with = FactoryMessageBuilder::with_metric;
    SnapshotBuilder::new()
        .line("L1", "Line 1")
        .machine(with(with(m("L1-CUT-01", "Cutter", "RUNNING"), "speed", 1500.0), "temperature", 42.0))
        .machine(with(m("L1-ROB-01", "RobotArm", "RUNNING"), "efficiency", 92.0))
        .machine(with(m("L1-CON-01", "Conveyor", "IDLE"), "speed", 0.6))
        .machine(with(m("L1-INS-01", "Inspector", "RUNNING"), "pass_rate", 98.5))
        .machine(with(m("L1-PAC-01", "Packer", "ERROR"), "jam_rate", 2.5))
        .alert(FactoryMessageBuilder::alert("a-1", "L1-PAC-01", "blockage", "high"))
        .order(FactoryMessageBuilder::order("ORD-1001", "Acme Corp", "2026-11-30", 40.0))
        .inventory_item(FactoryMessageBuilder::inventory_item("INV-1", 30.0, "CRITICAL", 4.5))
        .financials(125_000.0, 80_000.0)
        .kpi(1250.0, 0.8)
        .build()
}
