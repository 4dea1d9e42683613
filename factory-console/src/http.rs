/**
 * API DE VUE - Surface HTTP locale de la console
 *
 * RÔLE :
 * Expose l'état dérivé du hub à une couche de rendu et relaie ses actions
 * utilisateur (résolution, sélection, contrôle, chat...) vers le hub et le
 * command dispatcher. Écoute sur loopback par défaut.
 *
 * ROUTES :
 * - /health, /status, /snapshot
 * - /alerts (+ /alerts/filter, /alerts/{id}/resolve)
 * - /selection, /machines/{id}/control
 * - /autonomy, /chat, /reset
 * - /orders, /orders/validate, /utilization, /inventory/attention
 */

use crate::alerts::{AlertFilter, TimeRange};
use crate::api::MachineCommand;
use crate::chat::ChatMessage;
use crate::commands::{CommandDispatcher, ResetOutcome};
use crate::hub::{FactoryHub, HubStatus};
use crate::models::{Alert, InventoryItem, Machine, Order, Snapshot};
use crate::views::{self, HealthBand, InventorySummary, MetricEntry, OrderDraft, OrderSort, Utilization};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    pub hub: FactoryHub,
    pub commands: CommandDispatcher,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl ToString) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(get_status))
        .route("/snapshot", get(get_snapshot))
        .route("/alerts", get(list_alerts).delete(clear_alerts))
        .route("/alerts/filter", get(get_filter).put(set_filter))
        .route("/alerts/{id}/resolve", post(resolve_alert))
        .route("/selection", get(get_selection).put(set_selection))
        .route("/machines/{id}/control", post(control_machine))
        .route("/autonomy", get(get_autonomy).post(set_autonomy))
        .route("/chat", get(get_chat).post(post_chat))
        .route("/reset", post(reset_factory))
        .route("/orders", get(list_orders))
        .route("/orders/validate", post(validate_order))
        .route("/utilization", get(get_utilization))
        .route("/inventory/attention", get(get_inventory_attention))
        .with_state(app_state)
}

// GET /status
async fn get_status(State(app): State<AppState>) -> Json<HubStatus> {
    Json(app.hub.status())
}

// GET /snapshot (404 avant la première trame)
async fn get_snapshot(State(app): State<AppState>) -> Result<Json<Snapshot>, StatusCode> {
    let snap = app.hub.snapshot().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(Snapshot::clone(&snap)))
}

// ============ ALERTES ============

#[derive(Debug, Default, Deserialize)]
struct AlertQuery {
    severity: Option<String>,
    #[serde(rename = "type")]
    alert_type: Option<String>,
    machine: Option<String>,
    from: Option<f64>,
    to: Option<f64>,
}

impl AlertQuery {
    fn is_empty(&self) -> bool {
        self.severity.is_none()
            && self.alert_type.is_none()
            && self.machine.is_none()
            && self.from.is_none()
            && self.to.is_none()
    }

    fn to_filter(&self) -> AlertFilter {
        let mut filter = AlertFilter {
            severity: comma_list(self.severity.as_deref()),
            alert_type: comma_list(self.alert_type.as_deref()),
            ..AlertFilter::default()
        };
        filter.machine_id = self
            .machine
            .as_deref()
            .map(|s| split_list(s).map(str::to_string).collect())
            .unwrap_or_default();
        if self.from.is_some() || self.to.is_some() {
            filter.time_range = Some(TimeRange {
                from: self.from.unwrap_or(f64::MIN),
                to: self.to.unwrap_or(f64::MAX),
            });
        }
        filter
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

// Tolérant : un nom inconnu tombe dans la variante fourre-tout
fn comma_list<T: DeserializeOwned + Ord>(raw: Option<&str>) -> std::collections::BTreeSet<T> {
    raw.map(|s| {
        split_list(s)
            .filter_map(|item| serde_json::from_value(json!(item.to_lowercase())).ok())
            .collect()
    })
    .unwrap_or_default()
}

// GET /alerts?severity=critical,high&type=..&machine=..&from=..&to=..
async fn list_alerts(State(app): State<AppState>, Query(q): Query<AlertQuery>) -> Json<Vec<Alert>> {
    if q.is_empty() {
        Json(app.hub.visible_alerts(None))
    } else {
        Json(app.hub.visible_alerts(Some(&q.to_filter())))
    }
}

// DELETE /alerts (local seulement, le snapshot suivant repeuple)
async fn clear_alerts(State(app): State<AppState>) -> StatusCode {
    app.hub.clear_alerts();
    StatusCode::NO_CONTENT
}

async fn get_filter(State(app): State<AppState>) -> Json<AlertFilter> {
    Json(app.hub.filter())
}

async fn set_filter(State(app): State<AppState>, Json(filter): Json<AlertFilter>) -> Json<AlertFilter> {
    app.hub.set_filter(filter.clone());
    Json(filter)
}

// POST /alerts/{id}/resolve
async fn resolve_alert(State(app): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    if app.hub.resolve_alert(&id) {
        Ok(Json(json!({ "resolved": id })))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, format!("unknown alert {id}")))
    }
}

// ============ SÉLECTION / MACHINES ============

#[derive(Debug, Serialize)]
struct SelectionView {
    machine: Option<Machine>,
    stale: bool,
    metrics: Vec<MetricEntry>,
    health: Option<HealthBand>,
    efficiency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SelectRequest {
    id: Option<String>,
}

async fn get_selection(State(app): State<AppState>) -> Json<SelectionView> {
    let machine = app.hub.selected();
    Json(SelectionView {
        metrics: machine.as_ref().map(views::display_metrics).unwrap_or_default(),
        health: machine.as_ref().map(|m| HealthBand::of(m.health_score)),
        efficiency: machine.as_ref().map(views::efficiency_proxy),
        stale: app.hub.selection_is_stale(),
        machine,
    })
}

// PUT /selection {"id": "L1-CUT-01"}, ou {"id": null} pour effacer
async fn set_selection(State(app): State<AppState>, Json(req): Json<SelectRequest>) -> Result<StatusCode, ApiError> {
    match req.id {
        None => {
            app.hub.select(None);
            Ok(StatusCode::NO_CONTENT)
        }
        Some(id) if app.hub.select_by_id(&id) => Ok(StatusCode::NO_CONTENT),
        Some(id) => Err(api_error(StatusCode::NOT_FOUND, format!("machine {id} not in snapshot"))),
    }
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    command: MachineCommand,
}

// POST /machines/{id}/control : accepté tout de suite, un échec devient une alerte
async fn control_machine(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ControlRequest>,
) -> StatusCode {
    app.commands.dispatch_control(&id, req.command);
    StatusCode::ACCEPTED
}

// ============ AUTONOMIE / CHAT / RESET ============

#[derive(Debug, Deserialize)]
struct AutonomyRequest {
    enabled: bool,
}

async fn get_autonomy(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "enabled": app.hub.autonomy() }))
}

async fn set_autonomy(State(app): State<AppState>, Json(req): Json<AutonomyRequest>) -> Result<Json<serde_json::Value>, ApiError> {
    app.commands
        .toggle_autonomy(req.enabled)
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({ "enabled": req.enabled })))
}

#[derive(Debug, Serialize)]
struct ChatView {
    #[serde(flatten)]
    message: ChatMessage,
    display: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

async fn get_chat(State(app): State<AppState>) -> Json<Vec<ChatView>> {
    let views = app
        .hub
        .chat_messages()
        .into_iter()
        .map(|message| ChatView {
            display: message.display_text(),
            message,
        })
        .collect();
    Json(views)
}

async fn post_chat(State(app): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Json<serde_json::Value>, StatusCode> {
    let reply = app.commands.send_chat(&req.message).await.ok_or(StatusCode::NO_CONTENT)?;
    Ok(Json(json!({ "response": reply, "display": crate::chat::display_text(&reply) })))
}

#[derive(Debug, Default, Deserialize)]
struct ResetParams {
    #[serde(default)]
    confirm: bool,
}

// POST /reset?confirm=true
async fn reset_factory(State(app): State<AppState>, Query(params): Query<ResetParams>) -> Result<Json<serde_json::Value>, ApiError> {
    match app.commands.reset_factory(|| params.confirm).await {
        Ok(ResetOutcome::Reset) => Ok(Json(json!({ "reset": true }))),
        Ok(ResetOutcome::Declined) => Err(api_error(StatusCode::PRECONDITION_REQUIRED, "confirmation required")),
        Err(e) => Err(api_error(StatusCode::BAD_GATEWAY, e)),
    }
}

// ============ VUES DÉRIVÉES ============

#[derive(Debug, Default, Deserialize)]
struct OrderQuery {
    #[serde(default)]
    q: String,
    #[serde(default)]
    sort: OrderSort,
}

async fn list_orders(State(app): State<AppState>, Query(q): Query<OrderQuery>) -> Json<Vec<Order>> {
    let Some(snap) = app.hub.snapshot() else {
        return Json(Vec::new());
    };
    Json(views::search_orders(&snap.orders, &q.q, q.sort).into_iter().cloned().collect())
}

async fn validate_order(Json(draft): Json<OrderDraft>) -> Result<StatusCode, ApiError> {
    draft
        .validate()
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))
}

async fn get_utilization(State(app): State<AppState>) -> Json<Utilization> {
    Json(app.hub.snapshot().map(|s| views::utilization(&s)).unwrap_or_default())
}

#[derive(Debug, Serialize)]
struct InventoryAttention {
    summary: InventorySummary,
    items: Vec<InventoryItem>,
}

async fn get_inventory_attention(State(app): State<AppState>) -> Json<InventoryAttention> {
    let items = app.hub.snapshot().map(|s| s.inventory.clone()).unwrap_or_default();
    Json(InventoryAttention {
        summary: views::inventory_summary(&items),
        items: views::needs_attention(&items).into_iter().cloned().collect(),
    })
}
