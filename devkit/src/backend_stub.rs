/*!
Mock du backend REST de l'usine

Serveur Axum local qui enregistre chaque requête reçue et permet
d'injecter des pannes par famille de routes:
- `POST /api/v1/machines/{id}/control`
- `POST /api/v1/chat`
- `GET|POST /api/autonomy`
- `POST /api/reset`
- `GET /api/v1/latest`
*/

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Value,
}

/// Panne injectée: statut HTTP renvoyé après un délai optionnel
#[derive(Debug, Clone, Copy)]
pub struct Failure {
    pub status: u16,
    pub delay: Duration,
}

impl Failure {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug)]
struct StubState {
    requests: Vec<RecordedRequest>,
    control_failure: Option<Failure>,
    control_rejection: Option<String>,
    chat_failure: Option<Failure>,
    chat_reply: String,
    autonomy: bool,
    autonomy_failure: Option<Failure>,
    reset_failure: Option<Failure>,
    latest: Value,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            control_failure: None,
            control_rejection: None,
            chat_failure: None,
            chat_reply: "All systems nominal.".into(),
            autonomy: true,
            autonomy_failure: None,
            reset_failure: None,
            latest: json!({}),
        }
    }
}

type Shared = Arc<Mutex<StubState>>;

/// Backend REST simulé
pub struct BackendStub {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl BackendStub {
    pub async fn start() -> Result<Self> {
        let state: Shared = Arc::new(Mutex::new(StubState::default()));
        let app = Router::new()
            .route("/api/v1/machines/{id}/control", post(control))
            .route("/api/v1/chat", post(chat))
            .route("/api/autonomy", get(get_autonomy).post(set_autonomy))
            .route("/api/reset", post(reset))
            .route("/api/v1/latest", get(latest))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ [BACKEND STUB] serveur arrêté: {e}");
            }
        });

        log::info!("🚀 [BACKEND STUB] en écoute sur http://{addr}");
        Ok(Self { addr, state, server })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Toutes les requêtes reçues, dans l'ordre d'arrivée
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Requêtes reçues sur un chemin exact
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn fail_control(&self, failure: Option<Failure>) {
        self.state.lock().control_failure = failure;
    }

    /// Réponse 200 avec `{"status": "error"}` (simulation déconnectée)
    pub fn reject_control<S: Into<String>>(&self, message: S) {
        self.state.lock().control_rejection = Some(message.into());
    }

    pub fn fail_chat(&self, failure: Option<Failure>) {
        self.state.lock().chat_failure = failure;
    }

    pub fn set_chat_reply<S: Into<String>>(&self, reply: S) {
        self.state.lock().chat_reply = reply.into();
    }

    pub fn autonomy(&self) -> bool {
        self.state.lock().autonomy
    }

    pub fn set_autonomy(&self, enabled: bool) {
        self.state.lock().autonomy = enabled;
    }

    /// Pannes sur les écritures `POST /api/autonomy`
    pub fn fail_autonomy(&self, failure: Option<Failure>) {
        self.state.lock().autonomy_failure = failure;
    }

    pub fn fail_reset(&self, failure: Option<Failure>) {
        self.state.lock().reset_failure = failure;
    }

    pub fn set_latest(&self, snapshot: Value) {
        self.state.lock().latest = snapshot;
    }
}

impl Drop for BackendStub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn record(state: &Shared, method: &str, path: String, body: Value) {
    log::info!("📥 [BACKEND STUB] {method} {path}");
    state.lock().requests.push(RecordedRequest {
        method: method.to_string(),
        path,
        body,
    });
}

async fn injected(failure: Option<Failure>) -> Option<(StatusCode, Json<Value>)> {
    let failure = failure?;
    if !failure.delay.is_zero() {
        tokio::time::sleep(failure.delay).await;
    }
    let status = StatusCode::from_u16(failure.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Some((status, Json(json!({ "detail": "injected failure" }))))
}

async fn control(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let command = body.get("command").and_then(Value::as_str).unwrap_or_default().to_string();
    record(&state, "POST", format!("/api/v1/machines/{id}/control"), body);

    let (failure, rejection) = {
        let st = state.lock();
        (st.control_failure, st.control_rejection.clone())
    };
    if let Some(resp) = injected(failure).await {
        return resp;
    }
    if let Some(message) = rejection {
        return (StatusCode::OK, Json(json!({ "status": "error", "message": message })));
    }
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "message": format!("Command {command} sent to {id}") })),
    )
}

async fn chat(State(state): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    record(&state, "POST", "/api/v1/chat".into(), body);
    let (failure, reply) = {
        let st = state.lock();
        (st.chat_failure, st.chat_reply.clone())
    };
    if let Some(resp) = injected(failure).await {
        return resp;
    }
    (StatusCode::OK, Json(json!({ "response": reply })))
}

async fn get_autonomy(State(state): State<Shared>) -> Json<Value> {
    record(&state, "GET", "/api/autonomy".into(), Value::Null);
    let enabled = state.lock().autonomy;
    Json(json!({ "enabled": enabled }))
}

async fn set_autonomy(State(state): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let enabled = body.get("enabled").and_then(Value::as_bool);
    record(&state, "POST", "/api/autonomy".into(), body);
    let failure = state.lock().autonomy_failure;
    if let Some(resp) = injected(failure).await {
        return resp;
    }
    let Some(enabled) = enabled else {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": "missing enabled" })));
    };
    state.lock().autonomy = enabled;
    (StatusCode::OK, Json(json!({ "enabled": enabled })))
}

async fn reset(State(state): State<Shared>) -> (StatusCode, Json<Value>) {
    record(&state, "POST", "/api/reset".into(), Value::Null);
    let failure = state.lock().reset_failure;
    if let Some(resp) = injected(failure).await {
        return resp;
    }
    state.lock().latest = json!({});
    (StatusCode::OK, Json(json!({ "status": "Reset Successful" })))
}

async fn latest(State(state): State<Shared>) -> Json<Value> {
    record(&state, "GET", "/api/v1/latest".into(), Value::Null);
    let snapshot = state.lock().latest.clone();
    Json(snapshot)
}
