//! Client REST du backend usine
//!
//! Chaque requête part une seule fois : pas de retry, pas de timeout
//! au-delà de celui de reqwest, pas de déduplication.

use crate::error::{ConsoleError, Result};
use crate::models::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineCommand {
    Start,
    Stop,
    Reset,
}

impl MachineCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            MachineCommand::Start => "start",
            MachineCommand::Stop => "stop",
            MachineCommand::Reset => "reset",
        }
    }
}

impl fmt::Display for MachineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MachineCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "start" => Ok(MachineCommand::Start),
            "stop" => Ok(MachineCommand::Stop),
            "reset" => Ok(MachineCommand::Reset),
            other => Err(format!("unknown machine command: {other}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct AutonomyReply {
    enabled: bool,
}

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<reqwest::Response> {
        debug!("POST {path}");
        let response = self.http.post(self.url(path)).json(&body).send().await?;
        check_status(response)
    }

    /// POST /api/v1/machines/{id}/control
    ///
    /// Le backend répond 200 avec `{"status": "error"}` quand la commande
    /// n'a pas atteint la simulation ; c'est compté comme un échec.
    pub async fn control_machine(&self, machine_id: &str, command: MachineCommand) -> Result<()> {
        let path = format!("/api/v1/machines/{machine_id}/control");
        let response = self.post_json(&path, json!({ "command": command })).await?;
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if body.get("status").and_then(Value::as_str) == Some("error") {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("command rejected")
                .to_string();
            return Err(ConsoleError::Rejected(message));
        }
        Ok(())
    }

    /// POST /api/v1/chat, retourne le texte brut de l'assistant
    pub async fn chat(&self, message: &str) -> Result<String> {
        let response = self.post_json("/api/v1/chat", json!({ "message": message })).await?;
        let reply: ChatReply = response.json().await?;
        Ok(reply.response)
    }

    /// GET /api/autonomy
    pub async fn autonomy(&self) -> Result<bool> {
        let response = check_status(self.http.get(self.url("/api/autonomy")).send().await?)?;
        let reply: AutonomyReply = response.json().await?;
        Ok(reply.enabled)
    }

    /// POST /api/autonomy
    pub async fn set_autonomy(&self, enabled: bool) -> Result<()> {
        self.post_json("/api/autonomy", json!({ "enabled": enabled })).await?;
        Ok(())
    }

    /// POST /api/reset (destructif : efface les données du backend)
    pub async fn reset(&self) -> Result<()> {
        self.post_json("/api/reset", json!({})).await?;
        Ok(())
    }

    /// GET /api/v1/latest ; `None` tant que le backend n'a pas de données
    pub async fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        let response = check_status(self.http.get(self.url("/api/v1/latest")).send().await?)?;
        let body: Value = response.json().await?;
        match &body {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            _ => Ok(Some(serde_json::from_value(body)?)),
        }
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ConsoleError::Status {
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_names() {
        assert_eq!(json!({ "command": MachineCommand::Stop }), json!({ "command": "stop" }));
        assert_eq!("reset".parse::<MachineCommand>(), Ok(MachineCommand::Reset));
        assert!("explode".parse::<MachineCommand>().is_err());
        assert_eq!(MachineCommand::Start.to_string(), "start");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = BackendClient::new("http://localhost:8000/");
        assert_eq!(client.url("/api/reset"), "http://localhost:8000/api/reset");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = BackendClient::new(format!("http://127.0.0.1:{port}"));
        let err = client.set_autonomy(true).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Transport(_)));
    }
}
