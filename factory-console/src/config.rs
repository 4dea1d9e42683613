//! Configuration de la console
//!
//! Sources, de la plus faible à la plus forte :
//! - valeurs par défaut localhost
//! - fichier YAML optionnel (`FACTORY_CONSOLE_CONFIG`, défaut `console.yaml`)
//! - variables d'environnement (`FACTORY_API_URL`, `FACTORY_WS_URL`,
//!   `FACTORY_RECONNECT_MS`, `FACTORY_VIEW_ADDR`), `.env` compris

use crate::error::ConfigError;
use crate::selection::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws/realtime";
pub const DEFAULT_RECONNECT_MS: u64 = 3000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// URL de base de l'API REST du backend
    pub api_url: String,
    /// Endpoint temps réel des snapshots
    pub ws_url: String,
    /// Délai fixe avant chaque tentative de reconnexion
    pub reconnect_delay_ms: u64,
    /// Sort de la sélection quand sa machine quitte le snapshot
    pub selection_policy: SelectionPolicy,
    /// Adresse d'écoute de l'API de vue locale
    pub view_addr: SocketAddr,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            ws_url: DEFAULT_WS_URL.into(),
            reconnect_delay_ms: DEFAULT_RECONNECT_MS,
            selection_policy: SelectionPolicy::default(),
            view_addr: SocketAddr::from(([127, 0, 0, 1], 8090)),
        }
    }
}

impl ConsoleConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub async fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&txt)?)
    }

    /// Applique les variables d'env ; `lookup` retourne la valeur brute
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = non_empty(lookup("FACTORY_API_URL")) {
            self.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = non_empty(lookup("FACTORY_WS_URL")) {
            self.ws_url = url;
        }
        if let Some(ms) = non_empty(lookup("FACTORY_RECONNECT_MS")) {
            self.reconnect_delay_ms = ms.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "FACTORY_RECONNECT_MS",
                value: ms.clone(),
            })?;
        }
        if let Some(addr) = non_empty(lookup("FACTORY_VIEW_ADDR")) {
            self.view_addr = addr.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "FACTORY_VIEW_ADDR",
                value: addr.clone(),
            })?;
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// N'échoue jamais : fichier ou variable invalide -> défauts + warning
pub async fn load_config() -> ConsoleConfig {
    let path = std::env::var("FACTORY_CONSOLE_CONFIG").unwrap_or_else(|_| "console.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        ConsoleConfig::from_yaml_file(Path::new(&path))
            .await
            .unwrap_or_else(|e| {
                warn!("config {path} ignored: {e}");
                ConsoleConfig::default()
            })
    } else {
        info!("no {path}, using default config");
        ConsoleConfig::default()
    };

    if let Err(e) = cfg.apply_env(|key| std::env::var(key).ok()) {
        warn!("environment override ignored: {e}");
    }
    cfg
}
