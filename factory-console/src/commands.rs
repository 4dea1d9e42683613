/**
 * COMMAND DISPATCHER - Actions sortantes vers le backend
 *
 * Chaque opération est un appel REST dont l'échec est contenu ici :
 * - commande machine en échec -> alerte système locale
 * - bascule d'autonomie en échec -> retour à la valeur précédente
 * - chat en échec -> message d'excuse
 *
 * Aucun retry.
 */

use crate::api::{BackendClient, MachineCommand};
use crate::chat::UNREACHABLE;
use crate::error::Result;
use crate::hub::FactoryHub;
use crate::models::{Alert, AlertType, Severity};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Declined,
    Reset,
}

#[derive(Clone)]
pub struct CommandDispatcher {
    hub: FactoryHub,
    client: BackendClient,
}

impl CommandDispatcher {
    pub fn new(hub: FactoryHub, client: BackendClient) -> Self {
        Self { hub, client }
    }

    pub fn hub(&self) -> &FactoryHub {
        &self.hub
    }

    /// Envoie une commande machine. En cas d'échec une seule alerte système
    /// est ajoutée et l'erreur est renvoyée.
    pub async fn control_machine(&self, machine_id: &str, command: MachineCommand) -> Result<()> {
        match self.client.control_machine(machine_id, command).await {
            Ok(()) => {
                info!("command {command} sent to {machine_id}");
                Ok(())
            }
            Err(e) => {
                warn!("command {command} for {machine_id} failed: {e}");
                let now = chrono::Utc::now().timestamp_millis();
                self.hub.add_alert(Alert {
                    id: now.to_string(),
                    machine_id: machine_id.to_string(),
                    alert_type: AlertType::System,
                    severity: Severity::Medium,
                    message: format!("Failed to {command} machine: {e}"),
                    timestamp: now as f64,
                    count: None,
                    resolved: false,
                    suggested_action: None,
                    root_cause: None,
                });
                Err(e)
            }
        }
    }

    /// Variante fire-and-forget de [`control_machine`](Self::control_machine)
    pub fn dispatch_control(&self, machine_id: &str, command: MachineCommand) -> JoinHandle<()> {
        let this = self.clone();
        let machine_id = machine_id.to_string();
        tokio::spawn(async move {
            let _ = this.control_machine(&machine_id, command).await;
        })
    }

    /// Bascule optimiste : le hub change d'abord, un POST en échec annule
    /// sauf si une autre bascule a eu lieu entre-temps.
    pub async fn toggle_autonomy(&self, enabled: bool) -> Result<()> {
        let (generation, previous) = self.hub.begin_autonomy_toggle(enabled);
        match self.client.set_autonomy(enabled).await {
            Ok(()) => {
                info!("autonomy set to {enabled}");
                Ok(())
            }
            Err(e) => {
                if self.hub.revert_autonomy(generation, previous) {
                    warn!("autonomy toggle failed, reverted: {e}");
                } else {
                    warn!("autonomy toggle failed after a newer toggle, kept: {e}");
                }
                Err(e)
            }
        }
    }

    /// Lit le flag du backend ; ignoré si une bascule a croisé la requête
    pub async fn refresh_autonomy(&self) -> Result<bool> {
        let generation = self.hub.autonomy_generation();
        let enabled = self.client.autonomy().await?;
        self.hub.apply_fetched_autonomy(generation, enabled);
        Ok(enabled)
    }

    /// Reset destructif. `confirm` est demandé d'abord ; refusé, rien ne part.
    /// En cas de succès tout l'état client est rechargé.
    pub async fn reset_factory<F>(&self, confirm: F) -> Result<ResetOutcome>
    where
        F: FnOnce() -> bool,
    {
        if !confirm() {
            return Ok(ResetOutcome::Declined);
        }
        self.client.reset().await.inspect_err(|e| warn!("factory reset failed: {e}"))?;
        info!("factory reset accepted, reloading");
        self.hub.reload();
        Ok(ResetOutcome::Reset)
    }

    /// Un échange avec l'assistant. Saisie vide ignorée (`None`), sinon
    /// retourne le message final de l'assistant.
    pub async fn send_chat(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        self.hub.begin_chat(text);
        let reply = match self.client.chat(text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("chat request failed: {e}");
                UNREACHABLE.to_string()
            }
        };
        self.hub.complete_chat(reply.clone());
        Some(reply)
    }
}
