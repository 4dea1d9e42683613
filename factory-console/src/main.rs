/**
 * FACTORY CONSOLE - Point d'entrée de la console headless
 *
 * DÉMARRAGE :
 * config -> hub -> amorçage via /api/v1/latest -> tâche de connexion
 * temps réel -> API de vue. Ctrl-C arrête la boucle de connexion et le
 * serveur HTTP ensemble.
 */

use anyhow::{Context, Result};
use factory_console::config::load_config;
use factory_console::http::{self, AppState};
use factory_console::{
    BackendClient, CommandDispatcher, ConnectionManager, FactoryHub, HubEvent, WsConnector,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("factory_console=info")),
        )
        .init();

    let cfg = load_config().await;
    info!("backend {} / stream {}", cfg.api_url, cfg.ws_url);

    let hub = FactoryHub::new(cfg.selection_policy);
    let client = BackendClient::new(cfg.api_url.clone());
    let commands = CommandDispatcher::new(hub.clone(), client.clone());

    // premier affichage sans attendre le flux
    match client.latest_snapshot().await {
        Ok(Some(snapshot)) => {
            hub.apply_snapshot(snapshot);
            info!("seeded from latest backend snapshot");
        }
        Ok(None) => debug!("backend has no snapshot yet"),
        Err(e) => warn!("could not fetch latest snapshot: {e}"),
    }
    if let Err(e) = commands.refresh_autonomy().await {
        warn!("could not fetch autonomy status: {e}");
    }

    spawn_event_logger(hub.subscribe());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let manager = ConnectionManager::new(WsConnector, cfg.ws_url.clone(), cfg.reconnect_delay(), hub.clone());
    let connection = tokio::spawn(manager.run(shutdown_rx.clone()));

    let app = http::build_router(AppState { hub, commands });
    let listener = TcpListener::bind(cfg.view_addr)
        .await
        .with_context(|| format!("failed to bind view API on {}", cfg.view_addr))?;
    info!("view API listening on http://{}", cfg.view_addr);

    let mut server_shutdown = shutdown_rx;
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    };

    tokio::select! {
        res = server => res.context("view API server failed")?,
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    let _ = shutdown_tx.send(true);
    connection.await.context("connection task panicked")?;
    info!("factory console stopped");
    Ok(())
}

/// Événements de cycle de vie en info, détail par trame en debug
fn spawn_event_logger(mut events: broadcast::Receiver<HubEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(HubEvent::Connection(true)) => info!("🟢 realtime connected"),
                Ok(HubEvent::Connection(false)) => warn!("🔴 realtime disconnected"),
                Ok(HubEvent::AutonomyChanged(enabled)) => info!("autonomy: {enabled:?}"),
                Ok(event) => debug!("hub event {event:?}"),
                Err(broadcast::error::RecvError::Lagged(n)) => debug!("event logger skipped {n} events"),
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
