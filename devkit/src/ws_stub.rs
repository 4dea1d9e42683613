/*!
Serveur WebSocket de snapshots pour tests sans backend

Écoute sur `127.0.0.1:0`, accepte les connexions sur n'importe quel
chemin et diffuse à tous les clients connectés les trames poussées par le
test. Peut fermer toutes les connexions pour simuler une coupure.
*/

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum StubFrame {
    Text(String),
    Close,
}

/// Stub du endpoint `/ws/realtime`
pub struct WsStub {
    addr: SocketAddr,
    frames: broadcast::Sender<StubFrame>,
    accepted: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl WsStub {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (frames, _) = broadcast::channel(64);
        let accepted = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(0));

        let accept_task = {
            let frames = frames.clone();
            let accepted = accepted.clone();
            let live = live.clone();
            tokio::spawn(async move {
                while let Ok((stream, peer)) = listener.accept().await {
                    let ws = match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(e) => {
                            log::warn!("⚠️ [WS STUB] handshake refusé pour {peer}: {e}");
                            continue;
                        }
                    };
                    let mut rx = frames.subscribe();
                    accepted.fetch_add(1, Ordering::SeqCst);
                    live.fetch_add(1, Ordering::SeqCst);
                    log::info!("🔌 [WS STUB] client connecté: {peer}");

                    let live = live.clone();
                    tokio::spawn(async move {
                        let (mut sink, mut incoming) = ws.split();
                        loop {
                            tokio::select! {
                                frame = rx.recv() => match frame {
                                    Ok(StubFrame::Text(text)) => {
                                        if sink.send(Message::Text(text)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(StubFrame::Close) | Err(_) => {
                                        let _ = sink.send(Message::Close(None)).await;
                                        break;
                                    }
                                },
                                msg = incoming.next() => match msg {
                                    Some(Ok(_)) => {}
                                    Some(Err(_)) | None => break,
                                },
                            }
                        }
                        live.fetch_sub(1, Ordering::SeqCst);
                        log::info!("🔌 [WS STUB] client déconnecté: {peer}");
                    });
                }
            })
        };

        log::info!("🚀 [WS STUB] en écoute sur ws://{addr}/ws/realtime");
        Ok(Self {
            addr,
            frames,
            accepted,
            live,
            accept_task,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws/realtime", self.addr)
    }

    /// Diffuse une trame texte brute (JSON ou non)
    pub fn send_text<S: Into<String>>(&self, text: S) {
        let _ = self.frames.send(StubFrame::Text(text.into()));
    }

    pub fn send_snapshot(&self, snapshot: &Value) {
        self.send_text(snapshot.to_string());
    }

    /// Ferme toutes les connexions en cours (le serveur continue d'accepter)
    pub fn close_all(&self) {
        let _ = self.frames.send(StubFrame::Close);
    }

    /// Nombre total de connexions acceptées depuis le démarrage
    pub fn accepted_connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Attend au moins `count` connexions acceptées au total
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if self.accepted_connections() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        log::warn!("⏰ [WS STUB] timeout en attente de {count} connexions");
        false
    }
}

impl Drop for WsStub {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}
