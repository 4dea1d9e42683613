//! Connexion temps réel au flux de snapshots du backend.
//!
//! Un seul socket à la fois. Chaque fermeture, erreur ou connexion ratée
//! passe le hub en déconnecté immédiatement et planifie exactement une
//! nouvelle tentative après le délai fixe. Pas de backoff, pas de plafond.

use crate::error::ConnectionError;
use crate::hub::FactoryHub;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Trame indépendante du transport
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping, pong et trames brutes
    Control,
    Close,
}

pub type FrameStream = BoxStream<'static, Result<Frame, ConnectionError>>;

/// Ouvre une connexion ; le flux se termine à la fermeture du socket
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<FrameStream, ConnectionError>>;
}

/// Transport WebSocket
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<FrameStream, ConnectionError>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws, _) = connect_async(url.as_str())
                .await
                .map_err(|e| ConnectionError::Connect(e.to_string()))?;

            let frames = ws.map(|msg| match msg {
                Ok(Message::Text(text)) => Ok(Frame::Text(text)),
                Ok(Message::Binary(bytes)) => Ok(Frame::Binary(bytes)),
                Ok(Message::Close(_)) => Ok(Frame::Close),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Ok(Frame::Control),
                Err(e) => Err(ConnectionError::Socket(e.to_string())),
            });
            Ok(frames.boxed())
        })
    }
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    url: String,
    delay: Duration,
    hub: FactoryHub,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, url: impl Into<String>, delay: Duration, hub: FactoryHub) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            url: url.into(),
            delay,
            hub,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ConnectionState) {
        self.state.send_replace(next);
        match next {
            ConnectionState::Connected => self.hub.set_connected(true),
            ConnectionState::Disconnected => self.hub.set_connected(false),
            ConnectionState::Connecting => {}
        }
    }

    /// Boucle de connexion ; rend la main quand `shutdown` passe à true ou que l'émetteur disparaît
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.transition(ConnectionState::Connecting);
            debug!("connecting to {}", self.url);
            let attempt = tokio::select! {
                res = self.connector.connect(&self.url) => res,
                _ = shutdown.changed() => break,
            };

            match attempt {
                Ok(mut frames) => {
                    self.transition(ConnectionState::Connected);
                    info!("realtime stream connected ({})", self.url);

                    loop {
                        tokio::select! {
                            frame = frames.next() => match frame {
                                Some(Ok(Frame::Text(text))) => {
                                    self.hub.apply_message(&text);
                                }
                                Some(Ok(Frame::Close)) | None => {
                                    info!("realtime stream closed");
                                    break;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!("realtime stream error: {e}");
                                    break;
                                }
                            },
                            _ = shutdown.changed() => {
                                drop(frames);
                                self.transition(ConnectionState::Disconnected);
                                info!("realtime stream shut down");
                                return;
                            }
                        }
                    }
                }
                Err(e) => warn!("realtime connect failed: {e}"),
            }

            self.transition(ConnectionState::Disconnected);
            debug!("reconnecting in {:?}", self.delay);
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.transition(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubEvent;
    use crate::selection::SelectionPolicy;
    use futures::stream;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::time::Instant;

    enum Script {
        Refuse,
        /// Livre les trames puis ferme
        Close(Vec<Frame>),
        /// Livre les trames puis reste ouvert
        Hold(Vec<Frame>),
    }

    #[derive(Clone, Default)]
    struct ScriptedConnector {
        scripts: Arc<Mutex<VecDeque<Script>>>,
        attempts: Arc<Mutex<Vec<Instant>>>,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Arc::new(Mutex::new(scripts.into())),
                attempts: Arc::default(),
            }
        }

        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().clone()
        }
    }

    impl Connector for ScriptedConnector {
        fn connect(&self, _url: &str) -> BoxFuture<'static, Result<FrameStream, ConnectionError>> {
            self.attempts.lock().push(Instant::now());
            let script = self.scripts.lock().pop_front().unwrap_or(Script::Hold(Vec::new()));
            Box::pin(async move {
                match script {
                    Script::Refuse => Err(ConnectionError::Connect("refused".into())),
                    Script::Close(frames) => Ok(stream::iter(frames.into_iter().map(Ok)).boxed()),
                    Script::Hold(frames) => Ok(stream::iter(frames.into_iter().map(Ok))
                        .chain(stream::pending())
                        .boxed()),
                }
            })
        }
    }

    fn text(ts: f64) -> Frame {
        Frame::Text(format!(r#"{{"timestamp": {ts}, "lines": []}}"#))
    }

    fn start(
        connector: ScriptedConnector,
        hub: &FactoryHub,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = watch::channel(false);
        let manager = ConnectionManager::new(connector, "ws://test", Duration::from_millis(3000), hub.clone());
        (tx, tokio::spawn(manager.run(rx)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_triggers_single_delayed_retry() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        let mut events = hub.subscribe();
        let connector = ScriptedConnector::new(vec![Script::Close(vec![text(1.0)]), Script::Hold(vec![])]);
        let (_tx, _task) = start(connector.clone(), &hub);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!hub.connected());
        assert_eq!(hub.revision(), 1);
        assert_eq!(events.recv().await.unwrap(), HubEvent::Connection(true));
        assert_eq!(events.recv().await.unwrap(), HubEvent::SnapshotApplied { revision: 1 });
        assert_eq!(events.recv().await.unwrap(), HubEvent::Connection(false));

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(connector.attempts().len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1] - attempts[0] >= Duration::from_millis(3000));
        assert!(hub.connected());

        // la connexion tenue reste ouverte, rien d'autre n'est planifié
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_retries_at_fixed_interval() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        let connector = ScriptedConnector::new(vec![Script::Refuse, Script::Refuse, Script::Refuse, Script::Hold(vec![])]);
        let (_tx, _task) = start(connector.clone(), &hub);

        tokio::time::sleep(Duration::from_millis(9100)).await;
        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 4);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(3000));
        }
        assert!(hub.connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_keeps_connection_and_snapshot() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        let frames = vec![text(1.0), Frame::Text("not json".into()), Frame::Binary(vec![1, 2]), Frame::Control];
        let connector = ScriptedConnector::new(vec![Script::Hold(frames)]);
        let (_tx, _task) = start(connector.clone(), &hub);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(hub.connected());
        assert_eq!(hub.snapshot().unwrap().timestamp, 1.0);
        assert_eq!(hub.status().dropped_messages, 1);
        assert_eq!(connector.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_retry_loop() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        let connector = ScriptedConnector::new(vec![Script::Refuse]);
        let (tx, task) = start(connector.clone(), &hub);

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts().len(), 1);
        assert!(!hub.connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_machine_transitions() {
        let hub = FactoryHub::new(SelectionPolicy::default());
        let connector = ScriptedConnector::new(vec![Script::Hold(vec![])]);
        let (tx, rx) = watch::channel(false);
        let manager = ConnectionManager::new(connector, "ws://test", Duration::from_millis(3000), hub.clone());
        let state = manager.state();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);

        let task = tokio::spawn(manager.run(rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*state.borrow(), ConnectionState::Connected);

        tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }
}
