//! Notification channel: WebSocket broadcast to connected browsers.
//!
//! Every connection gets a bounded outbound queue. Broadcasting serializes
//! the event once, snapshots the registry and queues the frame to each open
//! client without waiting; a client whose queue is full misses the frame.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    Router,
};
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::dev::NotificationEvent;
use crate::error::{CliError, Result};

/// Port browsers connect to for notifications.
pub const DEFAULT_NOTIFY_PORT: u16 = 3001;

/// Frames buffered per client before new ones are dropped.
const CLIENT_QUEUE_CAPACITY: usize = 100;

/// How long shutdown waits for the server task before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Connection state of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug)]
struct Client {
    state: ClientState,
    tx: mpsc::Sender<String>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    clients: RwLock<HashMap<usize, Client>>,
    next_id: AtomicUsize,
}

/// Connected clients, shared between connection tasks and broadcasters.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client in the `Connecting` state.
    ///
    /// # Returns
    ///
    /// Client ID and the receiving end of its outbound queue
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        self.inner.clients.write().insert(
            id,
            Client {
                state: ClientState::Connecting,
                tx,
            },
        );
        tracing::debug!(client = id, "Client connecting");
        (id, rx)
    }

    pub fn set_state(&self, id: usize, state: ClientState) {
        if let Some(client) = self.inner.clients.write().get_mut(&id) {
            client.state = state;
            tracing::debug!(client = id, ?state, "Client state changed");
        }
    }

    /// Current state of a client. Unknown IDs are `Closed`.
    pub fn state(&self, id: usize) -> ClientState {
        self.inner
            .clients
            .read()
            .get(&id)
            .map(|c| c.state)
            .unwrap_or(ClientState::Closed)
    }

    /// Forget a client; its queue closes once in-flight frames drain.
    pub fn unregister_client(&self, id: usize) {
        if self.inner.clients.write().remove(&id).is_some() {
            tracing::debug!(client = id, "Client closed");
        }
    }

    /// Number of registered clients in any state.
    pub fn client_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// Number of clients in the `Open` state.
    pub fn open_count(&self) -> usize {
        self.inner
            .clients
            .read()
            .values()
            .filter(|c| c.state == ClientState::Open)
            .count()
    }

    /// Queue `event` for every open client.
    ///
    /// # Returns
    ///
    /// Number of clients the frame was queued for
    pub fn broadcast(&self, event: &NotificationEvent) -> usize {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to serialize notification: {}", e);
                return 0;
            }
        };

        // Snapshot so no lock is held while queueing
        let targets: Vec<(usize, mpsc::Sender<String>)> = self
            .inner
            .clients
            .read()
            .iter()
            .filter(|(_, c)| c.state == ClientState::Open)
            .map(|(id, c)| (*id, c.tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(client = id, "Client queue full, dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            self.unregister_client(id);
        }
        delivered
    }

    /// Mark every client `Closing` and drop its queue.
    fn close_all(&self) {
        let mut clients = self.inner.clients.write();
        for client in clients.values_mut() {
            client.state = ClientState::Closing;
        }
        clients.clear();
    }
}

/// Running WebSocket notification server.
pub struct NotificationChannel {
    registry: ClientRegistry,
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl NotificationChannel {
    /// Bind `0.0.0.0:port` and accept WebSocket upgrades on every path.
    ///
    /// Browsers reach the channel on the same host name they loaded the app
    /// from, so it listens on every interface like the app server.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Bind` if the port is unavailable.
    pub async fn start(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| CliError::Bind { port, source })?;
        let local_addr = listener.local_addr()?;

        let registry = ClientRegistry::new();
        let app = Router::new()
            .fallback(ws_handler)
            .with_state(registry.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                tracing::warn!("Notification server error: {}", e);
            }
        });

        tracing::debug!(%local_addr, "Notification channel listening");

        Ok(Self {
            registry,
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn broadcast(&self, event: &NotificationEvent) -> usize {
        self.registry.broadcast(event)
    }

    pub fn client_count(&self) -> usize {
        self.registry.client_count()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and close the open ones.
    pub async fn shutdown(mut self) {
        self.registry.close_all();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        tracing::debug!("Notification channel closed");
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        self.registry.close_all();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(registry): State<ClientRegistry>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(mut socket: WebSocket, registry: ClientRegistry) {
    let (id, mut rx) = registry.register_client();
    registry.set_state(id, ClientState::Open);

    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    registry.set_state(id, ClientState::Closing);
    registry.unregister_client(id);
}
