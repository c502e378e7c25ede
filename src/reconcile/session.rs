use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::state::{FolderView, Refetch};
use crate::models::{CollaborationMessage, MessageData, MessageType, RoomAction};
use crate::services::folder_store::{FolderQuestion, FolderStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Socket endpoint, e.g. `ws://localhost:3000/ws`.
    pub server_url: String,
    pub token: String,
    pub user_id: String,
    pub user_name: String,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>, user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: token.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    fn url(&self) -> String {
        let sep = if self.server_url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.server_url, sep, self.token)
    }
}

/// Exponential backoff: base, 2x, 4x, ... capped at `max`.
/// With the defaults: 1s, 2s, 4s, 8s, 16s, then 30s.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16)).min(max)
}

enum Command {
    Join(String),
    Leave,
    Reorder(Vec<String>, oneshot::Sender<Result<usize, StoreError>>),
    Relay(MessageType, Map<String, Value>),
    Retry,
    Shutdown,
}

enum Internal {
    Fetched {
        refetch: Refetch,
        result: Result<Vec<FolderQuestion>, StoreError>,
    },
    Reordered {
        folder_id: String,
        result: Result<usize, StoreError>,
        reply: oneshot::Sender<Result<usize, StoreError>>,
    },
}

enum Exit {
    Shutdown,
    Dropped,
}

/// Handle to a background session that keeps one folder view in sync.
pub struct CollabClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    view_rx: watch::Receiver<Option<FolderView>>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl CollabClient {
    /// Start the session. It connects in the background and keeps
    /// reconnecting until `shutdown` is called.
    pub fn connect(config: ClientConfig, store: Arc<dyn FolderStore>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let runner = Runner {
            config,
            store,
            cmd_rx,
            internal_tx,
            internal_rx,
            view_tx,
            state_tx,
            active: None,
        };
        let task = tokio::spawn(runner.run());

        Self { cmd_tx, view_rx, state_rx, task }
    }

    /// Open a folder, or switch to another one.
    pub fn join(&self, folder_id: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::Join(folder_id.into()));
    }

    pub fn leave(&self) {
        let _ = self.cmd_tx.send(Command::Leave);
    }

    /// Persist a new question order, then tell the room to refetch.
    pub async fn reorder(&self, question_ids: Vec<String>) -> Result<usize, StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Reorder(question_ids, reply_tx))
            .map_err(|_| StoreError::Request("session closed".to_string()))?;
        reply_rx
            .await
            .map_err(|_| StoreError::Request("session closed".to_string()))?
    }

    pub fn send_cursor(&self, data: Map<String, Value>) {
        let _ = self.cmd_tx.send(Command::Relay(MessageType::Cursor, data));
    }

    pub fn send_presence(&self, data: Map<String, Value>) {
        let _ = self.cmd_tx.send(Command::Relay(MessageType::Presence, data));
    }

    /// Retry a failed refetch.
    pub fn retry(&self) {
        let _ = self.cmd_tx.send(Command::Retry);
    }

    pub fn view(&self) -> watch::Receiver<Option<FolderView>> {
        self.view_rx.clone()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Leave the active folder, close the socket and stop reconnecting.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        let _ = self.task.await;
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;

struct Runner {
    config: ClientConfig,
    store: Arc<dyn FolderStore>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    view_tx: watch::Sender<Option<FolderView>>,
    state_tx: watch::Sender<ConnectionState>,
    active: Option<FolderView>,
}

impl Runner {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        loop {
            self.state_tx.send_replace(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting { attempt }
            });

            match tokio_tungstenite::connect_async(self.config.url()).await {
                Ok((ws, _)) => {
                    info!("Connected to {}", self.config.server_url);
                    attempt = 0;
                    self.state_tx.send_replace(ConnectionState::Connected);
                    if let Exit::Shutdown = self.drive(ws).await {
                        break;
                    }
                    warn!("Connection to {} dropped", self.config.server_url);
                }
                Err(e) => warn!("Failed to connect to {}: {}", self.config.server_url, e),
            }

            let delay = backoff_delay(attempt, self.config.base_delay, self.config.max_delay);
            attempt = attempt.saturating_add(1);
            self.state_tx.send_replace(ConnectionState::Reconnecting { attempt });
            if let Exit::Shutdown = self.wait_offline(delay).await {
                break;
            }
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    async fn drive(&mut self, ws: WsStream) -> Exit {
        let (mut write, mut read) = ws.split();

        // The server kept nothing about our previous socket, and signals sent
        // while we were away reached nobody: rejoin and refetch.
        if let Some(refetch) = self.active.as_mut().map(FolderView::request_refetch) {
            let folder_id = refetch.folder_id.clone();
            self.spawn_fetch(refetch);
            self.publish();
            if self.send(&mut write, MessageType::Join, &folder_id, None).await.is_err() {
                return Exit::Dropped;
            }
        }

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        return self.close(&mut write).await;
                    };
                    if let Command::Shutdown = cmd {
                        return self.close(&mut write).await;
                    }
                    if self.handle_online(cmd, &mut write).await.is_err() {
                        return Exit::Dropped;
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.on_text(text.as_str()),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Exit::Dropped,
                    Some(Ok(_)) => {}
                },
                Some(internal) = self.internal_rx.recv() => {
                    if let Some(signal) = self.on_internal(internal) {
                        if self.send(&mut write, MessageType::Update, &signal.0, Some(signal.1)).await.is_err() {
                            return Exit::Dropped;
                        }
                    }
                }
            }
        }
    }

    /// Sit out a backoff delay while still taking commands and fetch results.
    async fn wait_offline(&mut self, delay: Duration) -> Exit {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Exit::Dropped,
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(Command::Shutdown) => return Exit::Shutdown,
                    Some(cmd) => self.handle_offline(cmd),
                },
                Some(internal) = self.internal_rx.recv() => {
                    // a reorder persisted while offline reaches others when we rejoin
                    let _ = self.on_internal(internal);
                }
            }
        }
    }

    async fn close(&mut self, write: &mut WsSink) -> Exit {
        if let Some(view) = self.active.take() {
            let _ = self.send(write, MessageType::Leave, &view.folder_id, None).await;
            self.publish();
        }
        let _ = write.close().await;
        Exit::Shutdown
    }

    async fn handle_online(&mut self, cmd: Command, write: &mut WsSink) -> Result<(), ()> {
        match cmd {
            Command::Join(folder_id) => {
                self.open_view(&folder_id);
                self.send(write, MessageType::Join, &folder_id, None).await
            }
            Command::Leave => match self.active.take() {
                Some(view) => {
                    self.publish();
                    self.send(write, MessageType::Leave, &view.folder_id, None).await
                }
                None => Ok(()),
            },
            Command::Relay(kind, extra) => match self.active.as_ref().map(|v| v.folder_id.clone()) {
                Some(folder_id) => {
                    let data = MessageData { extra, ..Default::default() };
                    self.send(write, kind, &folder_id, Some(data)).await
                }
                None => Ok(()),
            },
            other => {
                self.handle_offline(other);
                Ok(())
            }
        }
    }

    /// Commands that need no socket, or that are only recorded until the
    /// next connection.
    fn handle_offline(&mut self, cmd: Command) {
        match cmd {
            Command::Join(folder_id) => self.open_view(&folder_id),
            Command::Leave => {
                self.active = None;
                self.publish();
            }
            Command::Reorder(question_ids, reply) => self.spawn_reorder(question_ids, reply),
            Command::Retry => {
                if let Some(refetch) = self.active.as_mut().map(|v| v.retry()) {
                    self.spawn_fetch(refetch);
                    self.publish();
                }
            }
            Command::Relay(kind, _) => debug!("Dropping {} while offline", kind.as_str()),
            Command::Shutdown => {}
        }
    }

    fn open_view(&mut self, folder_id: &str) {
        if self.active.as_ref().is_some_and(|v| v.folder_id == folder_id) {
            return;
        }
        let mut view = FolderView::new(folder_id);
        let refetch = view.request_refetch();
        self.active = Some(view);
        self.spawn_fetch(refetch);
        self.publish();
    }

    fn on_text(&mut self, text: &str) {
        let msg: CollaborationMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Ignoring unreadable server message: {}", e);
                return;
            }
        };
        let own_user_id = self.config.user_id.clone();
        let Some(view) = self.active.as_mut() else {
            return;
        };
        if let Some(refetch) = view.on_message(&msg, &own_user_id) {
            self.spawn_fetch(refetch);
        }
        self.publish();
    }

    /// Returns a reorder signal to send when a local reorder was persisted.
    fn on_internal(&mut self, internal: Internal) -> Option<(String, MessageData)> {
        match internal {
            Internal::Fetched { refetch, result } => {
                if let Some(view) = self.active.as_mut().filter(|v| v.folder_id == refetch.folder_id) {
                    if let Err(e) = &result {
                        warn!("Refetch of folder {} failed: {}", refetch.folder_id, e);
                    }
                    view.on_fetch_result(refetch.generation, result);
                    self.publish();
                }
                None
            }
            Internal::Reordered { folder_id, result, reply } => {
                let still_open = self.active.as_ref().is_some_and(|v| v.folder_id == folder_id);
                let signal = match &result {
                    // the room we reordered is no longer ours to signal
                    Ok(_) if !still_open => {
                        debug!("Folder {} closed before its reorder finished; not signalling", folder_id);
                        None
                    }
                    Ok(count) => {
                        // our own change is not echoed back, so refresh locally
                        if let Some(refetch) = self.active.as_mut().filter(|v| v.folder_id == folder_id).map(|v| v.request_refetch()) {
                            self.spawn_fetch(refetch);
                            self.publish();
                        }
                        Some((
                            folder_id,
                            MessageData {
                                action: Some(RoomAction::Reorder),
                                question_count: Some(*count as u64),
                                ..Default::default()
                            },
                        ))
                    }
                    Err(_) => None,
                };
                let _ = reply.send(result);
                signal
            }
        }
    }

    fn spawn_fetch(&self, refetch: Refetch) {
        let store = self.store.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = store.fetch_folder_contents(&refetch.folder_id).await;
            let _ = tx.send(Internal::Fetched { refetch, result });
        });
    }

    fn spawn_reorder(&self, question_ids: Vec<String>, reply: oneshot::Sender<Result<usize, StoreError>>) {
        let Some(folder_id) = self.active.as_ref().map(|v| v.folder_id.clone()) else {
            let _ = reply.send(Err(StoreError::Rejected("no folder open".to_string())));
            return;
        };
        let store = self.store.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = store.apply_reorder(&folder_id, &question_ids).await;
            let _ = tx.send(Internal::Reordered { folder_id, result, reply });
        });
    }

    async fn send(&self, write: &mut WsSink, kind: MessageType, folder_id: &str, data: Option<MessageData>) -> Result<(), ()> {
        let mut msg = CollaborationMessage::new(kind, folder_id, &self.config.user_id, &self.config.user_name);
        msg.data = data;
        write.send(Message::text(msg.to_json())).await.map_err(|e| {
            debug!("Send failed: {}", e);
        })
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.active.clone());
    }
}
