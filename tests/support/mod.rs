//! Shared helpers: a server on a random port, session tokens, an in-memory
//! folder store and a raw socket client.

#![allow(dead_code)]

use async_trait::async_trait;
use colabri_folder::config::Config;
use colabri_folder::models::CollaborationMessage;
use colabri_folder::services::access::{AccessChecker, OpenAccess};
use colabri_folder::services::folder_store::{FolderQuestion, FolderStore, StoreError};
use colabri_folder::state::AppState;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub const SECRET: &str = "test-secret";

pub type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub fn test_config() -> Config {
    Config {
        cloud_auth_jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    }
}

pub fn token_for(user_id: &str, name: &str, roles: &[&str]) -> String {
    let claims = json!({
        "sub": user_id,
        "name": name,
        "roles": roles,
        "exp": chrono::Utc::now().timestamp() + 600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

pub fn test_state() -> AppState {
    AppState::new(test_config(), Arc::new(OpenAccess))
}

pub fn test_state_with(access: Arc<dyn AccessChecker>) -> AppState {
    AppState::new(test_config(), access)
}

/// Serve `state` on a listener that is already bound.
pub async fn serve_on(listener: TcpListener, state: AppState) {
    let app = colabri_folder::build_app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

/// Start the server on a random port.
pub async fn start_test_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    serve_on(listener, state).await;
    addr
}

pub async fn connect(addr: SocketAddr, user_id: &str, name: &str) -> Socket {
    let url = format!("ws://{}/ws?token={}", addr, token_for(user_id, name, &[]));
    let (ws, _) = tokio_tungstenite::connect_async(url).await.expect("WebSocket connect failed");
    ws
}

pub async fn send_json(ws: &mut Socket, value: serde_json::Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next collaboration message, or None after `wait` of silence.
pub async fn next_message(ws: &mut Socket, wait: Duration) -> Option<CollaborationMessage> {
    loop {
        match tokio::time::timeout(wait, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) | Err(_) => return None,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

pub async fn expect_message(ws: &mut Socket) -> CollaborationMessage {
    next_message(ws, Duration::from_secs(2)).await.expect("expected a message")
}

pub async fn expect_silence(ws: &mut Socket) {
    assert!(next_message(ws, Duration::from_millis(200)).await.is_none());
}

pub fn roster_ids(msg: &CollaborationMessage) -> Vec<String> {
    msg.roster().expect("not a roster message").iter().map(|u| u.user_id.clone()).collect()
}

/// Poll until `check` passes or two seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Folder store kept in memory, counting reads.
#[derive(Default)]
pub struct MemoryStore {
    folders: Mutex<HashMap<String, Vec<FolderQuestion>>>,
    fetches: AtomicUsize,
    failing: Mutex<bool>,
}

impl MemoryStore {
    pub fn with_folder(folder_id: &str, ids: &[&str]) -> Arc<Self> {
        let store = Arc::new(Self::default());
        store.set(folder_id, ids);
        store
    }

    pub fn set(&self, folder_id: &str, ids: &[&str]) {
        let questions = ids
            .iter()
            .enumerate()
            .map(|(i, id)| FolderQuestion { id: id.to_string(), position: i as u32, title: format!("Question {id}") })
            .collect();
        self.folders.lock().insert(folder_id.to_string(), questions);
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FolderStore for MemoryStore {
    async fn fetch_folder_contents(&self, folder_id: &str) -> Result<Vec<FolderQuestion>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock() {
            return Err(StoreError::Request("store unavailable".to_string()));
        }
        self.folders
            .lock()
            .get(folder_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(folder_id.to_string()))
    }

    async fn apply_reorder(&self, folder_id: &str, question_ids: &[String]) -> Result<usize, StoreError> {
        let ids: Vec<&str> = question_ids.iter().map(String::as_str).collect();
        self.set(folder_id, &ids);
        Ok(ids.len())
    }
}
