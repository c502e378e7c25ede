use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{CollaborationMessage, InboundMessage, MessageType, RoomAction};
use crate::services::access::AccessChecker;
use crate::websocket::msg_join_handler::handle_join_message;
use crate::websocket::msg_leave_handler::handle_leave_message;
use crate::websocket::msg_relay_handler::handle_relay_message;
use crate::websocket::msg_update_handler::handle_update_message;
use crate::ws::broadcaster::Broadcaster;
use crate::ws::connctx::{ConnCtx, Outbox, SessionIdentity};
use crate::ws::error::CollabError;
use crate::ws::registry::ConnectionRegistry;

/// What handling one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Joined { folder_id: String, sends: usize },
    Left { folder_id: String, sends: usize },
    Forwarded { folder_id: String, sends: usize },
    Ignored,
}

/// Per-connection state machine `unjoined -> joined(folder)` over the
/// shared registry.
///
/// Access checks run before the dispatch lock is taken. Everything after
/// that (registry mutation, roster computation, fan-out) is synchronous and
/// runs under the lock, so one message is applied completely before the
/// next one touches the registry.
pub struct MessageRouter {
    pub(crate) registry: Arc<dyn ConnectionRegistry>,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) access: Arc<dyn AccessChecker>,
    pub(crate) dispatch: Mutex<()>,
}

impl MessageRouter {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, access: Arc<dyn AccessChecker>) -> Self {
        Self {
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            access,
            dispatch: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.registry
    }

    /// A socket was accepted for an authenticated session.
    pub fn open(&self, connection_id: &str, identity: &SessionIdentity, outbox: Outbox) {
        let _guard = self.dispatch.lock();
        self.registry.register(connection_id, &identity.user_id, &identity.user_name, outbox);
        info!("Connection {} opened for user {}", connection_id, identity.user_id);
    }

    /// The one exit path for a connection, whatever ended it.
    pub fn close(&self, connection_id: &str) {
        let _guard = self.dispatch.lock();
        let Some(ctx) = self.registry.remove(connection_id) else {
            return;
        };
        info!("Connection {} closed for user {}", connection_id, ctx.user_id);
        if let Some(folder_id) = ctx.folder_id {
            self.broadcaster
                .broadcast_room_state(&folder_id, RoomAction::Left, Some((&ctx.user_id, &ctx.user_name)));
        }
    }

    /// Handle one text frame. Failures are logged and, where the client can
    /// act on them, reported to the sender alone. The connection stays open.
    pub async fn handle_text(&self, connection_id: &str, text: &str) -> Result<Dispatch, CollabError> {
        let result = self.dispatch_text(connection_id, text).await;
        match &result {
            Ok(dispatch) => debug!("Connection {}: {:?}", connection_id, dispatch),
            Err(e @ (CollabError::Malformed(_) | CollabError::MissingField(_))) => {
                warn!("Dropping message from {}: {}", connection_id, e);
            }
            Err(e) => info!("Rejected message from {}: {}", connection_id, e),
        }
        if let Err(e) = &result {
            if e.notify_sender() {
                self.reply_error(connection_id, e);
            }
        }
        result
    }

    async fn dispatch_text(&self, connection_id: &str, text: &str) -> Result<Dispatch, CollabError> {
        let ctx = self
            .registry
            .get(connection_id)
            .ok_or_else(|| CollabError::UnknownConnection(connection_id.to_string()))?;

        let msg: InboundMessage = serde_json::from_str(text).map_err(|e| CollabError::Malformed(e.to_string()))?;

        if let Some(claimed) = msg.user_id.as_deref() {
            if claimed != ctx.user_id {
                return Err(CollabError::IdentityMismatch { claimed: claimed.to_string() });
            }
        }

        match msg.kind {
            MessageType::Join => handle_join_message(self, &ctx, msg).await,
            MessageType::Leave => handle_leave_message(self, &ctx, msg),
            MessageType::Update => handle_update_message(self, &ctx, msg).await,
            MessageType::Presence | MessageType::Cursor => handle_relay_message(self, &ctx, msg),
            MessageType::Error => Err(CollabError::Malformed("clients may not send error messages".to_string())),
        }
    }

    fn reply_error(&self, connection_id: &str, error: &CollabError) {
        let Some(ctx) = self.registry.get(connection_id) else {
            return;
        };
        let folder = ctx.folder_id.as_deref().unwrap_or_default();
        let msg = CollaborationMessage::error(folder, &ctx.user_id, &ctx.user_name, error.to_string());
        self.broadcaster.send_to(connection_id, &msg);
    }
}

/// Folder a non-join message may act on: the connection must be joined and
/// any `folderId` the message carries must name that same room.
pub(crate) fn joined_folder(ctx: &ConnCtx, msg: &InboundMessage, op: &'static str, folder_required: bool) -> Result<String, CollabError> {
    let joined = ctx.folder_id.clone().ok_or(CollabError::NotJoined(op))?;
    match msg.folder_id.as_deref() {
        Some(got) if got != joined => Err(CollabError::FolderMismatch { joined, got: got.to_string() }),
        Some(_) => Ok(joined),
        None if folder_required => Err(CollabError::MissingField("folderId")),
        None => Ok(joined),
    }
}
