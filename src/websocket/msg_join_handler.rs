use tracing::info;

use crate::models::{InboundMessage, RoomAction};
use crate::services::access::Role;
use crate::websocket::router::{Dispatch, MessageRouter};
use crate::ws::connctx::ConnCtx;
use crate::ws::error::CollabError;

/// Handle JoinMessage
pub async fn handle_join_message(router: &MessageRouter, ctx: &ConnCtx, msg: InboundMessage) -> Result<Dispatch, CollabError> {
    let folder_id = msg
        .folder_id
        .filter(|f| !f.is_empty())
        .ok_or(CollabError::MissingField("folderId"))?;

    // Check access before touching the registry
    let decision = router
        .access
        .check_access(&folder_id, &ctx.user_id, Role::Viewer)
        .await?;
    if !decision.allowed {
        return Err(CollabError::AccessDenied { folder_id });
    }

    info!("Join received for folder {}: user={}, connection={}", folder_id, ctx.user_id, ctx.connection_id);
    apply_join(router, &ctx.connection_id, folder_id)
}

fn apply_join(router: &MessageRouter, connection_id: &str, folder_id: String) -> Result<Dispatch, CollabError> {
    let _guard = router.dispatch.lock();

    // The socket may have closed while the access check was in flight
    let current = router
        .registry
        .get(connection_id)
        .ok_or_else(|| CollabError::UnknownConnection(connection_id.to_string()))?;
    let actor = Some((current.user_id.as_str(), current.user_name.as_str()));

    if let Some(previous) = current.folder_id.as_deref().filter(|f| *f != folder_id) {
        router.registry.clear_folder(connection_id);
        router.broadcaster.broadcast_room_state(previous, RoomAction::Left, actor);
    }

    router.registry.set_folder(connection_id, &folder_id);
    let sends = router.broadcaster.broadcast_room_state(&folder_id, RoomAction::Joined, actor);
    Ok(Dispatch::Joined { folder_id, sends })
}
