use tracing::info;

use crate::models::{CollaborationMessage, InboundMessage, MessageType, RoomAction};
use crate::services::access::Role;
use crate::websocket::router::{joined_folder, Dispatch, MessageRouter};
use crate::ws::connctx::ConnCtx;
use crate::ws::error::CollabError;

/// Handle UpdateMessage
///
/// The server never applies anything here. Content already lives in the
/// folder store; the update only tells the rest of the room to refetch.
pub async fn handle_update_message(router: &MessageRouter, ctx: &ConnCtx, msg: InboundMessage) -> Result<Dispatch, CollabError> {
    let folder_id = joined_folder(ctx, &msg, "update", true)?;

    let data = msg.data.unwrap_or_default();
    match data.action {
        None | Some(RoomAction::Reorder) => {}
        Some(other) => {
            return Err(CollabError::Malformed(format!("update action {:?} is reserved for the server", other)));
        }
    }
    if data.users.is_some() {
        return Err(CollabError::Malformed("update may not carry a roster".to_string()));
    }

    let decision = router
        .access
        .check_access(&folder_id, &ctx.user_id, Role::Editor)
        .await?;
    if !decision.allowed {
        return Err(CollabError::AccessDenied { folder_id });
    }

    info!("Update received for folder {}: user={}, questionCount={:?}", folder_id, ctx.user_id, data.question_count);

    let _guard = router.dispatch.lock();
    let still_joined = router
        .registry
        .get(&ctx.connection_id)
        .and_then(|c| c.folder_id)
        .is_some_and(|f| f == folder_id);
    if !still_joined {
        return Err(CollabError::NotJoined("update"));
    }

    let forward = CollaborationMessage::new(MessageType::Update, &folder_id, &ctx.user_id, &ctx.user_name).with_data(data);
    let sends = router.broadcaster.fan_out(&folder_id, &forward, Some(&ctx.connection_id));
    Ok(Dispatch::Forwarded { folder_id, sends })
}
