use tracing::debug;

use crate::models::{CollaborationMessage, InboundMessage, RoomAction};
use crate::websocket::router::{joined_folder, Dispatch, MessageRouter};
use crate::ws::connctx::ConnCtx;
use crate::ws::error::CollabError;

/// Handle PresenceMessage and CursorMessage: fan out to the room, keep nothing.
pub fn handle_relay_message(router: &MessageRouter, ctx: &ConnCtx, msg: InboundMessage) -> Result<Dispatch, CollabError> {
    let op = msg.kind.as_str();
    let folder_id = joined_folder(ctx, &msg, op, true)?;

    let data = msg.data;
    if let Some(d) = &data {
        // Rosters only ever come from the server
        if d.users.is_some() || matches!(d.action, Some(RoomAction::Joined | RoomAction::Left | RoomAction::RoomState)) {
            return Err(CollabError::Malformed(format!("{} may not carry room state", op)));
        }
    }

    let _guard = router.dispatch.lock();
    let mut forward = CollaborationMessage::new(msg.kind, &folder_id, &ctx.user_id, &ctx.user_name);
    forward.data = data;
    let sends = router.broadcaster.fan_out(&folder_id, &forward, Some(&ctx.connection_id));
    debug!("{} from {} relayed to {} connections in folder {}", op, ctx.user_id, sends, folder_id);
    Ok(Dispatch::Forwarded { folder_id, sends })
}

