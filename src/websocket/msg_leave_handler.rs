use tracing::info;

use crate::models::{InboundMessage, RoomAction};
use crate::websocket::router::{joined_folder, Dispatch, MessageRouter};
use crate::ws::connctx::ConnCtx;
use crate::ws::error::CollabError;

/// Handle LeaveMessage. Leaving only untags the connection; it stays
/// registered and may join another folder later.
pub fn handle_leave_message(router: &MessageRouter, ctx: &ConnCtx, msg: InboundMessage) -> Result<Dispatch, CollabError> {
    if ctx.folder_id.is_none() {
        return Ok(Dispatch::Ignored);
    }
    let folder_id = joined_folder(ctx, &msg, "leave", false)?;

    let _guard = router.dispatch.lock();
    match router.registry.clear_folder(&ctx.connection_id) {
        Some(vacated) => {
            info!("Leave received for folder {}: user={}, connection={}", vacated, ctx.user_id, ctx.connection_id);
            let sends = router
                .broadcaster
                .broadcast_room_state(&vacated, RoomAction::Left, Some((&ctx.user_id, &ctx.user_name)));
            Ok(Dispatch::Left { folder_id: vacated, sends })
        }
        None => {
            info!("Connection {} already left folder {}", ctx.connection_id, folder_id);
            Ok(Dispatch::Ignored)
        }
    }
}
