use std::sync::Arc;
use axum::{
    extract::{Query, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use tracing::{info, debug};
use futures_util::{StreamExt, SinkExt};
use uuid::Uuid;

use crate::routes::auth_middleware::{resolve_session, TokenQuery};
use crate::state::AppState;
use crate::utils::scope_guard::ScopeGuard;
use crate::websocket::router::MessageRouter;
use crate::ws::connctx::{Outbox, SessionIdentity};


/// WebSocket handler. The session is resolved before the upgrade so that
/// an unauthenticated client never gets a socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Response {
    info!("New WebSocket connection attempt");
    let identity = match resolve_session(&state, &headers, query.token.as_deref()) {
        Ok((identity, _roles)) => identity,
        Err(status) => return status.into_response(),
    };
    let router = state.router.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, identity, router))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, identity: SessionIdentity, router: Arc<MessageRouter>) {

    // Generate unique connection ID to identify this client
    let connection_id = Uuid::new_v4().to_string();
    info!("WebSocket connection established for user {} with connection_id: {}", identity.user_id, connection_id);

    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    // Everything for this socket goes through its outbox
    let (outbox, mut outbox_rx) = Outbox::channel();
    router.open(&connection_id, &identity, outbox);

    // However the socket ends, the registry entry goes with it
    let _close = {
        let router = router.clone();
        let connection_id = connection_id.clone();
        ScopeGuard::new(move || router.close(&connection_id))
    };

    // Writer: drain the outbox into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbox_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Reader: one message at a time, in the order the client sent them
    let recv_router = router.clone();
    let recv_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    // Failures are logged and answered by the router; the socket stays open
                    let _ = recv_router.handle_text(&recv_id, &text).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket error on {}: {}", recv_id, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!("WebSocket connection {} terminated", connection_id);
}
