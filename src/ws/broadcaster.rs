use std::sync::Arc;
use tracing::{debug, info};

use super::registry::ConnectionRegistry;
use super::roster::roster_for;
use crate::models::{CollaborationMessage, RoomAction};

/// Fans messages out to the connections of a folder room.
///
/// Sends are independent: a connection whose writer is gone is removed from
/// the registry on the spot and the loop carries on with the others.
pub struct Broadcaster {
    registry: Arc<dyn ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send the current roster of `folder_id` to every connection in it.
    /// Returns the number of successful sends.
    pub fn broadcast_room_state(&self, folder_id: &str, action: RoomAction, actor: Option<(&str, &str)>) -> usize {
        let mut roster = roster_for(self.registry.as_ref(), folder_id);
        let msg = CollaborationMessage::room_state(folder_id, action, actor, roster.clone());
        let (mut sent, mut stale) = self.deliver(folder_id, &msg.to_json(), None);

        // Dropping stale sockets can shrink the room; tell whoever is left.
        while !stale.is_empty() {
            let refreshed = roster_for(self.registry.as_ref(), folder_id);
            if refreshed == roster {
                break;
            }
            roster = refreshed;
            let msg = CollaborationMessage::room_state(folder_id, RoomAction::RoomState, None, roster.clone());
            let (n, s) = self.deliver(folder_id, &msg.to_json(), None);
            sent += n;
            stale = s;
        }

        info!("room_state {:?} for folder {}: {} users, {} sends", action, folder_id, roster.len(), sent);
        sent
    }

    /// Forward a message to every connection in the room except `exclude`.
    pub fn fan_out(&self, folder_id: &str, msg: &CollaborationMessage, exclude: Option<&str>) -> usize {
        let (sent, stale) = self.deliver(folder_id, &msg.to_json(), exclude);
        if !stale.is_empty() {
            self.broadcast_room_state(folder_id, RoomAction::RoomState, None);
        }
        sent
    }

    /// Send a message to a single connection.
    pub fn send_to(&self, connection_id: &str, msg: &CollaborationMessage) -> bool {
        let Some(outbox) = self.registry.outbox(connection_id) else {
            return false;
        };
        if outbox.send(msg.to_json()) {
            return true;
        }
        if let Some(ctx) = self.registry.remove(connection_id) {
            debug!("Dropped stale connection {}", connection_id);
            if let Some(folder) = ctx.folder_id {
                self.broadcast_room_state(&folder, RoomAction::RoomState, None);
            }
        }
        false
    }

    fn deliver(&self, folder_id: &str, text: &str, exclude: Option<&str>) -> (usize, Vec<String>) {
        let mut sent = 0;
        let mut stale = Vec::new();
        for conn in self.registry.list_by_folder(folder_id) {
            if exclude == Some(conn.connection_id.as_str()) {
                continue;
            }
            let delivered = self
                .registry
                .outbox(&conn.connection_id)
                .map(|outbox| outbox.send(text.to_string()))
                .unwrap_or(false);
            if delivered {
                sent += 1;
            } else {
                debug!("Send to {} failed, removing connection", conn.connection_id);
                self.registry.remove(&conn.connection_id);
                stale.push(conn.connection_id);
            }
        }
        (sent, stale)
    }
}
