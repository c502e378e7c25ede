use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Kind of a collaboration message on the folder socket.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Join,
    Leave,
    Update,
    Presence,
    Cursor,
    /// Server to client only.
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Join => "join",
            MessageType::Leave => "leave",
            MessageType::Update => "update",
            MessageType::Presence => "presence",
            MessageType::Cursor => "cursor",
            MessageType::Error => "error",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomAction {
    Joined,
    Left,
    RoomState,
    Reorder,
}

/// One distinct user in a folder room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RosterUser {
    pub user_id: String,
    pub user_name: String,
    pub is_online: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<RoomAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<RosterUser>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Client-defined payload (cursor position, focused question, ...), kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Inbound wire shape. Everything except `type` is optional here so that a
/// missing field is reported by validation rather than by serde.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub folder_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub data: Option<MessageData>,
}

/// A complete collaboration message, as sent to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub folder_id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
}

impl CollaborationMessage {
    pub fn new(kind: MessageType, folder_id: &str, user_id: &str, user_name: &str) -> Self {
        Self {
            kind,
            folder_id: folder_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: MessageData) -> Self {
        self.data = Some(data);
        self
    }

    /// Roster snapshot for a room. `kind` follows the action that caused it.
    pub fn room_state(folder_id: &str, action: RoomAction, actor: Option<(&str, &str)>, users: Vec<RosterUser>) -> Self {
        let kind = match action {
            RoomAction::Joined => MessageType::Join,
            RoomAction::Left => MessageType::Leave,
            _ => MessageType::Presence,
        };
        let (user_id, user_name) = actor.unwrap_or(("", ""));
        Self::new(kind, folder_id, user_id, user_name).with_data(MessageData {
            action: Some(action),
            users: Some(users),
            ..Default::default()
        })
    }

    pub fn error(folder_id: &str, user_id: &str, user_name: &str, error: impl Into<String>) -> Self {
        Self::new(MessageType::Error, folder_id, user_id, user_name).with_data(MessageData {
            error: Some(error.into()),
            ..Default::default()
        })
    }

    pub fn action(&self) -> Option<RoomAction> {
        self.data.as_ref().and_then(|d| d.action)
    }

    /// The roster carried by this message, if it is a roster snapshot.
    pub fn roster(&self) -> Option<&[RosterUser]> {
        self.data.as_ref().and_then(|d| d.users.as_deref())
    }

    pub fn to_json(&self) -> String {
        // Every field serializes to plain JSON; a failure here is unreachable.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_reorder_update() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "type": "update",
            "folderId": "f1",
            "userId": "b",
            "userName": "Bob",
            "data": { "action": "reorder", "questionCount": 5 }
        }))
        .unwrap();
        assert_eq!(msg.kind, MessageType::Update);
        let data = msg.data.unwrap();
        assert_eq!(data.action, Some(RoomAction::Reorder));
        assert_eq!(data.question_count, Some(5));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let res = serde_json::from_str::<InboundMessage>(r#"{"type":"explode","folderId":"f1"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn room_state_serializes_camel_case() {
        let msg = CollaborationMessage::room_state(
            "f1",
            RoomAction::Joined,
            Some(("a", "Alice")),
            vec![RosterUser { user_id: "a".into(), user_name: "Alice".into(), is_online: true }],
        );
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "join");
        assert_eq!(value["folderId"], "f1");
        assert_eq!(value["data"]["action"], "joined");
        assert_eq!(value["data"]["users"][0]["isOnline"], true);
        assert!(value["data"].get("questionCount").is_none());
    }

    #[test]
    fn cursor_extra_fields_survive() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "type": "cursor",
            "folderId": "f1",
            "data": { "questionId": "q7", "offset": 12 }
        }))
        .unwrap();
        let data = msg.data.unwrap();
        assert_eq!(data.extra.get("questionId"), Some(&json!("q7")));
        let out = serde_json::to_value(&data).unwrap();
        assert_eq!(out["offset"], 12);
    }
}
