//! End-to-end tests for the folder collaboration socket.
//! Each test starts the real server on a random port.

mod support;

use async_trait::async_trait;
use colabri_folder::models::{MessageType, RoomAction};
use colabri_folder::services::access::{AccessChecker, AccessDecision, Role};
use colabri_folder::ws::error::CollabError;
use futures_util::SinkExt;
use serde_json::json;
use std::sync::Arc;
use support::*;

/// Everyone may view; only "editor" may change anything; "vault" is off limits.
struct TestAccess;

#[async_trait]
impl AccessChecker for TestAccess {
    async fn check_access(&self, folder_id: &str, user_id: &str, required_role: Role) -> Result<AccessDecision, CollabError> {
        if folder_id == "vault" {
            return Ok(AccessDecision::deny());
        }
        let role = if user_id == "editor" { Role::Editor } else { Role::Viewer };
        if role >= required_role {
            Ok(AccessDecision::allow(role))
        } else {
            Ok(AccessDecision::deny())
        }
    }
}

#[tokio::test]
async fn test_join_reorder_and_disconnect() {
    let addr = start_test_server(test_state()).await;

    let mut alice = connect(addr, "alice", "Alice").await;
    send_json(&mut alice, json!({"type": "join", "folderId": "f1"})).await;
    let msg = expect_message(&mut alice).await;
    assert_eq!(msg.kind, MessageType::Join);
    assert_eq!(msg.action(), Some(RoomAction::Joined));
    assert_eq!(roster_ids(&msg), vec!["alice"]);

    let mut bob = connect(addr, "bob", "Bob").await;
    send_json(&mut bob, json!({"type": "join", "folderId": "f1"})).await;
    let to_alice = expect_message(&mut alice).await;
    let to_bob = expect_message(&mut bob).await;
    assert_eq!(roster_ids(&to_alice), vec!["alice", "bob"]);
    assert_eq!(to_alice, to_bob);
    assert_eq!(to_alice.user_id, "bob");

    // The update is relayed untouched to the others and not echoed back
    send_json(&mut bob, json!({
        "type": "update",
        "folderId": "f1",
        "userId": "bob",
        "userName": "Bob",
        "data": {"action": "reorder", "questionCount": 5}
    })).await;
    let update = expect_message(&mut alice).await;
    assert_eq!(update.kind, MessageType::Update);
    assert_eq!(update.user_id, "bob");
    let data = update.data.expect("update data");
    assert_eq!(data.action, Some(RoomAction::Reorder));
    assert_eq!(data.question_count, Some(5));
    expect_silence(&mut bob).await;

    alice.close(None).await.unwrap();
    let msg = expect_message(&mut bob).await;
    assert_eq!(msg.action(), Some(RoomAction::Left));
    assert_eq!(roster_ids(&msg), vec!["bob"]);
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let addr = start_test_server(test_state()).await;

    let mut alice = connect(addr, "alice", "Alice").await;
    let mut carol = connect(addr, "carol", "Carol").await;
    send_json(&mut alice, json!({"type": "join", "folderId": "f1"})).await;
    expect_message(&mut alice).await;
    send_json(&mut carol, json!({"type": "join", "folderId": "f2"})).await;
    expect_message(&mut carol).await;

    send_json(&mut carol, json!({"type": "cursor", "folderId": "f2", "data": {"questionId": "q1"}})).await;
    send_json(&mut carol, json!({"type": "update", "folderId": "f2", "data": {"action": "reorder", "questionCount": 2}})).await;
    expect_silence(&mut alice).await;
}

#[tokio::test]
async fn test_second_tab_keeps_user_present() {
    let addr = start_test_server(test_state()).await;

    let mut tab1 = connect(addr, "alice", "Alice").await;
    let mut tab2 = connect(addr, "alice", "Alice").await;
    let mut bob = connect(addr, "bob", "Bob").await;

    send_json(&mut tab1, json!({"type": "join", "folderId": "f1"})).await;
    expect_message(&mut tab1).await;
    send_json(&mut tab2, json!({"type": "join", "folderId": "f1"})).await;
    let msg = expect_message(&mut tab1).await;
    assert_eq!(roster_ids(&msg), vec!["alice"]);
    expect_message(&mut tab2).await;
    send_json(&mut bob, json!({"type": "join", "folderId": "f1"})).await;
    expect_message(&mut tab1).await;
    expect_message(&mut tab2).await;
    expect_message(&mut bob).await;

    tab1.close(None).await.unwrap();
    let msg = expect_message(&mut bob).await;
    assert_eq!(roster_ids(&msg), vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_cursor_is_relayed_with_payload() {
    let addr = start_test_server(test_state()).await;

    let mut alice = connect(addr, "alice", "Alice").await;
    let mut bob = connect(addr, "bob", "Bob").await;
    send_json(&mut alice, json!({"type": "join", "folderId": "f1"})).await;
    expect_message(&mut alice).await;
    send_json(&mut bob, json!({"type": "join", "folderId": "f1"})).await;
    expect_message(&mut alice).await;
    expect_message(&mut bob).await;

    send_json(&mut alice, json!({"type": "cursor", "folderId": "f1", "data": {"questionId": "q7", "offset": 3}})).await;
    let msg = expect_message(&mut bob).await;
    assert_eq!(msg.kind, MessageType::Cursor);
    assert_eq!(msg.user_name, "Alice");
    let data = msg.data.unwrap();
    assert_eq!(data.extra.get("questionId"), Some(&json!("q7")));
    assert_eq!(data.extra.get("offset"), Some(&json!(3)));
    expect_silence(&mut alice).await;
}

#[tokio::test]
async fn test_denied_join_gets_error_and_no_room() {
    let addr = start_test_server(test_state_with(Arc::new(TestAccess))).await;

    let mut alice = connect(addr, "alice", "Alice").await;
    send_json(&mut alice, json!({"type": "join", "folderId": "vault"})).await;
    let msg = expect_message(&mut alice).await;
    assert_eq!(msg.kind, MessageType::Error);
    assert!(msg.data.unwrap().error.unwrap().contains("vault"));

    // Viewers may join but not reorder
    send_json(&mut alice, json!({"type": "join", "folderId": "f1"})).await;
    expect_message(&mut alice).await;
    send_json(&mut alice, json!({"type": "update", "folderId": "f1", "data": {"action": "reorder", "questionCount": 1}})).await;
    let msg = expect_message(&mut alice).await;
    assert_eq!(msg.kind, MessageType::Error);
}

#[tokio::test]
async fn test_spoofed_user_and_malformed_frames() {
    let addr = start_test_server(test_state()).await;

    let mut alice = connect(addr, "alice", "Alice").await;
    send_json(&mut alice, json!({"type": "join", "folderId": "f1", "userId": "mallory"})).await;
    let msg = expect_message(&mut alice).await;
    assert_eq!(msg.kind, MessageType::Error);

    // Garbage is dropped and the socket stays usable
    alice.send(tokio_tungstenite::tungstenite::Message::text("{not json".to_string())).await.unwrap();
    expect_silence(&mut alice).await;
    send_json(&mut alice, json!({"type": "join", "folderId": "f1"})).await;
    let msg = expect_message(&mut alice).await;
    assert_eq!(roster_ids(&msg), vec!["alice"]);
}

#[tokio::test]
async fn test_unauthenticated_socket_is_refused() {
    let addr = start_test_server(test_state()).await;

    let res = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr)).await;
    assert!(res.is_err());

    let res = tokio_tungstenite::connect_async(format!("ws://{}/ws?token=bogus", addr)).await;
    assert!(res.is_err());
}
