// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios driving the relay through its HTTP surface while
//! reaching into `RelayState` directly to assert on internal state a
//! client response wouldn't expose (pending counts, reverse-index size,
//! metric alerts). Per-endpoint contract tests live in `tests/http.rs`;
//! these cover whole flows across multiple endpoints.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use tokio_util::sync::CancellationToken;

use relay::config::{EncryptionMode, Environment, RelayConfig};
use relay::constants::{HEADER_CONTROLLER_KEY, HEADER_DEVICE_ID, MAX_GROUP_SIZE, MAX_MESSAGE_PAYLOAD_BYTES};
use relay::state::RelayState;
use relay::transport::build_router;

const CONTROLLER_KEY: &str = "test-controller-key";

fn test_config() -> RelayConfig {
    RelayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        redis_url: None,
        conversation_ttl_seconds: 1800,
        controller_api_keys: vec![CONTROLLER_KEY.to_owned()],
        encryption_mode: EncryptionMode::Client,
        encryption_key_seed: None,
        demo_mode: false,
        frontend_origin: None,
        environment: Environment::Development,
    }
}

/// Builds both the shared state (kept for direct assertions) and a
/// `TestServer` wrapping the same router a real deployment serves.
async fn test_harness() -> (Arc<RelayState>, TestServer) {
    let state = RelayState::build(test_config(), CancellationToken::new()).await.expect("state build");
    let server = TestServer::new(build_router(Arc::clone(&state))).expect("create test server");
    (state, server)
}

async fn activate_device(server: &TestServer, device_id: &str) {
    server
        .post("/api/device/provision")
        .add_header(HEADER_CONTROLLER_KEY, CONTROLLER_KEY)
        .json(&serde_json::json!({ "device_id": device_id, "public_key": "pk" }))
        .await
        .assert_status_ok();
    server
        .post("/api/device/provision/confirm")
        .add_header(HEADER_CONTROLLER_KEY, CONTROLLER_KEY)
        .json(&serde_json::json!({ "device_id": device_id }))
        .await
        .assert_status_ok();
}

async fn received_messages(server: &TestServer, device_id: &str) -> Vec<serde_json::Value> {
    let resp = server.get("/api/message/receive").add_header(HEADER_DEVICE_ID, device_id).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    body["messages"].as_array().cloned().unwrap_or_default()
}

async fn create_conversation(server: &TestServer, creator: &str, participants: &[&str]) -> String {
    let resp = server
        .post("/api/conversation/create")
        .add_header(HEADER_DEVICE_ID, creator)
        .json(&serde_json::json!({ "participants": participants }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    body["conversation_id"].as_str().unwrap().to_owned()
}

// -- S1: full provision -> send -> poll -> ack lifecycle ---------------------

#[tokio::test]
async fn full_lifecycle_provision_send_poll_ack() {
    let (state, server) = test_harness().await;
    activate_device(&server, "alice").await;
    activate_device(&server, "bob").await;
    let conversation_id = create_conversation(&server, "alice", &["bob"]).await;

    let resp = server
        .post("/api/message/send")
        .add_header(HEADER_DEVICE_ID, "alice")
        .json(&serde_json::json!({ "conversation_id": conversation_id, "payload": "cafebabe" }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);
    assert_eq!(state.relay.pending_count().await, 1);

    let messages = received_messages(&server, "bob").await;
    assert_eq!(messages.len(), 1);
    let message_id = messages[0]["message_id"].as_str().unwrap().to_owned();
    assert_eq!(messages[0]["payload"], "cafebabe");

    // A second poll without acking still returns the message (it's only
    // dropped from the recipient's own queue on ack, not on read).
    let messages_again = received_messages(&server, "bob").await;
    assert_eq!(messages_again.len(), 1);

    // Simulate the WebSocket ack path (the same call `ws.rs` makes on an
    // inbound `ack` frame), since axum-test isn't wired for a live socket.
    let message_uuid: uuid::Uuid = message_id.parse().unwrap();
    state.relay.ack(message_uuid, "bob").await.unwrap();
    state.ack.clear(message_uuid, "bob").await;
    assert_eq!(state.relay.pending_count().await, 0);

    let messages_after_ack = received_messages(&server, "bob").await;
    assert!(messages_after_ack.is_empty());
}

// -- S2: REST-only fallback (no live connection) -----------------------------

#[tokio::test]
async fn rest_poll_fallback_delivers_without_a_live_connection() {
    let (_state, server) = test_harness().await;
    activate_device(&server, "alice").await;
    activate_device(&server, "bob").await;
    let conversation_id = create_conversation(&server, "alice", &["bob"]).await;

    // Nobody ever connects to /ws/messages for bob; REST polling is the
    // only delivery path exercised here.
    server
        .post("/api/message/send")
        .add_header(HEADER_DEVICE_ID, "alice")
        .json(&serde_json::json!({ "conversation_id": conversation_id, "payload": "01" }))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let messages = received_messages(&server, "bob").await;
    assert_eq!(messages.len(), 1);
}

// -- S3: revocation cascade ---------------------------------------------------

#[tokio::test]
async fn revoking_last_active_participant_closes_the_conversation() {
    let (_state, server) = test_harness().await;
    activate_device(&server, "alice").await;
    activate_device(&server, "bob").await;
    let conversation_id = create_conversation(&server, "alice", &["bob"]).await;

    let resp = server
        .post("/api/device/revoke")
        .add_header(HEADER_CONTROLLER_KEY, CONTROLLER_KEY)
        .json(&serde_json::json!({ "device_id": "alice" }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["affected_conversations"], 1);
    assert_eq!(body["conversations_closed"], 0);

    // bob can still read info (still a participant); alice cannot send.
    let resp = server
        .get("/api/conversation/info")
        .add_header(HEADER_DEVICE_ID, "bob")
        .add_query_param("conversation_id", &conversation_id)
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["participants"].as_array().unwrap().len(), 1);

    let resp = server
        .post("/api/message/send")
        .add_header(HEADER_DEVICE_ID, "alice")
        .json(&serde_json::json!({ "conversation_id": conversation_id, "payload": "01" }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    // Revoking the last remaining participant closes the conversation.
    let resp = server
        .post("/api/device/revoke")
        .add_header(HEADER_CONTROLLER_KEY, CONTROLLER_KEY)
        .json(&serde_json::json!({ "device_id": "bob" }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["conversations_closed"], 1);
}

#[tokio::test]
async fn revoking_an_unknown_device_reports_no_affected_conversations() {
    let (_state, server) = test_harness().await;
    let resp = server
        .post("/api/device/revoke")
        .add_header(HEADER_CONTROLLER_KEY, CONTROLLER_KEY)
        .json(&serde_json::json!({ "device_id": "nobody" }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

// -- S4: expiration ------------------------------------------------------------

#[tokio::test]
async fn expired_messages_disappear_from_the_poll_queue() {
    let (state, server) = test_harness().await;
    activate_device(&server, "alice").await;
    activate_device(&server, "bob").await;
    let conversation_id = create_conversation(&server, "alice", &["bob"]).await;

    let soon = (chrono::Utc::now() + chrono::Duration::milliseconds(50)).to_rfc3339();
    server
        .post("/api/message/send")
        .add_header(HEADER_DEVICE_ID, "alice")
        .json(&serde_json::json!({ "conversation_id": conversation_id, "payload": "01", "expiration": soon }))
        .await
        .assert_status(StatusCode::ACCEPTED);

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    // The background sweep runs on its own interval; poll filters
    // expired entries regardless of whether the sweep has run yet.
    let messages = received_messages(&server, "bob").await;
    assert!(messages.is_empty());

    let removed = state.relay.sweep_expired().await;
    assert_eq!(removed, 1);
}

// -- S5: failed-delivery alert threshold ---------------------------------------

#[tokio::test]
async fn repeated_failed_deliveries_trigger_an_alert() {
    let (state, _server) = test_harness().await;
    for _ in 0..relay::constants::ALERT_THRESHOLD_FAILED_DELIVERIES {
        state.metrics.record_failed_delivery().await;
    }
    assert_eq!(state.metrics.alerts().await.len(), 1);
}

// -- S6: content-classification enforcement on client-submitted log events ----

#[tokio::test]
async fn client_submitted_log_events_are_screened_for_content() {
    let (_state, server) = test_harness().await;
    activate_device(&server, "alice").await;

    let resp = server
        .post("/api/log/event")
        .add_header(HEADER_DEVICE_ID, "alice")
        .json(&serde_json::json!({ "event_type": "message_attempted", "event_data": { "message_id": "abc" } }))
        .await;
    resp.assert_status_ok();

    let resp = server
        .post("/api/log/event")
        .add_header(HEADER_DEVICE_ID, "alice")
        .json(&serde_json::json!({ "event_type": "message_attempted", "event_data": { "decrypted_payload": "secret" } }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

// -- Boundary conditions --------------------------------------------------------

#[tokio::test]
async fn group_of_max_size_is_accepted_one_more_is_rejected() {
    let (_state, server) = test_harness().await;
    activate_device(&server, "creator").await;

    let mut participants = Vec::new();
    for i in 0..(MAX_GROUP_SIZE - 1) {
        let device_id = format!("member-{i}");
        activate_device(&server, &device_id).await;
        participants.push(device_id);
    }
    let participant_refs: Vec<&str> = participants.iter().map(String::as_str).collect();
    let resp = server
        .post("/api/conversation/create")
        .add_header(HEADER_DEVICE_ID, "creator")
        .json(&serde_json::json!({ "participants": participant_refs }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["participants"].as_array().unwrap().len(), MAX_GROUP_SIZE);

    activate_device(&server, "one-too-many").await;
    let mut over_participants = participants.clone();
    over_participants.push("one-too-many".to_owned());
    let over_refs: Vec<&str> = over_participants.iter().map(String::as_str).collect();
    let resp = server
        .post("/api/conversation/create")
        .add_header(HEADER_DEVICE_ID, "creator")
        .json(&serde_json::json!({ "participants": over_refs }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payload_at_the_size_limit_is_accepted_one_byte_over_is_rejected() {
    let (_state, server) = test_harness().await;
    activate_device(&server, "alice").await;
    activate_device(&server, "bob").await;
    let conversation_id = create_conversation(&server, "alice", &["bob"]).await;

    let at_limit = hex::encode(vec![0u8; MAX_MESSAGE_PAYLOAD_BYTES]);
    let resp = server
        .post("/api/message/send")
        .add_header(HEADER_DEVICE_ID, "alice")
        .json(&serde_json::json!({ "conversation_id": conversation_id, "payload": at_limit }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);

    let over_limit = hex::encode(vec![0u8; MAX_MESSAGE_PAYLOAD_BYTES + 1]);
    let resp = server
        .post("/api/message/send")
        .add_header(HEADER_DEVICE_ID, "alice")
        .json(&serde_json::json!({ "conversation_id": conversation_id, "payload": over_limit }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error_code"], "payload_size_exceeded");
}

#[tokio::test]
async fn leaving_and_rejoining_is_idempotent_on_conversation_membership() {
    let (_state, server) = test_harness().await;
    activate_device(&server, "alice").await;
    activate_device(&server, "bob").await;
    let conversation_id = create_conversation(&server, "alice", &["bob"]).await;

    server
        .post("/api/conversation/leave")
        .add_header(HEADER_DEVICE_ID, "bob")
        .add_query_param("conversation_id", &conversation_id)
        .await
        .assert_status_ok();

    // Leaving twice is rejected: bob is no longer a member the second time.
    let resp = server
        .post("/api/conversation/leave")
        .add_header(HEADER_DEVICE_ID, "bob")
        .add_query_param("conversation_id", &conversation_id)
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    server
        .post("/api/conversation/join")
        .add_header(HEADER_DEVICE_ID, "bob")
        .add_query_param("conversation_id", &conversation_id)
        .await
        .assert_status_ok();

    let resp = server
        .get("/api/conversation/info")
        .add_header(HEADER_DEVICE_ID, "bob")
        .add_query_param("conversation_id", &conversation_id)
        .await;
    resp.assert_status_ok();
}

#[tokio::test]
async fn closing_a_conversation_twice_is_idempotent() {
    let (_state, server) = test_harness().await;
    activate_device(&server, "alice").await;
    let conversation_id = create_conversation(&server, "alice", &[]).await;

    server
        .post("/api/conversation/close")
        .add_header(HEADER_DEVICE_ID, "alice")
        .add_query_param("conversation_id", &conversation_id)
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/conversation/close")
        .add_header(HEADER_DEVICE_ID, "alice")
        .add_query_param("conversation_id", &conversation_id)
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["state"], "closed");
}
