// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the relay's API surface (§6). Each handler validates
//! its own request shape, consults the Authorization Gate (via the service
//! layer it delegates to), and maps domain errors to the `error_code`
//! taxonomy in [`crate::error`].

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{codes, RelayError};
use crate::identity::IdentityError;
use crate::state::RelayState;
use crate::transport::auth::{device_id, require_controller};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pending_messages: usize,
    pub connected_devices: usize,
}

pub async fn health(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        pending_messages: state.relay.pending_count().await,
        connected_devices: state.delivery.connected_count().await,
    })
}

// -- Device provisioning (§4.A, §6) -----------------------------------------

#[derive(Debug, Deserialize)]
pub struct ProvisionDeviceRequest {
    pub device_id: String,
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceStatusResponse {
    pub status: &'static str,
    pub device_id: String,
    pub state: &'static str,
}

pub async fn device_provision(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(body): Json<ProvisionDeviceRequest>,
) -> Result<impl IntoResponse, RelayError> {
    require_controller(&headers, &state)?;
    if body.device_id.is_empty() || body.public_key.is_empty() {
        return Err(RelayError::bad_request(codes::PARTICIPANTS_REQUIRED, "device_id and public_key are required"));
    }

    let controller_id = headers
        .get(crate::constants::HEADER_CONTROLLER_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let record = state
        .identity
        .register(&body.device_id, &body.public_key, controller_id)
        .await
        .map_err(map_identity_error)?;

    state
        .log
        .log_audit_event(
            "device_provisioned",
            serde_json::json!({ "device_id": record.device_id, "state": record.state.as_str() }),
        )
        .await
        .ok();

    Ok((
        axum::http::StatusCode::OK,
        Json(DeviceStatusResponse { status: "provisioned", device_id: record.device_id, state: record.state.as_str() }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmProvisioningRequest {
    pub device_id: String,
}

/// Advances a device through the remaining activation steps in one call.
///
/// The Identity Registry exposes `provision` (`Pending -> Provisioned`) and
/// `confirm` (`Provisioned -> Active`) as two distinct transitions, mirroring
/// the original device registry's own methods. But the Controller API this
/// was distilled from never wires a route to the second one: its
/// `/api/device/provision/confirm` handler calls only the first transition,
/// so every device provisioned through it is stuck `Provisioned` and can
/// never send, create, or join. This handler runs both remaining
/// transitions so a device is usable after exactly the two Controller calls
/// the external contract describes.
pub async fn device_provision_confirm(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(body): Json<ConfirmProvisioningRequest>,
) -> Result<impl IntoResponse, RelayError> {
    require_controller(&headers, &state)?;
    if body.device_id.is_empty() {
        return Err(RelayError::bad_request(codes::PARTICIPANTS_REQUIRED, "device_id is required"));
    }

    let current = state
        .identity
        .get(&body.device_id)
        .await
        .ok_or_else(|| RelayError::not_found(codes::DEVICE_UNKNOWN, "device not found"))?;

    let record = match current.state {
        crate::identity::DeviceState::Pending => {
            state.identity.provision(&body.device_id).await.map_err(map_identity_error)?;
            state.identity.confirm(&body.device_id).await.map_err(map_identity_error)?
        }
        crate::identity::DeviceState::Provisioned => {
            state.identity.confirm(&body.device_id).await.map_err(map_identity_error)?
        }
        crate::identity::DeviceState::Active | crate::identity::DeviceState::Revoked => {
            return Err(RelayError::conflict(codes::DEVICE_BAD_STATE, "device not in a confirmable state"));
        }
    };

    state
        .log
        .log_audit_event(
            "device_provisioned",
            serde_json::json!({ "device_id": record.device_id, "state": record.state.as_str() }),
        )
        .await
        .ok();

    Ok((
        axum::http::StatusCode::OK,
        Json(DeviceStatusResponse { status: "confirmed", device_id: record.device_id, state: record.state.as_str() }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RevokeDeviceRequest {
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeDeviceResponse {
    pub status: &'static str,
    pub device_id: String,
    pub affected_conversations: usize,
    pub conversations_closed: usize,
}

pub async fn device_revoke(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(body): Json<RevokeDeviceRequest>,
) -> Result<impl IntoResponse, RelayError> {
    require_controller(&headers, &state)?;
    if body.device_id.is_empty() {
        return Err(RelayError::bad_request(codes::PARTICIPANTS_REQUIRED, "device_id is required"));
    }
    if state.identity.get(&body.device_id).await.is_none() {
        return Err(RelayError::not_found(codes::DEVICE_UNKNOWN, "device not found"));
    }

    let report = state
        .identity
        .revoke_with_propagation(&body.device_id, state.store.as_ref(), &state.reverse_index, &state.log)
        .await
        .map_err(map_identity_error)?;

    Ok((
        axum::http::StatusCode::OK,
        Json(RevokeDeviceResponse {
            status: "revoked",
            device_id: report.device_id,
            affected_conversations: report.affected_conversations,
            conversations_closed: report.conversations_closed,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct DeviceStatusQuery {
    pub device_id: String,
}

/// Controller-only full device record read, supplementing the core
/// endpoint table with the read path a Controller dashboard needs to show
/// provisioning progress.
pub async fn device_status(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Query(query): Query<DeviceStatusQuery>,
) -> Result<impl IntoResponse, RelayError> {
    require_controller(&headers, &state)?;
    let record = state
        .identity
        .get(&query.device_id)
        .await
        .ok_or_else(|| RelayError::not_found(codes::DEVICE_UNKNOWN, "device not found"))?;
    Ok(Json(record))
}

fn map_identity_error(err: IdentityError) -> RelayError {
    match err {
        IdentityError::NotFound => RelayError::not_found(codes::DEVICE_UNKNOWN, "device not found"),
        IdentityError::AlreadyExists => RelayError::conflict(codes::DEVICE_ALREADY_EXISTS, "device already provisioned"),
        IdentityError::BadState => RelayError::conflict(codes::DEVICE_BAD_STATE, "device not in the required state"),
    }
}

// -- Conversations (§4.D, §6) ------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub status: &'static str,
    pub conversation_id: String,
    pub participants: Vec<String>,
    pub state: &'static str,
}

impl From<crate::membership::ConversationRecord> for ConversationResponse {
    fn from(record: crate::membership::ConversationRecord) -> Self {
        Self {
            status: "success",
            conversation_id: record.conversation_id,
            participants: record.participants,
            state: record.state.as_str(),
        }
    }
}

pub async fn conversation_create(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(body): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let caller = device_id(&headers)?;
    crate::authz::check(&state.identity, &caller, crate::authz::Operation::CreateConversation).await?;
    let record = state.conversations.create(&caller, body.conversation_id, body.participants).await?;
    Ok((axum::http::StatusCode::OK, Json(ConversationResponse::from(record))))
}

#[derive(Debug, Deserialize)]
pub struct ConversationIdRequest {
    pub conversation_id: String,
}

pub async fn conversation_join(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Query(query): Query<ConversationIdRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let caller = device_id(&headers)?;
    if query.conversation_id.is_empty() {
        return Err(RelayError::bad_request(codes::CONVERSATION_ID_REQUIRED, "conversation_id is required"));
    }
    let outcome = state.conversations.join(&caller, &query.conversation_id).await?;
    Ok((axum::http::StatusCode::OK, Json(ConversationResponse::from(outcome.record))))
}

#[derive(Debug, Serialize)]
pub struct LeaveConversationResponse {
    pub status: &'static str,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub conversation_closed: bool,
}

pub async fn conversation_leave(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Query(query): Query<ConversationIdRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let caller = device_id(&headers)?;
    if query.conversation_id.is_empty() {
        return Err(RelayError::bad_request(codes::CONVERSATION_ID_REQUIRED, "conversation_id is required"));
    }
    let outcome = state.conversations.leave(&caller, &query.conversation_id).await?;
    Ok((
        axum::http::StatusCode::OK,
        Json(LeaveConversationResponse {
            status: "success",
            conversation_id: outcome.record.conversation_id,
            conversation_closed: outcome.conversation_closed,
        }),
    ))
}

pub async fn conversation_close(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Query(query): Query<ConversationIdRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let caller = device_id(&headers)?;
    if query.conversation_id.is_empty() {
        return Err(RelayError::bad_request(codes::CONVERSATION_ID_REQUIRED, "conversation_id is required"));
    }
    let record = state.conversations.close(&caller, &query.conversation_id).await?;
    Ok((axum::http::StatusCode::OK, Json(ConversationResponse::from(record))))
}

#[derive(Debug, Deserialize)]
pub struct ConversationInfoQuery {
    pub conversation_id: String,
}

pub async fn conversation_info(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Query(query): Query<ConversationInfoQuery>,
) -> Result<impl IntoResponse, RelayError> {
    let caller = device_id(&headers)?;
    let record = state.conversations.info(&caller, &query.conversation_id).await?;
    Ok(Json(ConversationResponse::from(record)))
}

// -- Messages (§4.E, §6) -----------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub payload: String,
    #[serde(default)]
    pub expiration: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub status: &'static str,
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// `conversation_not_found` is reported as `400`, not `404`, on the send
/// path — the external contract treats an unknown conversation as a
/// malformed request here, unlike the read path (`conversation_info`),
/// which uses `404`.
pub async fn message_send(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let caller = device_id(&headers)?;
    crate::authz::check(&state.identity, &caller, crate::authz::Operation::SendMessage).await?;
    if body.conversation_id.is_empty() {
        return Err(RelayError::bad_request(codes::CONVERSATION_ID_REQUIRED, "conversation_id is required"));
    }
    if body.payload.is_empty() {
        return Err(RelayError::bad_request(codes::PAYLOAD_REQUIRED, "payload is required"));
    }

    let record = state
        .store
        .get(&body.conversation_id)
        .await
        .map_err(|_| RelayError::backend_send())?
        .ok_or_else(|| RelayError::bad_request(codes::CONVERSATION_NOT_FOUND, "conversation not found"))?;
    if record.state != crate::membership::ConversationState::Active {
        return Err(RelayError::bad_request(codes::CONVERSATION_NOT_ACTIVE, "conversation is not active"));
    }
    if !record.contains(&caller) {
        return Err(RelayError::forbidden(codes::SENDER_NOT_PARTICIPANT, "not a participant"));
    }

    let now = Utc::now();
    let expires_at = match body.expiration {
        None => crate::relay::RelayCore::default_expiration(now),
        Some(raw) => raw
            .parse::<DateTime<Utc>>()
            .map_err(|_| RelayError::bad_request(codes::EXPIRATION_INVALID_FORMAT, "expiration must be RFC 3339"))?,
    };

    let payload =
        crate::relay::encoding::decode_inbound(state.encoding_mode(), &body.payload, state.server_key.as_deref())?;

    let mut recipients = Vec::new();
    for candidate in &record.participants {
        if candidate != &caller && state.identity.is_active(candidate).await {
            recipients.push(candidate.clone());
        }
    }

    let message = state.relay.relay(&caller, &record.conversation_id, recipients.clone(), payload, expires_at).await?;

    state
        .log
        .log_event(
            "message_attempted",
            serde_json::json!({ "conversation_id": record.conversation_id, "recipient_count": recipients.len() }),
        )
        .await
        .ok();

    for recipient in recipients {
        let delivered = crate::relay::DeliveredMessage::from(&message);
        if state.delivery.is_connected(&recipient).await {
            state.delivery.enqueue(&recipient, delivered.clone()).await;
        }
        state.ack.start(delivered, recipient);
    }

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(SendMessageResponse { status: "queued", message_id: message.id, timestamp: message.created_at }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ReceiveMessagesQuery {
    #[serde(default)]
    pub last_received_id: Option<Uuid>,
}

/// Wire shape for a single polled message. The REST poll response names
/// this field `message_id`, distinct from the WebSocket frame's `id`
/// (§4.F vs §6) — two callers, two documented field names for the same
/// identifier.
#[derive(Debug, Serialize)]
pub struct ReceivedMessage {
    pub message_id: Uuid,
    pub payload: String,
    pub sender_id: String,
    pub expiration: DateTime<Utc>,
    pub conversation_id: String,
}

impl From<&crate::relay::DeliveredMessage> for ReceivedMessage {
    fn from(message: &crate::relay::DeliveredMessage) -> Self {
        Self {
            message_id: message.id,
            payload: message.payload.clone(),
            sender_id: message.sender_id.clone(),
            expiration: message.expiration,
            conversation_id: message.conversation_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiveMessagesResponse {
    pub messages: Vec<ReceivedMessage>,
}

pub async fn message_receive(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Query(query): Query<ReceiveMessagesQuery>,
) -> Result<impl IntoResponse, RelayError> {
    let caller = device_id(&headers)?;
    if !state.identity.can_read(&caller).await {
        return Err(RelayError::unauthorized("device not authorized to receive messages"));
    }
    state.identity.touch(&caller).await;
    let messages = state.relay.poll(&caller, query.last_received_id).await;
    let messages = messages.iter().map(ReceivedMessage::from).collect();
    Ok(Json(ReceiveMessagesResponse { messages }))
}

// -- Observability submission (§6 supplement) --------------------------------

#[derive(Debug, Deserialize)]
pub struct LogEventRequest {
    pub event_type: String,
    #[serde(default)]
    pub event_data: serde_json::Value,
}

/// Accepts a client-submitted operational event. Unlike the server's own
/// internal `log_event` calls (which swallow content-schema violations as a
/// programming error never surfaced to a caller), a violation submitted by
/// a client here is the client's own mistake and is reported as `400`.
pub async fn log_event(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(body): Json<LogEventRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let caller = device_id(&headers)?;
    if !crate::observability::EVENT_TYPES.contains(&body.event_type.as_str()) {
        return Err(RelayError::bad_request(codes::EVENT_TYPE_INVALID, "unrecognized event_type"));
    }
    let mut data = match body.event_data {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        _ => return Err(RelayError::bad_request(codes::EVENT_DATA_INVALID, "event_data must be an object")),
    };
    data.insert("device_id".to_owned(), serde_json::Value::String(caller));

    state
        .log
        .log_event(&body.event_type, serde_json::Value::Object(data))
        .await
        .map_err(|_| RelayError::bad_request(codes::EVENT_DATA_INVALID, "event_data violates the content-free schema"))?;

    Ok(axum::http::StatusCode::OK)
}
