// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport for real-time delivery (§4.F, §6). One connection
//! per device; outbound frames are `DeliveredMessage` JSON, inbound frames
//! are `InboundFrame` (currently just `ack`). Close code `1008` (policy
//! violation) is used for an unauthorized device, matching the HTTP
//! surface's `401`/`403` split at the connection boundary instead.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::delivery::InboundFrame;
use crate::state::RelayState;

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesWsQuery {
    pub device_id: String,
}

pub async fn ws_handler(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<MessagesWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if query.device_id.is_empty() || !state.identity.can_read(&query.device_id).await {
        return ws.on_upgrade(|socket| async move { close_unauthorized(socket).await });
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, query.device_id))
}

/// Policy-violation close (RFC 6455 code 1008): an unrecognized or
/// revoked-without-read-access device never gets a live connection.
async fn close_unauthorized(mut socket: WebSocket) {
    let frame = CloseFrame { code: 1008, reason: "unauthorized device".into() };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Drives a single device's connection: a receiver task drains the
/// `DeliveryChannel` mpsc queue and writes outbound frames, while the main
/// loop reads inbound `ack` frames and resolves the corresponding ACK
/// timer. Disconnection (either direction) tears down the connection-table
/// entry so subsequent sends fall back to REST polling.
async fn handle_socket(socket: WebSocket, state: Arc<RelayState>, device_id: String) {
    let (mut sink, mut stream) = socket.split();
    let mut outbound = state.delivery.connect(&device_id).await;
    state.identity.touch(&device_id).await;

    tracing::debug!(device_id = %device_id, "websocket connected");

    loop {
        tokio::select! {
            outgoing = outbound.recv() => {
                let Some(message) = outgoing else { break };
                let Ok(text) = serde_json::to_string(&message) else { continue };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                let Some(frame) = incoming else { break };
                let Ok(frame) = frame else { break };
                match frame {
                    Message::Text(text) => handle_inbound_text(&state, &device_id, &text.to_string()).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.delivery.disconnect(&device_id).await;
    tracing::debug!(device_id = %device_id, "websocket disconnected");
}

async fn handle_inbound_text(state: &Arc<RelayState>, device_id: &str, text: &str) {
    let Ok(frame) = serde_json::from_str::<InboundFrame>(text) else { return };
    match frame {
        InboundFrame::Ack { message_id, .. } => {
            if state.relay.ack(message_id, device_id).await.is_ok() {
                state.ack.clear(message_id, device_id).await;
            }
        }
        InboundFrame::Unknown => {}
    }
}
