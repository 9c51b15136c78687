// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the relay: route wiring, header-based
//! authentication (§4.J), and request validation live in the handler
//! modules; this module only assembles the `axum::Router`.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::RelayState;

/// Builds the axum `Router` with every endpoint named in §6, plus the
/// supplemental Controller device-status read (§6 supplement).
pub fn build_router(state: Arc<RelayState>) -> Router {
    let cors = match state.config.frontend_origin.as_deref() {
        Some(origin) => match origin.parse() {
            Ok(value) => CorsLayer::new().allow_origin(value).allow_methods(tower_http::cors::Any),
            Err(_) => CorsLayer::permissive(),
        },
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/health", get(http::health))
        .route("/api/device/provision", post(http::device_provision))
        .route("/api/device/provision/confirm", post(http::device_provision_confirm))
        .route("/api/device/revoke", post(http::device_revoke))
        .route("/api/device/status", get(http::device_status))
        .route("/api/conversation/create", post(http::conversation_create))
        .route("/api/conversation/join", post(http::conversation_join))
        .route("/api/conversation/leave", post(http::conversation_leave))
        .route("/api/conversation/close", post(http::conversation_close))
        .route("/api/conversation/info", get(http::conversation_info))
        .route("/api/message/send", post(http::message_send))
        .route("/api/message/receive", get(http::message_receive))
        .route("/api/log/event", post(http::log_event))
        .route("/ws/messages", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
