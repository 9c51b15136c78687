// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A client-rule violation or backend failure, carrying a stable
/// machine-readable `error_code` and an HTTP status.
///
/// Errors that represent framework-level schema rejections (malformed JSON)
/// are not represented here; axum's native 422 body is allowed to surface
/// those directly.
#[derive(Debug, Clone)]
pub struct RelayError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl RelayError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    /// Category (e): transient backend failure. Never reveals internal detail.
    pub fn backend() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "backend_failure", "Backend failure")
    }

    /// Same category, but for a transient failure specifically on the send
    /// path, where §7 names a distinct user-facing message from the
    /// generic backend failure.
    pub fn backend_send() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "backend_failure", crate::constants::ERROR_UNABLE_TO_SEND)
    }

    pub fn as_str(&self) -> &'static str {
        self.code
    }

    pub fn http_status(&self) -> StatusCode {
        self.status
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        let body = ErrorResponse {
            error_code: self.code.to_owned(),
            message: self.message.clone(),
            request_id: Uuid::new_v4(),
        };
        (self.status, Json(body))
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RelayError {}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        self.to_http_response().into_response()
    }
}

/// Structured error body returned to callers for client-rule violations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub request_id: Uuid,
}

/// Canonical error_code strings named by the external contract.
pub mod codes {
    pub const CONVERSATION_ID_REQUIRED: &str = "conversation_id_required";
    pub const PAYLOAD_REQUIRED: &str = "payload_required";
    pub const PAYLOAD_NOT_STRING: &str = "payload_not_string";
    pub const PAYLOAD_ENCODING_INVALID: &str = "payload_encoding_invalid";
    pub const PAYLOAD_PLAINTEXT_REJECTED: &str = "payload_plaintext_rejected";
    pub const PAYLOAD_SIZE_EXCEEDED: &str = "payload_size_exceeded";
    pub const CONVERSATION_NOT_ACTIVE: &str = "conversation_not_active";
    pub const CONVERSATION_NOT_FOUND: &str = "conversation_not_found";
    pub const NO_RECIPIENTS_AVAILABLE: &str = "no_recipients_available";
    pub const EXPIRATION_INVALID_FORMAT: &str = "expiration_invalid_format";
    pub const EXPIRATION_NOT_FUTURE: &str = "expiration_not_future";
    pub const SENDER_NOT_PARTICIPANT: &str = "sender_not_participant";
    pub const DEVICE_NOT_ACTIVE: &str = "device_not_active";
    pub const PARTICIPANTS_REQUIRED: &str = "participants_required";
    pub const DEVICE_UNKNOWN: &str = "device_unknown";
    pub const DEVICE_ALREADY_EXISTS: &str = "device_already_exists";
    pub const DEVICE_BAD_STATE: &str = "device_bad_state";
    pub const CONTROLLER_KEY_INVALID: &str = "controller_key_invalid";
    pub const CONVERSATION_FULL: &str = "conversation_full";
    pub const MESSAGE_UNKNOWN: &str = "message_unknown";
    pub const EVENT_TYPE_INVALID: &str = "event_type_invalid";
    pub const EVENT_DATA_INVALID: &str = "event_data_invalid";
}
