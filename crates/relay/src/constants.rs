// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical numeric and string constants shared across the relay, kept
//! in one place so no magic number is hand-copied at its use site.

use std::time::Duration;

/// Maximum participants in a single conversation.
pub const MAX_GROUP_SIZE: usize = 50;

/// Maximum recipients on a single `relay` call.
pub const MAX_RECIPIENTS: usize = 50;

/// Maximum opaque payload size, in bytes.
pub const MAX_MESSAGE_PAYLOAD_BYTES: usize = 50 * 1024;

/// Default message lifetime when the caller does not supply one.
pub const DEFAULT_MESSAGE_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Maximum delivery retries before a message is marked `Failed`.
pub const MAX_DELIVERY_RETRIES: u32 = 5;

/// Time to wait for a per-recipient ACK before retrying.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Base delay for exponential retry backoff.
pub const RETRY_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Cap on retry backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// REST poll interval recommended to clients (advisory only; not enforced server-side).
pub const REST_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket reconnect fallback threshold (advisory, client-side).
pub const WEBSOCKET_RECONNECT_FALLBACK: Duration = Duration::from_secs(15);

/// Tolerance for clock skew between client-supplied and server timestamps.
pub const CLOCK_SKEW_TOLERANCE: Duration = Duration::from_secs(2 * 60);

/// Operational log retention window.
pub const LOG_RETENTION_DAYS: i64 = 90;

/// Metrics aggregation window.
pub const METRICS_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Alert threshold for failed deliveries within one metrics window.
pub const ALERT_THRESHOLD_FAILED_DELIVERIES: u64 = 5;

/// Default conversation TTL (inactivity before the membership store expires it).
pub const DEFAULT_CONVERSATION_TTL_SECONDS: i64 = 30 * 60;

/// Key rotation cadence for device identities.
pub const KEY_ROTATION_PERIOD_DAYS: i64 = 90;

/// Demo-mode device activity window for the `is_active` TTL relaxation.
pub const DEMO_ACTIVITY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Header carrying the device identifier on user-facing endpoints.
pub const HEADER_DEVICE_ID: &str = "X-Device-ID";

/// Header carrying the Controller API key on controller endpoints.
pub const HEADER_CONTROLLER_KEY: &str = "X-Controller-Key";

/// Neutral, externally-visible error copy. No stack traces, no internals.
pub const ERROR_MESSAGING_DISABLED: &str = "Messaging Disabled";
pub const ERROR_UNABLE_TO_SEND: &str = "Unable to send messages; retry will occur automatically";
pub const ERROR_BACKEND_UNREACHABLE: &str = "Unable to connect; retry will occur automatically";
