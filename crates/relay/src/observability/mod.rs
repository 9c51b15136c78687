// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observability Pipeline: a content-free event log (operational + audit)
//! and windowed, threshold-alerted metrics.

pub mod log;
pub mod metrics;

/// Enumerated log event types (closed set, per the external contract).
pub const EVENT_TYPES: &[&str] = &[
    "device_provisioned",
    "device_revoked",
    "message_attempted",
    "policy_enforced",
    "system_start",
    "system_stop",
    "delivery_failed",
    "conversation_created",
    "conversation_participant_joined",
    "conversation_participant_left",
    "conversation_closed",
];

/// Substrings that may never appear in a log or metric key, enforced
/// case-insensitively. Violating this is a programming error, not a
/// runtime condition, and is never surfaced to an HTTP caller.
pub const PROHIBITED_KEY_SUBSTRINGS: &[&str] = &["content", "plaintext", "payload", "key", "secret", "password"];

/// Maximum length for any string value in event data.
pub const MAX_VALUE_LEN: usize = 1000;
