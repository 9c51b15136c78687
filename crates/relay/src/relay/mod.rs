// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay Core: accepts encrypted payloads, queues them per recipient, and
//! enforces expiration. A single `RwLock<HashMap<Uuid, PendingMessage>>`
//! backs the pending map — coarse-grained locking is acceptable here since
//! messages are small and short-lived (the original keeps a single dict
//! for the same reason).

pub mod encoding;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::constants::{DEFAULT_MESSAGE_EXPIRATION, MAX_MESSAGE_PAYLOAD_BYTES, MAX_RECIPIENTS};
use crate::error::{codes, RelayError};

#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub id: Uuid,
    pub sender_id: String,
    pub conversation_id: String,
    pub remaining_recipients: HashSet<String>,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingMessage {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A message as delivered to a single recipient, over WebSocket or REST
/// poll. Payload is always hex-encoded on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveredMessage {
    pub id: Uuid,
    pub conversation_id: String,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
    pub expiration: DateTime<Utc>,
}

impl From<&PendingMessage> for DeliveredMessage {
    fn from(message: &PendingMessage) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id.clone(),
            payload: hex::encode(&message.payload),
            timestamp: message.created_at,
            sender_id: message.sender_id.clone(),
            expiration: message.expires_at,
        }
    }
}

pub struct RelayCore {
    pending: RwLock<HashMap<Uuid, PendingMessage>>,
}

impl Default for RelayCore {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayCore {
    pub fn new() -> Self {
        Self { pending: RwLock::new(HashMap::new()) }
    }

    /// Accepts a pre-validated, already-decoded payload and queues it for
    /// every active recipient. Recipient activity is validated by the
    /// caller (the HTTP handler, via the Identity Registry) before this is
    /// invoked; this method enforces only the relay-local invariants.
    #[allow(clippy::too_many_arguments)]
    pub async fn relay(
        &self,
        sender_id: &str,
        conversation_id: &str,
        recipients: Vec<String>,
        payload: Vec<u8>,
        expires_at: DateTime<Utc>,
    ) -> Result<PendingMessage, RelayError> {
        if payload.len() > MAX_MESSAGE_PAYLOAD_BYTES {
            return Err(RelayError::bad_request(codes::PAYLOAD_SIZE_EXCEEDED, "payload exceeds 50 KB"));
        }
        if recipients.len() > MAX_RECIPIENTS {
            return Err(RelayError::bad_request(codes::NO_RECIPIENTS_AVAILABLE, "too many recipients"));
        }
        if recipients.is_empty() {
            return Err(RelayError::bad_request(codes::NO_RECIPIENTS_AVAILABLE, "no recipients available"));
        }
        let now = Utc::now();
        if expires_at <= now {
            return Err(RelayError::bad_request(codes::EXPIRATION_NOT_FUTURE, "expiration must be in the future"));
        }

        let message = PendingMessage {
            id: Uuid::new_v4(),
            sender_id: sender_id.to_owned(),
            conversation_id: conversation_id.to_owned(),
            remaining_recipients: recipients.into_iter().collect(),
            payload,
            created_at: now,
            expires_at,
        };
        self.pending.write().await.insert(message.id, message.clone());
        Ok(message)
    }

    pub fn default_expiration(now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(DEFAULT_MESSAGE_EXPIRATION)
            .unwrap_or_else(|_| chrono::Duration::days(7))
    }

    /// REST poll: messages not yet expired, not yet ACKed by `device_id`,
    /// with `id` ordering implied by insertion (the original orders by a
    /// monotonically increasing message id; here the UUID's creation time
    /// is carried alongside so callers can order by `created_at`).
    pub async fn poll(&self, device_id: &str, last_received_id: Option<Uuid>) -> Vec<DeliveredMessage> {
        let now = Utc::now();
        let pending = self.pending.read().await;
        let mut messages: Vec<&PendingMessage> = pending
            .values()
            .filter(|m| !m.is_expired(now))
            .filter(|m| m.remaining_recipients.contains(device_id))
            .collect();
        messages.sort_by_key(|m| m.created_at);
        if let Some(last_seen) = last_received_id {
            if let Some(pos) = messages.iter().position(|m| m.id == last_seen) {
                messages = messages.split_off(pos + 1);
            }
        }
        messages.into_iter().map(DeliveredMessage::from).collect()
    }

    pub async fn ack(&self, message_id: Uuid, device_id: &str) -> Result<(), RelayError> {
        let mut pending = self.pending.write().await;
        let Some(message) = pending.get_mut(&message_id) else {
            return Err(RelayError::not_found(codes::MESSAGE_UNKNOWN, "unknown message"));
        };
        message.remaining_recipients.remove(device_id);
        if message.remaining_recipients.is_empty() {
            pending.remove(&message_id);
        }
        Ok(())
    }

    /// Marks retry exhaustion or explicit failure: the message is dropped
    /// from the pending map unconditionally.
    pub async fn fail(&self, message_id: Uuid) {
        self.pending.write().await.remove(&message_id);
    }

    pub async fn get(&self, message_id: Uuid) -> Option<PendingMessage> {
        self.pending.read().await.get(&message_id).cloned()
    }

    /// Scans the pending map and drops every entry whose expiration has
    /// passed. Runs as a periodic background task; never blocks `relay`
    /// or `ack` for more than the time needed to take the write lock.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, message| !message.is_expired(now));
        before - pending.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}
