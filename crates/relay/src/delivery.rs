// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery Channel: the WebSocket connection table plus the per-device
//! outbound queue, one slot per device (there is one logical connection
//! per device, not per session).
//!
//! There is no separate drain worker here: an `mpsc::UnboundedSender`
//! already serializes writers, so enqueueing onto a connected device's
//! channel and writing it out in the per-connection task (see
//! `transport::ws`) already gives a dedicated worker's draining guarantee
//! without a separate abstraction.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::relay::DeliveredMessage;

/// Inbound frame from a client over `/ws/messages`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    Ack { message_id: uuid::Uuid, conversation_id: Option<String> },
    #[serde(other)]
    Unknown,
}

pub struct DeliveryChannel {
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<DeliveredMessage>>>,
}

impl Default for DeliveryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryChannel {
    pub fn new() -> Self {
        Self { connections: RwLock::new(HashMap::new()) }
    }

    /// Registers a device's outbound channel, returning the receiver half
    /// for the connection's per-task write loop to drain.
    pub async fn connect(&self, device_id: &str) -> mpsc::UnboundedReceiver<DeliveredMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(device_id.to_owned(), tx);
        rx
    }

    pub async fn disconnect(&self, device_id: &str) {
        self.connections.write().await.remove(device_id);
    }

    pub async fn is_connected(&self, device_id: &str) -> bool {
        self.connections.read().await.contains_key(device_id)
    }

    /// Fire-and-forget send attempt. Returns `true` meaning only "queued
    /// to a connected socket's channel" — never "delivered". Only the ACK
    /// engine may assert delivery.
    pub async fn enqueue(&self, device_id: &str, message: DeliveredMessage) -> bool {
        let connections = self.connections.read().await;
        match connections.get(device_id) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    pub async fn connected_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

pub type SharedDeliveryChannel = Arc<DeliveryChannel>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_message() -> DeliveredMessage {
        DeliveredMessage {
            id: uuid::Uuid::new_v4(),
            conversation_id: "c1".to_owned(),
            payload: "deadbeef".to_owned(),
            timestamp: Utc::now(),
            sender_id: "a".to_owned(),
            expiration: Utc::now(),
        }
    }

    #[tokio::test]
    async fn enqueue_to_connected_device_succeeds() {
        let channel = DeliveryChannel::new();
        let mut rx = channel.connect("b").await;
        assert!(channel.enqueue("b", sample_message()).await);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn enqueue_to_unknown_device_fails() {
        let channel = DeliveryChannel::new();
        assert!(!channel.enqueue("ghost", sample_message()).await);
    }

    #[tokio::test]
    async fn disconnect_removes_connection() {
        let channel = DeliveryChannel::new();
        let _rx = channel.connect("b").await;
        assert!(channel.is_connected("b").await);
        channel.disconnect("b").await;
        assert!(!channel.is_connected("b").await);
    }
}
