// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ACK & Retry Engine: per-recipient delivery tracking, exponential
//! backoff, and failure marking after exhausting retries. Each pending
//! timer is a cancellable task, keyed by `(message_id, device_id)` with
//! its own `CancellationToken` handle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::constants::{ACK_TIMEOUT, MAX_DELIVERY_RETRIES, MAX_BACKOFF, RETRY_BACKOFF_BASE};
use crate::delivery::DeliveryChannel;
use crate::observability::log::EventLog;
use crate::observability::metrics::MetricRegistry;
use crate::relay::{DeliveredMessage, RelayCore};

struct Timer {
    cancel: CancellationToken,
}

/// Tracks `(message_id, device_id) -> send_time` pairs and schedules
/// retry/timeout tasks. Cleared on ACK, expiration, or revocation.
pub struct AckEngine {
    timers: RwLock<HashMap<(Uuid, String), Timer>>,
    relay: Arc<RelayCore>,
    delivery: Arc<DeliveryChannel>,
    log: Arc<EventLog>,
    metrics: Arc<MetricRegistry>,
    shutdown: CancellationToken,
}

impl AckEngine {
    pub fn new(
        relay: Arc<RelayCore>,
        delivery: Arc<DeliveryChannel>,
        log: Arc<EventLog>,
        metrics: Arc<MetricRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { timers: RwLock::new(HashMap::new()), relay, delivery, log, metrics, shutdown }
    }

    /// Starts (or restarts) the ACK timeout/retry timer for a single
    /// recipient of a message. Spawns a background task; the returned
    /// handle is dropped immediately since cancellation is keyed by
    /// `(message_id, device_id)` in the shared map instead.
    pub fn start(self: &Arc<Self>, message: DeliveredMessage, device_id: String) {
        let key = (message.id, device_id.clone());
        let cancel = CancellationToken::new();
        let engine = Arc::clone(self);
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            {
                let mut timers = engine.timers.write().await;
                if let Some(old) = timers.insert(key, Timer { cancel: cancel.clone() }) {
                    old.cancel.cancel();
                }
            }
            engine.run_timer(message, device_id, task_cancel, 0).await;
        });
    }

    async fn run_timer(self: Arc<Self>, message: DeliveredMessage, device_id: String, cancel: CancellationToken, retry_count: u32) {
        tokio::select! {
            _ = self.shutdown.cancelled() => return,
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(ACK_TIMEOUT) => {}
        }

        // Expiration always overrides retry.
        let Some(_still_pending) = self.relay.get(message.id).await else { return };

        if retry_count >= MAX_DELIVERY_RETRIES {
            self.relay.fail(message.id).await;
            self.metrics.record_failed_delivery().await;
            self.log
                .log_event(
                    "delivery_failed",
                    serde_json::json!({ "message_id": message.id.to_string(), "retry_count": retry_count }),
                )
                .await
                .ok();
            self.clear(message.id, &device_id).await;
            return;
        }

        self.delivery.enqueue(&device_id, message.clone()).await;

        let backoff_secs = (RETRY_BACKOFF_BASE.as_secs().saturating_mul(1u64 << retry_count.min(16)))
            .min(MAX_BACKOFF.as_secs());
        tokio::select! {
            _ = self.shutdown.cancelled() => return,
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)) => {}
        }

        Box::pin(self.run_timer(message, device_id, cancel, retry_count + 1)).await;
    }

    /// Clears the pending timer for `(message_id, device_id)`, e.g. on ACK
    /// arrival or revocation, preventing a timer leak.
    pub async fn clear(&self, message_id: Uuid, device_id: &str) {
        if let Some(timer) = self.timers.write().await.remove(&(message_id, device_id.to_owned())) {
            timer.cancel.cancel();
        }
    }

    pub async fn clear_all_for_message(&self, message_id: Uuid) {
        let mut timers = self.timers.write().await;
        let keys: Vec<_> = timers.keys().filter(|(id, _)| *id == message_id).cloned().collect();
        for key in keys {
            if let Some(timer) = timers.remove(&key) {
                timer.cancel.cancel();
            }
        }
    }
}
