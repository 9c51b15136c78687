// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windowed metrics with threshold alerting, matching `metrics_service.py`:
//! counters keyed by `(hour-aligned window, name)`, checked against an
//! alert threshold after every increment.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::RwLock;

use crate::constants::ALERT_THRESHOLD_FAILED_DELIVERIES;

#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub metric: String,
    pub value: u64,
    pub window: DateTime<Utc>,
    pub triggered_at: DateTime<Utc>,
}

pub struct MetricRegistry {
    counters: RwLock<HashMap<(DateTime<Utc>, String), u64>>,
    alerts: RwLock<Vec<AlertRecord>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self { counters: RwLock::new(HashMap::new()), alerts: RwLock::new(Vec::new()) }
    }

    fn hour_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
        timestamp.with_minute(0).and_then(|t| t.with_second(0)).and_then(|t| t.with_nanosecond(0)).unwrap_or(timestamp)
    }

    pub async fn record(&self, name: &str, value: u64) -> u64 {
        let window = Self::hour_bucket(Utc::now());
        let mut counters = self.counters.write().await;
        let entry = counters.entry((window, name.to_owned())).or_insert(0);
        *entry += value;
        *entry
    }

    pub async fn get(&self, window: DateTime<Utc>, name: &str) -> u64 {
        let window = Self::hour_bucket(window);
        *self.counters.read().await.get(&(window, name.to_owned())).unwrap_or(&0)
    }

    /// Records a failed delivery and immediately checks the alert
    /// threshold, matching `record_failed_delivery`'s eager-check
    /// behavior in the original.
    pub async fn record_failed_delivery(&self) {
        let total = self.record("failed_deliveries", 1).await;
        if total >= ALERT_THRESHOLD_FAILED_DELIVERIES {
            self.alerts.write().await.push(AlertRecord {
                metric: "failed_deliveries".to_owned(),
                value: total,
                window: Self::hour_bucket(Utc::now()),
                triggered_at: Utc::now(),
            });
            tracing::warn!(total, threshold = ALERT_THRESHOLD_FAILED_DELIVERIES, "failed delivery alert threshold reached");
        }
    }

    pub async fn alerts(&self) -> Vec<AlertRecord> {
        self.alerts.read().await.clone()
    }

    /// Drops counters older than `retention` (default 24h, per the
    /// original's `purge_old_metrics`).
    pub async fn purge_older_than(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut counters = self.counters.write().await;
        let before = counters.len();
        counters.retain(|(window, _), _| *window >= cutoff);
        before - counters.len()
    }
}
