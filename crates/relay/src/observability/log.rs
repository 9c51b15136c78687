// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-free event log. Two sinks share one validation gate: an
//! operational log (90-day retention) and a distinct append-only audit
//! buffer, matching `logging_service.py`'s separate `_logs`/`_audit_events`
//! lists behind one lock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{MAX_VALUE_LEN, PROHIBITED_KEY_SUBSTRINGS};

/// Raised when submitted event data violates the content-free schema.
/// This is a programming error (§7, category f): callers must not
/// surface it to an HTTP client, only log-and-swallow it internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSchemaViolation(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub classification: &'static str,
    pub data: Value,
}

pub struct EventLog {
    events: RwLock<Vec<LogEvent>>,
    audit: RwLock<Vec<LogEvent>>,
    retention: Duration,
}

impl EventLog {
    pub fn new(retention: Duration) -> Self {
        Self { events: RwLock::new(Vec::new()), audit: RwLock::new(Vec::new()), retention }
    }

    fn validate(data: &Value) -> Result<(), ContentSchemaViolation> {
        let Value::Object(map) = data else {
            return Ok(());
        };
        for (key, value) in map {
            let lower = key.to_lowercase();
            if PROHIBITED_KEY_SUBSTRINGS.iter().any(|forbidden| lower.contains(forbidden)) {
                return Err(ContentSchemaViolation(format!("prohibited key: {key}")));
            }
            if let Value::String(s) = value {
                if s.len() > MAX_VALUE_LEN {
                    return Err(ContentSchemaViolation(format!("value too long for key: {key}")));
                }
            }
        }
        Ok(())
    }

    pub async fn log_event(&self, event_type: &str, data: Value) -> Result<(), ContentSchemaViolation> {
        Self::validate(&data)?;
        let event = LogEvent { event_type: event_type.to_owned(), timestamp: Utc::now(), classification: "internal", data };
        tracing::debug!(event_type = %event.event_type, "event logged");
        self.events.write().await.push(event);
        Ok(())
    }

    pub async fn log_audit_event(&self, event_type: &str, data: Value) -> Result<(), ContentSchemaViolation> {
        Self::validate(&data)?;
        let event = LogEvent { event_type: event_type.to_owned(), timestamp: Utc::now(), classification: "restricted", data };
        tracing::info!(event_type = %event.event_type, "audit event logged");
        self.audit.write().await.push(event);
        Ok(())
    }

    pub async fn events(&self) -> Vec<LogEvent> {
        self.events.read().await.clone()
    }

    pub async fn audit_events(&self) -> Vec<LogEvent> {
        self.audit.read().await.clone()
    }

    /// Removes entries older than the retention window from both sinks.
    pub async fn purge_expired(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.retention).unwrap_or_else(|_| chrono::Duration::days(90));
        let mut removed = 0;
        {
            let mut events = self.events.write().await;
            let before = events.len();
            events.retain(|e| e.timestamp >= cutoff);
            removed += before - events.len();
        }
        {
            let mut audit = self.audit.write().await;
            let before = audit.len();
            audit.retain(|e| e.timestamp >= cutoff);
            removed += before - audit.len();
        }
        removed
    }
}
