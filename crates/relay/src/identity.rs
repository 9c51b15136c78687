// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity Registry: device identity records and their lifecycle state
//! machine (`Pending -> Provisioned -> Active -> Revoked`).

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants::KEY_ROTATION_PERIOD_DAYS;
use crate::revocation::RevocationOutcome;

/// Device lifecycle state. Transitions only move forward; `Revoked` is
/// terminal and reachable only from `Active` or `Provisioned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Pending,
    Provisioned,
    Active,
    Revoked,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioned => "provisioned",
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }
}

/// Errors raised attempting an invalid state transition or lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    NotFound,
    AlreadyExists,
    BadState,
}

/// A device identity record. Immutable once `Revoked`, except the
/// key-rotation fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub state: DeviceState,
    pub public_key: String,
    pub controller_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub provisioned_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_key_rotation: DateTime<Utc>,
    pub next_key_rotation: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    fn new(device_id: String, public_key: String, controller_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            device_id,
            state: DeviceState::Pending,
            public_key,
            controller_id,
            created_at: now,
            provisioned_at: None,
            activated_at: None,
            revoked_at: None,
            last_key_rotation: now,
            next_key_rotation: Some(now + ChronoDuration::days(KEY_ROTATION_PERIOD_DAYS)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == DeviceState::Active
    }

    pub fn is_revoked(&self) -> bool {
        self.state == DeviceState::Revoked
    }

    pub fn can_send(&self) -> bool {
        self.is_active()
    }

    pub fn can_create(&self) -> bool {
        self.is_active()
    }

    pub fn can_join(&self) -> bool {
        self.is_active()
    }

    /// Neutral enterprise mode: revoked devices retain read access.
    pub fn can_read(&self) -> bool {
        self.is_active() || self.is_revoked()
    }

    fn transition_to_provisioned(&mut self) -> Result<(), IdentityError> {
        if self.state != DeviceState::Pending {
            return Err(IdentityError::BadState);
        }
        self.state = DeviceState::Provisioned;
        self.provisioned_at = Some(Utc::now());
        Ok(())
    }

    fn transition_to_active(&mut self) -> Result<(), IdentityError> {
        if self.state != DeviceState::Provisioned {
            return Err(IdentityError::BadState);
        }
        self.state = DeviceState::Active;
        self.activated_at = Some(Utc::now());
        Ok(())
    }

    /// No-op if already revoked. Errors if not `Active`/`Provisioned`.
    fn transition_to_revoked(&mut self) -> Result<bool, IdentityError> {
        if self.state == DeviceState::Revoked {
            return Ok(false);
        }
        if !matches!(self.state, DeviceState::Active | DeviceState::Provisioned) {
            return Err(IdentityError::BadState);
        }
        let now = Utc::now();
        self.state = DeviceState::Revoked;
        self.revoked_at = Some(now);
        self.last_key_rotation = now;
        self.next_key_rotation = None;
        Ok(true)
    }
}

/// Concurrent map from device identifier to identity record, plus the
/// demo-mode activity window used to relax `is_active` for HTTP-only
/// demo clients.
pub struct IdentityRegistry {
    records: RwLock<HashMap<String, DeviceRecord>>,
    last_seen: RwLock<HashMap<String, Instant>>,
    demo_mode: bool,
}

impl IdentityRegistry {
    pub fn new(demo_mode: bool) -> Self {
        Self { records: RwLock::new(HashMap::new()), last_seen: RwLock::new(HashMap::new()), demo_mode }
    }

    pub async fn register(
        &self,
        device_id: &str,
        public_key: &str,
        controller_id: Option<String>,
    ) -> Result<DeviceRecord, IdentityError> {
        let mut records = self.records.write().await;
        if records.contains_key(device_id) {
            return Err(IdentityError::AlreadyExists);
        }
        let record = DeviceRecord::new(device_id.to_owned(), public_key.to_owned(), controller_id);
        records.insert(device_id.to_owned(), record.clone());
        Ok(record)
    }

    pub async fn provision(&self, device_id: &str) -> Result<DeviceRecord, IdentityError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(device_id).ok_or(IdentityError::NotFound)?;
        record.transition_to_provisioned()?;
        Ok(record.clone())
    }

    pub async fn confirm(&self, device_id: &str) -> Result<DeviceRecord, IdentityError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(device_id).ok_or(IdentityError::NotFound)?;
        record.transition_to_active()?;
        Ok(record.clone())
    }

    /// Revokes the device, then lets the caller propagate the revocation
    /// through the membership store before reporting success upward.
    /// Returns `(record, did_transition)`; `did_transition = false` means
    /// the device was already revoked (idempotent no-op).
    pub async fn revoke(&self, device_id: &str) -> Result<(DeviceRecord, bool), IdentityError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(device_id).ok_or(IdentityError::NotFound)?;
        let transitioned = record.transition_to_revoked()?;
        Ok((record.clone(), transitioned))
    }

    /// The Controller-facing entry point: transitions the device, then
    /// synchronously runs the Revocation Propagator before returning,
    /// exactly as the registry's contract requires. The propagation
    /// counts are included in the response; a call on an already-revoked
    /// device is a no-op and reports zero impact.
    pub async fn revoke_with_propagation(
        &self,
        device_id: &str,
        store: &dyn crate::membership::MembershipStore,
        reverse_index: &crate::membership::reverse_index::ReverseIndex,
        log: &crate::observability::log::EventLog,
    ) -> Result<RevokeReport, IdentityError> {
        let (_, transitioned) = self.revoke(device_id).await?;
        if !transitioned {
            return Ok(RevokeReport { device_id: device_id.to_owned(), affected_conversations: 0, conversations_closed: 0 });
        }
        let outcome = crate::revocation::propagate(store, reverse_index, log, device_id).await;
        Ok(outcome.into())
    }

    pub async fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.records.read().await.get(device_id).cloned()
    }

    pub async fn touch(&self, device_id: &str) {
        if self.demo_mode {
            self.last_seen.write().await.insert(device_id.to_owned(), Instant::now());
        }
    }

    async fn touched_recently(&self, device_id: &str) -> bool {
        if !self.demo_mode {
            return false;
        }
        match self.last_seen.read().await.get(device_id) {
            Some(at) => at.elapsed() < crate::constants::DEMO_ACTIVITY_WINDOW,
            None => false,
        }
    }

    pub async fn is_active(&self, device_id: &str) -> bool {
        if self.touched_recently(device_id).await {
            return true;
        }
        matches!(self.get(device_id).await, Some(r) if r.is_active())
    }

    pub async fn can_send(&self, device_id: &str) -> bool {
        self.is_active(device_id).await
    }

    pub async fn can_create(&self, device_id: &str) -> bool {
        self.is_active(device_id).await
    }

    pub async fn can_join(&self, device_id: &str) -> bool {
        self.is_active(device_id).await
    }

    pub async fn can_read(&self, device_id: &str) -> bool {
        if self.is_active(device_id).await {
            return true;
        }
        matches!(self.get(device_id).await, Some(r) if r.is_revoked())
    }
}

/// Revocation result reported back to the Controller, folding
/// `identity_enforcement.py::handle_revocation_impact`'s counts into the
/// registry's own `revoke` response.
#[derive(Debug, Clone, Serialize)]
pub struct RevokeReport {
    pub device_id: String,
    pub affected_conversations: usize,
    pub conversations_closed: usize,
}

impl From<RevocationOutcome> for RevokeReport {
    fn from(outcome: RevocationOutcome) -> Self {
        Self {
            device_id: outcome.device_id,
            affected_conversations: outcome.affected_conversations,
            conversations_closed: outcome.conversations_closed,
        }
    }
}
