// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation Service: create/join/leave/close/info, consulting the
//! Identity Registry, Membership Store, and Authorization Gate.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{codes, RelayError};
use crate::identity::IdentityRegistry;
use crate::membership::reverse_index::ReverseIndex;
use crate::membership::{ConversationRecord, ConversationState, MembershipStore, StoreError};
use crate::observability::log::EventLog;

pub struct JoinOutcome {
    pub record: ConversationRecord,
    pub auto_created: bool,
}

pub struct LeaveOutcome {
    pub record: ConversationRecord,
    pub conversation_closed: bool,
}

pub struct ConversationService {
    identity: Arc<IdentityRegistry>,
    store: Arc<dyn MembershipStore>,
    reverse_index: Arc<ReverseIndex>,
    log: Arc<EventLog>,
    demo_mode: bool,
}

impl ConversationService {
    pub fn new(
        identity: Arc<IdentityRegistry>,
        store: Arc<dyn MembershipStore>,
        reverse_index: Arc<ReverseIndex>,
        log: Arc<EventLog>,
        demo_mode: bool,
    ) -> Self {
        Self { identity, store, reverse_index, log, demo_mode }
    }

    fn map_store_error(&self, err: StoreError) -> RelayError {
        match err {
            StoreError::Exists => RelayError::conflict(codes::CONVERSATION_NOT_FOUND, "conversation already exists"),
            StoreError::NotFound => {
                RelayError::not_found(codes::CONVERSATION_NOT_FOUND, "conversation not found")
            }
            StoreError::NotActive => {
                RelayError::bad_request(codes::CONVERSATION_NOT_ACTIVE, "conversation is not active")
            }
            StoreError::Full => RelayError::bad_request(codes::CONVERSATION_FULL, "conversation is at capacity"),
            StoreError::NotMember => RelayError::forbidden(codes::SENDER_NOT_PARTICIPANT, "not a participant"),
            StoreError::Backend => RelayError::backend(),
        }
    }

    pub async fn create(
        &self,
        caller: &str,
        conversation_id: Option<String>,
        mut participants: Vec<String>,
    ) -> Result<ConversationRecord, RelayError> {
        if !participants.iter().any(|p| p == caller) {
            participants.push(caller.to_owned());
        }
        let participants = crate::membership::dedup_preserve_order(participants);
        if participants.is_empty() {
            return Err(RelayError::bad_request(codes::PARTICIPANTS_REQUIRED, "participants required"));
        }
        if participants.len() > crate::constants::MAX_GROUP_SIZE {
            return Err(RelayError::bad_request(codes::PARTICIPANTS_REQUIRED, "too many participants"));
        }
        for device_id in &participants {
            if !self.identity.is_active(device_id).await {
                return Err(RelayError::bad_request(
                    codes::DEVICE_NOT_ACTIVE,
                    "all participants must be provisioned",
                ));
            }
        }

        let conversation_id = conversation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = match self.store.create(&conversation_id, participants.clone()).await {
            Ok(record) => record,
            Err(StoreError::Exists) => {
                let existing = self.store.get(&conversation_id).await.map_err(|e| self.map_store_error(e))?;
                match existing {
                    Some(record) if record.state == ConversationState::Active => record,
                    _ => return Err(self.map_store_error(StoreError::Exists)),
                }
            }
            Err(e) => return Err(self.map_store_error(e)),
        };

        for device_id in &record.participants {
            self.reverse_index.record(device_id, &record.conversation_id).await;
        }

        self.log
            .log_event(
                "conversation_created",
                serde_json::json!({ "participant_count": record.participants.len() }),
            )
            .await
            .ok();

        Ok(record)
    }

    pub async fn join(&self, caller: &str, conversation_id: &str) -> Result<JoinOutcome, RelayError> {
        crate::authz::check(&self.identity, caller, crate::authz::Operation::JoinConversation).await?;

        match self.store.add_participant(conversation_id, caller).await {
            Ok(record) => {
                self.reverse_index.record(caller, conversation_id).await;
                self.log
                    .log_event("conversation_participant_joined", serde_json::json!({}))
                    .await
                    .ok();
                Ok(JoinOutcome { record, auto_created: false })
            }
            Err(StoreError::NotFound) if self.demo_mode => {
                let record = self
                    .store
                    .create(conversation_id, vec![caller.to_owned()])
                    .await
                    .map_err(|e| self.map_store_error(e))?;
                self.reverse_index.record(caller, conversation_id).await;
                Ok(JoinOutcome { record, auto_created: true })
            }
            Err(e) => Err(self.map_store_error(e)),
        }
    }

    pub async fn leave(&self, caller: &str, conversation_id: &str) -> Result<LeaveOutcome, RelayError> {
        let record = self.store.remove_participant(conversation_id, caller).await.map_err(|e| self.map_store_error(e))?;
        self.reverse_index.forget(caller, conversation_id).await;
        let closed = record.state == ConversationState::Closed;
        if closed {
            self.log.log_event("conversation_closed", serde_json::json!({})).await.ok();
        } else {
            self.log.log_event("conversation_participant_left", serde_json::json!({})).await.ok();
        }
        Ok(LeaveOutcome { record, conversation_closed: closed })
    }

    pub async fn close(&self, caller: &str, conversation_id: &str) -> Result<ConversationRecord, RelayError> {
        let record = self.store.get(conversation_id).await.map_err(|e| self.map_store_error(e))?;
        let record = record.ok_or_else(|| self.map_store_error(StoreError::NotFound))?;
        if !record.contains(caller) {
            return Err(RelayError::forbidden(codes::SENDER_NOT_PARTICIPANT, "not a participant"));
        }
        if record.state == ConversationState::Closed {
            return Ok(record);
        }
        let updated = self
            .store
            .update(conversation_id, Some(ConversationState::Closed))
            .await
            .map_err(|e| self.map_store_error(e))?;
        self.log.log_event("conversation_closed", serde_json::json!({})).await.ok();
        Ok(updated)
    }

    /// Participants, and revoked devices that are still listed on the
    /// record (revocation's removal has not yet been propagated to this
    /// conversation, or ran before this one expired), may read. Any other
    /// caller — including an otherwise-active device with no membership —
    /// is denied, regardless of its own device state.
    pub async fn info(&self, caller: &str, conversation_id: &str) -> Result<ConversationRecord, RelayError> {
        let record = self.store.get(conversation_id).await.map_err(|e| self.map_store_error(e))?;
        let record = record.ok_or_else(|| self.map_store_error(StoreError::NotFound))?;
        if !record.contains(caller) {
            return Err(RelayError::forbidden(codes::SENDER_NOT_PARTICIPANT, "not a participant"));
        }
        Ok(record)
    }
}
