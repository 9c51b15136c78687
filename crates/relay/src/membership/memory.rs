// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process Membership Store for development and tests. Mirrors
//! `InMemoryConversationStore` in the original backend.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ConversationRecord, ConversationState, MembershipStore, StoreError, MAX_GROUP_SIZE};

struct Entry {
    record: ConversationRecord,
    expires_at: Instant,
}

pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl InMemoryStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), default_ttl }
    }

    fn expired(entry: &Entry) -> bool {
        Instant::now() >= entry.expires_at
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn create(
        &self,
        conversation_id: &str,
        participants: Vec<String>,
    ) -> Result<ConversationRecord, StoreError> {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(conversation_id) {
            if !Self::expired(existing) {
                return Err(StoreError::Exists);
            }
        }
        let record = ConversationRecord::new(conversation_id.to_owned(), participants);
        entries.insert(
            conversation_id.to_owned(),
            Entry { record: record.clone(), expires_at: Instant::now() + self.default_ttl },
        );
        Ok(record)
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        let entries = self.entries.lock().await;
        match entries.get(conversation_id) {
            Some(entry) if !Self::expired(entry) => Ok(Some(entry.record.clone())),
            _ => Ok(None),
        }
    }

    async fn exists(&self, conversation_id: &str) -> Result<bool, StoreError> {
        Ok(self.get(conversation_id).await?.is_some())
    }

    async fn add_participant(
        &self,
        conversation_id: &str,
        device_id: &str,
    ) -> Result<ConversationRecord, StoreError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(conversation_id).filter(|e| !Self::expired(e)).ok_or(StoreError::NotFound)?;
        if entry.record.state != ConversationState::Active {
            return Err(StoreError::NotActive);
        }
        if entry.record.contains(device_id) {
            return Ok(entry.record.clone());
        }
        if entry.record.participants.len() >= MAX_GROUP_SIZE {
            return Err(StoreError::Full);
        }
        entry.record.participants.push(device_id.to_owned());
        entry.record.last_activity_at = chrono::Utc::now();
        Ok(entry.record.clone())
    }

    async fn remove_participant(
        &self,
        conversation_id: &str,
        device_id: &str,
    ) -> Result<ConversationRecord, StoreError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(conversation_id).filter(|e| !Self::expired(e)).ok_or(StoreError::NotFound)?;
        let before = entry.record.participants.len();
        entry.record.participants.retain(|p| p != device_id);
        if entry.record.participants.len() == before {
            return Err(StoreError::NotMember);
        }
        if entry.record.participants.is_empty() {
            entry.record.state = ConversationState::Closed;
        }
        entry.record.last_activity_at = chrono::Utc::now();
        Ok(entry.record.clone())
    }

    async fn update(
        &self,
        conversation_id: &str,
        state: Option<ConversationState>,
    ) -> Result<ConversationRecord, StoreError> {
        let mut entries = self.entries.lock().await;
        let remaining = {
            let entry = entries.get(conversation_id).filter(|e| !Self::expired(e)).ok_or(StoreError::NotFound)?;
            entry.expires_at.saturating_duration_since(Instant::now())
        };
        let entry = entries.get_mut(conversation_id).ok_or(StoreError::NotFound)?;
        if let Some(state) = state {
            entry.record.state = state;
        }
        entry.record.last_activity_at = chrono::Utc::now();
        // TTL is preserved, not reset, per the membership store contract.
        entry.expires_at = Instant::now() + remaining;
        Ok(entry.record.clone())
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(conversation_id);
        Ok(())
    }
}
