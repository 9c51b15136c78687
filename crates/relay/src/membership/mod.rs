// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Membership Store: atomic conversation metadata with TTL.
//!
//! A capability abstraction (`MembershipStore`) with two realizations: an
//! in-process mutex-guarded map for dev/test, and a Redis-backed store using
//! an optimistic WATCH/MULTI/EXEC transaction for every mutation.

pub mod memory;
pub mod optimistic;
pub mod redis_store;
pub mod reverse_index;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_GROUP_SIZE: usize = crate::constants::MAX_GROUP_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    Active,
    Closed,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// Participants are de-duplicated and order-preserving so JSON
/// serialization is deterministic (the original keeps a `Set`; a `Vec`
/// wrapper with dedup-on-insert gives the same semantics with stable wire
/// output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub participants: Vec<String>,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(conversation_id: String, participants: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            participants: dedup_preserve_order(participants),
            state: ConversationState::Active,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.participants.iter().any(|p| p == device_id)
    }
}

pub fn dedup_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

/// Errors surfaced by a `MembershipStore` implementation. Store-level
/// transient failures (lock contention exhausted, backend unreachable) are
/// represented by `Backend` and mapped by callers to a 500, never a
/// policy-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    Exists,
    NotFound,
    NotActive,
    Full,
    NotMember,
    Backend,
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn create(
        &self,
        conversation_id: &str,
        participants: Vec<String>,
    ) -> Result<ConversationRecord, StoreError>;

    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationRecord>, StoreError>;

    async fn exists(&self, conversation_id: &str) -> Result<bool, StoreError>;

    async fn add_participant(
        &self,
        conversation_id: &str,
        device_id: &str,
    ) -> Result<ConversationRecord, StoreError>;

    /// Returns the updated record. If the removal empties the participant
    /// set, the record transitions to `Closed` within the same operation.
    async fn remove_participant(
        &self,
        conversation_id: &str,
        device_id: &str,
    ) -> Result<ConversationRecord, StoreError>;

    async fn update(
        &self,
        conversation_id: &str,
        state: Option<ConversationState>,
    ) -> Result<ConversationRecord, StoreError>;

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError>;
}
