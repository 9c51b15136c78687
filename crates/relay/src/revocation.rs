// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Revocation Propagator: cascades a device revocation through the
//! Membership Store and the reverse index. Triggered synchronously by the
//! Identity Registry before `revoke` returns success to the Controller.

use std::sync::Arc;

use serde::Serialize;

use crate::membership::reverse_index::ReverseIndex;
use crate::membership::{MembershipStore, StoreError};
use crate::observability::log::EventLog;

#[derive(Debug, Clone, Serialize)]
pub struct RevocationOutcome {
    pub device_id: String,
    pub affected_conversations: usize,
    pub conversations_closed: usize,
}

/// Scans the reverse index for `device_id`'s candidate conversations and
/// removes it from each, atomically closing any conversation that empties.
/// Stale reverse-index entries (the conversation already expired) are
/// discarded silently, matching §4.H.
pub async fn propagate(
    store: &dyn MembershipStore,
    reverse_index: &ReverseIndex,
    log: &EventLog,
    device_id: &str,
) -> RevocationOutcome {
    let candidates = reverse_index.candidates(device_id).await;
    let mut affected = 0usize;
    let mut closed = 0usize;

    for conversation_id in candidates {
        match store.remove_participant(&conversation_id, device_id).await {
            Ok(record) => {
                affected += 1;
                if record.state == crate::membership::ConversationState::Closed {
                    closed += 1;
                }
                reverse_index.forget(device_id, &conversation_id).await;
            }
            Err(StoreError::NotFound) | Err(StoreError::NotMember) => {
                // Stale entry: conversation expired or device already removed.
                reverse_index.forget(device_id, &conversation_id).await;
            }
            Err(_) => {
                // Transient backend failure: leave the index entry for the
                // next periodic rebuild to reconcile.
            }
        }
    }

    let outcome = RevocationOutcome { device_id: device_id.to_owned(), affected_conversations: affected, conversations_closed: closed };
    log.log_event(
        "device_revoked",
        serde_json::json!({
            "affected_conversations": outcome.affected_conversations,
            "conversations_closed": outcome.conversations_closed,
        }),
    )
    .await
    .ok();
    outcome
}

pub type SharedMembershipStore = Arc<dyn MembershipStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::memory::InMemoryStore;
    use crate::observability::log::EventLog;
    use std::time::Duration;

    #[tokio::test]
    async fn propagate_removes_device_from_all_conversations() {
        let store = InMemoryStore::new(Duration::from_secs(1800));
        let index = ReverseIndex::new();
        let log = EventLog::new(Duration::from_secs(90 * 24 * 3600));

        store.create("x1", vec!["a".into(), "b".into()]).await.unwrap();
        store.create("x2", vec!["a".into(), "b".into(), "c".into()]).await.unwrap();
        index.record("b", "x1").await;
        index.record("b", "x2").await;

        let outcome = propagate(&store, &index, &log, "b").await;
        assert_eq!(outcome.affected_conversations, 2);
        assert_eq!(outcome.conversations_closed, 0);

        let x1 = store.get("x1").await.unwrap().unwrap();
        assert_eq!(x1.participants, vec!["a".to_owned()]);
        let x2 = store.get("x2").await.unwrap().unwrap();
        assert_eq!(x2.participants, vec!["a".to_owned(), "c".to_owned()]);
    }

    #[tokio::test]
    async fn propagate_discards_stale_reverse_index_entries() {
        let store = InMemoryStore::new(Duration::from_secs(1800));
        let index = ReverseIndex::new();
        let log = EventLog::new(Duration::from_secs(90 * 24 * 3600));
        index.record("ghost-device", "never-created").await;

        let outcome = propagate(&store, &index, &log, "ghost-device").await;
        assert_eq!(outcome.affected_conversations, 0);
        assert!(index.candidates("ghost-device").await.is_empty());
    }
}
