// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derived `device -> {conversations}` cache. Advisory only: every consumer
//! MUST re-validate with `MembershipStore::exists` before acting on an
//! entry, since conversations can expire via TTL between a cache write and
//! a later read.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

#[derive(Default)]
pub struct ReverseIndex {
    index: RwLock<HashMap<String, HashSet<String>>>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, device_id: &str, conversation_id: &str) {
        self.index.write().await.entry(device_id.to_owned()).or_default().insert(conversation_id.to_owned());
    }

    pub async fn forget(&self, device_id: &str, conversation_id: &str) {
        if let Some(set) = self.index.write().await.get_mut(device_id) {
            set.remove(conversation_id);
        }
    }

    /// Candidate conversations for a device. Advisory — callers must
    /// re-validate each with `exists()`.
    pub async fn candidates(&self, device_id: &str) -> Vec<String> {
        self.index.read().await.get(device_id).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Replaces the entire index from a freshly scanned set of
    /// `(conversation_id, participants)` pairs. Used by the periodic full
    /// rebuild.
    pub async fn rebuild(&self, conversations: impl IntoIterator<Item = (String, Vec<String>)>) {
        let mut fresh: HashMap<String, HashSet<String>> = HashMap::new();
        for (conversation_id, participants) in conversations {
            for device_id in participants {
                fresh.entry(device_id).or_default().insert(conversation_id.clone());
            }
        }
        *self.index.write().await = fresh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_forget_roundtrip() {
        let index = ReverseIndex::new();
        index.record("a", "c1").await;
        index.record("a", "c2").await;
        assert_eq!(index.candidates("a").await.len(), 2);
        index.forget("a", "c1").await;
        assert_eq!(index.candidates("a").await, vec!["c2".to_owned()]);
    }

    #[tokio::test]
    async fn rebuild_replaces_contents() {
        let index = ReverseIndex::new();
        index.record("a", "stale").await;
        index.rebuild(vec![("c1".to_owned(), vec!["a".to_owned(), "b".to_owned()])]).await;
        assert_eq!(index.candidates("a").await, vec!["c1".to_owned()]);
        assert_eq!(index.candidates("b").await, vec!["c1".to_owned()]);
    }
}
