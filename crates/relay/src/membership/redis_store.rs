// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable Membership Store backed by Redis. Every mutation runs under a
//! WATCH/MULTI/EXEC optimistic transaction so concurrent writers never
//! silently clobber each other's participant changes.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use super::optimistic::with_retry;
use super::{ConversationRecord, ConversationState, MembershipStore, StoreError, MAX_GROUP_SIZE};

pub struct RedisStore {
    conn: ConnectionManager,
    default_ttl_seconds: i64,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, default_ttl: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, default_ttl_seconds: default_ttl.as_secs() as i64 })
    }

    fn key(conversation_id: &str) -> String {
        format!("conversation:{conversation_id}")
    }

    /// `-2` missing, `-1` no expiration (use default), `>= 0` remaining
    /// seconds to preserve, per the membership store's TTL contract.
    fn resolve_ttl(&self, ttl: i64) -> i64 {
        if ttl >= 0 {
            ttl
        } else {
            self.default_ttl_seconds
        }
    }

    /// Reads the value and TTL under a `WATCH`, hands both to `compute`,
    /// then commits the new value inside a `MULTI/EXEC` that aborts if the
    /// key changed underneath. Retried via [`with_retry`] up to
    /// [`super::optimistic::MAX_ATTEMPTS`] times.
    async fn cas<T, C>(&self, conversation_id: &str, compute: C) -> Result<T, StoreError>
    where
        T: Clone,
        C: Fn(Option<ConversationRecord>, i64) -> Result<(ConversationRecord, T), StoreError>,
    {
        let key = Self::key(conversation_id);
        let mut conn = self.conn.clone();
        with_retry(|| {
            let key = key.clone();
            let mut conn = conn.clone();
            async {
                redis::cmd("WATCH")
                    .arg(&key)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|_| StoreError::Backend)?;

                let raw: Option<String> = conn.get(&key).await.map_err(|_| StoreError::Backend)?;
                let ttl: i64 = conn.ttl(&key).await.map_err(|_| StoreError::Backend)?;
                let current = match raw {
                    Some(s) => {
                        Some(serde_json::from_str::<ConversationRecord>(&s).map_err(|_| StoreError::Backend)?)
                    }
                    None => None,
                };

                let (new_record, result) = match compute(current, ttl) {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = redis::cmd("UNWATCH").query_async::<()>(&mut conn).await;
                        return Err(e);
                    }
                };

                let ttl_to_use = self.resolve_ttl(ttl);
                let payload = serde_json::to_string(&new_record).map_err(|_| StoreError::Backend)?;

                let mut pipe = redis::pipe();
                pipe.atomic().set(&key, payload).ignore().expire(&key, ttl_to_use).ignore();
                let response: Option<()> = pipe.query_async(&mut conn).await.map_err(|_| StoreError::Backend)?;
                match response {
                    Some(()) => Ok(Some(result)),
                    None => Ok(None),
                }
            }
        })
        .await
    }
}

#[async_trait]
impl MembershipStore for RedisStore {
    async fn create(
        &self,
        conversation_id: &str,
        participants: Vec<String>,
    ) -> Result<ConversationRecord, StoreError> {
        self.cas(conversation_id, |existing, _ttl| {
            if existing.is_some() {
                return Err(StoreError::Exists);
            }
            let record = ConversationRecord::new(conversation_id.to_owned(), participants.clone());
            Ok((record.clone(), record))
        })
        .await
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> =
            conn.get(Self::key(conversation_id)).await.map_err(|_| StoreError::Backend)?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s).map_err(|_| StoreError::Backend)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, conversation_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::key(conversation_id)).await.map_err(|_| StoreError::Backend)?;
        Ok(exists)
    }

    async fn add_participant(
        &self,
        conversation_id: &str,
        device_id: &str,
    ) -> Result<ConversationRecord, StoreError> {
        self.cas(conversation_id, |existing, _ttl| {
            let mut record = existing.ok_or(StoreError::NotFound)?;
            if record.state != ConversationState::Active {
                return Err(StoreError::NotActive);
            }
            if record.contains(device_id) {
                return Ok((record.clone(), record));
            }
            if record.participants.len() >= MAX_GROUP_SIZE {
                return Err(StoreError::Full);
            }
            record.participants.push(device_id.to_owned());
            record.last_activity_at = chrono::Utc::now();
            Ok((record.clone(), record))
        })
        .await
    }

    async fn remove_participant(
        &self,
        conversation_id: &str,
        device_id: &str,
    ) -> Result<ConversationRecord, StoreError> {
        self.cas(conversation_id, |existing, _ttl| {
            let mut record = existing.ok_or(StoreError::NotFound)?;
            let before = record.participants.len();
            record.participants.retain(|p| p != device_id);
            if record.participants.len() == before {
                return Err(StoreError::NotMember);
            }
            if record.participants.is_empty() {
                record.state = ConversationState::Closed;
            }
            record.last_activity_at = chrono::Utc::now();
            Ok((record.clone(), record))
        })
        .await
    }

    async fn update(
        &self,
        conversation_id: &str,
        state: Option<ConversationState>,
    ) -> Result<ConversationRecord, StoreError> {
        self.cas(conversation_id, |existing, _ttl| {
            let mut record = existing.ok_or(StoreError::NotFound)?;
            if let Some(state) = state {
                record.state = state;
            }
            record.last_activity_at = chrono::Utc::now();
            Ok((record.clone(), record))
        })
        .await
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(conversation_id)).await.map_err(|_| StoreError::Backend)?;
        Ok(())
    }
}
