// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-singleton wiring for the relay runtime. Every component named in
//! §9's "Global state" is constructed once here, in the deterministic order
//! the design notes require, and handed explicitly to handlers via
//! `Arc<RelayState>` rather than reached for as an implicit global.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ack::AckEngine;
use crate::config::{EncryptionMode, RelayConfig};
use crate::conversation::ConversationService;
use crate::delivery::DeliveryChannel;
use crate::identity::IdentityRegistry;
use crate::membership::memory::InMemoryStore;
use crate::membership::redis_store::RedisStore;
use crate::membership::reverse_index::ReverseIndex;
use crate::membership::MembershipStore;
use crate::observability::log::EventLog;
use crate::observability::metrics::MetricRegistry;
use crate::relay::encoding::ServerKey;
use crate::relay::RelayCore;

/// Everything a handler needs, wired once at startup.
pub struct RelayState {
    pub config: RelayConfig,
    pub identity: Arc<IdentityRegistry>,
    pub store: Arc<dyn MembershipStore>,
    pub reverse_index: Arc<ReverseIndex>,
    pub conversations: Arc<ConversationService>,
    pub relay: Arc<RelayCore>,
    pub delivery: Arc<DeliveryChannel>,
    pub ack: Arc<AckEngine>,
    pub log: Arc<EventLog>,
    pub metrics: Arc<MetricRegistry>,
    pub server_key: Option<Arc<ServerKey>>,
    pub shutdown: CancellationToken,
}

impl RelayState {
    /// Builds the durable or in-process Membership Store, then every
    /// dependent service in turn, in the fixed construction order the
    /// rest of the module relies on.
    pub async fn build(config: RelayConfig, shutdown: CancellationToken) -> anyhow::Result<Arc<Self>> {
        let log = Arc::new(EventLog::new(std::time::Duration::from_secs(
            crate::constants::LOG_RETENTION_DAYS as u64 * 24 * 3600,
        )));
        let metrics = Arc::new(MetricRegistry::new());

        let store: Arc<dyn MembershipStore> = match &config.redis_url {
            Some(url) => {
                tracing::info!("membership store: redis");
                Arc::new(RedisStore::connect(url, config.conversation_ttl()).await?)
            }
            None => {
                tracing::warn!("membership store: in-process (not durable, dev/test only)");
                Arc::new(InMemoryStore::new(config.conversation_ttl()))
            }
        };

        let identity = Arc::new(IdentityRegistry::new(config.demo_mode));
        let reverse_index = Arc::new(ReverseIndex::new());
        let conversations = Arc::new(ConversationService::new(
            Arc::clone(&identity),
            Arc::clone(&store),
            Arc::clone(&reverse_index),
            Arc::clone(&log),
            config.demo_mode,
        ));
        let relay = Arc::new(RelayCore::new());
        let delivery = Arc::new(DeliveryChannel::new());
        let ack = Arc::new(AckEngine::new(
            Arc::clone(&relay),
            Arc::clone(&delivery),
            Arc::clone(&log),
            Arc::clone(&metrics),
            shutdown.clone(),
        ));

        let server_key = match config.encryption_mode {
            EncryptionMode::Server => {
                let seed = config
                    .encryption_key_seed
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("ENCRYPTION_KEY_SEED required for server-mode"))?;
                Some(Arc::new(ServerKey::derive(seed)))
            }
            EncryptionMode::Client => None,
        };

        Ok(Arc::new(Self {
            config,
            identity,
            store,
            reverse_index,
            conversations,
            relay,
            delivery,
            ack,
            log,
            metrics,
            server_key,
            shutdown,
        }))
    }

    pub fn encoding_mode(&self) -> crate::relay::encoding::EncodingMode {
        match self.config.encryption_mode {
            EncryptionMode::Client => crate::relay::encoding::EncodingMode::Client,
            EncryptionMode::Server => crate::relay::encoding::EncodingMode::Server,
        }
    }

    /// Constant-time membership check against the configured Controller
    /// API keys, matching `controller_auth.py::validate_controller_key`.
    pub fn validate_controller_key(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented else { return false };
        self.config.controller_api_keys.iter().any(|known| constant_time_eq(known, presented))
    }
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}
