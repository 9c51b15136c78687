// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secure ephemeral messaging relay: the server-side runtime for
//! device-to-device encrypted group chats. The relay never decrypts a
//! payload; it owns only device identity, conversation membership, and
//! transient delivery metadata.

pub mod ack;
pub mod authz;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod identity;
pub mod membership;
pub mod observability;
pub mod relay;
pub mod revocation;
pub mod state;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::state::RelayState;
use crate::transport::build_router;

/// Runs the relay until `shutdown` is cancelled (e.g. on SIGINT), wiring
/// every process-singleton service in the deterministic order §9's
/// "Global state" requires and starting the background workers (§5) last.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    config.validate()?;

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = RelayState::build(config, shutdown.clone()).await?;

    spawn_expiration_sweep(Arc::clone(&state));
    spawn_log_purge(Arc::clone(&state));

    state
        .log
        .log_event("system_start", serde_json::json!({}))
        .await
        .ok();
    tracing::info!(%addr, "relay listening");

    let router = build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    };
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal).await?;

    // Stop background workers before the store connection is dropped,
    // per §9's teardown order ("stopping background workers first, then
    // closing store connections").
    shutdown.cancel();
    state
        .log
        .log_event("system_stop", serde_json::json!({}))
        .await
        .ok();

    Ok(())
}

/// Periodic sweep dropping expired pending messages, per §4.E. Runs every
/// tenth of the clock-skew tolerance so expired messages are reclaimed
/// promptly without a dedicated short-interval tuning knob.
fn spawn_expiration_sweep(state: Arc<RelayState>) {
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {
                    let removed = state.relay.sweep_expired().await;
                    if removed > 0 {
                        tracing::debug!(removed, "expiration sweep");
                    }
                }
            }
        }
    });
}

/// Hourly purge of log/audit entries older than the retention window and
/// metric counters older than 24h, resolving §9's open question on purge
/// cadence in favor of the metrics window's own granularity.
fn spawn_log_purge(state: Arc<RelayState>) {
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(crate::constants::METRICS_WINDOW);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {
                    let purged_logs = state.log.purge_expired().await;
                    let purged_metrics = state.metrics.purge_older_than(Duration::from_secs(24 * 3600)).await;
                    tracing::debug!(purged_logs, purged_metrics, "observability purge");
                }
            }
        }
    });
}
