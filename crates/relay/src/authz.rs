// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization Gate: a stateless policy function mapping
//! (device state, operation) to allow/deny. All enforcement is
//! server-side; client-asserted state never changes a decision.

use crate::error::{codes, RelayError};
use crate::identity::IdentityRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SendMessage,
    CreateConversation,
    JoinConversation,
    LeaveConversation,
    CloseConversation,
    ReadConversation,
}

/// Checks whether `device_id` may perform `operation`, given its current
/// identity record. `Leave`/`Close` additionally require participant
/// membership, which is enforced by the Conversation Service itself (§4.D)
/// since this gate has no conversation context.
pub async fn check(registry: &IdentityRegistry, device_id: &str, operation: Operation) -> Result<(), RelayError> {
    let record = match registry.get(device_id).await {
        Some(record) => record,
        None => return Err(RelayError::unauthorized("unknown device")),
    };

    let allowed = match operation {
        Operation::SendMessage => registry.can_send(device_id).await,
        Operation::CreateConversation => registry.can_create(device_id).await,
        Operation::JoinConversation => registry.can_join(device_id).await,
        Operation::LeaveConversation | Operation::CloseConversation => true,
        Operation::ReadConversation => registry.can_read(device_id).await,
    };

    if allowed {
        return Ok(());
    }

    if record.is_revoked() {
        return Err(RelayError::forbidden(codes::DEVICE_NOT_ACTIVE, crate::constants::ERROR_MESSAGING_DISABLED));
    }
    Err(RelayError::unauthorized("device not active"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_device_is_unauthorized() {
        let registry = IdentityRegistry::new(false);
        let err = check(&registry, "ghost", Operation::SendMessage).await.unwrap_err();
        assert_eq!(err.http_status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn revoked_device_is_forbidden_to_send() {
        let registry = IdentityRegistry::new(false);
        registry.register("a", "pk", None).await.unwrap();
        registry.provision("a").await.unwrap();
        registry.confirm("a").await.unwrap();
        registry.revoke("a").await.unwrap();
        let err = check(&registry, "a", Operation::SendMessage).await.unwrap_err();
        assert_eq!(err.http_status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn revoked_device_may_still_read() {
        let registry = IdentityRegistry::new(false);
        registry.register("a", "pk", None).await.unwrap();
        registry.provision("a").await.unwrap();
        registry.confirm("a").await.unwrap();
        registry.revoke("a").await.unwrap();
        assert!(check(&registry, "a", Operation::ReadConversation).await.is_ok());
    }

    #[tokio::test]
    async fn active_device_may_send() {
        let registry = IdentityRegistry::new(false);
        registry.register("a", "pk", None).await.unwrap();
        registry.provision("a").await.unwrap();
        registry.confirm("a").await.unwrap();
        assert!(check(&registry, "a", Operation::SendMessage).await.is_ok());
    }
}
