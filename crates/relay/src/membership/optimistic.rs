// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic optimistic-lock retry helper shared by every store backend that
//! needs WATCH/MULTI/EXEC semantics.

use std::future::Future;

use super::StoreError;

/// Maximum attempts before a caller gives up and reports a transient
/// backend failure.
pub const MAX_ATTEMPTS: u32 = 3;

/// Retries `attempt` up to [`MAX_ATTEMPTS`] times. `attempt` returns
/// `Ok(None)` when its transaction was aborted by a concurrent writer
/// (the watched key changed between the read and the `EXEC`); it returns
/// `Ok(Some(value))` on a successful commit. Exceeding the attempt budget
/// surfaces as [`StoreError::Backend`], never as a policy-level error.
pub async fn with_retry<F, Fut, T>(mut attempt: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, StoreError>>,
{
    for _ in 0..MAX_ATTEMPTS {
        if let Some(value) = attempt().await? {
            return Ok(value);
        }
    }
    Err(StoreError::Backend)
}
