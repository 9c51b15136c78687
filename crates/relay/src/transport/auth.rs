// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Header-based authentication for the API Surface. Device endpoints read
//! `X-Device-ID`; Controller endpoints read `X-Controller-Key` and compare
//! it against the configured key set in constant time.

use axum::http::HeaderMap;

use crate::constants::{HEADER_CONTROLLER_KEY, HEADER_DEVICE_ID};
use crate::error::RelayError;
use crate::state::RelayState;

/// Extracts the caller's device identifier. Missing header is `401`; this
/// says nothing about whether the device is known or active — that is the
/// Authorization Gate's job (§4.C).
pub fn device_id(headers: &HeaderMap) -> Result<String, RelayError> {
    headers
        .get(HEADER_DEVICE_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| RelayError::unauthorized("missing X-Device-ID header"))
}

/// Validates the `X-Controller-Key` header against the configured key set.
pub fn require_controller(headers: &HeaderMap, state: &RelayState) -> Result<(), RelayError> {
    let presented = headers.get(HEADER_CONTROLLER_KEY).and_then(|v| v.to_str().ok());
    if state.validate_controller_key(presented) {
        Ok(())
    } else {
        Err(RelayError::unauthorized("missing or invalid X-Controller-Key header"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn device_id_requires_header() {
        let headers = HeaderMap::new();
        assert!(device_id(&headers).is_err());
    }

    #[test]
    fn device_id_reads_header_value() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_DEVICE_ID, HeaderValue::from_static("a"));
        assert_eq!(device_id(&headers).unwrap(), "a");
    }
}
