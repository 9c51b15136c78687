// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Send-path encoding contract (§4.E). `client-mode` requires the inbound
//! payload to already be base64 or hex; `server-mode` (development only)
//! accepts plaintext and encrypts it with a deployment-local symmetric key
//! before persistence.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{codes, RelayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMode {
    Client,
    Server,
}

/// Decodes (and, in `server-mode`, encrypts) an inbound payload string into
/// opaque bytes suitable for the pending map. The server never derives any
/// field from the decoded bytes beyond their length.
pub fn decode_inbound(mode: EncodingMode, payload: &str, server_key: Option<&ServerKey>) -> Result<Vec<u8>, RelayError> {
    match mode {
        EncodingMode::Client => decode_client_mode(payload),
        EncodingMode::Server => encode_server_mode(payload, server_key),
    }
}

/// Hex and standard base64 alphabets overlap heavily (e.g. `"deadbeef"` is
/// valid in both), so decoding must pick a single interpretation rather
/// than trying one encoding and silently falling back to the other. A
/// payload made up entirely of hex digits, with an even length, is always
/// treated as hex; anything else is attempted as base64.
fn decode_client_mode(payload: &str) -> Result<Vec<u8>, RelayError> {
    use base64::Engine;
    if payload.len() % 2 == 0 && !payload.is_empty() && payload.bytes().all(|b| b.is_ascii_hexdigit()) {
        if let Ok(bytes) = hex::decode(payload) {
            return Ok(bytes);
        }
    }
    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(payload) {
        return Ok(bytes);
    }
    Err(RelayError::bad_request(codes::PAYLOAD_PLAINTEXT_REJECTED, "payload must be base64 or hex encoded"))
}

fn encode_server_mode(payload: &str, server_key: Option<&ServerKey>) -> Result<Vec<u8>, RelayError> {
    let key = server_key.ok_or_else(RelayError::backend)?;
    key.seal(payload.as_bytes())
}

/// Process-local symmetric key for `server-mode`, derived from
/// `ENCRYPTION_KEY_SEED` at startup.
pub struct ServerKey {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl ServerKey {
    pub fn derive(seed: &str) -> Self {
        let digest = digest(&SHA256, seed.as_bytes());
        let unbound = match UnboundKey::new(&AES_256_GCM, digest.as_ref()) {
            Ok(key) => key,
            // SHA-256 output is always 32 bytes, the exact key length AES-256-GCM requires.
            Err(_) => unreachable!("sha256 digest length matches aes-256-gcm key length"),
        };
        Self { key: LessSafeKey::new(unbound), rng: SystemRandom::new() }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, RelayError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).map_err(|_| RelayError::backend())?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out).map_err(|_| RelayError::backend())?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_mode_accepts_hex() {
        let bytes = decode_inbound(EncodingMode::Client, "deadbeef", None).unwrap();
        assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn client_mode_rejects_plaintext() {
        let err = decode_inbound(EncodingMode::Client, "not encoded at all!!", None).unwrap_err();
        assert_eq!(err.as_str(), codes::PAYLOAD_PLAINTEXT_REJECTED);
    }

    #[test]
    fn server_mode_encrypts_plaintext() {
        let key = ServerKey::derive("test-seed");
        let sealed = decode_inbound(EncodingMode::Server, "hello", Some(&key)).unwrap();
        assert!(sealed.len() > "hello".len());
    }
}
