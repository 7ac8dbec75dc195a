// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Secret codec — deterministic text ⇄ byte conversion (UTF-8) plus the
// asymmetric encrypt/decrypt step layered on a hardware key store's key
// pair.

use std::sync::Arc;

use lockbox_core::{KeyPairRef, Result, StoreError};
use lockbox_platform::HardwareKeyStore;
use tracing::instrument;

/// Convert text to its byte representation.  UTF-8, always.
pub fn encode(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Convert bytes back to text.
///
/// Fails with `EncodingError` when the payload is not valid UTF-8 — which
/// after a successful decrypt means the stored value was written by
/// something other than this codec.
pub fn decode(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| StoreError::EncodingError)
}

/// The asymmetric half of the codec, bound to one [`HardwareKeyStore`].
///
/// Encryption uses only the public half carried by the [`KeyPairRef`];
/// decryption goes through the key store so the private half never leaves
/// its boundary (and gating, where the key's policy demands it, is honored
/// there).
pub struct SecretCodec {
    keys: Arc<dyn HardwareKeyStore>,
}

impl SecretCodec {
    pub fn new(keys: Arc<dyn HardwareKeyStore>) -> Self {
        Self { keys }
    }

    /// Encode `value` and encrypt it under `key`'s public half.
    #[instrument(skip_all, fields(label = %key.label))]
    pub async fn seal(&self, key: &KeyPairRef, value: &str) -> Result<Vec<u8>> {
        self.keys.encrypt(key, &encode(value)).await
    }

    /// Decrypt `ciphertext` through the key store and decode the result.
    #[instrument(skip_all, fields(label = %key.label))]
    pub async fn open(&self, key: &KeyPairRef, ciphertext: &[u8]) -> Result<String> {
        let plaintext = self.keys.decrypt(key, ciphertext).await?;
        decode(&plaintext)
    }
}
