// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Software hardware-key emulation — P-256 key pairs held in process memory,
// ECIES (ECDH + HKDF-SHA256 + AES-256-GCM) for the hybrid encrypt/decrypt
// step.  Mirrors the scheme used by enclave-class hardware so the vault
// layer behaves identically against a real boundary.
//
// Ciphertext layout:
//   ephemeral public key (SEC1 uncompressed, 65 bytes)
//   || nonce (12 bytes)
//   || AES-256-GCM ciphertext + tag

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use async_trait::async_trait;
use hkdf::Hkdf;
use lockbox_core::{AccessPolicy, KeyPairRef, Result, StoreError};
use p256::{ecdh, PublicKey, SecretKey};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::traits::HardwareKeyStore;

const EPHEMERAL_PUB_LEN: usize = 65;
const NONCE_LEN: usize = 12;

struct StoredKey {
    secret: SecretKey,
    policy: AccessPolicy,
}

/// In-process [`HardwareKeyStore`].
///
/// Private halves never leave the store: callers only ever see the SEC1
/// public key inside a [`KeyPairRef`], and decryption happens through the
/// store.  A single async mutex over the key map serializes `get_or_create`,
/// so concurrent first-use calls for one label observe exactly one creation.
///
/// This implementation cannot present an interactive prompt itself; the
/// vault layer evaluates the authenticator gate before asking it to decrypt
/// policy-protected material.
pub struct SoftwareKeyStore {
    keys: tokio::sync::Mutex<HashMap<String, StoredKey>>,
    creations: AtomicU64,
}

impl SoftwareKeyStore {
    pub fn new() -> Self {
        Self {
            keys: tokio::sync::Mutex::new(HashMap::new()),
            creations: AtomicU64::new(0),
        }
    }

    /// Total key pairs created since construction.  Diagnostic counter used
    /// to verify creation idempotence.
    pub fn creations(&self) -> u64 {
        self.creations.load(Ordering::Relaxed)
    }

    /// Number of live key pairs.
    pub async fn key_count(&self) -> usize {
        self.keys.lock().await.len()
    }
}

impl Default for SoftwareKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareKeyStore for SoftwareKeyStore {
    #[instrument(skip(self), fields(%label, ?policy))]
    async fn get_or_create(&self, label: &str, policy: AccessPolicy) -> Result<KeyPairRef> {
        let mut keys = self.keys.lock().await;

        if let Some(existing) = keys.get(label) {
            // Reuse as-is; the original policy wins and the key is never
            // rotated implicitly.
            debug!("reusing existing key pair");
            return Ok(KeyPairRef::new(
                label,
                existing.policy,
                existing.secret.public_key().to_sec1_bytes().into_vec(),
            ));
        }

        let secret = SecretKey::random(&mut OsRng);
        let public_key = secret.public_key().to_sec1_bytes().into_vec();
        keys.insert(label.to_owned(), StoredKey { secret, policy });
        self.creations.fetch_add(1, Ordering::Relaxed);

        debug!(
            public_key_prefix = %hex::encode(&public_key[..8.min(public_key.len())]),
            "created key pair"
        );
        Ok(KeyPairRef::new(label, policy, public_key))
    }

    async fn find(&self, label: &str) -> Result<Option<KeyPairRef>> {
        let keys = self.keys.lock().await;
        Ok(keys.get(label).map(|stored| {
            KeyPairRef::new(
                label,
                stored.policy,
                stored.secret.public_key().to_sec1_bytes().into_vec(),
            )
        }))
    }

    #[instrument(skip_all, fields(label = %key.label, plaintext_len = plaintext.len()))]
    async fn encrypt(&self, key: &KeyPairRef, plaintext: &[u8]) -> Result<Vec<u8>> {
        // Public-half operation — no map access, no gating.
        let recipient = PublicKey::from_sec1_bytes(&key.public_key)
            .map_err(|e| StoreError::EncryptionFailed(format!("bad public key: {e}")))?;
        ecies_seal(&recipient, plaintext)
    }

    #[instrument(skip_all, fields(label = %key.label, ciphertext_len = ciphertext.len()))]
    async fn decrypt(&self, key: &KeyPairRef, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys.lock().await;
        let stored = keys.get(&key.label).ok_or_else(|| {
            StoreError::KeyRetrievalFailed(format!("no key pair labeled {:?}", key.label))
        })?;
        ecies_open(&stored.secret, ciphertext)
    }

    #[instrument(skip(self), fields(%label))]
    async fn delete(&self, label: &str) -> Result<bool> {
        let existed = self.keys.lock().await.remove(label).is_some();
        debug!(existed, "key pair delete");
        Ok(existed)
    }
}

// ---------------------------------------------------------------------------
// ECIES primitives
// ---------------------------------------------------------------------------

/// Derive the AES-256-GCM key from an ECDH shared secret, binding the
/// ephemeral public key into the KDF info.
fn derive_symmetric_key(
    shared: &ecdh::SharedSecret,
    ephemeral_public: &[u8],
) -> Result<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes().as_slice());
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(ephemeral_public, okm.as_mut())
        .map_err(|e| StoreError::EncryptionFailed(format!("key derivation failed: {e}")))?;
    Ok(okm)
}

fn ecies_seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = SecretKey::random(&mut OsRng);
    let ephemeral_public = ephemeral.public_key().to_sec1_bytes();

    let shared = ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());
    let symmetric = derive_symmetric_key(&shared, &ephemeral_public)?;

    let cipher = Aes256Gcm::new_from_slice(symmetric.as_ref())
        .map_err(|e| StoreError::EncryptionFailed(e.to_string()))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| StoreError::EncryptionFailed("AEAD seal failed".into()))?;

    let mut out = Vec::with_capacity(EPHEMERAL_PUB_LEN + NONCE_LEN + sealed.len());
    out.extend_from_slice(&ephemeral_public);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn ecies_open(secret: &SecretKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < EPHEMERAL_PUB_LEN + NONCE_LEN {
        return Err(StoreError::DecryptionFailed("ciphertext truncated".into()));
    }
    let (ephemeral_public, rest) = blob.split_at(EPHEMERAL_PUB_LEN);
    let (nonce, sealed) = rest.split_at(NONCE_LEN);

    let ephemeral = PublicKey::from_sec1_bytes(ephemeral_public)
        .map_err(|e| StoreError::DecryptionFailed(format!("bad ephemeral key: {e}")))?;

    let shared = ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
    let symmetric = derive_symmetric_key(&shared, ephemeral_public)
        .map_err(|e| StoreError::DecryptionFailed(e.to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(symmetric.as_ref())
        .map_err(|e| StoreError::DecryptionFailed(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| StoreError::DecryptionFailed("AEAD open failed".into()))
}
