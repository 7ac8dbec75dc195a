// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Stub platform for targets with no native secure-storage backend.
//
// Every capability reports unavailability — real backends are injected by
// the embedding application; the software implementations live in the
// `software` module.

use async_trait::async_trait;
use lockbox_core::{AccessPolicy, AuthOutcome, AuthPolicy, KeyPairRef, Result, StoreError};

use crate::traits::{AuthenticatorGate, HardwareKeyStore, ProtectedBlobStore};

/// No-op platform returned where no secure hardware exists.
pub struct StubPlatform;

#[async_trait]
impl AuthenticatorGate for StubPlatform {
    fn can_evaluate(&self, _policy: AuthPolicy) -> bool {
        false
    }

    async fn evaluate(&self, _policy: AuthPolicy, _reason: &str) -> AuthOutcome {
        tracing::warn!("AuthenticatorGate::evaluate called on stub platform");
        AuthOutcome::Unavailable
    }
}

#[async_trait]
impl HardwareKeyStore for StubPlatform {
    async fn get_or_create(&self, _label: &str, _policy: AccessPolicy) -> Result<KeyPairRef> {
        tracing::warn!("HardwareKeyStore::get_or_create called on stub platform");
        Err(StoreError::KeyCreationFailed(
            "no hardware key store on this platform".into(),
        ))
    }

    async fn find(&self, _label: &str) -> Result<Option<KeyPairRef>> {
        Err(StoreError::KeyRetrievalFailed(
            "no hardware key store on this platform".into(),
        ))
    }

    async fn encrypt(&self, _key: &KeyPairRef, _plaintext: &[u8]) -> Result<Vec<u8>> {
        Err(StoreError::EncryptionFailed(
            "no hardware key store on this platform".into(),
        ))
    }

    async fn decrypt(&self, _key: &KeyPairRef, _ciphertext: &[u8]) -> Result<Vec<u8>> {
        Err(StoreError::DecryptionFailed(
            "no hardware key store on this platform".into(),
        ))
    }

    async fn delete(&self, _label: &str) -> Result<bool> {
        // Nothing can ever have been stored here.
        Ok(false)
    }
}

#[async_trait]
impl ProtectedBlobStore for StubPlatform {
    async fn put(
        &self,
        _service: &str,
        _account: &str,
        _bytes: &[u8],
        _policy: AccessPolicy,
    ) -> Result<()> {
        tracing::warn!("ProtectedBlobStore::put called on stub platform");
        Err(StoreError::StoreWriteFailed(
            "no protected store on this platform".into(),
        ))
    }

    async fn get(&self, _service: &str, _account: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn contains(&self, _service: &str, _account: &str) -> Result<bool> {
        Ok(false)
    }

    async fn delete(&self, _service: &str, _account: &str) -> Result<bool> {
        Ok(false)
    }
}
