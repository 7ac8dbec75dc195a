// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Preference vault — four storage policies composed from the authenticator
// gate, the hardware key store, and the protected blob store, all behind
// one get/put/has/remove surface.
//
// Per-key operations are single-flight: a vault-level async mutex per key
// serializes read-modify-write sequences so two concurrent puts can never
// leave a record partially written.

use std::collections::HashMap;
use std::sync::Arc;

use lockbox_core::{
    AccessPolicy, AuthOutcome, AuthPolicy, Result, StorageVariant, StoreError, VaultConfig,
};
use lockbox_platform::{
    AuthenticatorGate, HardwareKeyStore, MemoryBlobStore, ProtectedBlobStore, SoftwareKeyStore,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use crate::codec::{self, SecretCodec};

/// Uniform secret-preference store over one of the four storage policies.
///
/// The variant is fixed at construction; the authenticator gate is injected
/// (shared, not owned) while the key and blob stores belong to the vault
/// for the lifetime of the process.
pub struct PreferenceVault {
    config: VaultConfig,
    blobs: Arc<dyn ProtectedBlobStore>,
    keys: Arc<dyn HardwareKeyStore>,
    gate: Arc<dyn AuthenticatorGate>,
    codec: SecretCodec,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PreferenceVault {
    pub fn new(
        config: VaultConfig,
        blobs: Arc<dyn ProtectedBlobStore>,
        keys: Arc<dyn HardwareKeyStore>,
        gate: Arc<dyn AuthenticatorGate>,
    ) -> Self {
        let codec = SecretCodec::new(Arc::clone(&keys));
        Self {
            config,
            blobs,
            keys,
            gate,
            codec,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Vault over the in-process software backends — memory blob store and
    /// software key store — with the given gate.
    pub fn with_software_backend(config: VaultConfig, gate: Arc<dyn AuthenticatorGate>) -> Self {
        Self::new(
            config,
            Arc::new(MemoryBlobStore::new()),
            Arc::new(SoftwareKeyStore::new()),
            gate,
        )
    }

    pub fn variant(&self) -> StorageVariant {
        self.config.variant
    }

    pub fn service(&self) -> &str {
        &self.config.service
    }

    // -- Public operations --------------------------------------------------

    /// Fetch the stored value for `key`.
    ///
    /// Key-backed variants return `default` when neither key pair nor
    /// record was ever created; blob-gated variants fail with
    /// `DataNotFound` instead.  That divergence is deliberate and fixed
    /// per variant.
    #[instrument(skip(self, default), fields(service = %self.config.service, variant = %self.config.variant, %key))]
    pub async fn get_preference(&self, key: &str, default: &str) -> Result<String> {
        let _guard = self.lock_key(key).await;

        match self.config.variant {
            StorageVariant::Plain => self.fetch_and_decode(key).await,
            StorageVariant::Biometric => {
                self.require_gate(AuthPolicy::Biometrics).await?;
                self.fetch_and_decode(key).await
            }
            StorageVariant::HardwareKey => self.get_encrypted(key, default).await,
            StorageVariant::BiometricHardwareKey => {
                self.require_gate(AuthPolicy::DeviceOwner).await?;
                self.get_encrypted(key, default).await
            }
        }
    }

    /// Store `value` under `key`, fully replacing any prior value.
    #[instrument(skip(self, value), fields(service = %self.config.service, variant = %self.config.variant, %key))]
    pub async fn put_preference(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock_key(key).await;

        match self.config.variant {
            StorageVariant::Plain => {
                self.blobs
                    .put(&self.config.service, key, &codec::encode(value), AccessPolicy::None)
                    .await
            }
            StorageVariant::Biometric => {
                // Writing needs no challenge, but a device that cannot
                // evaluate the policy could never read the record back —
                // short-circuit before touching the store.
                self.require_capability(AuthPolicy::Biometrics)?;
                self.blobs
                    .put(
                        &self.config.service,
                        key,
                        &codec::encode(value),
                        AccessPolicy::Presence,
                    )
                    .await
            }
            StorageVariant::HardwareKey => self.put_encrypted(key, value).await,
            StorageVariant::BiometricHardwareKey => {
                self.require_capability(AuthPolicy::DeviceOwner)?;
                self.put_encrypted(key, value).await
            }
        }
    }

    /// Existence probe.  Checks store-level presence only — never decrypts
    /// and never presents a challenge.
    #[instrument(skip(self), fields(service = %self.config.service, variant = %self.config.variant, %key))]
    pub async fn has_preference(&self, key: &str) -> Result<bool> {
        let _guard = self.lock_key(key).await;
        self.blobs.contains(&self.config.service, key).await
    }

    /// Delete the record and, for key-backed variants, the key pair.
    ///
    /// Both legs are idempotent — removing an absent preference succeeds.
    /// Both legs are always attempted; if either fails the operation
    /// reports failure.
    #[instrument(skip(self), fields(service = %self.config.service, variant = %self.config.variant, %key))]
    pub async fn remove_preference(&self, key: &str) -> Result<()> {
        let _guard = self.lock_key(key).await;

        let key_leg = if self.config.variant.is_key_backed() {
            self.keys
                .delete(&self.key_label(key))
                .await
                .map(|existed| debug!(existed, "key pair leg"))
        } else {
            Ok(())
        };
        let blob_leg = self
            .blobs
            .delete(&self.config.service, key)
            .await
            .map(|existed| debug!(existed, "record leg"));

        key_leg.and(blob_leg)
    }

    // -- Gate handling ------------------------------------------------------

    /// Capability probe; `false` short-circuits before the expensive
    /// challenge or any store access.
    fn require_capability(&self, policy: AuthPolicy) -> Result<()> {
        if self.gate.can_evaluate(policy) {
            Ok(())
        } else {
            Err(StoreError::BiometricUnavailable)
        }
    }

    /// Probe, then present the challenge, translating the single outcome
    /// into the taxonomy.  Never retried here.
    async fn require_gate(&self, policy: AuthPolicy) -> Result<()> {
        self.require_capability(policy)?;
        match self.gate.evaluate(policy, &self.config.auth_reason).await {
            AuthOutcome::Success => Ok(()),
            AuthOutcome::UserFallbackRequested => Err(StoreError::UserFallbackRequested),
            AuthOutcome::Failed(detail) => Err(StoreError::AuthenticationFailed(detail)),
            AuthOutcome::Unavailable => Err(StoreError::BiometricUnavailable),
        }
    }

    // -- Variant plumbing ---------------------------------------------------

    /// Key labels are scoped by service so two vaults with different
    /// namespaces never collide in the key store.
    fn key_label(&self, key: &str) -> String {
        format!("{}/{}", self.config.service, key)
    }

    async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.key_locks.lock().await;
            // A strong count of 1 means only the map holds the lock — no
            // guard and no waiter.  Pruning here keeps a long-lived vault
            // from accumulating an entry per key ever touched.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.to_owned()).or_default())
        };
        lock.lock_owned().await
    }

    /// Blob-backed read: absence is `DataNotFound` for the non-defaulting
    /// variants.
    async fn fetch_and_decode(&self, key: &str) -> Result<String> {
        match self.blobs.get(&self.config.service, key).await? {
            Some(bytes) => codec::decode(&bytes),
            None => Err(StoreError::DataNotFound),
        }
    }

    /// Key-backed read: a missing key pair or record is a legitimate empty
    /// state and yields the caller's default.
    async fn get_encrypted(&self, key: &str, default: &str) -> Result<String> {
        let Some(key_ref) = self.keys.find(&self.key_label(key)).await? else {
            debug!("no key pair; yielding default");
            return Ok(default.to_owned());
        };
        let Some(ciphertext) = self.blobs.get(&self.config.service, key).await? else {
            debug!("no record; yielding default");
            return Ok(default.to_owned());
        };
        self.codec.open(&key_ref, &ciphertext).await
    }

    /// Key-backed write: resolve-or-create the key pair, seal, upsert.
    async fn put_encrypted(&self, key: &str, value: &str) -> Result<()> {
        let key_ref = self
            .keys
            .get_or_create(&self.key_label(key), self.config.variant.access_policy())
            .await?;
        let ciphertext = self.codec.seal(&key_ref, value).await?;
        self.blobs
            .put(&self.config.service, key, &ciphertext, AccessPolicy::None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use lockbox_platform::{MockAuthenticator, SqliteBlobStore};

    use super::*;

    /// Blob store that flags any two writes in flight at the same time.
    struct OverlapDetectingStore {
        inner: MemoryBlobStore,
        in_flight: AtomicUsize,
        overlapped: AtomicBool,
    }

    impl OverlapDetectingStore {
        fn new() -> Self {
            Self {
                inner: MemoryBlobStore::new(),
                in_flight: AtomicUsize::new(0),
                overlapped: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ProtectedBlobStore for OverlapDetectingStore {
        async fn put(
            &self,
            service: &str,
            account: &str,
            bytes: &[u8],
            policy: AccessPolicy,
        ) -> Result<()> {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            // Widen the window so an unserialized caller would be caught.
            tokio::task::yield_now().await;
            let result = self.inner.put(service, account, bytes, policy).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn get(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(service, account).await
        }

        async fn contains(&self, service: &str, account: &str) -> Result<bool> {
            self.inner.contains(service, account).await
        }

        async fn delete(&self, service: &str, account: &str) -> Result<bool> {
            self.inner.delete(service, account).await
        }
    }

    const ALL_VARIANTS: [StorageVariant; 4] = [
        StorageVariant::Plain,
        StorageVariant::Biometric,
        StorageVariant::HardwareKey,
        StorageVariant::BiometricHardwareKey,
    ];

    fn software_vault(variant: StorageVariant) -> (PreferenceVault, Arc<MockAuthenticator>) {
        let gate = Arc::new(MockAuthenticator::new());
        let vault = PreferenceVault::with_software_backend(
            VaultConfig::new("svc.test", variant),
            Arc::clone(&gate) as Arc<dyn AuthenticatorGate>,
        );
        (vault, gate)
    }

    #[tokio::test]
    async fn round_trip_every_variant() {
        for variant in ALL_VARIANTS {
            let (vault, _gate) = software_vault(variant);
            vault
                .put_preference("greeting", "héllo wörld")
                .await
                .unwrap_or_else(|e| panic!("put failed for {variant}: {e}"));

            let value = vault
                .get_preference("greeting", "FALLBACK")
                .await
                .unwrap_or_else(|e| panic!("get failed for {variant}: {e}"));
            assert_eq!(value, "héllo wörld", "variant {variant}");

            assert!(vault.has_preference("greeting").await.expect("has"));
        }
    }

    #[tokio::test]
    async fn put_fully_replaces_prior_value() {
        for variant in ALL_VARIANTS {
            let (vault, _gate) = software_vault(variant);
            vault.put_preference("k", "first").await.expect("first put");
            vault.put_preference("k", "second").await.expect("second put");

            let value = vault.get_preference("k", "FALLBACK").await.expect("get");
            assert_eq!(value, "second", "variant {variant}");
        }
    }

    #[tokio::test]
    async fn absence_semantics_per_variant() {
        // Blob-gated variants: absence is an error.
        for variant in [StorageVariant::Plain, StorageVariant::Biometric] {
            let (vault, _gate) = software_vault(variant);
            let result = vault.get_preference("never-written", "FALLBACK").await;
            assert!(
                matches!(result, Err(StoreError::DataNotFound)),
                "variant {variant}"
            );
        }

        // Key-backed variants: absence yields the caller's default.
        for variant in [
            StorageVariant::HardwareKey,
            StorageVariant::BiometricHardwareKey,
        ] {
            let (vault, _gate) = software_vault(variant);
            let value = vault
                .get_preference("never-written", "FALLBACK")
                .await
                .expect("get");
            assert_eq!(value, "FALLBACK", "variant {variant}");
        }
    }

    #[tokio::test]
    async fn gate_capability_denied_never_reaches_store() {
        for variant in [
            StorageVariant::Biometric,
            StorageVariant::BiometricHardwareKey,
        ] {
            let (vault, gate) = software_vault(variant);
            gate.set_capability(false);

            let put = vault.put_preference("secret", "x").await;
            assert!(
                matches!(put, Err(StoreError::BiometricUnavailable)),
                "variant {variant}"
            );
            // No record was created and no challenge was presented.
            assert!(!vault.has_preference("secret").await.expect("has"));
            assert_eq!(gate.evaluations(), 0, "variant {variant}");

            let get = vault.get_preference("secret", "FALLBACK").await;
            assert!(
                matches!(get, Err(StoreError::BiometricUnavailable)),
                "variant {variant}"
            );
            assert_eq!(gate.evaluations(), 0, "variant {variant}");
        }
    }

    #[tokio::test]
    async fn failed_challenge_surfaces_distinctly() {
        let (vault, gate) = software_vault(StorageVariant::Biometric);
        vault.put_preference("pin", "1234").await.expect("put");

        gate.push_outcome(AuthOutcome::Failed("wrong finger".into()));
        let result = vault.get_preference("pin", "FALLBACK").await;
        match result {
            Err(StoreError::AuthenticationFailed(detail)) => {
                assert_eq!(detail, "wrong finger");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        gate.push_outcome(AuthOutcome::UserFallbackRequested);
        let result = vault.get_preference("pin", "FALLBACK").await;
        assert!(matches!(result, Err(StoreError::UserFallbackRequested)));

        // The record itself is untouched by denied challenges.
        gate.push_outcome(AuthOutcome::Success);
        assert_eq!(
            vault.get_preference("pin", "FALLBACK").await.expect("get"),
            "1234"
        );
    }

    #[tokio::test]
    async fn synchronously_unavailable_gate_does_not_hang() {
        let (vault, gate) = software_vault(StorageVariant::BiometricHardwareKey);
        vault.put_preference("k", "v").await.expect("put");

        gate.push_outcome(AuthOutcome::Unavailable);
        let result = vault.get_preference("k", "FALLBACK").await;
        assert!(matches!(result, Err(StoreError::BiometricUnavailable)));
    }

    #[tokio::test]
    async fn key_pair_reused_across_puts() {
        let gate = Arc::new(MockAuthenticator::new());
        let keys = Arc::new(SoftwareKeyStore::new());
        let vault = PreferenceVault::new(
            VaultConfig::new("svc.test", StorageVariant::HardwareKey),
            Arc::new(MemoryBlobStore::new()),
            Arc::clone(&keys) as Arc<dyn HardwareKeyStore>,
            gate,
        );

        vault.put_preference("token", "first").await.expect("put");
        vault.put_preference("token", "second").await.expect("put");

        assert_eq!(keys.creations(), 1, "second put must reuse the key pair");
    }

    #[tokio::test]
    async fn concurrent_puts_for_one_key_never_interleave() {
        let gate = Arc::new(MockAuthenticator::new());
        let keys = Arc::new(SoftwareKeyStore::new());
        let blobs = Arc::new(OverlapDetectingStore::new());
        let vault = Arc::new(PreferenceVault::new(
            VaultConfig::new("svc.test", StorageVariant::HardwareKey),
            Arc::clone(&blobs) as Arc<dyn ProtectedBlobStore>,
            Arc::clone(&keys) as Arc<dyn HardwareKeyStore>,
            gate,
        ));

        let values: Vec<String> = (0..8).map(|i| format!("value-{i}")).collect();
        let mut tasks = Vec::new();
        for value in values.clone() {
            let vault = Arc::clone(&vault);
            tasks.push(tokio::spawn(async move {
                vault.put_preference("token", &value).await.expect("put");
            }));
        }
        for task in tasks {
            task.await.expect("join");
        }

        assert!(
            !blobs.overlapped.load(Ordering::SeqCst),
            "two writes for one key were in flight at once"
        );
        assert_eq!(keys.creations(), 1, "concurrent puts must share one key pair");

        // The surviving value is exactly one complete write.
        let stored = vault
            .get_preference("token", "MISSING")
            .await
            .expect("get");
        assert!(values.contains(&stored), "partial write survived: {stored:?}");
    }

    #[tokio::test]
    async fn key_locks_are_pruned_once_idle() {
        let (vault, _gate) = software_vault(StorageVariant::Plain);

        for i in 0..32 {
            let key = format!("k{i}");
            vault.put_preference(&key, "v").await.expect("put");
            vault.remove_preference(&key).await.expect("remove");
        }

        // Each operation drops locks no longer in use; only the entry from
        // the most recent operation can remain.
        assert!(vault.key_locks.lock().await.len() <= 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_deletes_both_legs() {
        let gate = Arc::new(MockAuthenticator::new());
        let keys = Arc::new(SoftwareKeyStore::new());
        let vault = PreferenceVault::new(
            VaultConfig::new("svc.test", StorageVariant::BiometricHardwareKey),
            Arc::new(MemoryBlobStore::new()),
            Arc::clone(&keys) as Arc<dyn HardwareKeyStore>,
            gate,
        );

        vault.put_preference("token", "abc123").await.expect("put");
        assert_eq!(keys.key_count().await, 1);

        vault.remove_preference("token").await.expect("first remove");
        assert_eq!(keys.key_count().await, 0, "key pair leg must be deleted");
        assert!(!vault.has_preference("token").await.expect("has"));

        // Second remove is a no-op success.
        vault.remove_preference("token").await.expect("second remove");
    }

    #[tokio::test]
    async fn scenario_hardware_key_token_lifecycle() {
        let gate = Arc::new(MockAuthenticator::new());
        let vault = PreferenceVault::with_software_backend(
            VaultConfig::new("svc.example", StorageVariant::HardwareKey),
            gate,
        );

        vault.put_preference("token", "abc123").await.expect("put");
        assert_eq!(
            vault
                .get_preference("token", "MISSING")
                .await
                .expect("get after put"),
            "abc123"
        );

        vault.remove_preference("token").await.expect("remove");
        assert_eq!(
            vault
                .get_preference("token", "MISSING")
                .await
                .expect("get after remove"),
            "MISSING"
        );
    }

    #[tokio::test]
    async fn scenario_biometric_vault_without_capability() {
        let (vault, gate) = software_vault(StorageVariant::Biometric);
        gate.set_capability(false);

        let result = vault.put_preference("secret", "x").await;
        assert!(matches!(result, Err(StoreError::BiometricUnavailable)));
        assert!(!vault.has_preference("secret").await.expect("has"));
    }

    #[tokio::test]
    async fn aborted_challenge_leaves_record_and_gate_intact() {
        let gate = Arc::new(MockAuthenticator::new());
        let vault = Arc::new(PreferenceVault::with_software_backend(
            VaultConfig::new("svc.test", StorageVariant::Biometric),
            Arc::clone(&gate) as Arc<dyn AuthenticatorGate>,
        ));
        vault.put_preference("k", "v").await.expect("put");

        gate.hold_next();
        let pending = {
            let vault = Arc::clone(&vault);
            tokio::spawn(async move { vault.get_preference("k", "FALLBACK").await })
        };
        tokio::task::yield_now().await;
        pending.abort();
        assert!(pending.await.is_err());

        // The record is unmodified and the gate accepts a fresh challenge.
        assert_eq!(
            vault.get_preference("k", "FALLBACK").await.expect("get"),
            "v"
        );
    }

    #[tokio::test]
    async fn has_never_presents_a_challenge() {
        let (vault, gate) = software_vault(StorageVariant::BiometricHardwareKey);
        vault.put_preference("k", "v").await.expect("put");

        let evaluations_before = gate.evaluations();
        assert!(vault.has_preference("k").await.expect("has"));
        assert_eq!(gate.evaluations(), evaluations_before);
    }

    #[tokio::test]
    async fn plain_vault_over_sqlite_store() {
        let gate = Arc::new(MockAuthenticator::new());
        let vault = PreferenceVault::new(
            VaultConfig::new("svc.test", StorageVariant::Plain),
            Arc::new(SqliteBlobStore::open_in_memory().expect("open store")),
            Arc::new(SoftwareKeyStore::new()),
            gate,
        );

        vault.put_preference("durable", "value").await.expect("put");
        assert_eq!(
            vault
                .get_preference("durable", "FALLBACK")
                .await
                .expect("get"),
            "value"
        );
        vault.remove_preference("durable").await.expect("remove");
        let result = vault.get_preference("durable", "FALLBACK").await;
        assert!(matches!(result, Err(StoreError::DataNotFound)));
    }

    #[tokio::test]
    async fn service_namespaces_are_isolated() {
        let gate = Arc::new(MockAuthenticator::new());
        let blobs: Arc<dyn ProtectedBlobStore> = Arc::new(MemoryBlobStore::new());
        let keys: Arc<dyn HardwareKeyStore> = Arc::new(SoftwareKeyStore::new());

        let vault_a = PreferenceVault::new(
            VaultConfig::new("svc.alpha", StorageVariant::HardwareKey),
            Arc::clone(&blobs),
            Arc::clone(&keys),
            Arc::clone(&gate) as Arc<dyn AuthenticatorGate>,
        );
        let vault_b = PreferenceVault::new(
            VaultConfig::new("svc.beta", StorageVariant::HardwareKey),
            blobs,
            keys,
            gate,
        );

        vault_a.put_preference("token", "from-a").await.expect("put");
        assert_eq!(
            vault_b
                .get_preference("token", "UNSET")
                .await
                .expect("get"),
            "UNSET",
            "vault_b must not see vault_a's record"
        );
    }
}
