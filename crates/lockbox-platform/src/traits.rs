// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Platform-agnostic trait definitions for the three secure-storage
// collaborators.
//
// Each trait wraps one opaque platform capability so the vault engine never
// talks to an OS API directly: implementations translate whatever failure
// shape the platform produces into the closed `StoreError` taxonomy, and
// tests substitute deterministic doubles.

use async_trait::async_trait;
use lockbox_core::{AccessPolicy, AuthOutcome, AuthPolicy, KeyPairRef, Result};

/// Liveness / biometric challenge evaluator.
///
/// Injected (shared, not owned) so tests can script outcomes instead of
/// touching real hardware or UI.  Implementations that need a particular
/// execution context for the interactive prompt (commonly the platform's
/// main thread) handle that hop internally; the engine stays
/// executor-agnostic.
#[async_trait]
pub trait AuthenticatorGate: Send + Sync {
    /// Non-suspending capability probe.
    ///
    /// Must be consulted before an evaluation that requires biometry; a
    /// `false` here short-circuits to `BiometricUnavailable` without
    /// presenting the expensive challenge.
    fn can_evaluate(&self, policy: AuthPolicy) -> bool;

    /// Present the challenge and suspend until the user completes, cancels,
    /// or the system denies it.
    ///
    /// Yields exactly one outcome per call and is never retried by the
    /// engine.  Dropping the returned future aborts the challenge and must
    /// leave the gate usable for subsequent evaluations.
    async fn evaluate(&self, policy: AuthPolicy, reason: &str) -> AuthOutcome;
}

/// Labeled, non-exportable asymmetric key pairs inside a hardware (or
/// hardware-emulating) security boundary.
#[async_trait]
pub trait HardwareKeyStore: Send + Sync {
    /// Look up the key pair for `label`, creating it with `policy` if absent.
    ///
    /// Observably idempotent: concurrent or repeated calls with the same
    /// label never produce two distinct live keys, and an existing key is
    /// reused as-is — its original policy wins, it is never rotated.
    async fn get_or_create(&self, label: &str, policy: AccessPolicy) -> Result<KeyPairRef>;

    /// Resolve an existing key pair by label; `Ok(None)` when absent.
    async fn find(&self, label: &str) -> Result<Option<KeyPairRef>>;

    /// Encrypt with the public half.  Never requires gating.
    async fn encrypt(&self, key: &KeyPairRef, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt through the private half held inside the boundary.
    ///
    /// When the key's policy mandates a challenge the caller must have
    /// satisfied the gate first; platform implementations may additionally
    /// trigger the system prompt themselves.  A cryptographic failure is
    /// `DecryptionFailed` — distinct from a missing record (`DataNotFound`)
    /// and from a denied challenge.
    async fn decrypt(&self, key: &KeyPairRef, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Destroy the key pair for `label`.
    ///
    /// Idempotent — deleting an absent key is `Ok(false)`, not an error.
    /// Returns `Ok(true)` when a live key was removed.
    async fn delete(&self, label: &str) -> Result<bool>;
}

/// OS-level protected store associating opaque bytes with a
/// (service, account) pair.
#[async_trait]
pub trait ProtectedBlobStore: Send + Sync {
    /// Create-or-update: replaces any existing payload for the pair in
    /// full, never duplicating records for the same key.
    async fn put(
        &self,
        service: &str,
        account: &str,
        bytes: &[u8],
        policy: AccessPolicy,
    ) -> Result<()>;

    /// Fetch the payload; `Ok(None)` when no record exists (absence is not
    /// an error at this layer — the vault decides what it means).
    async fn get(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>>;

    /// Existence probe that never decrypts and never prompts.
    async fn contains(&self, service: &str, account: &str) -> Result<bool>;

    /// Idempotent delete; `Ok(false)` when nothing was stored.
    async fn delete(&self, service: &str, account: &str) -> Result<bool>;
}
