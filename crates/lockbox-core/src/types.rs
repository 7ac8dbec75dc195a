// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Core domain types for the Lockbox secret-storage engine.

use serde::{Deserialize, Serialize};

/// The four storage policies a vault can be constructed with.
///
/// Fixed at construction and never changed afterwards — the variant decides
/// which combination of biometric gating and asymmetric encryption applies
/// to every operation on that vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageVariant {
    /// Protected blob store only; no gate, no encryption.
    Plain,
    /// Protected blob store with a biometric gate on both put and get.
    Biometric,
    /// Hardware-key-encrypted payloads; no interactive gate.
    HardwareKey,
    /// Hardware-key-encrypted payloads behind a biometric gate.
    BiometricHardwareKey,
}

impl StorageVariant {
    /// Variants whose payloads are ciphertext under a hardware-bound key.
    pub fn is_key_backed(&self) -> bool {
        matches!(self, Self::HardwareKey | Self::BiometricHardwareKey)
    }

    /// Variants that require a liveness challenge before reading.
    pub fn requires_gate(&self) -> bool {
        matches!(self, Self::Biometric | Self::BiometricHardwareKey)
    }

    /// Whether `get` on a never-written key yields the caller's default.
    ///
    /// Key-backed variants treat "never created" as a legitimate empty
    /// state; blob-gated variants treat it as `DataNotFound`.  The split is
    /// deliberate and callers rely on it.
    pub fn absent_yields_default(&self) -> bool {
        self.is_key_backed()
    }

    /// Access-control policy attached to records or keys created under
    /// this variant.
    pub fn access_policy(&self) -> AccessPolicy {
        match self {
            Self::Plain | Self::HardwareKey => AccessPolicy::None,
            Self::Biometric => AccessPolicy::Presence,
            Self::BiometricHardwareKey => AccessPolicy::BiometryCurrentSet,
        }
    }
}

impl std::fmt::Display for StorageVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Plain => "plain",
            Self::Biometric => "biometric",
            Self::HardwareKey => "hardware-key",
            Self::BiometricHardwareKey => "biometric-hardware-key",
        };
        f.write_str(name)
    }
}

/// Access-control rule attached to a hardware key or a protected record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessPolicy {
    /// Usable whenever the store itself is unlocked.
    None,
    /// Requires user presence (any enrolled credential).
    Presence,
    /// Requires the currently enrolled biometric set; invalidated if the
    /// enrollment changes.
    BiometryCurrentSet,
    /// Biometry preferred, device passcode accepted as fallback.
    BiometryWithFallback,
}

impl AccessPolicy {
    /// Whether using material under this policy needs an interactive
    /// challenge first.
    pub fn requires_challenge(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Which liveness policy the authenticator should evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthPolicy {
    /// Biometrics only — no passcode fallback offered.
    Biometrics,
    /// Any device-owner credential: biometrics with passcode fallback.
    DeviceOwner,
}

/// The single outcome of one authenticator challenge.
///
/// The gate yields exactly one of these per evaluation; the engine never
/// retries on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The user passed the challenge.
    Success,
    /// The user chose the alternate credential path.
    UserFallbackRequested,
    /// The user attempted and failed, with platform detail.
    Failed(String),
    /// The policy cannot be evaluated right now.
    Unavailable,
}

/// Reference to a hardware-bound asymmetric key pair.
///
/// The private half never leaves the hardware boundary; the reference
/// carries only the label it was created under, its access policy, and the
/// derivable public half.  At most one live key pair exists per label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairRef {
    /// Caller-supplied unique name for the key pair.
    pub label: String,
    /// Policy the key was created with; decrypt honors it.
    pub policy: AccessPolicy,
    /// SEC1-encoded public key, usable for encryption without gating.
    pub public_key: Vec<u8>,
}

impl KeyPairRef {
    pub fn new(label: impl Into<String>, policy: AccessPolicy, public_key: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            policy,
            public_key,
        }
    }
}
