// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Unified error taxonomy for the Lockbox engine.
//
// Every vault variant and every platform collaborator reports failure through
// exactly one member of this closed set.  Boundary code translates whatever
// shape the underlying platform returns (booleans, optionals, thrown errors)
// into a `StoreError`; nothing is logged-and-swallowed.

use thiserror::Error;

/// Closed failure taxonomy shared by all storage variants.
#[derive(Debug, Error)]
pub enum StoreError {
    // -- Recoverable: the caller decides what absence or a denied
    //    challenge means for its use case --
    /// No record exists for the requested key.
    #[error("no stored value for this key")]
    DataNotFound,

    /// The device cannot evaluate the required biometric policy right now.
    #[error("biometric authentication is not available")]
    BiometricUnavailable,

    /// The user attempted and failed the liveness challenge.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The user chose the alternate credential path instead of biometry.
    #[error("user requested the fallback credential")]
    UserFallbackRequested,

    // -- Fatal for the current call --
    /// Text ⇄ bytes conversion failed; the payload is not valid UTF-8.
    #[error("value is not representable as UTF-8 text")]
    EncodingError,

    /// The hardware boundary refused to create a key pair.
    #[error("hardware key creation failed: {0}")]
    KeyCreationFailed(String),

    /// An existing key pair could not be resolved by label.
    #[error("hardware key retrieval failed: {0}")]
    KeyRetrievalFailed(String),

    /// The asymmetric encryption step failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// The asymmetric decryption step failed (distinct from a missing
    /// record, which is `DataNotFound`).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The protected blob store rejected an insert or update.
    #[error("protected store write failed: {0}")]
    StoreWriteFailed(String),

    /// The protected blob store rejected a delete.
    #[error("protected store delete failed: {0}")]
    StoreDeleteFailed(String),
}

/// Alias used throughout the engine.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether the caller can reasonably retry or substitute a default.
    ///
    /// Recoverable errors are absence and challenge outcomes; everything
    /// else indicates a failed operation that retrying will not fix.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DataNotFound
                | Self::BiometricUnavailable
                | Self::AuthenticationFailed(_)
                | Self::UserFallbackRequested
        )
    }
}
