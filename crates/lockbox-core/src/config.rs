// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Vault configuration.

use serde::{Deserialize, Serialize};

use crate::types::StorageVariant;

/// Construction-time configuration of one vault instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Namespace that scopes every record and key label of this vault.
    pub service: String,
    /// Storage policy; immutable for the lifetime of the vault.
    pub variant: StorageVariant,
    /// Reason string shown by the platform during a liveness challenge.
    pub auth_reason: String,
}

impl VaultConfig {
    /// Configuration with the default challenge reason.
    pub fn new(service: impl Into<String>, variant: StorageVariant) -> Self {
        Self {
            service: service.into(),
            variant,
            auth_reason: "Authenticate to access your secure data.".to_owned(),
        }
    }

    /// Override the reason string shown during the challenge.
    pub fn with_auth_reason(mut self, reason: impl Into<String>) -> Self {
        self.auth_reason = reason.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_round_trip() {
        let config = VaultConfig::new("svc.example", StorageVariant::HardwareKey)
            .with_auth_reason("Unlock the token cache");

        let json = serde_json::to_string(&config).expect("serialize config");
        let back: VaultConfig = serde_json::from_str(&json).expect("deserialize config");

        assert_eq!(back.service, "svc.example");
        assert_eq!(back.variant, StorageVariant::HardwareKey);
        assert_eq!(back.auth_reason, "Unlock the token cache");
    }
}
