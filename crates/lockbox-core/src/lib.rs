// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Lockbox — core types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::VaultConfig;
pub use error::{Result, StoreError};
pub use types::*;
