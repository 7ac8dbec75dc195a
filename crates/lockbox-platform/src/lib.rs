// SPDX-License-Identifier: MIT OR Apache-2.0
//
// lockbox-platform — collaborator traits and backends for the Lockbox
// secret-storage engine.
//
// The vault engine depends only on the three traits in `traits`; this crate
// also ships a stub platform for targets with no native backend, software
// implementations of the key store and blob store, and a scripted
// authenticator for tests.

pub mod mock;
pub mod software;
pub mod stub;
pub mod traits;

pub use mock::MockAuthenticator;
pub use software::{MemoryBlobStore, SoftwareKeyStore, SqliteBlobStore};
pub use stub::StubPlatform;
pub use traits::{AuthenticatorGate, HardwareKeyStore, ProtectedBlobStore};
