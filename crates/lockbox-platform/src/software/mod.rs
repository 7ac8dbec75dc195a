// SPDX-License-Identifier: MIT OR Apache-2.0
//
// In-process software implementations of the platform collaborators, for
// targets without native secure hardware and for deterministic tests.

pub mod blob_store;
pub mod key_store;

pub use blob_store::{MemoryBlobStore, SqliteBlobStore};
pub use key_store::SoftwareKeyStore;
