// SPDX-License-Identifier: MIT OR Apache-2.0
//
// lockbox-vault — the preference vault engine.
//
// Composes the authenticator gate, hardware key store, and protected blob
// store from `lockbox-platform` into four storage policies behind one
// uniform get/put/has/remove surface.

pub mod codec;
pub mod vault;

pub use codec::SecretCodec;
pub use vault::PreferenceVault;
