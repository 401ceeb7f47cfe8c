// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Router identity: an opaque, already-parsed structure. The SSU
//! core never constructs or destructures an identity's signing-key bytes; it
//! only hashes, verifies, and compares them.

use std::fmt;
use std::sync::Arc;

/// 32-byte SHA-256 identity hash used to key router identities.
pub type IdentityHash = [u8; 32];

/// A parsed I2P router identity.
///
/// Ownership is always by `Arc`: the same identity may be cached by the
/// net-database and held concurrently by several sessions.
pub trait RouterIdentity: fmt::Debug + Send + Sync {
    /// SHA-256 of the identity's certificate+keys blob.
    fn hash(&self) -> IdentityHash;

    /// Length in bytes of signatures produced by this identity's signing
    /// scheme (32-128 depending on scheme).
    fn signature_len(&self) -> usize;

    /// Verify `sig` over `data` using this identity's public signing key.
    fn verify(&self, data: &[u8], sig: &[u8]) -> bool;

    /// Encode this identity the way it is carried inside SessionConfirmed.
    fn to_bytes(&self) -> Vec<u8>;
}

pub type SharedIdentity = Arc<dyn RouterIdentity>;

/// Our own identity plus the private half needed to sign handshake tuples.
/// Implemented by the enclosing router; the SSU core never generates or
/// stores a private signing key itself.
pub trait LocalIdentity: Send + Sync {
    fn identity(&self) -> SharedIdentity;

    /// Sign `data` with our private signing key.
    fn sign(&self, data: &[u8]) -> Vec<u8>;
}
