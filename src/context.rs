// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! External collaborators: the DH key-pair source, the router context, and
//! the net-database lookup. All three are provided by the enclosing
//! router; the SSU core only calls into them.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::crypto::dh::DhKeyPair;
use crate::identity::{IdentityHash, LocalIdentity, SharedIdentity};

/// Our own published SSU address record.
#[derive(Debug, Clone)]
pub struct SsuAddress {
    pub host: SocketAddr,
    pub intro_key: [u8; 32],
}

/// A remote router's SSU address record, as looked up from the net-database.
#[derive(Debug, Clone)]
pub struct RemoteSsuAddress {
    pub host: Option<SocketAddr>,
    pub intro_key: [u8; 32],
    /// Relay tags this router's introducers have handed out for this peer,
    /// used to address an indirect SessionRequest.
    pub introducers: Vec<IntroducerRef>,
}

#[derive(Debug, Clone)]
pub struct IntroducerRef {
    pub host: SocketAddr,
    pub intro_key: [u8; 32],
    pub tag: u32,
}

/// A precomputing pool of fresh Diffie-Hellman ephemeral pairs.
/// The SSU core never generates DH pairs itself.
pub trait DhPool: Send + Sync {
    fn take(&self) -> DhKeyPair;
}

/// Read-only accessors plus the one write sink the router context exposes
/// to the SSU core.
pub trait RouterContext: Send + Sync {
    fn local_identity(&self) -> Arc<dyn LocalIdentity>;

    fn ssu_address(&self) -> SsuAddress;

    fn dh_pool(&self) -> Arc<dyn DhPool>;

    /// Records our externally observed endpoint for republication. Invoked
    /// with a single atomic write from the session handling SessionCreated.
    fn update_external_address(&self, observed: SocketAddr);

    /// Decode the identity block carried in a SessionConfirmed. `None` on a
    /// malformed block; the caller fails the handshake.
    fn decode_identity(&self, bytes: &[u8]) -> Option<SharedIdentity>;
}

/// Read-only net-database lookup by router hash.
pub trait NetDatabase: Send + Sync {
    fn lookup(&self, hash: &IdentityHash) -> Option<(SharedIdentity, RemoteSsuAddress)>;

    /// Select a random router with an established SSU session, used by Bob
    /// when choosing a Charlie for a peer test.
    fn random_established_peer(&self) -> Option<IdentityHash>;
}
