// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Test doubles for the external collaborators `SsuServer` expects a real
//! router to supply: identity, DH pool, net-database, and I2NP sink.
//! Signing here is a symmetric XOR scheme, not real asymmetric crypto — fine
//! for these tests since nothing here cares about key secrecy, only that
//! sign/verify agree.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ssu_core::context::{DhPool, NetDatabase, RemoteSsuAddress, RouterContext, SsuAddress};
use ssu_core::crypto::dh::DhKeyPair;
use ssu_core::identity::{IdentityHash, LocalIdentity, RouterIdentity, SharedIdentity};
use ssu_core::sink::I2npSink;

#[derive(Debug)]
pub struct XorIdentity {
    pub hash: IdentityHash,
}

impl RouterIdentity for XorIdentity {
    fn hash(&self) -> IdentityHash {
        self.hash
    }

    fn signature_len(&self) -> usize {
        64
    }

    fn verify(&self, data: &[u8], sig: &[u8]) -> bool {
        sig == xor_sign(&self.hash, data)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.hash.to_vec()
    }
}

pub struct XorLocalIdentity {
    pub identity: SharedIdentity,
}

impl LocalIdentity for XorLocalIdentity {
    fn identity(&self) -> SharedIdentity {
        self.identity.clone()
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        xor_sign(&self.identity.hash(), data)
    }
}

fn xor_sign(key: &IdentityHash, data: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 64];
    for (i, b) in data.iter().enumerate() {
        out[i % 64] ^= b ^ key[i % 32];
    }
    out
}

pub struct TestDhPool;

impl DhPool for TestDhPool {
    fn take(&self) -> DhKeyPair {
        DhKeyPair::generate()
    }
}

/// Knows about exactly one remote peer, by construction — enough for a
/// two-node handshake test.
pub struct SinglePeerNetDatabase {
    pub peer_hash: IdentityHash,
    pub peer_identity: SharedIdentity,
    pub peer_address: RemoteSsuAddress,
}

impl NetDatabase for SinglePeerNetDatabase {
    fn lookup(&self, hash: &IdentityHash) -> Option<(SharedIdentity, RemoteSsuAddress)> {
        if *hash == self.peer_hash {
            Some((self.peer_identity.clone(), self.peer_address.clone()))
        } else {
            None
        }
    }

    fn random_established_peer(&self) -> Option<IdentityHash> {
        None
    }
}

pub struct TestRouterContext {
    pub local_identity: Arc<dyn LocalIdentity>,
    pub ssu_address: SsuAddress,
    pub dh_pool: Arc<dyn DhPool>,
}

impl RouterContext for TestRouterContext {
    fn local_identity(&self) -> Arc<dyn LocalIdentity> {
        Arc::clone(&self.local_identity)
    }

    fn ssu_address(&self) -> SsuAddress {
        self.ssu_address.clone()
    }

    fn dh_pool(&self) -> Arc<dyn DhPool> {
        Arc::clone(&self.dh_pool)
    }

    fn update_external_address(&self, _observed: SocketAddr) {}

    fn decode_identity(&self, bytes: &[u8]) -> Option<SharedIdentity> {
        let hash: IdentityHash = bytes.try_into().ok()?;
        Some(Arc::new(XorIdentity { hash }))
    }
}

pub struct NullI2npSink;

#[async_trait]
impl I2npSink for NullI2npSink {
    async fn deliver_i2np(&self, _msg: Vec<u8>, _from: SharedIdentity) -> bool {
        true
    }
}
