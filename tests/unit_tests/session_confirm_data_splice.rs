// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Drives the handshake all the way through SessionConfirmed, the leg
//! `session::handshake`'s own unit tests stop short of since the final
//! identity-specific verify happens at the executor call site.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use ssu_core::crypto::dh::DhKeyPair;
use ssu_core::identity::{IdentityHash, LocalIdentity, RouterIdentity, SharedIdentity};
use ssu_core::session::handshake;

#[derive(Debug)]
struct XorIdentity {
    hash: IdentityHash,
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

struct XorLocal {
    identity: SharedIdentity,
}

impl LocalIdentity for XorLocal {
    fn identity(&self) -> SharedIdentity {
        self.identity.clone()
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        xor_sign(&self.identity.hash(), data)
    }
}

fn xor_sign(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 64];
    for (i, b) in data.iter().enumerate() {
        out[i % 64] ^= b ^ key[i % 32];
    }
    out
}

#[test]
fn full_handshake_round_trip_verifies_on_both_sides() {
    let alice_dh = DhKeyPair::generate();
    let bob_dh = DhKeyPair::generate();

    let bob_identity: SharedIdentity = Arc::new(XorIdentity { hash: [7u8; 32] });
    let bob_local = XorLocal { identity: bob_identity.clone() };
    let alice_identity: SharedIdentity = Arc::new(XorIdentity { hash: [9u8; 32] });
    let alice_local = XorLocal { identity: alice_identity.clone() };

    let alice_addr = (IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5)), 4000u16);
    let bob_addr = (IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9)), 5000u16);
    let iv = [0x5Au8; 16];

    let (created, bob_derived, mut signed_tuple) = handshake::build_session_created(
        &bob_local,
        &bob_dh,
        &alice_dh.public,
        alice_addr,
        bob_addr,
        0,
        1_000_000,
        &iv,
    )
    .expect("bob builds SessionCreated");

    let alice_derived = handshake::verify_session_created(
        &alice_dh,
        &bob_identity,
        &created,
        alice_addr,
        bob_addr,
        &iv,
        1_000_000,
    )
    .expect("alice verifies SessionCreated");
    assert_eq!(alice_derived, bob_derived);

    // Alice splices her own signed_on_time into her copy before signing;
    // Bob's stored `signed_tuple` still carries his original one until he
    // performs the matching splice on his side.
    let alice_signed_on_time = 1_000_050u32;
    let tuple_len = signed_tuple.len();
    let mut alice_tuple = signed_tuple.clone();
    alice_tuple[tuple_len - 4..].copy_from_slice(&alice_signed_on_time.to_be_bytes());
    let confirmed = handshake::build_session_confirmed(&alice_local, &alice_tuple, alice_signed_on_time);

    handshake::verify_session_confirmed(&mut signed_tuple, &confirmed).expect("time splice succeeds");
    assert_eq!(signed_tuple, alice_tuple, "bob's splice should reproduce exactly what alice signed");
    assert!(
        alice_identity.verify(&signed_tuple, &confirmed.signature),
        "bob should accept alice's signature over the spliced tuple"
    );
}
