// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Indirect-handshake relaying: this router acting as Bob, the introducer
//! that lets Alice reach a firewalled Charlie through a previously handed
//! out relay tag. Pure decision logic; the caller owns the `relay_tags`
//! table and performs the actual sends.

use std::net::{IpAddr, SocketAddr};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::constants::MAX_INTRODUCERS;
use crate::packet::{RelayIntro, RelayRequest, RelayResponse};

/// Draw a fresh non-zero relay tag. Tag 0 means "not offering to introduce".
pub fn allocate_relay_tag() -> u32 {
    loop {
        let t = OsRng.next_u32();
        if t != 0 {
            return t;
        }
    }
}

/// Whether this router can still take on one more introducer relationship,
/// given how many relay tags it has already handed out.
pub fn can_offer_another_introduction(current_table_size: usize) -> bool {
    current_table_size < MAX_INTRODUCERS
}

/// What to send once Bob has found Charlie's session for Alice's relay tag.
pub struct RelayForward {
    pub response_to_alice: RelayResponse,
    pub intro_to_charlie: RelayIntro,
}

/// Bob received a RelayRequest from Alice at `alice_observed`, and looked up
/// `charlie_endpoint` for the tag it named. Builds the RelayResponse to
/// return to Alice and the RelayIntro to forward to Charlie.
pub fn on_relay_request(
    req: &RelayRequest,
    alice_observed: SocketAddr,
    charlie_endpoint: SocketAddr,
) -> Option<RelayForward> {
    let charlie_ip = match charlie_endpoint.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => return None,
    };
    let alice_ip = match req.alice_ip {
        Some(ip) => ip,
        None => alice_observed.ip(),
    };
    let alice_port = if req.alice_port != 0 { req.alice_port } else { alice_observed.port() };

    let response_to_alice = RelayResponse {
        charlie_ip,
        charlie_port: charlie_endpoint.port(),
        alice_ip,
        alice_port,
        nonce: req.nonce,
    };
    let alice_ip_v4 = match alice_ip {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => return None,
    };
    let intro_to_charlie =
        RelayIntro { alice_ip: alice_ip_v4, alice_port, challenge: req.challenge.clone() };

    Some(RelayForward { response_to_alice, intro_to_charlie })
}

/// Charlie received a RelayIntro naming Alice's claimed endpoint: the
/// address to send the zero-length HolePunch datagram to.
pub fn hole_punch_target(intro: &RelayIntro) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(intro.alice_ip), intro.alice_port)
}

/// Alice's request to a chosen introducer for the Charlie behind `relay_tag`.
/// Alice IP/port are left unset so the introducer falls back to the observed
/// source address, same as Bob does in [`on_relay_request`].
pub fn build_relay_request(relay_tag: u32, alice_intro_key: [u8; 32], nonce: u32) -> RelayRequest {
    RelayRequest { relay_tag, alice_ip: None, alice_port: 0, challenge: Vec::new(), alice_intro_key, nonce }
}

/// A fresh nonce correlating a RelayRequest to its eventual RelayResponse.
pub fn generate_nonce() -> u32 {
    OsRng.next_u32()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn allocate_relay_tag_never_returns_zero() {
        for _ in 0..1000 {
            assert_ne!(allocate_relay_tag(), 0);
        }
    }

    #[test]
    fn table_at_cap_refuses_another_introduction() {
        assert!(can_offer_another_introduction(MAX_INTRODUCERS - 1));
        assert!(!can_offer_another_introduction(MAX_INTRODUCERS));
    }

    #[test]
    fn relay_request_without_alice_address_falls_back_to_observed_source() {
        let req = RelayRequest {
            relay_tag: 5,
            alice_ip: None,
            alice_port: 0,
            challenge: vec![],
            alice_intro_key: [1u8; 32],
            nonce: 99,
        };
        let observed = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5)), 6000);
        let charlie = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9)), 7000);
        let forward = on_relay_request(&req, observed, charlie).expect("ipv4 endpoints should forward");
        assert_eq!(forward.response_to_alice.alice_ip, observed.ip());
        assert_eq!(forward.response_to_alice.alice_port, observed.port());
        assert_eq!(forward.response_to_alice.charlie_ip, Ipv4Addr::new(198, 51, 100, 9));
        assert_eq!(forward.intro_to_charlie.alice_port, observed.port());
    }

    #[test]
    fn hole_punch_targets_alices_claimed_endpoint() {
        let intro = RelayIntro { alice_ip: Ipv4Addr::new(203, 0, 113, 5), alice_port: 6000, challenge: vec![] };
        assert_eq!(
            hole_punch_target(&intro),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5)), 6000)
        );
    }
}
