// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wires the pure [`crate::introducer`] decision functions into the
//! demultiplexer: looks up and updates the `peer_tests`/`relay_tags`
//! tables, resolves a Charlie candidate from the net-database, and sends
//! the resulting datagrams.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use crate::introducer::{peer_test, relay};
use crate::packet::header::{Header, PayloadType};
use crate::packet::{self, Packet};
use crate::server::dispatch::seal_datagram;
use crate::server::{NonceRole, PeerTestState, SocketDatagramSink, SsuServer};
use crate::session::executor::{self, SessionHandle};
use crate::session::state::SessionState;
use crate::session::Session;

fn now_secs() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}

impl SsuServer {
    /// Route one of the four introducer-family payload types. `existing` is
    /// the sender's established session, if any — PeerTest from a genuine
    /// Alice and RelayIntro from Bob always arrive over one; PeerTest from
    /// Charlie and RelayRequest from Alice never do.
    pub(crate) async fn handle_introducer_packet(
        self: &Arc<Self>,
        src: SocketAddr,
        existing: Option<SessionHandle>,
        body: Packet,
    ) {
        match body {
            Packet::PeerTest(pt) => self.handle_peer_test(src, existing, pt).await,
            Packet::RelayRequest(req) => self.handle_relay_request(src, req).await,
            Packet::RelayIntro(intro) => self.handle_relay_intro(existing, intro).await,
            Packet::RelayResponse(resp) => self.handle_relay_response(resp).await,
            _ => unreachable!("handle_introducer_packet only called for introducer payload types"),
        }
    }

    async fn handle_peer_test(&self, src: SocketAddr, existing: Option<SessionHandle>, pt: packet::PeerTest) {
        let now = tokio::time::Instant::now();

        if let Some(role) = self.peer_tests.get(&pt.nonce).map(|e| e.value().role) {
            match peer_test::alice_on_reply(role, &pt, role == NonceRole::Alice1) {
                peer_test::AliceOutcome::ForwardToCharlie { to, packet: forward } => {
                    self.peer_tests
                        .insert(pt.nonce, PeerTestState { role: NonceRole::Alice2, partner_session: Some(to), created_at: now });
                    self.send_with_local_intro_key(to, PayloadType::PeerTest, Packet::PeerTest(forward)).await;
                },
                peer_test::AliceOutcome::Confirmed => {
                    self.peer_tests.remove(&pt.nonce);
                    debug!(nonce = pt.nonce, "peer test closed the loop, router is reachable");
                },
                peer_test::AliceOutcome::NoChange => {},
            }
            return;
        }

        let Some(handle) = existing else {
            debug!(endpoint = %src, nonce = pt.nonce, "PeerTest for unknown nonce with no established session, dropping");
            return;
        };

        if pt.ip.is_none() {
            let Some(charlie_hash) = self.net_database.random_established_peer() else {
                debug!("no established peer available to act as Charlie, dropping PeerTest");
                return;
            };
            let Some((_, charlie_addr)) = self.net_database.lookup(&charlie_hash) else {
                return;
            };
            let Some(charlie_host) = charlie_addr.host else {
                return;
            };
            let Some(charlie_handle) = self.sessions_by_endpoint.get(&charlie_host).map(|e| e.value().clone()) else {
                debug!(%charlie_host, "chosen Charlie has no live session, dropping PeerTest");
                return;
            };

            let forward = peer_test::on_peer_test_as_bob(handle.remote_endpoint, &pt, now);
            self.peer_tests.insert(pt.nonce, forward.state);
            self.send_over_session(&charlie_handle, PayloadType::PeerTest, Packet::PeerTest(forward.to_charlie)).await;
            self.send_over_session(&handle, PayloadType::PeerTest, Packet::PeerTest(forward.echo_to_alice)).await;
        } else {
            let local_intro_key = self.router_context.ssu_address().intro_key;
            let Some(forward) = peer_test::on_peer_test_as_charlie(handle.remote_endpoint, local_intro_key, &pt, now)
            else {
                debug!(endpoint = %src, "PeerTest from Bob missing Alice's endpoint, dropping");
                return;
            };
            self.peer_tests.insert(pt.nonce, forward.state);
            self.send_over_session(&handle, PayloadType::PeerTest, Packet::PeerTest(forward.echo_to_bob)).await;
            self.send_with_local_intro_key(
                forward.alice_endpoint,
                PayloadType::PeerTest,
                Packet::PeerTest(forward.to_alice),
            )
            .await;
        }
    }

    async fn handle_relay_request(&self, src: SocketAddr, req: packet::RelayRequest) {
        let Some(charlie_handle) = self.relay_tags.get(&req.relay_tag).map(|e| e.value().clone()) else {
            debug!(endpoint = %src, relay_tag = req.relay_tag, "RelayRequest for unknown relay tag, dropping");
            return;
        };

        let Some(forward) = relay::on_relay_request(&req, src, charlie_handle.remote_endpoint) else {
            debug!(endpoint = %src, "RelayRequest names an IPv6 endpoint we cannot relay, dropping");
            return;
        };

        self.send_with_local_intro_key(src, PayloadType::RelayResponse, Packet::RelayResponse(forward.response_to_alice))
            .await;
        self.send_over_session(&charlie_handle, PayloadType::RelayIntro, Packet::RelayIntro(forward.intro_to_charlie))
            .await;
    }

    /// Alice's side of the introducer path: the introducer resolved
    /// Charlie's endpoint for the RelayRequest we sent. Spawn Charlie's
    /// session in `Introduced`; the direct SessionRequest is deferred until
    /// the HolePunch (or any other packet) arrives from Charlie.
    async fn handle_relay_response(self: &Arc<Self>, resp: packet::RelayResponse) {
        let Some((_, pending)) = self.pending_relays.remove(&resp.nonce) else {
            debug!(nonce = resp.nonce, "RelayResponse for unknown nonce, dropping");
            return;
        };
        let charlie = SocketAddr::new(IpAddr::V4(resp.charlie_ip), resp.charlie_port);

        match self.sessions_by_endpoint.entry(charlie) {
            Entry::Occupied(_) => {
                debug!(%charlie, "RelayResponse for an endpoint we already have a session with, dropping");
            },
            Entry::Vacant(slot) => {
                let dh = self.dh_pool.take();
                let mut session = Session::new_outbound(charlie, pending.charlie_intro_key, dh);
                session.remote_identity = Some(pending.identity);
                session.state = SessionState::Introduced;

                let sink = Arc::new(SocketDatagramSink::new(Arc::clone(&self.socket_v4)));
                let handle = executor::spawn(session, sink, Arc::clone(&self.i2np), Arc::clone(&self.router_context));
                slot.insert(handle);
                debug!(%charlie, nonce = resp.nonce, "introducer resolved Charlie's endpoint, session now Introduced");
            },
        }
    }

    async fn handle_relay_intro(&self, existing: Option<SessionHandle>, intro: packet::RelayIntro) {
        if existing.is_none() {
            warn!("RelayIntro arrived without an established session to the forwarding introducer, dropping");
            return;
        }
        let target = relay::hole_punch_target(&intro);
        self.socket_v4_send_empty(target).await;
    }

    async fn socket_v4_send_empty(&self, to: SocketAddr) {
        if let Err(e) = self.socket_v4.send_to(&[], to).await {
            warn!(%to, "hole punch send failed: {e}");
        }
    }

    /// Seal and send under an established session's own keys.
    async fn send_over_session(&self, handle: &SessionHandle, payload_type: PayloadType, packet: Packet) {
        let (aes_key, mac_key) = {
            let session = handle.session.lock().await;
            if !session.keys.is_established() {
                warn!(endpoint = %handle.remote_endpoint, "attempted to send introducer packet over a non-established session");
                return;
            }
            let (aes, mac) = session.keys.active_keys();
            (*aes, *mac)
        };
        self.seal_and_send(handle.remote_endpoint, payload_type, packet, &aes_key, &mac_key).await;
    }

    /// Seal and send under our own published intro key, for peers we have
    /// no session with yet.
    async fn send_with_local_intro_key(&self, to: SocketAddr, payload_type: PayloadType, packet: Packet) {
        let key = self.router_context.ssu_address().intro_key;
        self.seal_and_send(to, payload_type, packet, &key, &key).await;
    }

    async fn seal_and_send(
        &self,
        to: SocketAddr,
        payload_type: PayloadType,
        packet: Packet,
        aes_key: &[u8; 32],
        mac_key: &[u8; 32],
    ) {
        let mut header = Header::new(payload_type, now_secs());
        let mut body = BytesMut::new();
        if let Err(e) = crate::packet::write_body(&packet, &mut body, 0) {
            warn!("failed to serialize outbound {payload_type:?}: {e}");
            return;
        }
        let datagram = seal_datagram(&mut header, body, aes_key, mac_key);
        if let Err(e) = self.socket_v4.send_to(&datagram, to).await {
            warn!(%to, "send failed: {e}");
        }
    }
}
