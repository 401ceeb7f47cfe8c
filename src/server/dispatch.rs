// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Datagram routing: find or create the session a packet belongs to,
//! validate its MAC under the right candidate key, and hand the parsed
//! body to that session's executor.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::constants::{IV_LEN, MAC_LEN};
use crate::crypto::envelope;
use crate::crypto::keys::SessionKeys;
use crate::packet::header::Header;
use crate::packet::{self, PayloadType};
use crate::server::{SocketDatagramSink, SsuServer};
use crate::session::executor::{self, SessionEvent};
use crate::session::handshake;
use crate::session::state::SessionState;
use crate::session::{PendingResend, Session};

impl SsuServer {
    /// Entry point for one received UDP datagram.
    pub async fn handle_datagram(self: Arc<Self>, src: SocketAddr, datagram: Vec<u8>) {
        if datagram.is_empty() {
            self.handle_hole_punch(src);
            return;
        }

        if datagram.len() < Header::ENCRYPTED_REGION_OFFSET {
            self.stats.framing_errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&datagram[Header::MAC_OFFSET..Header::MAC_OFFSET + MAC_LEN]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&datagram[Header::IV_OFFSET..Header::IV_OFFSET + IV_LEN]);

        let existing = self.sessions_by_endpoint.get(&src).map(|e| e.value().clone());

        let (decrypted, used_session_keys) = match self.open_envelope(&datagram, &mac, &iv, existing.as_ref()).await {
            Some(v) => v,
            None => {
                self.stats.mac_failures.fetch_add(1, Ordering::Relaxed);
                if let Some(handle) = &existing {
                    let mut session = handle.session.lock().await;
                    if session.note_mac_failure() {
                        warn!(endpoint = %src, "three consecutive MAC failures, tearing session down as suspected attack");
                        session.state = SessionState::Failed;
                        drop(session);
                        self.sessions_by_endpoint.remove(&src);
                        handle.cancel();
                    }
                }
                return;
            },
        };

        if let Some(handle) = &existing {
            if used_session_keys {
                handle.session.lock().await.note_mac_success();
            }
        }

        let (header, header_tail_len) = match Header::parse_decrypted(mac, iv, &decrypted) {
            Ok(v) => v,
            Err(_) => {
                self.stats.framing_errors.fetch_add(1, Ordering::Relaxed);
                return;
            },
        };

        let signature_len =
            existing.as_ref().and_then(|h| cached_signature_len(h)).unwrap_or(64);
        let body = match packet::parse_body(header.payload_type, &decrypted[header_tail_len..], signature_len) {
            Ok(b) => b,
            Err(_) => {
                self.stats.framing_errors.fetch_add(1, Ordering::Relaxed);
                return;
            },
        };

        if matches!(
            header.payload_type,
            PayloadType::PeerTest | PayloadType::RelayRequest | PayloadType::RelayResponse | PayloadType::RelayIntro
        ) {
            self.handle_introducer_packet(src, existing, body).await;
            return;
        }

        match existing {
            Some(handle) => {
                if handle.post(SessionEvent::Inbound(body, header.iv)).is_err() {
                    self.stats.resource_exhausted_drops.fetch_add(1, Ordering::Relaxed);
                }
            },
            None => self.handle_first_contact(src, header.payload_type, body).await,
        }
    }

    fn handle_hole_punch(&self, src: SocketAddr) {
        if let Some(handle) = self.sessions_by_endpoint.get(&src) {
            if handle.post(SessionEvent::HolePunch).is_err() {
                self.stats.resource_exhausted_drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Try the existing session's keys first, falling back to our local
    /// intro key. Returns the decrypted bytes from offset 32 onward and
    /// whether session keys (as opposed to the intro key) were the ones
    /// that validated.
    async fn open_envelope(
        &self,
        datagram: &[u8],
        mac: &[u8; MAC_LEN],
        iv: &[u8; IV_LEN],
        existing: Option<&executor::SessionHandle>,
    ) -> Option<(Vec<u8>, bool)> {
        let mut candidates: Vec<([u8; 32], [u8; 32], bool)> = Vec::new();
        if let Some(handle) = existing {
            let session = handle.session.lock().await;
            if session.keys.is_established() {
                let (aes, mac_key) = session.keys.active_keys();
                candidates.push((*aes, *mac_key, true));
            }
        }
        let local_intro_key = self.router_context.ssu_address().intro_key;
        candidates.push((local_intro_key, local_intro_key, false));

        let encrypted = &datagram[Header::ENCRYPTED_REGION_OFFSET..];
        for (aes_key, mac_key, is_session) in candidates {
            let mut attempt = encrypted.to_vec();
            if envelope::open(&mut attempt, iv, mac, &aes_key, &mac_key).is_ok() {
                return Some((attempt, is_session));
            }
        }
        None
    }

    /// A datagram that validated under our local intro key with no
    /// existing session: introducer-family payloads are routed separately,
    /// so the only payload type expected here is a SessionRequest.
    async fn handle_first_contact(self: Arc<Self>, src: SocketAddr, payload_type: PayloadType, body: packet::Packet) {
        match (payload_type, body) {
            (PayloadType::SessionRequest, packet::Packet::SessionRequest(req)) => {
                self.bootstrap_inbound_session(src, req).await;
            },
            _ => {
                debug!(endpoint = %src, "unexpected first-contact payload type, dropping");
            },
        }
    }

    async fn bootstrap_inbound_session(self: Arc<Self>, src: SocketAddr, req: packet::SessionRequest) {
        use dashmap::mapref::entry::Entry;

        // At most one handshake per endpoint: a retransmitted SessionRequest
        // for an already in-progress handshake must not spawn a second
        // session and orphan the first.
        let slot = match self.sessions_by_endpoint.entry(src) {
            Entry::Occupied(_) => {
                debug!(endpoint = %src, "SessionRequest for an endpoint already mid-handshake, dropping");
                return;
            },
            Entry::Vacant(slot) => slot,
        };

        let dh = self.dh_pool.take();
        let local_identity = self.router_context.local_identity();
        let ssu_address = self.router_context.ssu_address();
        let local_intro_key = ssu_address.intro_key;
        let mut session = Session::new_inbound(src, local_intro_key, dh);
        session.keys = SessionKeys::new(local_intro_key);

        let our_dh = session.dh_keypair.as_ref().expect("freshly constructed inbound session always carries a keypair");
        let relay_tag = 0; // this router does not yet offer an indirect-relay slot on the inbound path
        let mut iv = [0u8; IV_LEN];
        envelope::random_pad(&mut iv);
        let now = now_secs();

        let built = handshake::build_session_created(
            local_identity.as_ref(),
            our_dh,
            &req.dh_x,
            (src.ip(), src.port()),
            (ssu_address.host.ip(), ssu_address.host.port()),
            relay_tag,
            now,
            &iv,
        );
        let (created, derived, signed_tuple) = match built {
            Ok(v) => v,
            Err(e) => {
                warn!(endpoint = %src, error = %e, "failed to build SessionCreated, dropping SessionRequest");
                return;
            },
        };
        session.keys.install(derived);
        session.relay_tag = relay_tag;
        session.session_confirm_data = Some(signed_tuple);

        let mut header = Header::new(PayloadType::SessionCreated, now);
        let mut body = BytesMut::new();
        if let Err(e) = packet::write_body(&packet::Packet::SessionCreated(created), &mut body, 0) {
            warn!(endpoint = %src, error = %e, "failed to serialize SessionCreated");
            return;
        }
        let (aes_key, mac_key) = session.keys.active_keys();
        let datagram = seal_datagram_with_iv(&mut header, body, aes_key, mac_key, &iv);
        self.socket_v4.send_to(&datagram, src).await.ok();
        session.pending_resend = Some(PendingResend { datagram, attempts: 0 });
        session.timers.arm_resend(tokio::time::Instant::now());

        let sink = Arc::new(SocketDatagramSink::new(Arc::clone(&self.socket_v4)));
        let handle = executor::spawn(session, sink, Arc::clone(&self.i2np), Arc::clone(&self.router_context));
        slot.insert(handle);

        debug!(endpoint = %src, dh_x_prefix = ?&req.dh_x[..4], "bootstrapped inbound session, sent SessionCreated");
    }

    /// Alice's entry point: start an outbound handshake to a peer resolved
    /// from the net-database. If the peer publishes a direct endpoint this
    /// sends SessionRequest immediately and returns its handle; if it's only
    /// reachable through an introducer this sends RelayRequest and returns
    /// `None` — the session itself appears once RelayResponse resolves
    /// Charlie's endpoint (see `handle_relay_response`).
    pub async fn connect(self: &Arc<Self>, identity_hash: crate::identity::IdentityHash) -> Option<executor::SessionHandle> {
        let (identity, remote_addr) = self.net_database.lookup(&identity_hash)?;
        match remote_addr.host {
            Some(host) => self.connect_direct(host, remote_addr.intro_key, identity).await,
            None => {
                self.connect_via_introducer(identity, remote_addr).await;
                None
            },
        }
    }

    async fn connect_direct(
        self: &Arc<Self>,
        host: SocketAddr,
        intro_key: [u8; 32],
        identity: crate::identity::SharedIdentity,
    ) -> Option<executor::SessionHandle> {
        use dashmap::mapref::entry::Entry;

        let slot = match self.sessions_by_endpoint.entry(host) {
            Entry::Occupied(e) => return Some(e.get().clone()),
            Entry::Vacant(slot) => slot,
        };

        let dh = self.dh_pool.take();
        let mut session = Session::new_outbound(host, intro_key, dh);
        session.remote_identity = Some(identity);

        let our_dh = session.dh_keypair.as_ref().expect("freshly constructed outbound session always carries a keypair");
        let request = handshake::build_session_request(our_dh);

        let mut header = Header::new(PayloadType::SessionRequest, now_secs());
        let mut body = BytesMut::new();
        if packet::write_body(&packet::Packet::SessionRequest(request), &mut body, 0).is_err() {
            return None;
        }
        let (aes_key, mac_key) = session.keys.active_keys();
        let datagram = seal_datagram(&mut header, body, aes_key, mac_key);
        self.socket_v4.send_to(&datagram, host).await.ok();
        session.pending_resend = Some(PendingResend { datagram, attempts: 0 });
        session.timers.arm_resend(tokio::time::Instant::now());

        let sink = Arc::new(SocketDatagramSink::new(Arc::clone(&self.socket_v4)));
        let handle = executor::spawn(session, sink, Arc::clone(&self.i2np), Arc::clone(&self.router_context));
        slot.insert(handle.clone());
        Some(handle)
    }

    /// Alice addressing a firewalled peer indirectly: pick the first
    /// introducer the net-database offered and send it RelayRequest for the
    /// relay tag it holds for this peer.
    async fn connect_via_introducer(
        self: &Arc<Self>,
        identity: crate::identity::SharedIdentity,
        remote_addr: crate::context::RemoteSsuAddress,
    ) {
        use crate::introducer::relay;
        use crate::server::PendingRelay;

        let Some(introducer) = remote_addr.introducers.first() else {
            debug!("peer has no direct endpoint and no introducers, cannot connect");
            return;
        };

        let local_intro_key = self.router_context.ssu_address().intro_key;
        let nonce = relay::generate_nonce();
        let req = relay::build_relay_request(introducer.tag, local_intro_key, nonce);

        let mut header = Header::new(PayloadType::RelayRequest, now_secs());
        let mut body = BytesMut::new();
        if let Err(e) = packet::write_body(&packet::Packet::RelayRequest(req), &mut body, 0) {
            warn!(error = %e, "failed to serialize RelayRequest");
            return;
        }
        let datagram = seal_datagram(&mut header, body, &introducer.intro_key, &introducer.intro_key);
        self.socket_v4.send_to(&datagram, introducer.host).await.ok();

        self.pending_relays.insert(nonce, PendingRelay { identity, charlie_intro_key: remote_addr.intro_key });
    }
}

fn now_secs() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Reads the signature length off an established session's cached remote
/// identity; `None` until the identity is known, since signature length is
/// identity-scheme-dependent. A `try_lock` failure (the executor is mid-tick)
/// falls back to the caller's 64-byte default rather than blocking dispatch.
fn cached_signature_len(handle: &executor::SessionHandle) -> Option<usize> {
    handle.session.try_lock().ok()?.remote_identity.as_ref().map(|id| id.signature_len())
}

/// Build a fully sealed outbound datagram. The encrypted region starts at
/// offset 32 and covers flag/time/[rekey]/[extopts] together with the
/// payload body — `Header::write_tail` followed by `body`, padded to a
/// 16-byte boundary with random bytes, then encrypted and MAC'd as one
/// buffer. Only the MAC and IV precede it in cleartext, matching what
/// `open_envelope`/`Header::parse_decrypted` expect on receive.
pub fn seal_datagram(header: &mut Header, body: BytesMut, aes_key: &[u8; 32], mac_key: &[u8; 32]) -> Bytes {
    let mut plaintext = BytesMut::new();
    header.write_tail(&mut plaintext);
    plaintext.extend_from_slice(&body);

    let original_len = plaintext.len();
    let padded = envelope::padded_len(original_len);
    plaintext.resize(padded, 0);
    if padded > original_len {
        envelope::random_pad(&mut plaintext[original_len..]);
    }
    let (mac, iv) = envelope::seal(&mut plaintext, aes_key, mac_key);
    header.mac = mac;
    header.iv = iv;

    let mut out = BytesMut::with_capacity(Header::ENCRYPTED_REGION_OFFSET + plaintext.len());
    out.extend_from_slice(&header.mac);
    out.extend_from_slice(&header.iv);
    out.extend_from_slice(&plaintext);
    out.freeze()
}

/// Variant of [`seal_datagram`] for SessionCreated: the embedded signature
/// is pre-encrypted under the same IV the outer envelope will use, so the
/// caller picks the IV up front instead of letting the envelope pick one.
pub fn seal_datagram_with_iv(
    header: &mut Header,
    body: BytesMut,
    aes_key: &[u8; 32],
    mac_key: &[u8; 32],
    iv: &[u8; IV_LEN],
) -> Bytes {
    let mut plaintext = BytesMut::new();
    header.write_tail(&mut plaintext);
    plaintext.extend_from_slice(&body);

    let original_len = plaintext.len();
    let padded = envelope::padded_len(original_len);
    plaintext.resize(padded, 0);
    if padded > original_len {
        envelope::random_pad(&mut plaintext[original_len..]);
    }
    let mac = envelope::seal_with_iv(&mut plaintext, aes_key, mac_key, iv);
    header.mac = mac;
    header.iv = *iv;

    let mut out = BytesMut::with_capacity(Header::ENCRYPTED_REGION_OFFSET + plaintext.len());
    out.extend_from_slice(&header.mac);
    out.extend_from_slice(&header.iv);
    out.extend_from_slice(&plaintext);
    out.freeze()
}
