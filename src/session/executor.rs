// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The single-threaded cooperative event loop driving one session: one
//! inbound packet, one timer tick, or one outbound I2NP message processed
//! at a time, never two concurrently.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants::{
    DATA_SINGLE_FRAGMENT_OVERHEAD, HEADER_MIN_LEN, IV_LEN, MAX_HANDSHAKE_RESENDS, MAX_PADDING_OVERHEAD,
    PACKET_MAX_IPV4, PACKET_MAX_IPV6,
};
use crate::context::RouterContext;
use crate::crypto::envelope;
use crate::error::SsuError;
use crate::fragment::{self, Ingest};
use crate::identity::SharedIdentity;
use crate::packet::header::Header;
use crate::packet::{self, Packet, PayloadType};
use crate::server::dispatch::seal_datagram;
use crate::session::handshake;
use crate::session::state::SessionState;
use crate::session::{PendingResend, Session};
use crate::sink::I2npSink;

fn now_secs() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}

/// Outbound datagram hand-off to the demultiplexer's socket.
pub trait DatagramSink: Send + Sync {
    fn send_datagram(&self, to: SocketAddr, bytes: Bytes);
}

/// One event fed into a session's executor.
pub enum SessionEvent {
    /// A parsed body plus the envelope IV it arrived under; the IV is only
    /// consulted by SessionCreated's embedded-signature decryption.
    Inbound(Packet, [u8; IV_LEN]),
    /// Zero-length datagram: Charlie's HolePunch while `Introduced`.
    HolePunch,
    /// An upstream I2NP message queued for fragmentation and send.
    Outbound(Vec<u8>),
}

/// A handle other components use to post events into a session without
/// touching its internals. Cross-executor access goes through this queue.
#[derive(Clone)]
pub struct SessionHandle {
    pub remote_endpoint: SocketAddr,
    /// Shared with the executor task. The dispatch path takes this lock
    /// only briefly, for key selection and state checks; the executor
    /// holds it for the body of each event it processes.
    pub session: Arc<Mutex<Session>>,
    inbox: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Non-blocking post; on a full inbox the caller should drop the
    /// packet and bump a counter rather than tear the session down.
    pub fn post(&self, event: SessionEvent) -> Result<(), SsuError> {
        self.inbox.try_send(event).map_err(|_| SsuError::ResourceExhausted("session inbox full"))
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Spawns the executor task for `session` and returns a handle to post
/// events to it.
pub fn spawn(
    session: Session,
    sink: Arc<dyn DatagramSink>,
    i2np: Arc<dyn I2npSink>,
    router_context: Arc<dyn RouterContext>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(128);
    let cancel = CancellationToken::new();
    let remote_endpoint = session.remote_endpoint;
    let shared = Arc::new(Mutex::new(session));
    let handle = SessionHandle { remote_endpoint, session: Arc::clone(&shared), inbox: tx, cancel: cancel.clone() };

    tokio::spawn(run(shared, rx, sink, i2np, router_context, cancel));

    handle
}

async fn run(
    session: Arc<Mutex<Session>>,
    mut inbox: mpsc::Receiver<SessionEvent>,
    sink: Arc<dyn DatagramSink>,
    i2np: Arc<dyn I2npSink>,
    router_context: Arc<dyn RouterContext>,
    cancel: CancellationToken,
) {
    loop {
        let deadline = { session.lock().await.timers.next_deadline() };

        tokio::select! {
            _ = cancel.cancelled() => {
                let endpoint = session.lock().await.remote_endpoint;
                debug!(%endpoint, "session executor cancelled");
                return;
            }
            _ = sleep_until(deadline) => {
                if !handle_timer_tick(&session, &sink).await {
                    return;
                }
            }
            event = inbox.recv() => {
                match event {
                    Some(ev) => handle_event(&session, ev, &i2np, &router_context, &sink).await,
                    None => return,
                }
            }
        }
    }
}

/// Returns `false` when the session has moved to `Failed`/`Closed` and the
/// loop should exit.
async fn handle_timer_tick(session: &Arc<Mutex<Session>>, sink: &Arc<dyn DatagramSink>) -> bool {
    let mut s = session.lock().await;
    let now = tokio::time::Instant::now();

    if s.state != SessionState::Established && s.timers.connect_expired(now) {
        warn!(endpoint = %s.remote_endpoint, "connect timer expired");
        s.state = SessionState::Failed;
        s.pending_resend = None;
        return false;
    }

    if s.timers.resend_due(now) {
        let remote_endpoint = s.remote_endpoint;
        if let Some(resend) = &mut s.pending_resend {
            if resend.attempts >= MAX_HANDSHAKE_RESENDS {
                warn!(endpoint = %remote_endpoint, "handshake resend cap reached, failing session");
                s.state = SessionState::Failed;
                s.pending_resend = None;
                return false;
            }
            resend.attempts += 1;
            let attempt = resend.attempts;
            sink.send_datagram(remote_endpoint, resend.datagram.clone());
            s.timers.arm_resend(now);
            debug!(endpoint = %s.remote_endpoint, attempt, "resent handshake datagram");
        } else {
            s.timers.clear_resend();
        }
    }

    if s.timers.termination_expired(now) {
        debug!(endpoint = %s.remote_endpoint, "termination timer expired, closing session");
        if s.state == SessionState::Established {
            // Best-effort SessionDestroyed; sealing happens at the
            // demultiplexer layer, which owns the session-key material
            // needed to frame it.
            sink.send_datagram(s.remote_endpoint, Bytes::new());
        }
        s.state = SessionState::Closed;
        return false;
    }

    s.reassembler.expire_stale();
    true
}

async fn handle_event(
    session: &Arc<Mutex<Session>>,
    event: SessionEvent,
    i2np: &Arc<dyn I2npSink>,
    router_context: &Arc<dyn RouterContext>,
    sink: &Arc<dyn DatagramSink>,
) {
    let mut s = session.lock().await;
    s.timers.on_packet_received(tokio::time::Instant::now());

    match event {
        SessionEvent::Inbound(Packet::Data(data), _) => {
            for frag in data.fragments {
                s.ack_scheduler.note_fragment_received();
                let msg_id = frag.msg_id;
                if let Ingest::Complete(payload) = s.reassembler.ingest(frag) {
                    s.ack_scheduler.note_completed(msg_id);
                    deliver(&mut s, i2np, payload).await;
                }
            }
        },
        SessionEvent::Inbound(Packet::SessionCreated(created), iv) => {
            handle_session_created(&mut s, router_context, created, iv);
        },
        SessionEvent::Inbound(Packet::SessionConfirmed(confirmed), _) => {
            handle_session_confirmed(&mut s, router_context, confirmed);
        },
        SessionEvent::Inbound(_, _) => {
            // SessionRequest post-bootstrap, SessionDestroyed, and the
            // introducer-family payloads never reach the executor: the
            // demultiplexer either bootstraps a new session or routes them
            // to `introducer_dispatch` before a SessionEvent is posted.
        },
        SessionEvent::HolePunch => {
            if s.state == SessionState::Introduced {
                s.state = SessionState::Unknown;
                send_initial_session_request(&mut s, sink);
            }
        },
        SessionEvent::Outbound(msg) => {
            send_outbound_message(&mut s, sink, &msg);
        },
    }
}

/// Streaming MTU minus the common header and one fragment's own framing
/// overhead, with headroom for the worst-case 16-byte padding round-up —
/// the per-fragment payload budget `build_fragments` splits on.
fn mtu_payload_budget(addr: SocketAddr) -> usize {
    let packet_max = if addr.is_ipv4() { PACKET_MAX_IPV4 } else { PACKET_MAX_IPV6 };
    packet_max
        .saturating_sub(HEADER_MIN_LEN)
        .saturating_sub(DATA_SINGLE_FRAGMENT_OVERHEAD)
        .saturating_sub(MAX_PADDING_OVERHEAD)
        .max(1)
}

/// An upstream I2NP message queued for send: fragment it, wrap each
/// fragment in its own Data payload, seal, and hand to the socket.
fn send_outbound_message(s: &mut Session, sink: &Arc<dyn DatagramSink>, msg: &[u8]) {
    if !s.keys.is_established() {
        warn!(endpoint = %s.remote_endpoint, "dropping outbound I2NP message on a non-established session");
        return;
    }

    let budget = mtu_payload_budget(s.remote_endpoint);
    let fragments = match fragment::build_fragments(msg, 0, 0, budget) {
        Ok(f) => f,
        Err(e) => {
            warn!(endpoint = %s.remote_endpoint, error = %e, "failed to fragment outbound I2NP message");
            return;
        },
    };

    let (aes_key, mac_key) = s.keys.active_keys();
    for frag in fragments {
        let data = packet::DataPacket {
            want_reply: false,
            explicit_acks: Vec::new(),
            ack_bitfields: Vec::new(),
            fragments: vec![frag],
        };
        let mut header = Header::new(PayloadType::Data, now_secs());
        let mut body = BytesMut::new();
        if packet::write_body(&packet::Packet::Data(data), &mut body, 0).is_err() {
            warn!(endpoint = %s.remote_endpoint, "failed to serialize outbound Data fragment");
            continue;
        }
        let datagram = seal_datagram(&mut header, body, aes_key, mac_key);
        s.note_sent(datagram.len() as u64);
        sink.send_datagram(s.remote_endpoint, datagram);
    }
}

/// Alice's direct SessionRequest to Charlie, deferred until the introducer
/// path's HolePunch opens the NAT mapping. `s` is already carrying the DH
/// keypair allocated when its `Introduced` session object was spawned.
fn send_initial_session_request(s: &mut Session, sink: &Arc<dyn DatagramSink>) {
    let Some(our_dh) = s.dh_keypair.as_ref() else {
        warn!(endpoint = %s.remote_endpoint, "no DH keypair on session transitioning out of Introduced, dropping");
        return;
    };
    let request = handshake::build_session_request(our_dh);
    let mut header = Header::new(PayloadType::SessionRequest, now_secs());
    let mut body = BytesMut::new();
    if packet::write_body(&packet::Packet::SessionRequest(request), &mut body, 0).is_err() {
        warn!(endpoint = %s.remote_endpoint, "failed to serialize direct SessionRequest to Charlie");
        return;
    }
    let (aes_key, mac_key) = s.keys.active_keys();
    let datagram = seal_datagram(&mut header, body, aes_key, mac_key);
    sink.send_datagram(s.remote_endpoint, datagram.clone());
    s.pending_resend = Some(PendingResend { datagram, attempts: 0 });
    s.timers.arm_resend(tokio::time::Instant::now());
}

/// Alice's reaction to Bob's SessionCreated: verify, derive keys, sign, and
/// seal SessionConfirmed for immediate send plus the resend table.
fn handle_session_created(
    s: &mut Session,
    router_context: &Arc<dyn RouterContext>,
    created: packet::SessionCreated,
    iv: [u8; IV_LEN],
) {
    if s.state != SessionState::Unknown || s.session_confirm_data.is_some() {
        debug!(endpoint = %s.remote_endpoint, "unexpected SessionCreated for session not awaiting one, dropping");
        return;
    }
    let Some(our_dh) = s.dh_keypair.as_ref() else {
        warn!(endpoint = %s.remote_endpoint, "SessionCreated with no outstanding DH keypair, dropping");
        return;
    };
    let Some(bob_identity) = s.remote_identity.clone() else {
        warn!(endpoint = %s.remote_endpoint, "SessionCreated with no cached remote identity, dropping");
        return;
    };

    let alice_addr = (created.alice_ip, created.alice_port);
    let bob_addr = (s.remote_endpoint.ip(), s.remote_endpoint.port());

    let derived = match handshake::verify_session_created(our_dh, &bob_identity, &created, alice_addr, bob_addr, &iv, now_secs()) {
        Ok(d) => d,
        Err(e) => {
            warn!(endpoint = %s.remote_endpoint, error = %e, "SessionCreated failed verification");
            return;
        },
    };
    s.keys.install(derived);

    // Our own signed_on_time, distinct from Bob's: spliced into the tuple's
    // last four bytes before signing, mirroring the splice Bob performs on
    // his stored copy once SessionConfirmed arrives.
    let own_signed_on_time = now_secs();
    let mut signed_tuple = packet::SessionCreated::signed_tuple(
        &our_dh.public,
        &created.dh_y,
        alice_addr.0,
        alice_addr.1,
        bob_addr.0,
        bob_addr.1,
        created.relay_tag,
        created.signed_on_time,
    );
    let tuple_len = signed_tuple.len();
    signed_tuple[tuple_len - 4..].copy_from_slice(&own_signed_on_time.to_be_bytes());

    let local = router_context.local_identity();
    let confirmed = handshake::build_session_confirmed(local.as_ref(), &signed_tuple, own_signed_on_time);

    let prelim_len = 1 + 2 + confirmed.identity.len() + 4 + confirmed.signature.len();
    let total_padded_len = envelope::padded_len(prelim_len);
    let mut body = BytesMut::new();
    if packet::write_body(&packet::Packet::SessionConfirmed(confirmed), &mut body, total_padded_len).is_err() {
        warn!(endpoint = %s.remote_endpoint, "failed to serialize SessionConfirmed");
        return;
    }
    let mut header = Header::new(PayloadType::SessionConfirmed, now_secs());
    let (aes_key, mac_key) = s.keys.active_keys();
    let datagram = seal_datagram(&mut header, body, aes_key, mac_key);

    s.relay_tag = created.relay_tag;
    s.pending_resend = Some(PendingResend { datagram, attempts: 0 });
    s.timers.arm_resend(tokio::time::Instant::now());
    s.transition_to_established();
    router_context.update_external_address(SocketAddr::new(alice_addr.0, alice_addr.1));
}

/// Bob's reaction to Alice's SessionConfirmed: splice in the signed time,
/// decode her identity, and verify her signature over the tuple we signed
/// when we sent SessionCreated.
fn handle_session_confirmed(s: &mut Session, router_context: &Arc<dyn RouterContext>, confirmed: packet::SessionConfirmed) {
    let Some(signed_tuple) = s.session_confirm_data.as_mut() else {
        debug!(endpoint = %s.remote_endpoint, "unexpected SessionConfirmed for session not awaiting one, dropping");
        return;
    };
    if handshake::verify_session_confirmed(signed_tuple.as_mut_slice(), &confirmed).is_err() {
        warn!(endpoint = %s.remote_endpoint, "SessionConfirmed time splice failed, dropping");
        return;
    }
    let Some(alice_identity) = router_context.decode_identity(&confirmed.identity) else {
        warn!(endpoint = %s.remote_endpoint, "SessionConfirmed carried an undecodable identity, dropping");
        return;
    };
    if !alice_identity.verify(signed_tuple.as_slice(), &confirmed.signature) {
        warn!(endpoint = %s.remote_endpoint, "SessionConfirmed signature did not verify");
        return;
    }

    s.remote_identity = Some(alice_identity);
    s.pending_resend = None;
    s.timers.clear_resend();
    s.transition_to_established();
}

async fn deliver(session: &mut Session, i2np: &Arc<dyn I2npSink>, payload: Vec<u8>) {
    let Some(identity) = session.remote_identity.clone() else {
        warn!("delivering I2NP message before remote identity is known");
        return;
    };
    let identity: SharedIdentity = identity;
    if !i2np.deliver_i2np(payload, identity).await {
        debug!(endpoint = %session.remote_endpoint, "upstream sink applied backpressure, dropping message");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;
    use std::net::Ipv4Addr;
    use std::sync::Mutex as StdMutex;

    use flate2::read::ZlibDecoder;

    use super::*;
    use crate::crypto::dh::DhKeyPair;
    use crate::crypto::envelope;

    struct CapturingSink {
        sent: StdMutex<Vec<(SocketAddr, Bytes)>>,
    }

    impl CapturingSink {
        fn new() -> Self {
            Self { sent: StdMutex::new(Vec::new()) }
        }
    }

    impl DatagramSink for CapturingSink {
        fn send_datagram(&self, to: SocketAddr, bytes: Bytes) {
            self.sent.lock().expect("not poisoned").push((to, bytes));
        }
    }

    fn established_session(addr: SocketAddr) -> Session {
        let mut s = Session::new_outbound(addr, [0x77u8; 32], DhKeyPair::generate());
        s.keys.install(crate::crypto::dh::DerivedKeys { session_key: [0x01u8; 32], mac_key: [0x02u8; 32] });
        s
    }

    fn decode_single_fragment_message(frame: &[u8]) -> Vec<u8> {
        let len = u32::from_be_bytes(frame[0..4].try_into().unwrap()) as usize;
        let compressed = &frame[4..4 + len];
        let mut decoder = ZlibDecoder::new(compressed);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).expect("valid zlib stream");
        out
    }

    #[test]
    fn mtu_payload_budget_is_smaller_for_ipv6_than_ipv4() {
        let v4 = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 1000);
        let v6 = SocketAddr::new(std::net::IpAddr::V6(std::net::Ipv6Addr::LOCALHOST), 1000);
        assert!(mtu_payload_budget(v4) > mtu_payload_budget(v6));
        assert!(mtu_payload_budget(v4) < PACKET_MAX_IPV4);
    }

    #[test]
    fn outbound_message_on_unestablished_session_is_dropped() {
        let addr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 9000);
        let mut s = Session::new_outbound(addr, [0x77u8; 32], DhKeyPair::generate());
        let sink = Arc::new(CapturingSink::new());
        let sink_dyn: Arc<dyn DatagramSink> = sink.clone();
        send_outbound_message(&mut s, &sink_dyn, b"hello");
        assert!(sink.sent.lock().expect("not poisoned").is_empty());
    }

    #[test]
    fn outbound_message_seals_and_round_trips_through_the_envelope() {
        let addr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 9000);
        let mut s = established_session(addr);
        let sink = Arc::new(CapturingSink::new());
        let sink_dyn: Arc<dyn DatagramSink> = sink.clone();
        let message = b"an upstream i2np message payload".to_vec();
        send_outbound_message(&mut s, &sink_dyn, &message);

        let sent = sink.sent.lock().expect("not poisoned");
        assert_eq!(sent.len(), 1);
        let (to, datagram) = &sent[0];
        assert_eq!(*to, addr);

        let (aes_key, mac_key) = s.keys.active_keys();
        let mut mac = [0u8; 16];
        mac.copy_from_slice(&datagram[Header::MAC_OFFSET..Header::MAC_OFFSET + 16]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&datagram[Header::IV_OFFSET..Header::IV_OFFSET + IV_LEN]);
        let mut encrypted = datagram[Header::ENCRYPTED_REGION_OFFSET..].to_vec();
        envelope::open(&mut encrypted, &iv, &mac, aes_key, mac_key).expect("envelope should verify");

        let (header, consumed) = Header::parse_decrypted(mac, iv, &encrypted).expect("header should parse");
        assert_eq!(header.payload_type, PayloadType::Data);
        let data = match packet::parse_body(PayloadType::Data, &encrypted[consumed..], 0).expect("body should parse") {
            Packet::Data(d) => d,
            other => panic!("expected Data payload, got {other:?}"),
        };
        assert_eq!(data.fragments.len(), 1);
        assert!(data.fragments[0].is_last);
        let recovered = decode_single_fragment_message(&data.fragments[0].data);
        assert_eq!(recovered, message);
    }
}
