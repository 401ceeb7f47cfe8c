// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-peer session object: handshake, established transfer, and the
//! single-threaded executor driving both.

pub mod executor;
pub mod handshake;
pub mod state;
pub mod timers;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::time::Instant;

use crate::crypto::dh::DhKeyPair;
use crate::crypto::keys::SessionKeys;
use crate::fragment::{AckScheduler, Reassembler};
use crate::identity::SharedIdentity;
use crate::session::state::{PeerTestRole, Role, SessionState};
use crate::session::timers::Timers;

/// A sealed handshake datagram we're waiting to see superseded by the next
/// step; resent verbatim on the resend sub-timer until `attempts` hits
/// [`crate::constants::MAX_HANDSHAKE_RESENDS`].
pub struct PendingResend {
    pub datagram: Bytes,
    pub attempts: u32,
}

/// A session's mutable state, owned exclusively by its executor. Shared
/// mutable state here is mutated only by the owning executor task.
pub struct Session {
    pub remote_endpoint: SocketAddr,
    pub remote_identity: Option<SharedIdentity>,
    pub role: Role,
    pub state: SessionState,
    /// Non-zero only while we offer to introduce this peer to others; a
    /// relay tag of zero means we are not offering.
    pub relay_tag: u32,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub created_at: Instant,
    pub peer_test_role: PeerTestRole,
    pub keys: SessionKeys,
    /// Cleared on transition to `Established`.
    pub dh_keypair: Option<DhKeyPair>,
    /// Bob-only: the signed tuple awaiting Alice's `signed_on_time` splice
    /// and her SessionConfirmed signature.
    pub session_confirm_data: Option<Vec<u8>>,
    pub reassembler: Reassembler,
    pub ack_scheduler: AckScheduler,
    pub timers: Timers,
    /// Consecutive MAC failures on this session; three in a row tears it
    /// down as a suspected attack.
    pub consecutive_mac_failures: u32,
    /// The last handshake message we sent, if we're still waiting for the
    /// next step and may need to resend it.
    pub pending_resend: Option<PendingResend>,
}

impl Session {
    pub fn new_outbound(remote_endpoint: SocketAddr, remote_intro_key: [u8; 32], dh: DhKeyPair) -> Self {
        let now = Instant::now();
        Self {
            remote_endpoint,
            remote_identity: None,
            role: Role::Alice,
            state: SessionState::Unknown,
            relay_tag: 0,
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            created_at: now,
            peer_test_role: PeerTestRole::None,
            keys: SessionKeys::new(remote_intro_key),
            dh_keypair: Some(dh),
            session_confirm_data: None,
            reassembler: Reassembler::new(),
            ack_scheduler: AckScheduler::new(),
            timers: Timers::start_handshake(now),
            consecutive_mac_failures: 0,
            pending_resend: None,
        }
    }

    pub fn new_inbound(remote_endpoint: SocketAddr, remote_intro_key: [u8; 32], dh: DhKeyPair) -> Self {
        let now = Instant::now();
        Self {
            remote_endpoint,
            remote_identity: None,
            role: Role::Bob,
            state: SessionState::Unknown,
            relay_tag: 0,
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            created_at: now,
            peer_test_role: PeerTestRole::None,
            keys: SessionKeys::new(remote_intro_key),
            dh_keypair: Some(dh),
            session_confirm_data: None,
            reassembler: Reassembler::new(),
            ack_scheduler: AckScheduler::new(),
            timers: Timers::start_handshake(now),
            consecutive_mac_failures: 0,
            pending_resend: None,
        }
    }

    pub fn note_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn note_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn transition_to_established(&mut self) {
        self.state = SessionState::Established;
        self.dh_keypair = None;
        self.session_confirm_data = None;
        self.timers.clear_connect_timer();
    }

    /// Record one MAC failure; returns `true` once the third consecutive
    /// failure is reached and the session must be torn down.
    pub fn note_mac_failure(&mut self) -> bool {
        self.consecutive_mac_failures += 1;
        self.consecutive_mac_failures >= 3
    }

    pub fn note_mac_success(&mut self) {
        self.consecutive_mac_failures = 0;
    }
}
