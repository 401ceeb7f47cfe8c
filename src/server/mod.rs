// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Owns the UDP socket(s) and the three lookup tables that let an
//! incoming datagram find its session, relay, or peer-test state.

pub mod dispatch;
mod introducer_dispatch;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::context::{DhPool, NetDatabase, RouterContext, SsuAddress};
use crate::identity::SharedIdentity;
use crate::packet::PayloadType;
use crate::session::executor::{DatagramSink, SessionHandle};
use crate::sink::I2npSink;

/// The role this router plays for one in-flight peer-test nonce it is
/// tracking at the demultiplexer level. Distinct from
/// [`crate::session::state::PeerTestRole`], which tracks the role on a
/// single session object and includes a `None` (inactive) variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceRole {
    Alice1,
    Alice2,
    Bob,
    Charlie,
}

pub struct PeerTestState {
    pub role: NonceRole,
    pub partner_session: Option<SocketAddr>,
    pub created_at: tokio::time::Instant,
}

/// An outbound RelayRequest awaiting its RelayResponse: who we're ultimately
/// trying to reach, and under what key to frame the direct SessionRequest we
/// send once the introducer hands back Charlie's endpoint.
pub struct PendingRelay {
    pub identity: SharedIdentity,
    pub charlie_intro_key: [u8; 32],
}

/// Counters incremented by the dispatch path; exposed for observability.
/// Every drop path increments one of these.
#[derive(Default)]
pub struct ServerStats {
    pub framing_errors: AtomicU64,
    pub mac_failures: AtomicU64,
    pub resource_exhausted_drops: AtomicU64,
    pub duplicate_fragments: AtomicU64,
}

pub struct SsuServer {
    pub(crate) socket_v4: Arc<UdpSocket>,
    socket_v6: Option<Arc<UdpSocket>>,
    pub sessions_by_endpoint: DashMap<SocketAddr, SessionHandle>,
    pub relay_tags: DashMap<u32, SessionHandle>,
    pub peer_tests: DashMap<u32, PeerTestState>,
    pub pending_relays: DashMap<u32, PendingRelay>,
    pub router_context: Arc<dyn RouterContext>,
    pub net_database: Arc<dyn NetDatabase>,
    pub dh_pool: Arc<dyn DhPool>,
    pub i2np: Arc<dyn I2npSink>,
    pub stats: ServerStats,
    cancel: CancellationToken,
}

impl SsuServer {
    pub async fn bind(
        ssu_address: SsuAddress,
        router_context: Arc<dyn RouterContext>,
        net_database: Arc<dyn NetDatabase>,
        i2np: Arc<dyn I2npSink>,
    ) -> std::io::Result<Self> {
        let socket_v4 = Arc::new(UdpSocket::bind(ssu_address.host).await?);
        let dh_pool = router_context.dh_pool();
        Ok(Self {
            socket_v4,
            socket_v6: None,
            sessions_by_endpoint: DashMap::new(),
            relay_tags: DashMap::new(),
            peer_tests: DashMap::new(),
            pending_relays: DashMap::new(),
            router_context,
            net_database,
            dh_pool,
            i2np,
            stats: ServerStats::default(),
            cancel: CancellationToken::new(),
        })
    }

    pub async fn bind_dual_stack(
        v4: SocketAddr,
        v6: SocketAddr,
        router_context: Arc<dyn RouterContext>,
        net_database: Arc<dyn NetDatabase>,
        i2np: Arc<dyn I2npSink>,
    ) -> std::io::Result<Self> {
        let socket_v4 = Arc::new(UdpSocket::bind(v4).await?);
        let socket_v6 = Arc::new(UdpSocket::bind(v6).await?);
        let dh_pool = router_context.dh_pool();
        Ok(Self {
            socket_v4,
            socket_v6: Some(socket_v6),
            sessions_by_endpoint: DashMap::new(),
            relay_tags: DashMap::new(),
            peer_tests: DashMap::new(),
            pending_relays: DashMap::new(),
            router_context,
            net_database,
            dh_pool,
            i2np,
            stats: ServerStats::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Read loop for one socket: never blocks on processing, posts decoded
    /// packets to the owning session's executor.
    pub async fn run_v4(self: &Arc<Self>) {
        let mut buf = vec![0u8; 2048];
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                recv = self.socket_v4.recv_from(&mut buf) => {
                    match recv {
                        Ok((n, src)) => self.clone().handle_datagram(src, buf[..n].to_vec()).await,
                        Err(e) => warn!("UDP recv error: {e}"),
                    }
                }
            }
        }
    }

    /// Cancel all timers, best-effort SessionDestroyed on every established
    /// session, drop all session handles.
    pub fn stop(&self) {
        self.cancel.cancel();
        for entry in self.sessions_by_endpoint.iter() {
            entry.value().cancel();
        }
        self.sessions_by_endpoint.clear();
        self.relay_tags.clear();
        self.peer_tests.clear();
        self.pending_relays.clear();
    }

    pub fn payload_type_hint(flag_byte: u8) -> Option<PayloadType> {
        PayloadType::from_nibble(flag_byte >> 4).ok()
    }
}

/// The socket-level send half handed to sessions so they can emit
/// datagrams without reaching back into server internals.
pub struct SocketDatagramSink {
    socket: Arc<UdpSocket>,
}

impl SocketDatagramSink {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl DatagramSink for SocketDatagramSink {
    fn send_datagram(&self, to: SocketAddr, bytes: Bytes) {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            if let Err(e) = socket.send_to(&bytes, to).await {
                warn!("UDP send to {to} failed: {e}");
            }
        });
    }
}
