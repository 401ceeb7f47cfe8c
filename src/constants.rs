// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire-format and protocol-timing constants.

use std::time::Duration;

pub const MTU_V4: usize = 1484;
pub const MTU_V6: usize = 1488;
pub const HEADER_IPV4: usize = 20;
pub const HEADER_IPV6: usize = 40;
pub const HEADER_UDP: usize = 8;

/// Largest SSU datagram that still fits under IPv4 without IP fragmentation.
pub const PACKET_MAX_IPV4: usize = MTU_V4 - HEADER_IPV4 - HEADER_UDP;
/// Largest SSU datagram that still fits under IPv6 without IP fragmentation.
pub const PACKET_MAX_IPV6: usize = MTU_V6 - HEADER_IPV6 - HEADER_UDP;

/// Minimum bytes of a common header: `MAC[16] || IV[16] || flag[1] || time[4]`.
pub const HEADER_MIN_LEN: usize = 37;
pub const MAC_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const INTRO_KEY_LEN: usize = 32;
pub const SESSION_KEY_LEN: usize = 32;
pub const REKEY_BLOCK_LEN: usize = 64;
pub const DH_PUBLIC_LEN: usize = 256;

/// Maximum concurrent relay-tag offers this router hands out as an
/// introducer (Kovri's `MaxIntroducers`).
pub const MAX_INTRODUCERS: usize = 3;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const TERMINATION_TIMEOUT: Duration = Duration::from_secs(330);
pub const QUICK_ACK_DELAY: Duration = Duration::from_millis(200);
pub const MAX_HANDSHAKE_RESENDS: u32 = 6;
/// `CONNECT_TIMEOUT` divided into `MAX_HANDSHAKE_RESENDS` sub-intervals: an
/// unacknowledged handshake message is retransmitted on this cadence until
/// the attempt cap is hit.
pub const HANDSHAKE_RESEND_INTERVAL: Duration = Duration::from_millis(833);
pub const MAX_RECEIVED_MESSAGE_DEDUPE: usize = 1000;
pub const COMPRESSION_THRESHOLD: usize = 66;
pub const FRAGMENT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(30);
pub const PEER_TEST_NONCE_TIMEOUT: Duration = Duration::from_secs(30);
pub const PEER_TEST_PROGRESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Session queue back-pressure window.
pub const SESSION_QUEUE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tolerated absolute skew between `signed_on_time`/header `time` and local
/// wall-clock time.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Maximum fragment payload size representable in the 14-bit size field
/// of fragment info.
pub const MAX_FRAGMENT_SIZE: usize = 16383;

pub const MAX_FRAGMENT_NUM: u8 = 127;
pub const MAX_EXPLICIT_ACKS: usize = 255;
pub const MAX_ACK_BITFIELD_ENTRIES: usize = 255;

/// Bytes a single-fragment Data payload adds on top of the fragment's own
/// data: flags (1) + fragment count (1) + one fragment header (msg_id[4] +
/// fragment info[3]).
pub const DATA_SINGLE_FRAGMENT_OVERHEAD: usize = 1 + 1 + 4 + 3;
/// Worst-case bytes the 16-byte padding boundary can add beyond a packet's
/// unpadded length.
pub const MAX_PADDING_OVERHEAD: usize = 15;
