// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! QuickAck scheduling: explicit ACKs for completed messages, NACK
//! bitfields for messages with gaps.

use std::time::Instant;

use crate::constants::{MAX_ACK_BITFIELD_ENTRIES, MAX_EXPLICIT_ACKS, QUICK_ACK_DELAY};
use crate::fragment::reassembler::pack_nack_bitfield;
use crate::packet::{AckBitfield, DataPacket};

/// Accumulates ACK-worthy state between received fragments and decides
/// when a QuickAck datagram is due.
pub struct AckScheduler {
    pending_explicit: Vec<u32>,
    scheduled_at: Option<Instant>,
}

impl Default for AckScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AckScheduler {
    pub fn new() -> Self {
        Self { pending_explicit: Vec::new(), scheduled_at: None }
    }

    /// Record that `msg_id` completed reassembly and should be explicitly
    /// ACKed. Arms the QuickAck timer if it isn't already running.
    pub fn note_completed(&mut self, msg_id: u32) {
        self.pending_explicit.push(msg_id);
        self.scheduled_at.get_or_insert_with(Instant::now);
    }

    /// Any fragment arriving at all arms the timer, even if it didn't complete a message.
    pub fn note_fragment_received(&mut self) {
        self.scheduled_at.get_or_insert_with(Instant::now);
    }

    pub fn is_due(&self) -> bool {
        self.scheduled_at.is_some_and(|t| t.elapsed() >= QUICK_ACK_DELAY)
    }

    /// Build the QuickAck Data payload and clear pending explicit ACKs.
    /// `incomplete` is the reassembler's current gap list.
    pub fn build_and_reset(&mut self, incomplete: &[(u32, Vec<u8>)]) -> DataPacket {
        self.scheduled_at = None;

        let mut explicit_acks = std::mem::take(&mut self.pending_explicit);
        explicit_acks.truncate(MAX_EXPLICIT_ACKS);

        let ack_bitfields = incomplete
            .iter()
            .take(MAX_ACK_BITFIELD_ENTRIES)
            .map(|(msg_id, missing)| AckBitfield { msg_id: *msg_id, bits: pack_nack_bitfield(missing) })
            .collect();

        DataPacket { want_reply: false, explicit_acks, ack_bitfields, fragments: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_is_not_due_immediately() {
        let mut s = AckScheduler::new();
        s.note_fragment_received();
        assert!(!s.is_due());
    }

    #[test]
    fn build_and_reset_caps_explicit_acks_at_255() {
        let mut s = AckScheduler::new();
        for id in 0..300u32 {
            s.note_completed(id);
        }
        let pkt = s.build_and_reset(&[]);
        assert_eq!(pkt.explicit_acks.len(), MAX_EXPLICIT_ACKS);
        assert!(s.build_and_reset(&[]).explicit_acks.is_empty());
    }
}
