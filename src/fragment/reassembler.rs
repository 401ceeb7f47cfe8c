// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Multi-fragment Data message assembly and duplicate suppression
//!.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use crate::constants::{FRAGMENT_REASSEMBLY_TIMEOUT, MAX_FRAGMENT_NUM, MAX_RECEIVED_MESSAGE_DEDUPE};
use crate::packet::WireFragment;

struct PendingMessage {
    expected_last: Option<u8>,
    fragments: Vec<Option<Vec<u8>>>,
    first_seen: Instant,
}

impl PendingMessage {
    fn new() -> Self {
        Self { expected_last: None, fragments: Vec::new(), first_seen: Instant::now() }
    }

    fn is_complete(&self) -> bool {
        match self.expected_last {
            None => false,
            Some(last) => {
                self.fragments.len() > last as usize && self.fragments.iter().all(Option::is_some)
            },
        }
    }

    /// Missing fragment numbers below `expected_last`, used for NACK
    /// bitfield construction.
    fn missing(&self) -> Vec<u8> {
        let Some(last) = self.expected_last else { return Vec::new() };
        (0..=last)
            .filter(|&i| self.fragments.get(i as usize).map(Option::is_none).unwrap_or(true))
            .collect()
    }

    fn concat(&self) -> Vec<u8> {
        self.fragments.iter().flatten().flat_map(|f| f.iter().copied()).collect()
    }
}

/// One reassembler per session, keyed by `msg_id` (a session is already
/// addressed by a single remote endpoint, so no further per-endpoint
/// keying is needed here).
pub struct Reassembler {
    open: std::collections::HashMap<u32, PendingMessage>,
    delivered_recent: VecDeque<u32>,
    delivered_set: HashSet<u32>,
    pub duplicate_count: u64,
}

/// Outcome of feeding one fragment into the reassembler.
pub enum Ingest {
    /// The message is not yet complete.
    Pending,
    /// The message completed and should be delivered upstream.
    Complete(Vec<u8>),
    /// This `msg_id` was already delivered; dropped.
    Duplicate,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            open: std::collections::HashMap::new(),
            delivered_recent: VecDeque::with_capacity(MAX_RECEIVED_MESSAGE_DEDUPE),
            delivered_set: HashSet::new(),
            duplicate_count: 0,
        }
    }

    pub fn ingest(&mut self, fragment: WireFragment) -> Ingest {
        if self.delivered_set.contains(&fragment.msg_id) {
            self.duplicate_count += 1;
            return Ingest::Duplicate;
        }

        let entry = self.open.entry(fragment.msg_id).or_insert_with(PendingMessage::new);
        if fragment.is_last {
            entry.expected_last = Some(fragment.fragment_num);
        }
        let idx = fragment.fragment_num as usize;
        if entry.fragments.len() <= idx {
            entry.fragments.resize(idx + 1, None);
        }
        entry.fragments[idx] = Some(fragment.data);

        if entry.is_complete() {
            let entry = self.open.remove(&fragment.msg_id).expect("just inserted");
            let payload = entry.concat();
            self.mark_delivered(fragment.msg_id);
            Ingest::Complete(payload)
        } else {
            Ingest::Pending
        }
    }

    fn mark_delivered(&mut self, msg_id: u32) {
        if self.delivered_recent.len() >= MAX_RECEIVED_MESSAGE_DEDUPE {
            if let Some(oldest) = self.delivered_recent.pop_front() {
                self.delivered_set.remove(&oldest);
            }
        }
        self.delivered_recent.push_back(msg_id);
        self.delivered_set.insert(msg_id);
    }

    /// Drop any open message whose first fragment arrived more than
    /// `FRAGMENT_REASSEMBLY_TIMEOUT` ago.
    pub fn expire_stale(&mut self) {
        self.open.retain(|_, m| m.first_seen.elapsed() < FRAGMENT_REASSEMBLY_TIMEOUT);
    }

    /// Message IDs that are still open along with their missing fragment
    /// numbers, for NACK bitfield construction.
    pub fn incomplete(&self) -> Vec<(u32, Vec<u8>)> {
        self.open.iter().map(|(id, m)| (*id, m.missing())).collect()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

/// Pack a sequence of missing fragment numbers (0..=127) into a
/// high-bit-continuation bitfield chain.
pub fn pack_nack_bitfield(missing: &[u8]) -> Vec<u8> {
    if missing.is_empty() {
        return Vec::new();
    }
    let max = *missing.iter().max().unwrap_or(&0).min(&MAX_FRAGMENT_NUM);
    let num_bytes = max as usize / 7 + 1;
    let mut bytes = vec![0u8; num_bytes];
    for &bit in missing {
        if bit > MAX_FRAGMENT_NUM {
            continue;
        }
        let byte_idx = bit as usize / 7;
        let bit_idx = bit as usize % 7;
        bytes[byte_idx] |= 1 << bit_idx;
    }
    for i in 0..bytes.len() - 1 {
        bytes[i] |= 0x80;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(msg_id: u32, num: u8, is_last: bool, data: Vec<u8>) -> WireFragment {
        WireFragment { msg_id, fragment_num: num, is_last, data }
    }

    #[test]
    fn two_fragments_in_order_deliver_one_message() {
        let mut r = Reassembler::new();
        assert!(matches!(r.ingest(frag(0x0A0B0C0D, 0, false, vec![0u8; 32])), Ingest::Pending));
        match r.ingest(frag(0x0A0B0C0D, 1, true, vec![1u8; 32])) {
            Ingest::Complete(bytes) => {
                assert_eq!(bytes.len(), 64);
                assert_eq!(&bytes[..32], &[0u8; 32][..]);
                assert_eq!(&bytes[32..], &[1u8; 32][..]);
            },
            _ => panic!("expected completion"),
        }
    }

    #[test]
    fn reverse_order_fragments_deliver_the_same_message() {
        let mut r = Reassembler::new();
        assert!(matches!(r.ingest(frag(7, 1, true, vec![1u8; 32])), Ingest::Pending));
        match r.ingest(frag(7, 0, false, vec![0u8; 32])) {
            Ingest::Complete(bytes) => {
                assert_eq!(&bytes[..32], &[0u8; 32][..]);
                assert_eq!(&bytes[32..], &[1u8; 32][..]);
            },
            _ => panic!("expected completion"),
        }
    }

    #[test]
    fn duplicate_msg_id_after_delivery_is_dropped() {
        let mut r = Reassembler::new();
        r.ingest(frag(1, 0, true, vec![9u8]));
        assert!(matches!(r.ingest(frag(1, 0, true, vec![9u8])), Ingest::Duplicate));
        assert_eq!(r.duplicate_count, 1);
    }

    #[test]
    fn pack_nack_bitfield_sets_low_bits_for_small_gaps() {
        let packed = pack_nack_bitfield(&[0, 2]);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0], 0b0000_0101);
    }
}
