// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Outbound I2NP framing and fragmentation.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use rand::rngs::OsRng;
use rand::RngCore;
use std::io::Write;

use crate::constants::{COMPRESSION_THRESHOLD, MAX_FRAGMENT_SIZE};
use crate::error::{Result, SsuError};
use crate::packet::WireFragment;

const STREAMING_PROTOCOL: u8 = 1;

/// Deflate `payload` with default compression, or the fastest level when
/// the payload is tiny enough (<= 66 bytes) that compression ratio doesn't
/// matter.
fn deflate(payload: &[u8]) -> Result<Vec<u8>> {
    let level = if payload.len() <= COMPRESSION_THRESHOLD {
        Compression::fast()
    } else {
        Compression::default()
    };
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder
        .write_all(payload)
        .map_err(|e| SsuError::Invariant(format!("deflate write failed: {e}")))?;
    encoder.finish().map_err(|e| SsuError::Invariant(format!("deflate finish failed: {e}")))
}

/// Wrap a compressed I2NP payload in its wire framing:
/// `length(4) || compressed_payload || source_port(2) || dest_port(2) ||
/// proto(1)`.
fn frame(compressed: &[u8], source_port: u16, dest_port: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + compressed.len() + 5);
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(compressed);
    out.extend_from_slice(&source_port.to_be_bytes());
    out.extend_from_slice(&dest_port.to_be_bytes());
    out.push(STREAMING_PROTOCOL);
    out
}

/// Compress, frame, and split an outbound I2NP message into wire fragments
/// ready to carry in one or more Data payloads.
/// `mtu_payload_budget` is the streaming MTU minus header overhead the
/// caller has already computed for the destination's address family.
pub fn build_fragments(
    payload: &[u8],
    source_port: u16,
    dest_port: u16,
    mtu_payload_budget: usize,
) -> Result<Vec<WireFragment>> {
    let compressed = deflate(payload)?;
    let framed = frame(&compressed, source_port, dest_port);

    let chunk_size = mtu_payload_budget.min(MAX_FRAGMENT_SIZE).max(1);
    let msg_id = OsRng.next_u32();

    let chunks: Vec<&[u8]> = framed.chunks(chunk_size).collect();
    let num_fragments = chunks.len().max(1);
    if num_fragments > 128 {
        return Err(SsuError::Invariant("message requires more than 128 fragments".into()));
    }

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| WireFragment {
            msg_id,
            fragment_num: i as u8,
            is_last: i + 1 == num_fragments,
            data: chunk.to_vec(),
        })
        .collect())
}
