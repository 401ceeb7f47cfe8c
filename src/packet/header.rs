// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The common SSU header: `MAC[16] || IV[16] || flag[1] || time[4]`, plus
//! the optional rekey block and extended-options tail.

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::{HEADER_MIN_LEN, IV_LEN, MAC_LEN, REKEY_BLOCK_LEN};
use crate::error::{Result, SsuError};

/// The 4-bit payload type carried in the high nibble of the flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    SessionRequest = 0,
    SessionCreated = 1,
    SessionConfirmed = 2,
    RelayRequest = 3,
    RelayResponse = 4,
    RelayIntro = 5,
    Data = 6,
    PeerTest = 7,
    SessionDestroyed = 8,
}

impl PayloadType {
    pub fn from_nibble(v: u8) -> Result<Self> {
        Ok(match v {
            0 => Self::SessionRequest,
            1 => Self::SessionCreated,
            2 => Self::SessionConfirmed,
            3 => Self::RelayRequest,
            4 => Self::RelayResponse,
            5 => Self::RelayIntro,
            6 => Self::Data,
            7 => Self::PeerTest,
            8 => Self::SessionDestroyed,
            other => {
                return Err(SsuError::Framing(format!("unknown payload type nibble {other}")));
            },
        })
    }

    fn to_nibble(self) -> u8 {
        self as u8
    }
}

const FLAG_EXTENDED_OPTIONS: u8 = 0x04;
const FLAG_REKEY: u8 = 0x08;

/// The common header fields shared by every SSU payload type.
#[derive(Debug, Clone)]
pub struct Header {
    pub mac: [u8; MAC_LEN],
    pub iv: [u8; IV_LEN],
    pub payload_type: PayloadType,
    pub rekey: bool,
    /// Present only when `rekey` is set: a 64-byte keying-material block.
    /// The parser retains it; no code path here ever sets `rekey`.
    pub rekey_data: Option<[u8; REKEY_BLOCK_LEN]>,
    /// Opaque extended-options bytes, stored but never interpreted.
    pub extended_options: Option<Vec<u8>>,
    pub time: u32,
}

impl Header {
    pub fn new(payload_type: PayloadType, time: u32) -> Self {
        Self {
            mac: [0u8; MAC_LEN],
            iv: [0u8; IV_LEN],
            payload_type,
            rekey: false,
            rekey_data: None,
            extended_options: None,
            time,
        }
    }

    fn flag_byte(&self) -> u8 {
        let mut flag = self.payload_type.to_nibble() << 4;
        if self.rekey {
            flag |= FLAG_REKEY;
        }
        if self.extended_options.is_some() {
            flag |= FLAG_EXTENDED_OPTIONS;
        }
        flag
    }

    /// Parse the fixed and variable-length header fields from the front of
    /// `buf`, returning the number of bytes consumed.
    ///
    /// `buf` must already be in cleartext. On the wire, MAC and IV are the
    /// only cleartext header bytes; flag/time/rekey/extopts live inside the
    /// encrypted region and are only readable after the crypto envelope has
    /// been opened — see [`Header::parse_decrypted`] for that path. This
    /// method is used directly by tests that exercise the codec against an
    /// already-plaintext buffer.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < HEADER_MIN_LEN {
            return Err(SsuError::Framing(format!(
                "datagram shorter than minimum header ({} < {HEADER_MIN_LEN})",
                buf.len()
            )));
        }

        let mut cur = buf;
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&cur[..MAC_LEN]);
        cur.advance(MAC_LEN);

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&cur[..IV_LEN]);
        cur.advance(IV_LEN);

        let (tail, tail_consumed) = Self::parse_tail(cur, mac, iv)?;
        Ok((tail, MAC_LEN + IV_LEN + tail_consumed))
    }

    /// Parse flag/time/rekey/extopts from an already-decrypted buffer (the
    /// region starting at offset 32 on the wire), pairing them with the MAC
    /// and IV already known from the cleartext prefix. Returns the header
    /// and the number of decrypted bytes consumed; everything after that is
    /// the payload body.
    pub fn parse_decrypted(mac: [u8; MAC_LEN], iv: [u8; IV_LEN], decrypted: &[u8]) -> Result<(Self, usize)> {
        Self::parse_tail(decrypted, mac, iv)
    }

    fn parse_tail(mut cur: &[u8], mac: [u8; MAC_LEN], iv: [u8; IV_LEN]) -> Result<(Self, usize)> {
        let start_len = cur.len();
        if cur.remaining() < 1 {
            return Err(SsuError::Framing("header truncated before flag byte".into()));
        }
        let flag = cur.get_u8();
        let payload_type = PayloadType::from_nibble(flag >> 4)?;
        let rekey = flag & FLAG_REKEY != 0;
        let has_ext_opts = flag & FLAG_EXTENDED_OPTIONS != 0;

        if cur.remaining() < 4 {
            return Err(SsuError::Framing("header truncated before time field".into()));
        }
        let time = cur.get_u32();

        let rekey_data = if rekey {
            if cur.remaining() < REKEY_BLOCK_LEN {
                return Err(SsuError::Framing("header truncated before rekey block".into()));
            }
            let mut block = [0u8; REKEY_BLOCK_LEN];
            block.copy_from_slice(&cur[..REKEY_BLOCK_LEN]);
            cur.advance(REKEY_BLOCK_LEN);
            Some(block)
        } else {
            None
        };

        let extended_options = if has_ext_opts {
            if cur.remaining() < 1 {
                return Err(SsuError::Framing("header truncated before ext-options length".into()));
            }
            let len = cur.get_u8() as usize;
            if cur.remaining() < len {
                return Err(SsuError::Framing("ext-options length overruns datagram".into()));
            }
            let opts = cur[..len].to_vec();
            cur.advance(len);
            Some(opts)
        } else {
            None
        };

        let consumed = start_len - cur.remaining();
        Ok((Header { mac, iv, payload_type, rekey, rekey_data, extended_options, time }, consumed))
    }

    /// Serialize the header into `out`. The MAC and IV slots are written as
    /// placeholders (zero) here; the crypto envelope overwrites them after
    /// sealing the body, since the MAC covers the already-encrypted body
    /// plus IV.
    pub fn write(&self, out: &mut BytesMut) {
        out.put_slice(&self.mac);
        out.put_slice(&self.iv);
        self.write_tail(out);
    }

    /// Serialize flag/time/rekey/extopts only, with no MAC or IV prefix.
    /// This is the part of the header that lives inside the encrypted
    /// region on the wire (offset 32 onward) — callers sealing a datagram
    /// prepend this to the payload body before encrypting, rather than
    /// using [`Header::write`], which also emits the cleartext MAC/IV slots.
    pub fn write_tail(&self, out: &mut BytesMut) {
        out.put_u8(self.flag_byte());
        out.put_u32(self.time);
        if let Some(block) = &self.rekey_data {
            out.put_slice(block);
        }
        if let Some(opts) = &self.extended_options {
            out.put_u8(opts.len() as u8);
            out.put_slice(opts);
        }
    }

    /// Offset of the MAC field within a serialized datagram.
    pub const MAC_OFFSET: usize = 0;
    /// Offset of the IV field within a serialized datagram.
    pub const IV_OFFSET: usize = MAC_LEN;
    /// The encrypted region of every datagram begins here.
    pub const ENCRYPTED_REGION_OFFSET: usize = MAC_LEN + IV_LEN;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_byte_identical() {
        let mac = [0x0au8; MAC_LEN];
        let iv: [u8; IV_LEN] = {
            let mut a = [0u8; IV_LEN];
            for (i, b) in a.iter_mut().enumerate() {
                *b = (i + 1) as u8;
            }
            a
        };
        let header = Header {
            mac,
            iv,
            payload_type: PayloadType::SessionRequest,
            rekey: false,
            rekey_data: None,
            extended_options: None,
            time: 0xAABBCCDD,
        };

        let mut buf = BytesMut::new();
        header.write(&mut buf);
        assert_eq!(buf.len(), HEADER_MIN_LEN);

        let (parsed, consumed) = Header::parse(&buf).expect("should parse");
        assert_eq!(consumed, HEADER_MIN_LEN);
        assert_eq!(parsed.payload_type, PayloadType::SessionRequest);
        assert!(!parsed.rekey);
        assert!(parsed.extended_options.is_none());
        assert_eq!(parsed.time, 0xAABBCCDD);

        let mut reserialized = BytesMut::new();
        parsed.write(&mut reserialized);
        assert_eq!(buf, reserialized);
    }

    #[test]
    fn short_buffer_is_a_framing_error() {
        let buf = [0u8; HEADER_MIN_LEN - 1];
        let err = Header::parse(&buf).unwrap_err();
        assert!(matches!(err, SsuError::Framing(_)));
    }
}
