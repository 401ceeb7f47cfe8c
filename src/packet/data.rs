// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Data payload (type 6) wire layout: ACKs, NACK bitfields, and the
//! fragment array itself.

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::{MAX_ACK_BITFIELD_ENTRIES, MAX_EXPLICIT_ACKS, MAX_FRAGMENT_SIZE};
use crate::error::{Result, SsuError};

const FLAG_WANT_REPLY: u8 = 0x04;
const FLAG_EXTENDED: u8 = 0x02;
const FLAG_ACK_BITFIELDS: u8 = 0x40;
const FLAG_EXPLICIT_ACKS: u8 = 0x80;
const BITFIELD_HAS_NEXT: u8 = 0x80;

/// One NACK bitfield chain: the message it covers, and the chain of
/// 7-bits-per-byte continuation bytes.
#[derive(Debug, Clone)]
pub struct AckBitfield {
    pub msg_id: u32,
    pub bits: Vec<u8>,
}

/// One wire-level fragment of a Data payload.
#[derive(Debug, Clone)]
pub struct WireFragment {
    pub msg_id: u32,
    pub fragment_num: u8,
    pub is_last: bool,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct DataPacket {
    pub want_reply: bool,
    pub explicit_acks: Vec<u32>,
    pub ack_bitfields: Vec<AckBitfield>,
    pub fragments: Vec<WireFragment>,
}

impl DataPacket {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = buf;
        if cur.remaining() < 1 {
            return Err(SsuError::Framing("Data payload truncated before flags".into()));
        }
        let flags = cur.get_u8();
        let want_reply = flags & FLAG_WANT_REPLY != 0;

        let mut explicit_acks = Vec::new();
        if flags & FLAG_EXPLICIT_ACKS != 0 {
            if cur.remaining() < 1 {
                return Err(SsuError::Framing("Data truncated before explicit ACK count".into()));
            }
            let n = cur.get_u8() as usize;
            if cur.remaining() < n * 4 {
                return Err(SsuError::Framing("explicit ACK list overruns datagram".into()));
            }
            for _ in 0..n {
                explicit_acks.push(cur.get_u32());
            }
        }

        let mut ack_bitfields = Vec::new();
        if flags & FLAG_ACK_BITFIELDS != 0 {
            if cur.remaining() < 1 {
                return Err(SsuError::Framing("Data truncated before bitfield count".into()));
            }
            let m = cur.get_u8() as usize;
            for _ in 0..m {
                if cur.remaining() < 4 {
                    return Err(SsuError::Framing("Data truncated inside bitfield entry".into()));
                }
                let msg_id = cur.get_u32();
                let mut bits = Vec::new();
                loop {
                    if cur.remaining() < 1 {
                        return Err(SsuError::Framing("Data truncated inside bitfield chain".into()));
                    }
                    let byte = cur.get_u8();
                    bits.push(byte);
                    if byte & BITFIELD_HAS_NEXT == 0 {
                        break;
                    }
                }
                ack_bitfields.push(AckBitfield { msg_id, bits });
            }
        }

        if flags & FLAG_EXTENDED != 0 {
            if cur.remaining() < 1 {
                return Err(SsuError::Framing("Data truncated before extended length".into()));
            }
            let len = cur.get_u8() as usize;
            if cur.remaining() < len {
                return Err(SsuError::Framing("extended data overruns datagram".into()));
            }
            cur.advance(len); // content is ignored but must be skipped
        }

        if cur.remaining() < 1 {
            return Err(SsuError::Framing("Data truncated before fragment count".into()));
        }
        let num_fragments = cur.get_u8() as usize;
        let mut fragments = Vec::with_capacity(num_fragments);
        for _ in 0..num_fragments {
            if cur.remaining() < 4 + 3 {
                return Err(SsuError::Framing("Data truncated inside fragment header".into()));
            }
            let msg_id = cur.get_u32();
            let b0 = cur.get_u8();
            let b1 = cur.get_u8();
            let b2 = cur.get_u8();
            let info = ((b0 as u32) << 16) | ((b1 as u32) << 8) | b2 as u32;
            let size = (info & 0x3FFF) as usize;
            let is_last = (info >> 16) & 0x1 != 0;
            let fragment_num = ((info >> 17) & 0x7F) as u8;

            if size > MAX_FRAGMENT_SIZE {
                return Err(SsuError::Framing(format!("fragment size {size} exceeds maximum")));
            }
            if cur.remaining() < size {
                return Err(SsuError::Framing("fragment size exceeds remaining datagram".into()));
            }
            let data = cur[..size].to_vec();
            cur.advance(size);

            fragments.push(WireFragment { msg_id, fragment_num, is_last, data });
        }

        Ok(Self { want_reply, explicit_acks, ack_bitfields, fragments })
    }

    pub fn write(&self, out: &mut BytesMut) -> Result<()> {
        if self.explicit_acks.len() > MAX_EXPLICIT_ACKS {
            return Err(SsuError::Framing("too many explicit ACKs".into()));
        }
        if self.ack_bitfields.len() > MAX_ACK_BITFIELD_ENTRIES {
            return Err(SsuError::Framing("too many ACK bitfield entries".into()));
        }

        let mut flags = 0u8;
        if self.want_reply {
            flags |= FLAG_WANT_REPLY;
        }
        if !self.explicit_acks.is_empty() {
            flags |= FLAG_EXPLICIT_ACKS;
        }
        if !self.ack_bitfields.is_empty() {
            flags |= FLAG_ACK_BITFIELDS;
        }
        out.put_u8(flags);

        if !self.explicit_acks.is_empty() {
            out.put_u8(self.explicit_acks.len() as u8);
            for id in &self.explicit_acks {
                out.put_u32(*id);
            }
        }

        if !self.ack_bitfields.is_empty() {
            out.put_u8(self.ack_bitfields.len() as u8);
            for entry in &self.ack_bitfields {
                out.put_u32(entry.msg_id);
                out.put_slice(&entry.bits);
            }
        }

        out.put_u8(self.fragments.len() as u8);
        for frag in &self.fragments {
            if frag.data.len() > MAX_FRAGMENT_SIZE {
                return Err(SsuError::Framing("fragment data exceeds maximum size".into()));
            }
            out.put_u32(frag.msg_id);
            let mut info = (frag.data.len() as u32) & 0x3FFF;
            if frag.is_last {
                info |= 1 << 16;
            }
            info |= (frag.fragment_num as u32 & 0x7F) << 17;
            out.put_u8(((info >> 16) & 0xFF) as u8);
            out.put_u8(((info >> 8) & 0xFF) as u8);
            out.put_u8((info & 0xFF) as u8);
            out.put_slice(&frag.data);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_packet_with_two_fragments_round_trips() {
        let pkt = DataPacket {
            want_reply: false,
            explicit_acks: vec![],
            ack_bitfields: vec![],
            fragments: vec![
                WireFragment { msg_id: 0x0A0B0C0D, fragment_num: 0, is_last: false, data: vec![0u8; 32] },
                WireFragment { msg_id: 0x0A0B0C0D, fragment_num: 1, is_last: true, data: vec![1u8; 32] },
            ],
        };
        let mut out = BytesMut::new();
        pkt.write(&mut out).expect("should serialize");
        let parsed = DataPacket::parse(&out).expect("should parse");
        assert_eq!(parsed.fragments.len(), 2);
        assert!(!parsed.fragments[0].is_last);
        assert!(parsed.fragments[1].is_last);
        assert_eq!(parsed.fragments[0].data, vec![0u8; 32]);
    }

    #[test]
    fn oversized_fragment_size_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(0); // flags
        buf.put_u8(1); // num_fragments
        buf.put_u32(1);
        // fragment info claiming max size, but no data follows
        buf.put_u8(0x3F);
        buf.put_u8(0xFF);
        buf.put_u8(0xFF);
        let err = DataPacket::parse(&buf).unwrap_err();
        assert!(matches!(err, SsuError::Framing(_)));
    }
}
