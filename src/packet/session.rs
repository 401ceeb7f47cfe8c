// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SessionRequest, SessionCreated, and SessionConfirmed payloads. These
//! three carry the handshake's DH values and signature.

use std::net::IpAddr;

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::DH_PUBLIC_LEN;
use crate::error::{Result, SsuError};
use crate::packet::util::{read_ip, write_ip};

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub dh_x: [u8; DH_PUBLIC_LEN],
    /// Bob's IP as Alice believes it (almost always absent in practice; the
    /// field exists so the struct mirrors the wire format exactly).
    pub bob_ip: Option<IpAddr>,
}

impl SessionRequest {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = buf;
        if cur.remaining() < DH_PUBLIC_LEN {
            return Err(SsuError::Framing("SessionRequest truncated before DH X".into()));
        }
        let mut dh_x = [0u8; DH_PUBLIC_LEN];
        dh_x.copy_from_slice(&cur[..DH_PUBLIC_LEN]);
        cur.advance(DH_PUBLIC_LEN);

        let (_, bob_ip) = read_ip(&mut cur, false)?;
        Ok(Self { dh_x, bob_ip })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_slice(&self.dh_x);
        write_ip(out, self.bob_ip);
    }
}

#[derive(Debug, Clone)]
pub struct SessionCreated {
    pub dh_y: [u8; DH_PUBLIC_LEN],
    pub alice_ip: IpAddr,
    pub alice_port: u16,
    pub relay_tag: u32,
    pub signed_on_time: u32,
    /// Encrypted signature; length is determined by Bob's signing scheme
    /// and is therefore not self-describing on the wire.
    pub encrypted_signature: Vec<u8>,
}

impl SessionCreated {
    pub fn parse(buf: &[u8], signature_len: usize) -> Result<Self> {
        let mut cur = buf;
        if cur.remaining() < DH_PUBLIC_LEN {
            return Err(SsuError::Framing("SessionCreated truncated before DH Y".into()));
        }
        let mut dh_y = [0u8; DH_PUBLIC_LEN];
        dh_y.copy_from_slice(&cur[..DH_PUBLIC_LEN]);
        cur.advance(DH_PUBLIC_LEN);

        let (_, alice_ip) = read_ip(&mut cur, false)?;
        let alice_ip = alice_ip.ok_or_else(|| SsuError::Framing("missing Alice IP".into()))?;

        if cur.remaining() < 2 + 4 + 4 {
            return Err(SsuError::Framing("SessionCreated truncated before fixed fields".into()));
        }
        let alice_port = cur.get_u16();
        let relay_tag = cur.get_u32();
        let signed_on_time = cur.get_u32();

        if cur.remaining() < signature_len {
            return Err(SsuError::Framing("SessionCreated truncated before signature".into()));
        }
        let encrypted_signature = cur[..signature_len].to_vec();
        cur.advance(signature_len);

        Ok(Self { dh_y, alice_ip, alice_port, relay_tag, signed_on_time, encrypted_signature })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_slice(&self.dh_y);
        write_ip(out, Some(self.alice_ip));
        out.put_u16(self.alice_port);
        out.put_u32(self.relay_tag);
        out.put_u32(self.signed_on_time);
        out.put_slice(&self.encrypted_signature);
    }

    /// The byte tuple Bob signs and Alice verifies: `X || Y ||
    /// alice_ip || alice_port || bob_ip || bob_port || relay_tag ||
    /// signed_on_time`.
    pub fn signed_tuple(
        dh_x: &[u8; DH_PUBLIC_LEN],
        dh_y: &[u8; DH_PUBLIC_LEN],
        alice_ip: IpAddr,
        alice_port: u16,
        bob_ip: IpAddr,
        bob_port: u16,
        relay_tag: u32,
        signed_on_time: u32,
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(DH_PUBLIC_LEN * 2 + 32);
        out.extend_from_slice(dh_x);
        out.extend_from_slice(dh_y);
        push_ip(&mut out, alice_ip);
        out.extend_from_slice(&alice_port.to_be_bytes());
        push_ip(&mut out, bob_ip);
        out.extend_from_slice(&bob_port.to_be_bytes());
        out.extend_from_slice(&relay_tag.to_be_bytes());
        out.extend_from_slice(&signed_on_time.to_be_bytes());
        out
    }
}

fn push_ip(out: &mut Vec<u8>, ip: IpAddr) {
    match ip {
        IpAddr::V4(v4) => out.extend_from_slice(&v4.octets()),
        IpAddr::V6(v6) => out.extend_from_slice(&v6.octets()),
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfirmed {
    /// `0x01` for a single fragment; no multi-fragment SessionConfirmed is
    /// produced by this implementation.
    pub fragment_info: u8,
    pub identity: Vec<u8>,
    pub signed_on_time: u32,
    pub signature: Vec<u8>,
}

impl SessionConfirmed {
    pub fn parse(buf: &[u8], signature_len: usize) -> Result<Self> {
        let mut cur = buf;
        if cur.remaining() < 1 + 2 {
            return Err(SsuError::Framing("SessionConfirmed truncated before identity length".into()));
        }
        let fragment_info = cur.get_u8();
        let identity_len = cur.get_u16() as usize;
        if cur.remaining() < identity_len {
            return Err(SsuError::Framing("identity length overruns datagram".into()));
        }
        let identity = cur[..identity_len].to_vec();
        cur.advance(identity_len);

        if cur.remaining() < 4 {
            return Err(SsuError::Framing("SessionConfirmed truncated before signed_on_time".into()));
        }
        let signed_on_time = cur.get_u32();

        // Zero-pad to align the signature to the 16-byte packet boundary;
        // the padding length is implicit in what's left once the signature
        // is subtracted from the remainder.
        if cur.remaining() < signature_len {
            return Err(SsuError::Framing("SessionConfirmed truncated before signature".into()));
        }
        let pad_len = cur.remaining() - signature_len;
        cur.advance(pad_len);
        let signature = cur[..signature_len].to_vec();
        cur.advance(signature_len);

        Ok(Self { fragment_info, identity, signed_on_time, signature })
    }

    pub fn write(&self, out: &mut BytesMut, total_padded_len: usize) {
        out.put_u8(self.fragment_info);
        out.put_u16(self.identity.len() as u16);
        out.put_slice(&self.identity);
        out.put_u32(self.signed_on_time);

        let written_before_pad = 1 + 2 + self.identity.len() + 4;
        let remaining = total_padded_len.saturating_sub(written_before_pad + self.signature.len());
        if remaining > 0 {
            let mut pad = vec![0u8; remaining];
            crate::crypto::envelope::random_pad(&mut pad);
            out.put_slice(&pad);
        }
        out.put_slice(&self.signature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn session_confirmed_decode_recovers_signed_on_time_and_signature() {
        let identity_payload = vec![0xABu8; 387];
        let signature = vec![0x5Cu8; 64];
        let signed_on_time: u32 = 0x576904AA;

        let mut buf = BytesMut::new();
        buf.put_u8(0x01);
        buf.put_u16(identity_payload.len() as u16);
        buf.put_slice(&identity_payload);
        buf.put_u32(signed_on_time);
        buf.put_slice(&[0u8; 13]); // random padding, deterministic for the test
        buf.put_slice(&signature);

        let parsed = SessionConfirmed::parse(&buf, 64).expect("should parse");
        assert_eq!(parsed.signed_on_time, 1466500266);
        assert_eq!(parsed.signature, signature);
        assert_eq!(parsed.identity, identity_payload);
    }

    #[test]
    fn session_request_round_trips_with_ipv4_bob_address() {
        let req = SessionRequest {
            dh_x: [0x07u8; DH_PUBLIC_LEN],
            bob_ip: Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1))),
        };
        let mut out = BytesMut::new();
        req.write(&mut out);
        let parsed = SessionRequest::parse(&out).expect("should parse");
        assert_eq!(parsed.dh_x, req.dh_x);
        assert_eq!(parsed.bob_ip, req.bob_ip);
    }
}
