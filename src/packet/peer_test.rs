// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PeerTest and SessionDestroyed payloads.

use std::net::IpAddr;

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::INTRO_KEY_LEN;
use crate::error::{Result, SsuError};
use crate::packet::util::{read_ip, write_ip};

#[derive(Debug, Clone)]
pub struct PeerTest {
    pub nonce: u32,
    pub ip: Option<IpAddr>,
    pub port: u16,
    pub intro_key: [u8; INTRO_KEY_LEN],
}

impl PeerTest {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = buf;
        if cur.remaining() < 4 {
            return Err(SsuError::Framing("PeerTest truncated before nonce".into()));
        }
        let nonce = cur.get_u32();
        let (_, ip) = read_ip(&mut cur, true)?;
        if cur.remaining() < 2 + INTRO_KEY_LEN {
            return Err(SsuError::Framing("PeerTest truncated before port/intro key".into()));
        }
        let port = cur.get_u16();
        let mut intro_key = [0u8; INTRO_KEY_LEN];
        intro_key.copy_from_slice(&cur[..INTRO_KEY_LEN]);
        cur.advance(INTRO_KEY_LEN);

        Ok(Self { nonce, ip, port, intro_key })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_u32(self.nonce);
        write_ip(out, self.ip);
        out.put_u16(self.port);
        out.put_slice(&self.intro_key);
    }
}

/// SessionDestroyed carries no body.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionDestroyed;

impl SessionDestroyed {
    pub fn parse(_buf: &[u8]) -> Result<Self> {
        Ok(Self)
    }

    pub fn write(&self, _out: &mut BytesMut) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_test_round_trips_with_empty_address() {
        let pt = PeerTest { nonce: 7, ip: None, port: 0, intro_key: [0x9u8; INTRO_KEY_LEN] };
        let mut out = BytesMut::new();
        pt.write(&mut out);
        let parsed = PeerTest::parse(&out).expect("should parse");
        assert_eq!(parsed.nonce, 7);
        assert!(parsed.ip.is_none());
        assert_eq!(parsed.intro_key, pt.intro_key);
    }
}
