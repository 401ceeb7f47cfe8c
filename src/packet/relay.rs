// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RelayRequest, RelayResponse, and RelayIntro — the three introducer
//! messages used for NAT traversal.

use std::net::{IpAddr, Ipv4Addr};

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::INTRO_KEY_LEN;
use crate::error::{Result, SsuError};
use crate::packet::util::{read_ip, read_len_prefixed, write_ip};

#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub relay_tag: u32,
    pub alice_ip: Option<IpAddr>,
    pub alice_port: u16,
    pub challenge: Vec<u8>,
    pub alice_intro_key: [u8; INTRO_KEY_LEN],
    pub nonce: u32,
}

impl RelayRequest {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = buf;
        if cur.remaining() < 4 {
            return Err(SsuError::Framing("RelayRequest truncated before relay tag".into()));
        }
        let relay_tag = cur.get_u32();
        let (_, alice_ip) = read_ip(&mut cur, true)?;
        if cur.remaining() < 2 {
            return Err(SsuError::Framing("RelayRequest truncated before Alice port".into()));
        }
        let alice_port = cur.get_u16();
        let challenge = read_len_prefixed(&mut cur, 255)?.to_vec();

        if cur.remaining() < INTRO_KEY_LEN + 4 {
            return Err(SsuError::Framing("RelayRequest truncated before intro key/nonce".into()));
        }
        let mut alice_intro_key = [0u8; INTRO_KEY_LEN];
        alice_intro_key.copy_from_slice(&cur[..INTRO_KEY_LEN]);
        cur.advance(INTRO_KEY_LEN);
        let nonce = cur.get_u32();

        Ok(Self { relay_tag, alice_ip, alice_port, challenge, alice_intro_key, nonce })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_u32(self.relay_tag);
        write_ip(out, self.alice_ip);
        out.put_u16(self.alice_port);
        out.put_u8(self.challenge.len() as u8);
        out.put_slice(&self.challenge);
        out.put_slice(&self.alice_intro_key);
        out.put_u32(self.nonce);
    }
}

#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub charlie_ip: Ipv4Addr,
    pub charlie_port: u16,
    pub alice_ip: IpAddr,
    pub alice_port: u16,
    pub nonce: u32,
}

impl RelayResponse {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = buf;
        let (size, charlie_ip) = read_ip(&mut cur, false)?;
        if size != 4 {
            return Err(SsuError::Framing("RelayResponse Charlie IP must be IPv4".into()));
        }
        let charlie_ip = match charlie_ip {
            Some(IpAddr::V4(v4)) => v4,
            _ => return Err(SsuError::Framing("RelayResponse Charlie IP must be IPv4".into())),
        };
        if cur.remaining() < 2 {
            return Err(SsuError::Framing("RelayResponse truncated before Charlie port".into()));
        }
        let charlie_port = cur.get_u16();

        let (_, alice_ip) = read_ip(&mut cur, false)?;
        let alice_ip = alice_ip.ok_or_else(|| SsuError::Framing("missing Alice IP".into()))?;
        if cur.remaining() < 2 + 4 {
            return Err(SsuError::Framing("RelayResponse truncated before Alice port/nonce".into()));
        }
        let alice_port = cur.get_u16();
        let nonce = cur.get_u32();

        Ok(Self { charlie_ip, charlie_port, alice_ip, alice_port, nonce })
    }

    pub fn write(&self, out: &mut BytesMut) {
        write_ip(out, Some(IpAddr::V4(self.charlie_ip)));
        out.put_u16(self.charlie_port);
        write_ip(out, Some(self.alice_ip));
        out.put_u16(self.alice_port);
        out.put_u32(self.nonce);
    }
}

#[derive(Debug, Clone)]
pub struct RelayIntro {
    pub alice_ip: Ipv4Addr,
    pub alice_port: u16,
    pub challenge: Vec<u8>,
}

impl RelayIntro {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = buf;
        let (size, alice_ip) = read_ip(&mut cur, false)?;
        if size != 4 {
            return Err(SsuError::Framing("RelayIntro Alice IP must be IPv4".into()));
        }
        let alice_ip = match alice_ip {
            Some(IpAddr::V4(v4)) => v4,
            _ => return Err(SsuError::Framing("RelayIntro Alice IP must be IPv4".into())),
        };
        if cur.remaining() < 2 {
            return Err(SsuError::Framing("RelayIntro truncated before Alice port".into()));
        }
        let alice_port = cur.get_u16();
        let challenge = read_len_prefixed(&mut cur, 255)?.to_vec();

        Ok(Self { alice_ip, alice_port, challenge })
    }

    pub fn write(&self, out: &mut BytesMut) {
        write_ip(out, Some(IpAddr::V4(self.alice_ip)));
        out.put_u16(self.alice_port);
        out.put_u8(self.challenge.len() as u8);
        out.put_slice(&self.challenge);
    }
}
