// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared wire helpers: the variable-length `size || address` encoding used
//! by nearly every SSU payload.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, SsuError};

/// Read a `size(1) || address(size)` pair. `size` must be 4 or 16, or 0 if
/// `allow_empty` is set").
pub fn read_ip(buf: &mut &[u8], allow_empty: bool) -> Result<(usize, Option<IpAddr>)> {
    if buf.remaining() < 1 {
        return Err(SsuError::Framing("truncated before IP size".into()));
    }
    let size = buf.get_u8() as usize;
    match size {
        0 if allow_empty => Ok((0, None)),
        4 => {
            if buf.remaining() < 4 {
                return Err(SsuError::Framing("truncated before IPv4 address".into()));
            }
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&buf[..4]);
            buf.advance(4);
            Ok((4, Some(IpAddr::V4(Ipv4Addr::from(octets)))))
        },
        16 => {
            if buf.remaining() < 16 {
                return Err(SsuError::Framing("truncated before IPv6 address".into()));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            buf.advance(16);
            Ok((16, Some(IpAddr::V6(Ipv6Addr::from(octets)))))
        },
        other => Err(SsuError::Framing(format!("invalid IP size {other}"))),
    }
}

pub fn write_ip(out: &mut BytesMut, addr: Option<IpAddr>) {
    match addr {
        None => out.put_u8(0),
        Some(IpAddr::V4(v4)) => {
            out.put_u8(4);
            out.put_slice(&v4.octets());
        },
        Some(IpAddr::V6(v6)) => {
            out.put_u8(16);
            out.put_slice(&v6.octets());
        },
    }
}

pub fn read_len_prefixed<'a>(buf: &mut &'a [u8], max: usize) -> Result<&'a [u8]> {
    if buf.remaining() < 1 {
        return Err(SsuError::Framing("truncated before length prefix".into()));
    }
    let len = buf[0] as usize;
    buf.advance(1);
    if len > max {
        return Err(SsuError::Framing(format!("length {len} exceeds max {max}")));
    }
    if buf.remaining() < len {
        return Err(SsuError::Framing("length-prefixed field overruns datagram".into()));
    }
    let out = &buf[..len];
    buf.advance(len);
    Ok(out)
}
