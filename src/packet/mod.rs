// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The SSU packet codec: one `Packet` enum over the nine payload types,
//! with free `parse_body`/`write_body` functions doing the dispatch.

pub mod data;
pub mod header;
pub mod relay;
pub mod session;
pub mod peer_test;
mod util;

use bytes::BytesMut;

pub use data::{AckBitfield, DataPacket, WireFragment};
pub use header::{Header, PayloadType};
pub use peer_test::{PeerTest, SessionDestroyed};
pub use relay::{RelayIntro, RelayRequest, RelayResponse};
pub use session::{SessionConfirmed, SessionCreated, SessionRequest};

use crate::error::Result;

/// A fully parsed SSU datagram body, tagged by payload type.
#[derive(Debug, Clone)]
pub enum Packet {
    SessionRequest(SessionRequest),
    SessionCreated(SessionCreated),
    SessionConfirmed(SessionConfirmed),
    RelayRequest(RelayRequest),
    RelayResponse(RelayResponse),
    RelayIntro(RelayIntro),
    Data(DataPacket),
    PeerTest(PeerTest),
    SessionDestroyed(SessionDestroyed),
}

impl Packet {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Self::SessionRequest(_) => PayloadType::SessionRequest,
            Self::SessionCreated(_) => PayloadType::SessionCreated,
            Self::SessionConfirmed(_) => PayloadType::SessionConfirmed,
            Self::RelayRequest(_) => PayloadType::RelayRequest,
            Self::RelayResponse(_) => PayloadType::RelayResponse,
            Self::RelayIntro(_) => PayloadType::RelayIntro,
            Self::Data(_) => PayloadType::Data,
            Self::PeerTest(_) => PayloadType::PeerTest,
            Self::SessionDestroyed(_) => PayloadType::SessionDestroyed,
        }
    }
}

/// Parse a payload body given its type. `signature_len` is only consulted
/// for `SessionCreated`/`SessionConfirmed`, whose signature is not
/// self-describing on the wire; callers that don't yet know
/// the peer's signing scheme should pass the local default.
pub fn parse_body(payload_type: PayloadType, buf: &[u8], signature_len: usize) -> Result<Packet> {
    Ok(match payload_type {
        PayloadType::SessionRequest => Packet::SessionRequest(SessionRequest::parse(buf)?),
        PayloadType::SessionCreated => {
            Packet::SessionCreated(SessionCreated::parse(buf, signature_len)?)
        },
        PayloadType::SessionConfirmed => {
            Packet::SessionConfirmed(SessionConfirmed::parse(buf, signature_len)?)
        },
        PayloadType::RelayRequest => Packet::RelayRequest(RelayRequest::parse(buf)?),
        PayloadType::RelayResponse => Packet::RelayResponse(RelayResponse::parse(buf)?),
        PayloadType::RelayIntro => Packet::RelayIntro(RelayIntro::parse(buf)?),
        PayloadType::Data => Packet::Data(DataPacket::parse(buf)?),
        PayloadType::PeerTest => Packet::PeerTest(PeerTest::parse(buf)?),
        PayloadType::SessionDestroyed => Packet::SessionDestroyed(SessionDestroyed::parse(buf)?),
    })
}

/// Serialize a payload body into `out`. `total_padded_len` is only
/// consulted for `SessionConfirmed`, whose trailing pad depends on the
/// 16-byte block alignment of the whole datagram.
pub fn write_body(packet: &Packet, out: &mut BytesMut, total_padded_len: usize) -> Result<()> {
    match packet {
        Packet::SessionRequest(p) => p.write(out),
        Packet::SessionCreated(p) => p.write(out),
        Packet::SessionConfirmed(p) => p.write(out, total_padded_len),
        Packet::RelayRequest(p) => p.write(out),
        Packet::RelayResponse(p) => p.write(out),
        Packet::RelayIntro(p) => p.write(out),
        Packet::Data(p) => p.write(out)?,
        Packet::PeerTest(p) => p.write(out),
        Packet::SessionDestroyed(p) => p.write(out),
    }
    Ok(())
}
