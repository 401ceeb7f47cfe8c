// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The SSU (Secure Semi-reliable UDP) transport layer: packet codec,
//! crypto envelope, session state machine, fragment reassembly,
//! demultiplexer, and introducer/peer-test coordination.
//!
//! This crate is the session layer only. Tunnel building, NetDb, and
//! streaming live above the [`sink::I2npSink`] boundary and are provided
//! by the enclosing router through [`context::RouterContext`].

/// Command-line, config-file, and logging setup.
pub mod cfg;
/// Wire-format and timing constants shared across the crate.
pub mod constants;
/// External collaborators the router provides: identity, net-database, DH pool.
pub mod context;
/// AES-256-CBC/HMAC-MD5 envelope and Diffie-Hellman key agreement.
pub mod crypto;
/// The crate's error taxonomy.
pub mod error;
/// Message fragmentation, reassembly, and ack scheduling.
pub mod fragment;
/// Router and destination identity types.
pub mod identity;
/// NAT traversal: peer tests and relay-tag based indirect handshakes.
pub mod introducer;
/// The SSU wire codec: header, session, relay, peer-test, and data payloads.
pub mod packet;
/// The UDP demultiplexer owning sessions, relay tags, and peer tests.
pub mod server;
/// Per-peer session state machine, handshake, timers, and executor.
pub mod session;
/// The upstream I2NP delivery boundary.
pub mod sink;

pub use context::{DhPool, NetDatabase, RouterContext, SsuAddress};
pub use error::{Result, SsuError};
pub use server::SsuServer;
pub use sink::I2npSink;
