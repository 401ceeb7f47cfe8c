// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fragment reassembly and ACK/NACK bookkeeping for Data payloads.

pub mod ack;
pub mod framing;
pub mod reassembler;

pub use ack::AckScheduler;
pub use framing::build_fragments;
pub use reassembler::{Ingest, Reassembler};
