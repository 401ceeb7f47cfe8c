// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Upstream I2NP sink. A fully decompressed I2NP frame surviving
//! reassembly is handed here; everything above this boundary — tunnel
//! build logic, NetDb, streaming — is out of scope.

use async_trait::async_trait;

use crate::identity::SharedIdentity;

/// Delivers one decompressed I2NP message to the router core.
///
/// Implementations must not block. If delivery would block or the upstream
/// applies backpressure, return `false`; the SSU layer drops the message
/// and counts it rather than retrying.
#[async_trait]
pub trait I2npSink: Send + Sync {
    async fn deliver_i2np(&self, msg: Vec<u8>, from: SharedIdentity) -> bool;
}
