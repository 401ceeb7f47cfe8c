// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Error taxonomy for the SSU core.
///
/// Each variant corresponds to one entry of the error taxonomy: framing
/// errors and MAC failures are dropped silently by the caller (they carry
/// no session-killing weight on their own), signature failures move a
/// session to `Failed`, and `Invariant` is the one variant whose caller is
/// expected to abort the process rather than recover.
#[derive(Debug, Error)]
pub enum SsuError {
    /// Malformed header or a declared length overruns the datagram.
    #[error("framing error: {0}")]
    Framing(String),

    /// HMAC-MD5 did not validate under any candidate key.
    #[error("MAC verification failed")]
    Mac,

    /// A handshake signature did not verify.
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// A connect or termination timer fired.
    #[error("timer expired: {0}")]
    Timeout(&'static str),

    /// A per-session inbox or table is full.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// The upstream I2NP sink applied backpressure.
    #[error("upstream sink rejected message")]
    UpstreamRejected,

    /// An internal invariant was violated. Recoverable nowhere; the caller
    /// must abort.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, SsuError>;
