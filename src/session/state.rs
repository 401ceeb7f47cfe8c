// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session lifecycle states and the two handshake roles.

/// Lifecycle of one SSU session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unknown,
    Introduced,
    Established,
    Failed,
    Closed,
}

/// Which side of the handshake this session is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// We initiated: "Alice".
    Alice,
    /// We received the first SessionRequest: "Bob".
    Bob,
}

/// A session's role in an in-progress peer test. `None` unless
/// a test is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerTestRole {
    #[default]
    None,
    Alice1,
    Alice2,
    Bob,
    Charlie,
}
