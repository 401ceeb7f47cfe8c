// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-session key material and the key-selection table that
//! decides which key pair an outbound or inbound datagram is sealed/opened
//! with.

use crate::crypto::dh::DerivedKeys;

/// All symmetric key material a session may hold across its lifetime.
/// `session_key`/`mac_key` are `None` until the handshake completes and are
/// cleared again on session teardown.
#[derive(Clone, Default)]
pub struct SessionKeys {
    pub session_key: Option<[u8; 32]>,
    pub mac_key: Option<[u8; 32]>,
    /// The remote peer's long-lived intro key, known from the moment we
    /// decide to contact them (outbound) or from the moment we decrypt
    /// their first SessionRequest under our own intro key (inbound).
    pub remote_intro_key: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("established", &self.session_key.is_some())
            .finish()
    }
}

impl SessionKeys {
    pub fn new(remote_intro_key: [u8; 32]) -> Self {
        Self { session_key: None, mac_key: None, remote_intro_key }
    }

    pub fn install(&mut self, derived: DerivedKeys) {
        self.session_key = Some(derived.session_key);
        self.mac_key = Some(derived.mac_key);
    }

    pub fn is_established(&self) -> bool {
        self.session_key.is_some() && self.mac_key.is_some()
    }

    /// The `(aes_key, mac_key)` pair to use for datagrams to or from this
    /// peer. Before a session exists this falls back to the intro key for
    /// both roles, since AES and MAC keys are identical in every
    /// pre-established case.
    pub fn active_keys(&self) -> (&[u8; 32], &[u8; 32]) {
        match (&self.session_key, &self.mac_key) {
            (Some(sk), Some(mk)) => (sk, mk),
            _ => (&self.remote_intro_key, &self.remote_intro_key),
        }
    }

    /// Clear DH-derived state, releasing it for GC once no longer needed
    /// (e.g. on session failure).
    pub fn clear_session_keys(&mut self) {
        self.session_key = None;
        self.mac_key = None;
    }
}
