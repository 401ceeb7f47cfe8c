// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Connect, termination, and keep-alive timers.

use tokio::time::{Duration, Instant};

use crate::constants::{CONNECT_TIMEOUT, HANDSHAKE_RESEND_INTERVAL, TERMINATION_TIMEOUT};

/// Tracks the two session timers plus the keep-alive cadence. The executor
/// asks for the next deadline and sleeps until it in its `select!` loop.
pub struct Timers {
    connect_deadline: Option<Instant>,
    termination_deadline: Instant,
    resend_deadline: Option<Instant>,
}

impl Timers {
    /// Arm the connect timer; used only while a handshake is outstanding.
    pub fn start_handshake(now: Instant) -> Self {
        Self {
            connect_deadline: Some(now + CONNECT_TIMEOUT),
            termination_deadline: now + TERMINATION_TIMEOUT,
            resend_deadline: None,
        }
    }

    pub fn established(now: Instant) -> Self {
        Self { connect_deadline: None, termination_deadline: now + TERMINATION_TIMEOUT, resend_deadline: None }
    }

    /// Disarm the connect timer on reaching `Established`.
    pub fn clear_connect_timer(&mut self) {
        self.connect_deadline = None;
    }

    /// Rearm the sliding termination timer; called on every received packet.
    pub fn on_packet_received(&mut self, now: Instant) {
        self.termination_deadline = now + TERMINATION_TIMEOUT;
    }

    pub fn connect_expired(&self, now: Instant) -> bool {
        self.connect_deadline.is_some_and(|d| now >= d)
    }

    pub fn termination_expired(&self, now: Instant) -> bool {
        now >= self.termination_deadline
    }

    /// Arm (or rearm) the handshake resend sub-timer.
    pub fn arm_resend(&mut self, now: Instant) {
        self.resend_deadline = Some(now + HANDSHAKE_RESEND_INTERVAL);
    }

    /// Disarm the resend sub-timer once the handshake message it was
    /// covering is no longer outstanding.
    pub fn clear_resend(&mut self) {
        self.resend_deadline = None;
    }

    pub fn resend_due(&self, now: Instant) -> bool {
        self.resend_deadline.is_some_and(|d| now >= d)
    }

    /// Idle duration after which a keep-alive Data packet should be sent.
    pub fn keep_alive_interval() -> Duration {
        TERMINATION_TIMEOUT / 2
    }

    /// The earliest of the armed deadlines, for the executor's `select!`.
    pub fn next_deadline(&self) -> Instant {
        [self.connect_deadline, Some(self.termination_deadline), self.resend_deadline]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(self.termination_deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn connect_timer_expires_after_five_seconds() {
        let start = Instant::now();
        let timers = Timers::start_handshake(start);
        assert!(!timers.connect_expired(start));
        assert!(!timers.connect_expired(start + Duration::from_millis(4900)));
        assert!(timers.connect_expired(start + Duration::from_millis(5100)));
    }

    #[tokio::test(start_paused = true)]
    async fn receiving_a_packet_slides_the_termination_deadline() {
        let start = Instant::now();
        let mut timers = Timers::established(start);
        let later = start + Duration::from_secs(200);
        timers.on_packet_received(later);
        assert!(!timers.termination_expired(later + Duration::from_secs(329)));
        assert!(timers.termination_expired(later + Duration::from_secs(331)));
    }

    #[tokio::test(start_paused = true)]
    async fn resend_timer_fires_before_the_connect_timeout_and_clears_on_demand() {
        let start = Instant::now();
        let mut timers = Timers::start_handshake(start);
        timers.arm_resend(start);
        assert!(!timers.resend_due(start + Duration::from_millis(800)));
        assert!(timers.resend_due(start + Duration::from_millis(900)));
        timers.clear_resend();
        assert!(!timers.resend_due(start + Duration::from_secs(10)));
    }
}
