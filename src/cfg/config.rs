// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, net::SocketAddr, path::Path, time::Duration};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::{BindFamily, YesNo};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Our externally reachable address and intro key.
    pub address: AddressConfig,
    /// The protocol timing/sizing tunables a deployment may want to adjust.
    pub timing: TimingConfig,
    /// Runtime/process-level parameters outside the wire protocol.
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AddressConfig {
    #[serde(rename = "BindFamily")]
    pub bind_family: BindFamily,

    #[serde(rename = "BindAddressV4")]
    pub bind_address_v4: SocketAddr,

    #[serde(default, rename = "BindAddressV6")]
    pub bind_address_v6: Option<SocketAddr>,

    /// Whether this router offers itself to others as an introducer.
    #[serde(rename = "OfferIntroductions")]
    pub offer_introductions: YesNo,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    #[serde(rename = "ConnectTimeout", with = "serde_secs")]
    pub connect_timeout: Duration,

    #[serde(rename = "TerminationTimeout", with = "serde_secs")]
    pub termination_timeout: Duration,

    #[serde(rename = "QuickAckDelayMillis")]
    pub quick_ack_delay_millis: u64,

    #[serde(rename = "MaxHandshakeResends")]
    pub max_handshake_resends: u32,

    #[serde(rename = "DedupeWindow")]
    pub dedupe_window: usize,

    #[serde(rename = "CompressionThreshold")]
    pub compression_threshold: usize,

    #[serde(rename = "MaxIntroducers")]
    pub max_introducers: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(rename = "MaxSessions")]
    pub max_sessions: u32,

    #[serde(rename = "SessionInboxCapacity")]
    pub session_inbox_capacity: usize,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    pub fn validate_and_normalize(&mut self) -> Result<()> {
        if self.address.bind_family == BindFamily::DualStack {
            ensure!(
                self.address.bind_address_v6.is_some(),
                "BindAddressV6 is required when BindFamily is dual"
            );
        }
        ensure!(self.timing.max_introducers >= 1, "MaxIntroducers must be >= 1");
        ensure!(self.timing.dedupe_window >= 1, "DedupeWindow must be >= 1");
        ensure!(self.runtime.max_sessions >= 1, "MaxSessions must be >= 1");
        ensure!(
            self.runtime.session_inbox_capacity >= 1,
            "SessionInboxCapacity must be >= 1"
        );
        Ok(())
    }
}

mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_stack_without_v6_address_is_rejected() {
        let mut cfg = Config {
            address: AddressConfig {
                bind_family: BindFamily::DualStack,
                bind_address_v4: "0.0.0.0:12345".parse().unwrap(),
                bind_address_v6: None,
                offer_introductions: YesNo::No,
            },
            timing: TimingConfig {
                connect_timeout: Duration::from_secs(5),
                termination_timeout: Duration::from_secs(330),
                quick_ack_delay_millis: 200,
                max_handshake_resends: 6,
                dedupe_window: 1000,
                compression_threshold: 66,
                max_introducers: 3,
            },
            runtime: RuntimeConfig { max_sessions: 1000, session_inbox_capacity: 128 },
        };
        assert!(cfg.validate_and_normalize().is_err());
    }
}
