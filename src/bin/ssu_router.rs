// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Standalone entry point: loads config, binds the UDP demultiplexer, and
//! runs the read loop. The identity, net-database, and I2NP sink here are
//! placeholder implementations — a real deployment embeds this crate
//! inside a router that supplies its own.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use ssu_core::cfg::cli::resolve_config_path;
use ssu_core::cfg::config::Config;
use ssu_core::cfg::logger::init_logger;
use ssu_core::context::{DhPool, NetDatabase, RemoteSsuAddress, RouterContext, SsuAddress};
use ssu_core::crypto::dh::DhKeyPair;
use ssu_core::identity::{IdentityHash, LocalIdentity, RouterIdentity, SharedIdentity};
use ssu_core::sink::I2npSink;
use ssu_core::SsuServer;
use tokio::signal;
use tracing::info;

#[derive(Debug)]
struct StandaloneIdentity {
    hash: IdentityHash,
}

impl RouterIdentity for StandaloneIdentity {
    fn hash(&self) -> IdentityHash {
        self.hash
    }

    fn signature_len(&self) -> usize {
        64
    }

    fn verify(&self, _data: &[u8], _sig: &[u8]) -> bool {
        false
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.hash.to_vec()
    }
}

struct StandaloneLocalIdentity {
    identity: SharedIdentity,
}

impl LocalIdentity for StandaloneLocalIdentity {
    fn identity(&self) -> SharedIdentity {
        Arc::clone(&self.identity)
    }

    fn sign(&self, _data: &[u8]) -> Vec<u8> {
        vec![0u8; self.identity.signature_len()]
    }
}

struct StandaloneDhPool;

impl DhPool for StandaloneDhPool {
    fn take(&self) -> DhKeyPair {
        DhKeyPair::generate()
    }
}

struct EmptyNetDatabase;

impl NetDatabase for EmptyNetDatabase {
    fn lookup(&self, _hash: &IdentityHash) -> Option<(SharedIdentity, RemoteSsuAddress)> {
        None
    }

    fn random_established_peer(&self) -> Option<IdentityHash> {
        None
    }
}

struct LoggingI2npSink;

#[async_trait]
impl I2npSink for LoggingI2npSink {
    async fn deliver_i2np(&self, msg: Vec<u8>, from: SharedIdentity) -> bool {
        info!(bytes = msg.len(), from = ?from.hash(), "delivered I2NP message to standalone sink");
        true
    }
}

struct StandaloneRouterContext {
    local_identity: Arc<dyn LocalIdentity>,
    ssu_address: SsuAddress,
    dh_pool: Arc<dyn DhPool>,
}

impl RouterContext for StandaloneRouterContext {
    fn local_identity(&self) -> Arc<dyn LocalIdentity> {
        Arc::clone(&self.local_identity)
    }

    fn ssu_address(&self) -> SsuAddress {
        self.ssu_address.clone()
    }

    fn dh_pool(&self) -> Arc<dyn DhPool> {
        Arc::clone(&self.dh_pool)
    }

    fn update_external_address(&self, observed: std::net::SocketAddr) {
        info!(%observed, "external address observed via SessionCreated");
    }

    fn decode_identity(&self, bytes: &[u8]) -> Option<SharedIdentity> {
        let hash: IdentityHash = Sha256::digest(bytes).into();
        Some(Arc::new(StandaloneIdentity { hash }))
    }
}

fn generate_intro_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

fn generate_identity_hash() -> IdentityHash {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.finalize().into()
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logger("config/logger.yaml").context("failed to initialize logger")?;

    let cfg = resolve_config_path("config/ssu.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let ssu_address = SsuAddress { host: cfg.address.bind_address_v4, intro_key: generate_intro_key() };

    let identity: SharedIdentity = Arc::new(StandaloneIdentity { hash: generate_identity_hash() });
    let router_context: Arc<dyn RouterContext> = Arc::new(StandaloneRouterContext {
        local_identity: Arc::new(StandaloneLocalIdentity { identity }),
        ssu_address: ssu_address.clone(),
        dh_pool: Arc::new(StandaloneDhPool),
    });
    let net_database: Arc<dyn NetDatabase> = Arc::new(EmptyNetDatabase);
    let i2np: Arc<dyn I2npSink> = Arc::new(LoggingI2npSink);

    let server = Arc::new(SsuServer::bind(ssu_address, router_context, net_database, i2np).await?);
    info!("ssu-router bound, entering read loop");

    let run_loop = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run_v4().await })
    };

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");
    server.stop();
    run_loop.await.context("read loop task panicked")?;

    Ok(())
}
