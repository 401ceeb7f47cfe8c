// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ssu_core::context::{RemoteSsuAddress, RouterContext, SsuAddress};
use ssu_core::session::state::SessionState;
use ssu_core::SsuServer;

use crate::integration_tests::common::{
    NullI2npSink, SinglePeerNetDatabase, TestDhPool, TestRouterContext, XorIdentity, XorLocalIdentity,
};

/// Drives a full SessionRequest/SessionCreated/SessionConfirmed handshake
/// between two live `SsuServer`s on loopback and checks both sides land in
/// `Established`.
#[tokio::test]
async fn direct_handshake_establishes_on_both_sides() {
    let alice_addr: SocketAddr = "127.0.0.1:28910".parse().unwrap();
    let bob_addr: SocketAddr = "127.0.0.1:28911".parse().unwrap();

    let alice_intro_key = [0x11u8; 32];
    let bob_intro_key = [0x22u8; 32];
    let alice_hash = [0xAAu8; 32];
    let bob_hash = [0xBBu8; 32];

    let alice_identity = Arc::new(XorIdentity { hash: alice_hash });
    let bob_identity = Arc::new(XorIdentity { hash: bob_hash });

    let alice_net_db = Arc::new(SinglePeerNetDatabase {
        peer_hash: bob_hash,
        peer_identity: bob_identity.clone(),
        peer_address: RemoteSsuAddress { host: Some(bob_addr), intro_key: bob_intro_key, introducers: vec![] },
    });
    let bob_net_db = Arc::new(SinglePeerNetDatabase {
        peer_hash: alice_hash,
        peer_identity: alice_identity.clone(),
        peer_address: RemoteSsuAddress { host: Some(alice_addr), intro_key: alice_intro_key, introducers: vec![] },
    });

    let alice_ctx: Arc<dyn RouterContext> = Arc::new(TestRouterContext {
        local_identity: Arc::new(XorLocalIdentity { identity: alice_identity.clone() }),
        ssu_address: SsuAddress { host: alice_addr, intro_key: alice_intro_key },
        dh_pool: Arc::new(TestDhPool),
    });
    let bob_ctx: Arc<dyn RouterContext> = Arc::new(TestRouterContext {
        local_identity: Arc::new(XorLocalIdentity { identity: bob_identity.clone() }),
        ssu_address: SsuAddress { host: bob_addr, intro_key: bob_intro_key },
        dh_pool: Arc::new(TestDhPool),
    });

    let alice_server = Arc::new(
        SsuServer::bind(SsuAddress { host: alice_addr, intro_key: alice_intro_key }, alice_ctx, alice_net_db, Arc::new(NullI2npSink))
            .await
            .expect("alice binds"),
    );
    let bob_server = Arc::new(
        SsuServer::bind(SsuAddress { host: bob_addr, intro_key: bob_intro_key }, bob_ctx, bob_net_db, Arc::new(NullI2npSink))
            .await
            .expect("bob binds"),
    );

    let a = Arc::clone(&alice_server);
    tokio::spawn(async move { a.run_v4().await });
    let b = Arc::clone(&bob_server);
    tokio::spawn(async move { b.run_v4().await });

    let handle = alice_server.connect(bob_hash).await.expect("alice should start a direct handshake");

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if handle.session.lock().await.state == SessionState::Established {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("alice's session should reach Established");

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(entry) = bob_server.sessions_by_endpoint.get(&alice_addr) {
                if entry.value().session.lock().await.state == SessionState::Established {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bob's session should reach Established");
}
