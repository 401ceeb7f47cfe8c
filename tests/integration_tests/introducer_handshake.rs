// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ssu_core::context::{IntroducerRef, RemoteSsuAddress, RouterContext, SsuAddress};
use ssu_core::session::state::SessionState;
use ssu_core::SsuServer;

use crate::integration_tests::common::{
    NullI2npSink, SinglePeerNetDatabase, TestDhPool, TestRouterContext, XorIdentity, XorLocalIdentity,
};

async fn wait_established(server: &Arc<SsuServer>, endpoint: SocketAddr) {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Some(entry) = server.sessions_by_endpoint.get(&endpoint) {
                if entry.value().session.lock().await.state == SessionState::Established {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("session to {endpoint} should reach Established"));
}

/// Alice cannot reach Charlie directly (his net-database record has no
/// `host`), so she goes through Bob: RelayRequest to Bob, Bob's RelayIntro to
/// Charlie, Charlie's HolePunch back to Alice, Bob's RelayResponse to Alice,
/// and finally a direct handshake between Alice and Charlie once the NAT
/// mapping is open.
#[tokio::test]
async fn introducer_path_establishes_alice_and_charlie() {
    let alice_addr: SocketAddr = "127.0.0.1:28920".parse().unwrap();
    let bob_addr: SocketAddr = "127.0.0.1:28921".parse().unwrap();
    let charlie_addr: SocketAddr = "127.0.0.1:28922".parse().unwrap();

    let alice_intro_key = [0x11u8; 32];
    let bob_intro_key = [0x22u8; 32];
    let charlie_intro_key = [0x33u8; 32];

    let alice_hash = [0xAAu8; 32];
    let bob_hash = [0xBBu8; 32];
    let charlie_hash = [0xCCu8; 32];

    let alice_identity = Arc::new(XorIdentity { hash: alice_hash });
    let bob_identity = Arc::new(XorIdentity { hash: bob_hash });
    let charlie_identity = Arc::new(XorIdentity { hash: charlie_hash });

    let relay_tag = 0x1234u32;

    // Alice only knows Charlie through Bob's introduction.
    let alice_net_db = Arc::new(SinglePeerNetDatabase {
        peer_hash: charlie_hash,
        peer_identity: charlie_identity.clone(),
        peer_address: RemoteSsuAddress {
            host: None,
            intro_key: charlie_intro_key,
            introducers: vec![IntroducerRef { host: bob_addr, intro_key: bob_intro_key, tag: relay_tag }],
        },
    });
    // Bob dials Charlie directly first, to seed `relay_tags`.
    let bob_net_db = Arc::new(SinglePeerNetDatabase {
        peer_hash: charlie_hash,
        peer_identity: charlie_identity.clone(),
        peer_address: RemoteSsuAddress { host: Some(charlie_addr), intro_key: charlie_intro_key, introducers: vec![] },
    });
    let charlie_net_db = Arc::new(SinglePeerNetDatabase {
        peer_hash: bob_hash,
        peer_identity: bob_identity.clone(),
        peer_address: RemoteSsuAddress { host: Some(bob_addr), intro_key: bob_intro_key, introducers: vec![] },
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
    let charlie_ctx: Arc<dyn RouterContext> = Arc::new(TestRouterContext {
        local_identity: Arc::new(XorLocalIdentity { identity: charlie_identity.clone() }),
        ssu_address: SsuAddress { host: charlie_addr, intro_key: charlie_intro_key },
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
    let charlie_server = Arc::new(
        SsuServer::bind(SsuAddress { host: charlie_addr, intro_key: charlie_intro_key }, charlie_ctx, charlie_net_db, Arc::new(NullI2npSink))
            .await
            .expect("charlie binds"),
    );

    let a = Arc::clone(&alice_server);
    tokio::spawn(async move { a.run_v4().await });
    let b = Arc::clone(&bob_server);
    tokio::spawn(async move { b.run_v4().await });
    let c = Arc::clone(&charlie_server);
    tokio::spawn(async move { c.run_v4().await });

    // Seed the introducer: Bob needs a live, established session to Charlie
    // before he can forward RelayIntro for `relay_tag`.
    bob_server.connect(charlie_hash).await.expect("bob should start a direct handshake with charlie");
    wait_established(&bob_server, charlie_addr).await;
    let bob_to_charlie =
        bob_server.sessions_by_endpoint.get(&charlie_addr).map(|e| e.value().clone()).expect("just established");
    bob_server.relay_tags.insert(relay_tag, bob_to_charlie);

    // Alice's peer record for Charlie has no direct host, so `connect()`
    // takes the introducer path and returns `None` immediately; the session
    // only appears once RelayResponse resolves Charlie's endpoint.
    let alice_handle = alice_server.connect(charlie_hash).await;
    assert!(alice_handle.is_none());

    wait_established(&alice_server, charlie_addr).await;
    wait_established(&charlie_server, alice_addr).await;
}
