use crate::*;
use treecast_core::{Body, Capabilities, Header, SearchMatch};

/// Two peers hear each other's beacons, and their own through loopback.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peers_discover_each_other() {
    let lan = Lan::new()
        .peer("alice", |_| {})
        .peer("bob", |c| c.services.upload = false)
        .start();
    let (alice, bob) = (lan.node(0), lan.node(1));

    eventually(WAIT, || {
        alice.peer.directory().len() == 2 && bob.peer.directory().len() == 2
    })
    .await
    .unwrap();

    let seen = alice.peer.directory().find(&bob.identity()).unwrap();
    assert_eq!(seen.server_port, 4105);
    assert!(seen.capabilities.download);
    assert!(!seen.capabilities.upload);
    assert_eq!(seen.capabilities.search_match, SearchMatch::PathFilenameSubstring);
    assert!(alice.peer.directory().find(&alice.identity()).is_some());

    lan.stop().await;
}

/// A peer that stops announcing is dropped; live peers stay.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_peer_expires() {
    let lan = Lan::new()
        .peer("alice", |c| {
            c.timing.sleep_time_ms = 50;
            c.timing.maximum_beacon_period_ms = 300;
        })
        .peer("bob", |_| {})
        .start();
    let (alice, bob) = (lan.node(0), lan.node(1));

    let ghost = Identity::new("ghost", HOST);
    alice
        .peer
        .router()
        .route(Message::new(
            Header::now(ghost.clone(), 1),
            Body::Beacon {
                server_port: 4105,
                capabilities: Capabilities::default(),
            },
        ))
        .await;
    assert!(alice.peer.directory().find(&ghost).is_some());

    eventually(WAIT, || alice.peer.directory().find(&ghost).is_none())
        .await
        .unwrap();
    eventually(WAIT, || alice.peer.directory().find(&bob.identity()).is_some())
        .await
        .unwrap();

    lan.stop().await;
}
