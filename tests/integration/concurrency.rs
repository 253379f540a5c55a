//! Many requests in flight at once, with beacons and duplicate deliveries
//! interleaved.

use std::collections::HashSet;

use crate::*;
use treecast_core::{Body, Capabilities, Family, Header, SearchType};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_request_is_answered_exactly_once() {
    const N: usize = 25;

    // Expiry sweeps run every 20 ms on both peers throughout the batch.
    let busy = |c: &mut TreecastConfig| c.timing.sleep_time_ms = 20;
    let lan = Lan::new()
        .duplicate_deliveries()
        .peer("alice", busy)
        .peer("bob", busy)
        .start();
    let (alice, bob) = (lan.node(0), lan.node(1));
    for i in 0..N {
        bob.put(&format!("/batch/f{i}.dat"), format!("payload {i}").as_bytes());
    }

    // Extra beacon inserts on both routers while the requests are in flight.
    let routers = [alice.peer.router(), bob.peer.router()];
    let beacons = tokio::spawn(async move {
        for serial in 1u64.. {
            let ghost = Identity::new(&format!("ghost{}", serial % 7), HOST);
            let beacon = Message::new(
                Header::now(ghost, serial),
                Body::Beacon {
                    server_port: 4105,
                    capabilities: Capabilities::default(),
                },
            );
            for router in &routers {
                router.route(beacon.clone()).await;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    });

    let mut keys = Vec::new();
    for i in 0..N {
        let key = alice
            .peer
            .delete(bob.identity(), &format!("/batch/f{i}.dat"))
            .await
            .unwrap();
        keys.push(key);
    }
    assert_eq!(keys.iter().collect::<HashSet<_>>().len(), N);

    eventually(WAIT, || alice.outcomes.count() >= N).await.unwrap();
    // Let any late duplicate settle before counting.
    tokio::time::sleep(Duration::from_millis(200)).await;
    beacons.abort();

    assert_eq!(alice.outcomes.count(), N);
    for (i, key) in keys.iter().enumerate() {
        let got = alice.summaries(key);
        assert_eq!(
            got,
            vec![format!("Successfully deleted /batch/f{i}.dat At bob@127.0.0.1")]
        );
        assert!(!bob.has(&format!("/batch/f{i}.dat")));
    }
    assert_eq!(alice.peer.pending(Family::Delete).await, 0);

    lan.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_downloads_keep_their_destinations() {
    const N: usize = 8;

    let lan = Lan::new().peer("alice", |_| {}).peer("bob", |_| {}).start();
    let (alice, bob) = (lan.node(0), lan.node(1));
    for i in 0..N {
        bob.put(&format!("/f{i}.txt"), format!("file number {i}").as_bytes());
    }

    let dest_dir = tempfile::tempdir().unwrap();
    let requests = (0..N).map(|i| {
        let peer = alice.peer.clone();
        let bob_id = bob.identity();
        let dest = dest_dir.path().join(format!("got{i}.txt"));
        tokio::spawn(async move { peer.download(bob_id, &format!("/f{i}.txt"), dest).await })
    });
    let mut keys = Vec::new();
    for handle in requests.collect::<Vec<_>>() {
        keys.push(handle.await.unwrap().unwrap());
    }

    eventually(WAIT, || alice.outcomes.count() == N).await.unwrap();
    for key in &keys {
        assert_eq!(alice.summaries(key).len(), 1);
        assert!(alice.summaries(key)[0].starts_with("Successfully downloaded"));
    }
    for i in 0..N {
        let got = std::fs::read(dest_dir.path().join(format!("got{i}.txt"))).unwrap();
        assert_eq!(got, format!("file number {i}").as_bytes());
    }

    lan.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_searchers_see_only_their_answers() {
    let lan = Lan::new()
        .peer("alice", |c| c.services.search = false)
        .peer("carol", |c| c.services.search = false)
        .peer("bob", |_| {})
        .start();
    let (alice, carol, bob) = (lan.node(0), lan.node(1), lan.node(2));
    bob.put("/shared/photo.jpg", b"jpeg");

    let (a, c) = tokio::join!(
        alice.peer.search(SearchType::Filename, "photo.jpg"),
        carol.peer.search(SearchType::Filename, "photo.jpg"),
    );
    let (a, c) = (a.unwrap(), c.unwrap());

    // One answer from each of the three peers.
    eventually(WAIT, || {
        alice.summaries(&a).len() == 3 && carol.summaries(&c).len() == 3
    })
    .await
    .unwrap();

    let hit = "Search Result: '/shared/photo.jpg' At bob@127.0.0.1".to_string();
    assert!(alice.summaries(&a).contains(&hit));
    assert!(carol.summaries(&c).contains(&hit));
    assert!(alice.summaries(&c).is_empty());
    assert!(carol.summaries(&a).is_empty());
    assert_eq!(bob.outcomes.count(), 0);

    lan.stop().await;
}
