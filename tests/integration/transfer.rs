//! Search, download, upload and delete between two live peers.

use crate::*;
use treecast_core::{Family, SearchType};

fn two_peers(configure_bob: impl FnOnce(&mut TreecastConfig)) -> RunningLan {
    Lan::new()
        .peer("alice", |c| c.services.search = false)
        .peer("bob", configure_bob)
        .start()
}

// ── Search ────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_collects_every_responder() {
    let lan = two_peers(|_| {});
    let (alice, bob) = (lan.node(0), lan.node(1));
    bob.put("/docs/report.txt", b"q3");
    bob.put("/report-old.md", b"q2");
    bob.put("/notes.txt", b"misc");

    let key = alice
        .peer
        .search(SearchType::Substring, "report")
        .await
        .unwrap();

    // Two hits from bob, one refusal from alice herself.
    eventually(WAIT, || alice.summaries(&key).len() == 3).await.unwrap();
    let mut got = alice.summaries(&key);
    got.sort();
    assert_eq!(
        got,
        vec![
            "Search Result: '/docs/report.txt' At bob@127.0.0.1",
            "Search Result: '/report-old.md' At bob@127.0.0.1",
            "Search Result: No Result At alice@127.0.0.1",
        ]
    );

    // Search requests stay open for late responders.
    assert_eq!(alice.peer.pending(Family::Search).await, 1);
    assert_eq!(bob.outcomes.count(), 0);

    lan.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_type_beyond_advertised_match_gets_no_result() {
    let lan = two_peers(|c| c.services.search_match = "path".into());
    let (alice, bob) = (lan.node(0), lan.node(1));
    bob.put("/notes.txt", b"misc");

    let by_name = alice
        .peer
        .search(SearchType::Filename, "notes.txt")
        .await
        .unwrap();
    let by_path = alice.peer.search(SearchType::Path, "/notes.txt").await.unwrap();

    eventually(WAIT, || {
        alice.summaries(&by_name).len() == 2 && alice.summaries(&by_path).len() == 2
    })
    .await
    .unwrap();

    assert!(alice
        .summaries(&by_name)
        .contains(&"Search Result: No Result At bob@127.0.0.1".to_string()));
    assert!(alice
        .summaries(&by_path)
        .contains(&"Search Result: '/notes.txt' At bob@127.0.0.1".to_string()));

    lan.stop().await;
}

// ── Download ──────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_copies_file_over_tcp() {
    let lan = two_peers(|_| {});
    let (alice, bob) = (lan.node(0), lan.node(1));
    let song: Vec<u8> = (0..200_000u32).map(|i| (i % 253) as u8).collect();
    bob.put("/music/song.ogg", &song);

    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("song.ogg");
    let key = alice
        .peer
        .download(bob.identity(), "/music/song.ogg", dest.clone())
        .await
        .unwrap();

    eventually(WAIT, || !alice.summaries(&key).is_empty()).await.unwrap();
    assert_eq!(
        alice.summaries(&key),
        vec!["Successfully downloaded /music/song.ogg From bob@127.0.0.1"]
    );
    assert_eq!(std::fs::read(&dest).unwrap(), song);
    assert_eq!(alice.peer.pending(Family::Download).await, 0);

    lan.stop().await;
}

/// Bob finds alice through her beacon, then fetches a file from her.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_from_discovered_peer() {
    let lan = Lan::new().peer("alice", |_| {}).peer("bob", |_| {}).start();
    let (alice, bob) = (lan.node(0), lan.node(1));
    alice.put("/notes.txt", b"meeting at noon");

    eventually(WAIT, || bob.peer.directory().find(&alice.identity()).is_some())
        .await
        .unwrap();
    let found = bob.peer.directory().find(&alice.identity()).unwrap();
    assert!(found.capabilities.download);

    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("notes.txt");
    let key = bob
        .peer
        .download(found.identity, "/notes.txt", dest.clone())
        .await
        .unwrap();

    eventually(WAIT, || !bob.summaries(&key).is_empty()).await.unwrap();
    assert!(bob.summaries(&key)[0].starts_with("Successfully downloaded"));
    assert_eq!(std::fs::read(&dest).unwrap(), b"meeting at noon");

    lan.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_of_missing_file_fails() {
    let lan = two_peers(|_| {});
    let (alice, bob) = (lan.node(0), lan.node(1));

    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("ghost.txt");
    let key = alice
        .peer
        .download(bob.identity(), "/ghost.txt", dest.clone())
        .await
        .unwrap();

    eventually(WAIT, || !alice.summaries(&key).is_empty()).await.unwrap();
    assert_eq!(alice.summaries(&key), vec!["Could not download the file."]);
    assert!(!dest.exists());

    lan.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parent_segments_are_refused() {
    let lan = two_peers(|_| {});
    let (alice, bob) = (lan.node(0), lan.node(1));
    bob.put("/inside.txt", b"ok");

    let dest_dir = tempfile::tempdir().unwrap();
    let download = alice
        .peer
        .download(bob.identity(), "/../inside.txt", dest_dir.path().join("x"))
        .await
        .unwrap();
    let delete = alice
        .peer
        .delete(bob.identity(), "/sub/../inside.txt")
        .await
        .unwrap();

    eventually(WAIT, || {
        !alice.summaries(&download).is_empty() && !alice.summaries(&delete).is_empty()
    })
    .await
    .unwrap();
    assert_eq!(alice.summaries(&download), vec!["Could not download the file."]);
    assert_eq!(
        alice.summaries(&delete),
        vec!["Failed To Delete /sub/../inside.txt At bob@127.0.0.1"]
    );
    assert!(bob.has("/inside.txt"));

    lan.stop().await;
}

// ── Upload ────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_lands_in_remote_root() {
    let lan = two_peers(|_| {});
    let (alice, bob) = (lan.node(0), lan.node(1));

    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("draft.txt");
    std::fs::write(&src, b"first draft").unwrap();

    let key = alice
        .peer
        .upload(bob.identity(), src, "/incoming.txt")
        .await
        .unwrap();

    eventually(WAIT, || !alice.summaries(&key).is_empty()).await.unwrap();
    assert_eq!(
        alice.summaries(&key),
        vec!["Successfully Uploaded To /incoming.txt At bob@127.0.0.1"]
    );
    eventually(WAIT, || bob.read("/incoming.txt").as_deref() == Some(b"first draft".as_slice()))
        .await
        .unwrap();

    lan.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_replaces_existing_file() {
    let lan = two_peers(|_| {});
    let (alice, bob) = (lan.node(0), lan.node(1));
    bob.put("/taken.txt", b"original");

    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("new.txt");
    std::fs::write(&src, b"replacement").unwrap();

    let key = alice
        .peer
        .upload(bob.identity(), src, "/taken.txt")
        .await
        .unwrap();
    eventually(WAIT, || !alice.summaries(&key).is_empty()).await.unwrap();
    assert_eq!(
        alice.summaries(&key),
        vec!["Successfully Uploaded To /taken.txt At bob@127.0.0.1"]
    );
    eventually(WAIT, || bob.read("/taken.txt").as_deref() == Some(b"replacement".as_slice()))
        .await
        .unwrap();

    lan.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_refused_for_bad_targets_or_when_disabled() {
    let lan = two_peers(|_| {});
    let strict = Lan::new()
        .peer("carol", |c| c.services.upload = false)
        .start();
    let (alice, bob) = (lan.node(0), lan.node(1));
    bob.put("/docs/readme.txt", b"keep");

    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("new.txt");
    std::fs::write(&src, b"replacement").unwrap();

    // A directory, a name without an extension, and a missing parent.
    for remote in ["/docs", "/noext", "/missing/file.txt"] {
        let key = alice
            .peer
            .upload(bob.identity(), src.clone(), remote)
            .await
            .unwrap();
        eventually(WAIT, || !alice.summaries(&key).is_empty()).await.unwrap();
        assert_eq!(
            alice.summaries(&key),
            vec!["Could not upload the file."],
            "{remote} should be refused"
        );
    }
    assert!(!bob.has("/noext"));
    assert_eq!(bob.read("/docs/readme.txt").unwrap(), b"keep");

    // A peer with uploads off refuses even a fresh name. It is on its own
    // bus, so it answers its own request.
    let carol = strict.node(0);
    let key = carol
        .peer
        .upload(carol.identity(), src, "/fresh.txt")
        .await
        .unwrap();
    eventually(WAIT, || !carol.summaries(&key).is_empty()).await.unwrap();
    assert_eq!(carol.summaries(&key), vec!["Could not upload the file."]);
    assert!(!carol.has("/fresh.txt"));

    strict.stop().await;
    lan.stop().await;
}

// ── Delete ────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_removes_file_once() {
    let lan = two_peers(|_| {});
    let (alice, bob) = (lan.node(0), lan.node(1));
    bob.put("/old.log", b"noise");

    let first = alice.peer.delete(bob.identity(), "/old.log").await.unwrap();
    eventually(WAIT, || !alice.summaries(&first).is_empty()).await.unwrap();
    assert_eq!(
        alice.summaries(&first),
        vec!["Successfully deleted /old.log At bob@127.0.0.1"]
    );
    assert!(!bob.has("/old.log"));

    let second = alice.peer.delete(bob.identity(), "/old.log").await.unwrap();
    eventually(WAIT, || !alice.summaries(&second).is_empty()).await.unwrap();
    assert_eq!(
        alice.summaries(&second),
        vec!["Failed To Delete /old.log At bob@127.0.0.1"]
    );

    lan.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_for_unknown_peer_stays_pending() {
    let lan = two_peers(|_| {});
    let alice = lan.node(0);

    alice
        .peer
        .delete(Identity::new("nobody", HOST), "/x.txt")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(alice.outcomes.count(), 0);
    assert_eq!(alice.peer.pending(Family::Delete).await, 1);

    lan.stop().await;
}
