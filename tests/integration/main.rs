//! Treecast integration test harness.
//!
//! Most tests run several complete peers inside one process. Their outbound
//! queues are joined by an in-memory bus that hands every message to every
//! peer's router, the sender included, the same way multicast loopback does
//! on a real LAN. File handoffs use real TCP on 127.0.0.1.
//!
//! `multicast.rs` talks to a real multicast group and skips when the host
//! has no multicast route.
//!
//!   cargo test --test integration

mod concurrency;
mod discovery;
mod multicast;
mod transfer;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use treecast_core::{Identity, Message, TreecastConfig};
use treecast_services::{OutcomeLog, Peer, PeerContext, Router, Workers};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Every test peer lives on the loopback host so TCP handoffs connect.
pub const HOST: &str = "127.0.0.1";

/// One peer of a test LAN.
pub struct Node {
    pub peer: Arc<Peer>,
    pub outcomes: OutcomeLog,
    pub root: tempfile::TempDir,
}

impl Node {
    pub fn identity(&self) -> Identity {
        self.peer.identity().clone()
    }

    /// Write `contents` at the root-relative `path`, creating parents.
    pub fn put(&self, path: &str, contents: &[u8]) {
        let full = self.root.path().join(path.trim_start_matches('/'));
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, contents).unwrap();
    }

    pub fn has(&self, path: &str) -> bool {
        self.root.path().join(path.trim_start_matches('/')).exists()
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        std::fs::read(self.root.path().join(path.trim_start_matches('/'))).ok()
    }

    pub fn summaries(&self, request: &str) -> Vec<String> {
        self.outcomes
            .for_request(request)
            .into_iter()
            .map(|o| o.summary)
            .collect()
    }
}

/// Builder for a set of peers sharing one in-memory bus.
#[derive(Default)]
pub struct Lan {
    nodes: Vec<Node>,
    outbound: Vec<mpsc::UnboundedReceiver<Message>>,
    duplicate: bool,
}

/// A running LAN. Dropping it without `stop` leaves tasks to the runtime.
pub struct RunningLan {
    pub nodes: Vec<Node>,
    workers: Workers,
}

/// Config with every service on and a fast beacon.
pub fn open_config(root: &Path) -> TreecastConfig {
    let mut config = TreecastConfig::default();
    config.services.root_dir = root.to_path_buf();
    config.services.remote_browse = true;
    config.services.search = true;
    config.services.search_match = "path-filename-substring".into();
    config.services.download = true;
    config.services.upload = true;
    config.services.delete = true;
    config.timing.maximum_beacon_period_ms = 50;
    config.transfer.accept_timeout_ms = 5_000;
    config
}

impl Lan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver every message twice, as a flaky network might.
    pub fn duplicate_deliveries(mut self) -> Self {
        self.duplicate = true;
        self
    }

    /// Add a peer named `username@127.0.0.1` with `configure` applied on top
    /// of [`open_config`].
    pub fn peer(mut self, username: &str, configure: impl FnOnce(&mut TreecastConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = open_config(root.path());
        configure(&mut config);

        let outcomes = OutcomeLog::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = PeerContext::new(
            Identity::new(username, HOST),
            &config,
            tx,
            Arc::new(outcomes.clone()),
        );
        self.nodes.push(Node {
            peer: Arc::new(Peer::new(Arc::new(ctx))),
            outcomes,
            root,
        });
        self.outbound.push(rx);
        self
    }

    /// Start every peer's loops and the bus.
    pub fn start(self) -> RunningLan {
        let mut workers = Workers::new();
        let routers: Arc<Vec<Arc<Router>>> =
            Arc::new(self.nodes.iter().map(|n| n.peer.router()).collect());

        for mut rx in self.outbound {
            let routers = routers.clone();
            let duplicate = self.duplicate;
            workers.spawn("bus", move |mut shutdown| async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => return,
                        next = rx.recv() => {
                            let Some(message) = next else { return };
                            let copies = if duplicate { 2 } else { 1 };
                            for _ in 0..copies {
                                for router in routers.iter() {
                                    router.route(message.clone()).await;
                                }
                            }
                        }
                    }
                }
            });
        }

        for node in &self.nodes {
            node.peer.start(&mut workers, Duration::from_millis(20));
        }

        RunningLan {
            nodes: self.nodes,
            workers,
        }
    }
}

impl RunningLan {
    pub fn node(&self, i: usize) -> &Node {
        &self.nodes[i]
    }

    pub async fn stop(self) {
        self.workers.stop();
        tokio::time::timeout(Duration::from_secs(5), self.workers.join())
            .await
            .expect("every worker should stop");
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub const WAIT: Duration = Duration::from_secs(10);
