//! treecastd: Treecast peer daemon.
//!
//! Reads `treecast.toml`, joins the multicast group, and runs the beacon,
//! correlator and transport loops plus the local HTTP API until Ctrl-C or
//! `POST /api/daemon/shutdown`.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use treecast_core::{Identity, TreecastConfig};
use treecast_services::transport::{receive_loop, send_loop};
use treecast_services::{MulticastTransport, OutcomeLog, Peer, PeerContext, Workers};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let started_at = Instant::now();

    // Load config
    match TreecastConfig::write_default_if_missing() {
        Ok(path) => tracing::debug!(path = %path.display(), "config file"),
        Err(e) => tracing::warn!(error = %e, "failed to write default config"),
    }
    let mut config = TreecastConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        TreecastConfig::default()
    });
    for warning in config.sanitize() {
        tracing::warn!("config: {}", warning);
    }

    let root = config.services.root_dir.clone();
    if let Err(e) = std::fs::create_dir_all(&root) {
        tracing::warn!(error = %e, root = %root.display(), "could not create shared root");
    }

    let identity = Identity::detect(
        Some(config.identity.username.as_str()),
        Some(config.identity.hostname.as_str()),
    );
    tracing::info!(
        identity = %identity,
        root = %root.display(),
        server_port = config.network.server_port,
        capabilities = %config.capabilities(),
        "treecastd starting"
    );

    // Shared state
    let outcomes = OutcomeLog::new();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let ctx = Arc::new(PeerContext::new(
        identity,
        &config,
        outbound_tx,
        Arc::new(outcomes.clone()),
    ));
    let peer = Arc::new(Peer::new(ctx));

    let group = config.group_addr();
    let transport = Arc::new(
        MulticastTransport::bind(&config.network, group).with_context(|| {
            format!(
                "failed to join multicast group {}:{}",
                group, config.network.port
            )
        })?,
    );

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let mut workers = Workers::new();
    let recv_timeout = config.network.recv_timeout();

    {
        let transport = transport.clone();
        let router = peer.router();
        workers.spawn("multicast-receive", move |rx| {
            receive_loop(transport, router, recv_timeout, rx)
        });
    }
    workers.spawn("multicast-send", move |rx| {
        send_loop(transport, outbound_rx, rx)
    });

    peer.start(&mut workers, recv_timeout);

    let api_port = config.network.api_port;
    let state = treecast_api::ApiState {
        peer: peer.clone(),
        outcomes,
        shutdown_tx: workers.shutdown_handle(),
        started_at,
    };
    workers.spawn("api", move |rx| async move {
        if let Err(e) = treecast_api::serve(state, api_port, rx).await {
            tracing::error!(error = %e, port = api_port, "API server failed");
        }
    });

    tracing::info!(tasks = workers.len(), "treecastd running");

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = workers.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received"),
        _ = shutdown_rx.recv() => tracing::info!("shutdown requested over API"),
    }

    workers.stop();
    workers.join().await;
    tracing::info!("treecastd stopped");

    Ok(())
}
