//! /status, /peers, /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use treecast_core::wire::{Capabilities, Family};
use treecast_services::BeaconView;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub identity: String,
    pub root_dir: String,
    pub server_port: u16,
    pub capabilities: Capabilities,
    pub peers_discovered: usize,
    pub pending: PendingInfo,
    pub outcomes: usize,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct PendingInfo {
    pub search: usize,
    pub download: usize,
    pub upload: usize,
    pub delete: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let peer = &state.peer;
    let ctx = peer.context();

    let pending = PendingInfo {
        search: peer.pending(Family::Search).await,
        download: peer.pending(Family::Download).await,
        upload: peer.pending(Family::Upload).await,
        delete: peer.pending(Family::Delete).await,
    };

    Json(StatusResponse {
        identity: ctx.identity.to_string(),
        root_dir: ctx.root.display().to_string(),
        server_port: ctx.server_port,
        capabilities: ctx.capabilities,
        peers_discovered: peer.directory().len(),
        pending,
        outcomes: state.outcomes.count(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<BeaconView>,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers = state
        .peer
        .directory()
        .entries()
        .iter()
        .map(BeaconView::from)
        .collect();

    Json(PeersResponse { peers })
}

// ── /daemon/shutdown ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::api;
    use treecast_core::wire::{Body, Header, Message};
    use treecast_core::Identity;

    #[tokio::test]
    async fn status_reports_identity_and_capabilities() {
        let t = api();
        let Json(status) = handle_status(State(t.state.clone())).await;
        assert_eq!(status.identity, "alice@127.0.0.1");
        assert!(status.capabilities.search);
        assert!(!status.capabilities.download);
        assert_eq!(status.peers_discovered, 0);
        assert_eq!(status.pending.search, 0);
    }

    #[tokio::test]
    async fn peers_lists_directory() {
        let t = api();
        let beacon = Message::new(
            Header::now(Identity::new("bob", "pc2"), 3),
            Body::Beacon {
                server_port: 4105,
                capabilities: Default::default(),
            },
        );
        t.state.peer.router().route(beacon).await;

        let Json(resp) = handle_peers(State(t.state.clone())).await;
        assert_eq!(resp.peers.len(), 1);
        assert_eq!(resp.peers[0].identity, "bob@pc2");
        assert_eq!(resp.peers[0].server_port, 4105);
    }

    #[tokio::test]
    async fn shutdown_fires_broadcast() {
        let mut t = api();
        let _ = handle_shutdown(State(t.state.clone())).await;
        assert!(t.shutdown_rx.try_recv().is_ok());
    }
}
