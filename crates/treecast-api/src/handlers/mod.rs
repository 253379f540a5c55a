//! HTTP API handlers. Exposes peer state as JSON and accepts operator requests.

pub mod outcomes;
pub mod requests;
pub mod status;

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;

use treecast_core::Identity;
use treecast_services::{OutcomeLog, Peer, RequestError};

#[derive(Clone)]
pub struct ApiState {
    pub peer: Arc<Peer>,
    pub outcomes: OutcomeLog,
    /// Fires the daemon-wide shutdown broadcast.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
    pub started_at: Instant,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Parse a `username@hostname` peer identity.
fn parse_identity(s: &str) -> Result<Identity, (StatusCode, String)> {
    s.parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid peer: {e}")))
}

fn request_failed(e: RequestError) -> (StatusCode, String) {
    match e {
        RequestError::LocalFile { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
        RequestError::QueueClosed => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

pub use outcomes::handle_outcomes;
pub use requests::{handle_delete, handle_download, handle_search, handle_upload};
pub use status::{handle_peers, handle_shutdown, handle_status};
