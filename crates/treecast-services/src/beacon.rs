//! Beacon directory: which peers are currently announcing themselves.
//!
//! Each peer multicasts a beacon every `maximum_beacon_period`. Received
//! beacons are upserted here keyed on `identity:serverPort`; an expiry task
//! removes entries that have not been refreshed within the same period.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use treecast_core::wire::{Body, Capabilities, Message, TIMESTAMP_FORMAT};
use treecast_core::Identity;

use crate::context::PeerContext;
use crate::workers::ticker;

/// Latest beacon seen from one peer.
#[derive(Debug, Clone)]
pub struct BeaconEntry {
    pub identity: Identity,
    pub server_port: u16,
    pub capabilities: Capabilities,
    /// Timestamp carried in the beacon header (sender's clock).
    pub sent_at: NaiveDateTime,
    /// Local receipt time. Expiry is measured against this.
    pub last_seen: Instant,
}

impl BeaconEntry {
    pub fn key(&self) -> String {
        entry_key(&self.identity, self.server_port)
    }
}

/// Serializable view of an entry for the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct BeaconView {
    pub identity: String,
    pub server_port: u16,
    pub capabilities: Capabilities,
    pub sent_at: String,
    pub age_ms: u64,
}

impl From<&BeaconEntry> for BeaconView {
    fn from(e: &BeaconEntry) -> Self {
        Self {
            identity: e.identity.to_string(),
            server_port: e.server_port,
            capabilities: e.capabilities,
            sent_at: e.sent_at.format(TIMESTAMP_FORMAT).to_string(),
            age_ms: e.last_seen.elapsed().as_millis() as u64,
        }
    }
}

pub fn entry_key(identity: &Identity, server_port: u16) -> String {
    format!("{}:{}", identity, server_port)
}

/// Concurrent table of live peers. Clones share the same table.
#[derive(Clone, Default)]
pub struct BeaconDirectory {
    entries: Arc<DashMap<String, BeaconEntry>>,
}

impl BeaconDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received beacon. Other kinds are ignored (returns false).
    pub fn observe(&self, message: &Message) -> bool {
        let Body::Beacon {
            server_port,
            capabilities,
        } = &message.body
        else {
            return false;
        };

        let entry = BeaconEntry {
            identity: message.header.identity.clone(),
            server_port: *server_port,
            capabilities: *capabilities,
            sent_at: message.header.timestamp,
            last_seen: Instant::now(),
        };
        let key = entry.key();
        if self.entries.insert(key.clone(), entry).is_none() {
            tracing::info!(peer = %key, "peer discovered");
        } else {
            tracing::trace!(peer = %key, "beacon refreshed");
        }
        true
    }

    /// Drop entries last seen more than `ttl` ago. Returns how many went.
    pub fn expire(&self, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let alive = entry.last_seen.elapsed() <= ttl;
            if !alive {
                tracing::info!(peer = %key, "peer expired");
            }
            alive
        });
        before.saturating_sub(self.entries.len())
    }

    /// Snapshot of every entry, ordered by key.
    pub fn entries(&self) -> Vec<BeaconEntry> {
        let mut all: Vec<BeaconEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|e| e.key());
        all
    }

    pub fn get(&self, key: &str) -> Option<BeaconEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Any entry announced by `identity`, whatever its server port.
    pub fn find(&self, identity: &Identity) -> Option<BeaconEntry> {
        self.entries
            .iter()
            .find(|e| e.value().identity == *identity)
            .map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Loops ─────────────────────────────────────────────────────────────────────

/// Announce this peer every `maximum_beacon_period` until shutdown.
pub async fn announce_loop(ctx: Arc<PeerContext>, mut shutdown: broadcast::Receiver<()>) {
    let period = ctx.timing.maximum_beacon_period();
    let mut interval = ticker(period);

    tracing::info!(
        identity = %ctx.identity,
        server_port = ctx.server_port,
        capabilities = %ctx.capabilities,
        period_ms = period.as_millis() as u64,
        "beacon announce starting"
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("beacon announce shutting down");
                return;
            }
            _ = interval.tick() => {
                let beacon = ctx.message(Body::Beacon {
                    server_port: ctx.server_port,
                    capabilities: ctx.capabilities,
                });
                ctx.send(beacon);
            }
        }
    }
}

/// Every `sleep_time`, remove entries older than `ttl`.
pub async fn expiry_loop(
    directory: BeaconDirectory,
    sleep_time: Duration,
    ttl: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = ticker(sleep_time);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("beacon expiry shutting down");
                return;
            }
            _ = interval.tick() => {
                let removed = directory.expire(ttl);
                if removed > 0 {
                    tracing::debug!(removed, remaining = directory.len(), "expired beacon entries");
                }
            }
        }
    }
}
