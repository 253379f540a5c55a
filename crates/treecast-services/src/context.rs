//! Per-peer state shared by every worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use treecast_core::config::{TimingConfig, TreecastConfig};
use treecast_core::wire::{Body, Capabilities, Header, Message};
use treecast_core::{Identity, SerialNumbers};

use crate::outcome::{Outcome, OutcomeSink};

/// Who this peer is, what it offers, and where its messages go.
///
/// Built once at startup and handed to each component behind an `Arc`.
pub struct PeerContext {
    pub identity: Identity,
    pub serials: SerialNumbers,
    /// Root of the shared file tree.
    pub root: PathBuf,
    /// Port advertised in beacons.
    pub server_port: u16,
    pub capabilities: Capabilities,
    pub timing: TimingConfig,
    pub accept_timeout: Duration,
    outbound: mpsc::UnboundedSender<Message>,
    sink: Arc<dyn OutcomeSink>,
}

impl PeerContext {
    pub fn new(
        identity: Identity,
        config: &TreecastConfig,
        outbound: mpsc::UnboundedSender<Message>,
        sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        Self {
            identity,
            serials: SerialNumbers::new(),
            root: config.services.root_dir.clone(),
            server_port: config.network.server_port,
            capabilities: config.capabilities(),
            timing: config.timing.clone(),
            accept_timeout: config.transfer.accept_timeout(),
            outbound,
            sink,
        }
    }

    /// Fresh header with the next serial number.
    pub fn header(&self) -> Header {
        Header::now(self.identity.clone(), self.serials.next())
    }

    /// Stamp `body` with a fresh header.
    pub fn message(&self, body: Body) -> Message {
        Message::new(self.header(), body)
    }

    /// Queue a message for the transport. False if the send worker is gone.
    pub fn send(&self, message: Message) -> bool {
        let kind = message.body.kind();
        match self.outbound.send(message) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(%kind, "outbound queue closed, message dropped");
                false
            }
        }
    }

    pub fn present(&self, outcome: Outcome) {
        self.sink.present(outcome);
    }

    /// Whether `identity` names this peer.
    pub fn is_local(&self, identity: &Identity) -> bool {
        *identity == self.identity
    }
}
