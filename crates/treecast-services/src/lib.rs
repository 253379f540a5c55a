//! treecast-services: the protocol engine of a Treecast peer.
//!
//! Beacon directory, per-family correlators, the router that feeds them,
//! the filesystem side of each request, and the TCP transfer handoff.

pub mod beacon;
pub mod context;
pub mod correlator;
pub mod files;
pub mod handoff;
pub mod outcome;
pub mod peer;
pub mod router;
pub mod transport;
pub mod workers;

pub use beacon::{BeaconDirectory, BeaconEntry, BeaconView};
pub use context::PeerContext;
pub use correlator::{Correlator, PendingRequest};
pub use files::Denied;
pub use handoff::TransferError;
pub use outcome::{Outcome, OutcomeLog, OutcomeSink};
pub use peer::{Peer, RequestError};
pub use router::Router;
pub use transport::{MulticastTransport, TransportError};
pub use workers::Workers;
