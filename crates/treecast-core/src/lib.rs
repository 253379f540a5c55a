//! treecast-core: wire format, peer identity, and configuration.
//! All other Treecast crates depend on this one.

pub mod config;
pub mod identity;
pub mod wire;

pub use config::TreecastConfig;
pub use identity::{Identity, SerialNumbers};
pub use wire::{Body, Capabilities, Family, Header, Message, SearchMatch, SearchType, WireError};
