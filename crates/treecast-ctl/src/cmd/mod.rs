//! CLI command modules.

pub mod http;
pub mod outcomes;
pub mod requests;
pub mod status;
