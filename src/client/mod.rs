//! The client state machine: one endpoint of a framed connection.

#[allow(clippy::module_inception)]
mod client;
mod state;

pub use client::{Client, ClientOptions};
pub use state::ClientState;
