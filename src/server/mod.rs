//! The server state machine: hosting, accepting, and client tracking.

mod accept;
#[allow(clippy::module_inception)]
mod server;
mod state;

pub use server::{AcceptFailedCallback, AcceptedCallback, Server, ServerOptions};
pub use state::ServerState;
