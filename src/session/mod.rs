//! Per-connection application sessions and packet dispatch.

pub use dispatch::DispatchTable;
pub use id::{SessionId, SessionIds};
pub use session::{Session, SessionFactory, SessionHooks};

mod dispatch;
mod id;
#[allow(clippy::module_inception)]
mod session;
