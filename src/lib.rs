//! Framelink: a bidirectional framed TCP networking framework.
//!
//! Raw bytes flow from the socket through an async reader pump into a
//! circular buffer, where the packet framer carves out length-prefixed,
//! ID-tagged frames and hands them to a session's dispatch table. Outbound,
//! packets are framed atomically into the write buffer and drained to the
//! socket by a flush-interval writer pump. Client and server state machines
//! layer explicit lifecycle semantics on top, with every failure captured
//! into composable error chains for diagnostics.

mod client;
mod codec;
mod io;
mod network;
mod packet;
mod policy;
mod server;
mod service;
mod session;
mod util;

pub use client::{Client, ClientOptions, ClientState};
pub use codec::{PayloadReader, PayloadWriter};
pub use io::{OnClosed, RingBuffer, StreamReader, StreamWriter};
pub use network::{
    bind, connect, Connection, ConnectionSettings, PacketFramer, PacketReceiver, ID_BYTES,
    LENGTH_BYTES,
};
pub use packet::{
    MessagePacket, Packet, PacketId, PacketIds, PingPacket, PongPacket, SessionAcceptPacket,
    SessionRejectPacket, StockPackets,
};
pub use policy::{
    open_policy_factory, AcceptancePolicy, OpenPolicy, PolicyContext, PolicyFactory, PolicyOutcome,
};
pub use server::{AcceptFailedCallback, AcceptedCallback, Server, ServerOptions, ServerState};
pub use service::{
    setup_file_tracing, setup_local_tracing, AppConfig, AppError, AppResult, CloseSignal,
    NetworkConfig, TimingConfig,
};
pub use session::{DispatchTable, Session, SessionFactory, SessionHooks, SessionId, SessionIds};
pub use util::{ErrorChain, ErrorEntry};
