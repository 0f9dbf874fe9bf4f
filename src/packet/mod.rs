//! Packets: the unit of application messaging.
//!
//! A packet is ephemeral: constructed per send or receive, identified by a
//! 2-byte ID assigned from a [`PacketIds`] registry at process start, and
//! carrying its own payload encode/decode logic.

pub use registry::PacketIds;
pub use stock::{
    MessagePacket, PingPacket, PongPacket, SessionAcceptPacket, SessionRejectPacket, StockPackets,
};

mod registry;
mod stock;

use crate::codec::{PayloadReader, PayloadWriter};
use crate::service::AppResult;

/// 2-byte wire identifier of a packet type. Stable for the process
/// lifetime; stability across processes requires registering types in
/// identical order.
pub type PacketId = u16;

pub trait Packet: Send {
    fn id(&self) -> PacketId;

    /// Decodes the payload. The reader is bounded to this frame's payload;
    /// a decode error disconnects the receiving client.
    fn read(&mut self, reader: &mut PayloadReader<'_>) -> AppResult<()>;

    /// Encodes the payload. Writing goes to the in-memory frame buffer and
    /// cannot fail.
    fn write(&self, writer: &mut PayloadWriter<'_>);
}
