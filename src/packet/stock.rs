// Copyright 2025 The Framelink Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::codec::{PayloadReader, PayloadWriter};
use crate::service::AppResult;

use super::{Packet, PacketId, PacketIds};

/// The packet types the framework itself speaks.
///
/// Allocated in a fixed order so both ends of a connection agree on the
/// wire IDs as long as they register from equivalent registries.
#[derive(Debug, Clone, Copy)]
pub struct StockPackets {
    pub ping: PacketId,
    pub pong: PacketId,
    pub message: PacketId,
    pub session_accept: PacketId,
    pub session_reject: PacketId,
}

impl StockPackets {
    pub fn register(ids: &PacketIds) -> StockPackets {
        StockPackets {
            ping: ids.allocate(),
            pong: ids.allocate(),
            message: ids.allocate(),
            session_accept: ids.allocate(),
            session_reject: ids.allocate(),
        }
    }
}

/// Latency probe. Carries the sender's epoch-millis send time so the peer
/// can echo it back in a [`PongPacket`].
#[derive(Debug)]
pub struct PingPacket {
    id: PacketId,
    pub sent_at: i64,
}

impl PingPacket {
    pub fn new(id: PacketId, sent_at: i64) -> PingPacket {
        PingPacket { id, sent_at }
    }

    pub fn empty(id: PacketId) -> PingPacket {
        PingPacket { id, sent_at: 0 }
    }
}

impl Packet for PingPacket {
    fn id(&self) -> PacketId {
        self.id
    }

    fn read(&mut self, reader: &mut PayloadReader<'_>) -> AppResult<()> {
        self.sent_at = reader.read_i64()?;
        Ok(())
    }

    fn write(&self, writer: &mut PayloadWriter<'_>) {
        writer.write_i64(self.sent_at);
    }
}

#[derive(Debug)]
pub struct PongPacket {
    id: PacketId,
    /// The `sent_at` of the ping being answered.
    pub sent_at: i64,
}

impl PongPacket {
    pub fn new(id: PacketId, sent_at: i64) -> PongPacket {
        PongPacket { id, sent_at }
    }

    pub fn empty(id: PacketId) -> PongPacket {
        PongPacket { id, sent_at: 0 }
    }
}

impl Packet for PongPacket {
    fn id(&self) -> PacketId {
        self.id
    }

    fn read(&mut self, reader: &mut PayloadReader<'_>) -> AppResult<()> {
        self.sent_at = reader.read_i64()?;
        Ok(())
    }

    fn write(&self, writer: &mut PayloadWriter<'_>) {
        writer.write_i64(self.sent_at);
    }
}

/// Free-form text message; also the vehicle acceptance policies use to talk
/// to a client before a session exists.
#[derive(Debug)]
pub struct MessagePacket {
    id: PacketId,
    pub message: String,
}

impl MessagePacket {
    pub fn new(id: PacketId, message: impl Into<String>) -> MessagePacket {
        MessagePacket {
            id,
            message: message.into(),
        }
    }

    pub fn empty(id: PacketId) -> MessagePacket {
        MessagePacket {
            id,
            message: String::new(),
        }
    }
}

impl Packet for MessagePacket {
    fn id(&self) -> PacketId {
        self.id
    }

    fn read(&mut self, reader: &mut PayloadReader<'_>) -> AppResult<()> {
        self.message = reader.read_string()?;
        Ok(())
    }

    fn write(&self, writer: &mut PayloadWriter<'_>) {
        writer.write_string(&self.message);
    }
}

/// Sent by the server once a connection passes the acceptance policy;
/// carries the authenticated session ID so both ends identify the client
/// the same way.
#[derive(Debug)]
pub struct SessionAcceptPacket {
    id: PacketId,
    pub session_id: String,
}

impl SessionAcceptPacket {
    pub fn new(id: PacketId, session_id: impl Into<String>) -> SessionAcceptPacket {
        SessionAcceptPacket {
            id,
            session_id: session_id.into(),
        }
    }

    pub fn empty(id: PacketId) -> SessionAcceptPacket {
        SessionAcceptPacket {
            id,
            session_id: String::new(),
        }
    }
}

impl Packet for SessionAcceptPacket {
    fn id(&self) -> PacketId {
        self.id
    }

    fn read(&mut self, reader: &mut PayloadReader<'_>) -> AppResult<()> {
        self.session_id = reader.read_string()?;
        Ok(())
    }

    fn write(&self, writer: &mut PayloadWriter<'_>) {
        writer.write_string(&self.session_id);
    }
}

/// Sent by the server when the acceptance policy turns a connection away.
#[derive(Debug)]
pub struct SessionRejectPacket {
    id: PacketId,
    pub reason: String,
}

impl SessionRejectPacket {
    pub fn new(id: PacketId, reason: impl Into<String>) -> SessionRejectPacket {
        SessionRejectPacket {
            id,
            reason: reason.into(),
        }
    }

    pub fn empty(id: PacketId) -> SessionRejectPacket {
        SessionRejectPacket {
            id,
            reason: String::new(),
        }
    }
}

impl Packet for SessionRejectPacket {
    fn id(&self) -> PacketId {
        self.id
    }

    fn read(&mut self, reader: &mut PayloadReader<'_>) -> AppResult<()> {
        self.reason = reader.read_string()?;
        Ok(())
    }

    fn write(&self, writer: &mut PayloadWriter<'_>) {
        writer.write_string(&self.reason);
    }
}
