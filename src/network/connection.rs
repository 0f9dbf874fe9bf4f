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

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info};

use crate::codec::PayloadReader;
use crate::io::{StreamReader, StreamWriter};
use crate::network::{ConnectionSettings, PacketFramer};
use crate::packet::{Packet, PacketId};
use crate::util::{ErrorChain, ErrorEntry};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Hook invoked per received frame, with the reader positioned at the
/// payload start. Installed by the owning client, or by an acceptance
/// policy before a session exists.
pub type PacketReceiver = Box<dyn FnMut(PacketId, &mut PayloadReader<'_>) + Send>;

/// One socket, one reader pump, one writer pump, one framer.
///
/// A connection is owned exclusively by the client (or accept slot) that
/// created it; all mutation goes through this synchronized surface. The
/// `closed` flag is one-way: once true it stays true.
pub struct Connection {
    id: u64,
    peer: Option<SocketAddr>,
    framer: PacketFramer,
    closed: AtomicBool,
    disconnected_self: AtomicBool,
    errors: ErrorChain,
    receiver: Mutex<Option<PacketReceiver>>,
}

impl Connection {
    /// Starts the I/O pumps over `stream` and returns the shared handle.
    ///
    /// Generic over the byte stream so in-memory duplex pipes can stand in
    /// for TCP in tests. Either pump winding down (EOF, I/O failure, or an
    /// explicit close) closes the whole connection.
    pub fn open<S>(
        stream: S,
        peer: Option<SocketAddr>,
        settings: ConnectionSettings,
    ) -> Arc<Connection>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let conn = Arc::new_cyclic(|weak: &Weak<Connection>| {
            let reader_weak = weak.clone();
            let writer_weak = weak.clone();
            let reader = StreamReader::spawn_with(
                read_half,
                Some(Box::new(move || {
                    if let Some(conn) = reader_weak.upgrade() {
                        conn.on_stream_closed("input");
                    }
                })),
            );
            let writer = StreamWriter::spawn_with(
                write_half,
                settings.flush_interval,
                Some(Box::new(move || {
                    if let Some(conn) = writer_weak.upgrade() {
                        conn.on_stream_closed("output");
                    }
                })),
            );
            Connection {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                peer,
                framer: PacketFramer::new(reader, writer, settings.max_frame_size),
                closed: AtomicBool::new(false),
                disconnected_self: AtomicBool::new(false),
                errors: ErrorChain::new(),
                receiver: Mutex::new(None),
            }
        });
        conn.errors.add_child(conn.framer.reader().errors());
        conn.errors.add_child(conn.framer.writer().errors());
        conn
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn errors(&self) -> &ErrorChain {
        &self.errors
    }

    pub fn framer(&self) -> &PacketFramer {
        &self.framer
    }

    /// Installs (or replaces) the per-frame receive hook.
    pub fn set_packet_receiver(&self, receiver: PacketReceiver) {
        *self.receiver.lock() = Some(receiver);
    }

    /// Drains every complete buffered frame through the receive hook.
    ///
    /// Malformed frames and I/O failures are recorded to the error chain
    /// and close the connection; they never propagate to the caller. A
    /// connection without a hook buffers silently.
    pub fn process(&self) {
        let mut slot = self.receiver.lock();
        let Some(receive) = slot.as_mut() else {
            return;
        };
        match self.framer.read_frames(receive) {
            Ok(_) => {}
            Err(err) => {
                error!(
                    "failed to process inbound data on connection {}, closing: {}",
                    self.id, err
                );
                self.errors
                    .record(ErrorEntry::from_error(err, "connection"));
                drop(slot);
                self.close();
            }
        }
    }

    /// Queues one packet as an atomic frame. Returns false once closed.
    pub fn send(&self, packet: &dyn Packet) -> bool {
        if self.is_closed() {
            return false;
        }
        self.framer.write_packet(packet)
    }

    /// Half-closes the outbound side if the connection is still live: the
    /// writer flushes pending frames and ends the stream, which the peer
    /// observes as an orderly end-of-stream. Marks this end
    /// self-disconnected on success, then completes the full close.
    pub fn disconnect(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        if !self.framer.writer().is_closed() {
            self.disconnected_self.store(true, Ordering::SeqCst);
        }
        self.framer.writer().close();
        self.close();
        self.disconnected_self.load(Ordering::SeqCst)
    }

    /// Idempotent full close: reader, then writer (with its final flush),
    /// then the socket halves as the pumps wind down. Only the caller that
    /// performed the transition sees `true`, however many race.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        debug!("closing connection {}", self.id);
        self.framer.reader().close();
        self.framer.writer().close();
        true
    }

    /// A connection counts as closed once its own flag is set or either
    /// pump has wound down; the flag itself is settled by the next `close()`
    /// call (the owner's tick loop does this when classifying).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
            || self.framer.reader().is_closed()
            || self.framer.writer().is_closed()
    }

    /// True when the peer ended the inbound stream cleanly before we closed.
    pub fn reached_end(&self) -> bool {
        self.framer.reader().reached_end()
    }

    pub fn did_disconnect_self(&self) -> bool {
        self.disconnected_self.load(Ordering::SeqCst)
    }

    fn on_stream_closed(&self, side: &str) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        info!(
            "{} stream of connection {} closed, closing connection",
            side, self.id
        );
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
