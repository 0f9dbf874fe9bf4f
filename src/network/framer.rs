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

use tracing::trace;

use crate::codec::{PayloadReader, PayloadWriter};
use crate::io::{StreamReader, StreamWriter};
use crate::packet::{Packet, PacketId};
use crate::service::{AppError, AppResult};

/// Bytes of the frame-length prefix.
pub const LENGTH_BYTES: usize = 4;
/// Bytes of the packet ID following the length prefix.
pub const ID_BYTES: usize = 2;

/// The wire framing layer of one connection:
/// `[length:4 BE][id:2 BE][payload]`, length covering ID plus payload.
pub struct PacketFramer {
    reader: StreamReader,
    writer: StreamWriter,
    max_frame_size: usize,
}

impl PacketFramer {
    pub fn new(reader: StreamReader, writer: StreamWriter, max_frame_size: usize) -> PacketFramer {
        PacketFramer {
            reader,
            writer,
            max_frame_size,
        }
    }

    pub fn reader(&self) -> &StreamReader {
        &self.reader
    }

    pub fn writer(&self) -> &StreamWriter {
        &self.writer
    }

    /// Drains every complete frame currently buffered, invoking `receive`
    /// once per frame with the reader positioned at the payload start.
    ///
    /// Returns how many frames were dispatched, or the protocol violation
    /// that should fail the connection. A partial frame at the tail is left
    /// in the buffer untouched.
    pub fn read_frames(
        &self,
        receive: &mut dyn FnMut(PacketId, &mut PayloadReader<'_>),
    ) -> AppResult<usize> {
        let mut dispatched = 0;
        let mut ring = self.reader.buffer().lock();
        loop {
            if ring.available() < LENGTH_BYTES {
                break;
            }
            // peek the length without consuming; the peeks cannot miss
            // because availability was just checked
            let mut length_bytes = [0u8; LENGTH_BYTES];
            for (offset, byte) in length_bytes.iter_mut().enumerate() {
                *byte = ring.peek_unsigned(offset).unwrap_or(0);
            }
            let length = u32::from_be_bytes(length_bytes) as usize;

            if ring.available() - LENGTH_BYTES < length {
                // partial frame, wait for more data
                break;
            }
            ring.skip(LENGTH_BYTES);

            if length < ID_BYTES {
                // no room for a packet ID; drop the bytes and fail
                ring.skip(length);
                return Err(AppError::MalformedFrame(format!(
                    "frame length {} cannot hold a packet id",
                    length
                )));
            }
            if length - ID_BYTES > self.max_frame_size {
                ring.skip(length);
                return Err(AppError::MalformedFrame(format!(
                    "frame payload of {} bytes exceeds the {} byte limit",
                    length - ID_BYTES,
                    self.max_frame_size
                )));
            }

            let id = match (ring.pop(), ring.pop()) {
                (Some(high), Some(low)) => u16::from_be_bytes([high, low]),
                _ => {
                    return Err(AppError::MalformedFrame(
                        "packet id missing from a complete frame".to_string(),
                    ))
                }
            };

            let payload_len = length - ID_BYTES;
            let mut payload = PayloadReader::new(&mut ring, payload_len);
            receive(id, &mut payload);
            let leftover = payload.remaining();
            if leftover > 0 {
                trace!(
                    "receiver left {} byte(s) of packet {} unread, skipping",
                    leftover,
                    id
                );
                ring.skip(leftover);
            }
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Writes one packet as a single atomic frame.
    ///
    /// Flushing is disabled while the frame is assembled: placeholder
    /// length, ID, payload, then the measured length patched over the
    /// placeholder. Returns false if the writer is already closed.
    pub fn write_packet(&self, packet: &dyn Packet) -> bool {
        if self.writer.is_closed() {
            return false;
        }
        let mut state = self.writer.state().lock();
        state.flush_enabled = false;

        let frame_start = state.ring.available();
        state.ring.push_slice(&[0u8; LENGTH_BYTES]);
        state.ring.push_slice(&packet.id().to_be_bytes());
        packet.write(&mut PayloadWriter::new(&mut state.ring));

        let length = state.ring.available() - frame_start - LENGTH_BYTES;
        for (offset, byte) in (length as u32).to_be_bytes().iter().enumerate() {
            state.ring.set(frame_start + offset, *byte);
        }

        state.flush_enabled = true;
        true
    }
}
