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

/// Most chunks won't be larger than 8kb, roughly the default size of the
/// standard library's buffered readers.
const INITIAL_CAPACITY: usize = 8 * 1024;

/// Growable circular byte buffer backing one side of an async stream pump.
///
/// Grows 2x on demand and never shrinks. FIFO order is preserved across
/// growth. The buffer is not self-locking: both pump sides wrap it in a
/// single `parking_lot::Mutex`, and all reads and writes, including peeks,
/// must happen under that one lock.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<u8>,
    size: usize,
    read_pos: usize,
    write_pos: usize,
    bytes_in: u64,
    bytes_out: u64,
}

impl RingBuffer {
    pub fn new() -> RingBuffer {
        RingBuffer::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> RingBuffer {
        RingBuffer {
            buf: vec![0; capacity.max(1)],
            size: 0,
            read_pos: 0,
            write_pos: 0,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Number of bytes currently buffered.
    pub fn available(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Cumulative bytes ever pushed.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Cumulative bytes ever popped or skipped.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    pub fn push(&mut self, byte: u8) {
        if self.size == self.buf.len() {
            self.grow();
        }
        self.buf[self.write_pos] = byte;
        self.write_pos += 1;
        if self.write_pos == self.buf.len() {
            self.write_pos = 0;
        }
        self.size += 1;
        self.bytes_in += 1;
    }

    pub fn push_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// Quiet `None` on empty: running out of buffered data is an expected
    /// condition, not a fault.
    pub fn pop(&mut self) -> Option<u8> {
        if self.size == 0 {
            return None;
        }
        let byte = self.buf[self.read_pos];
        self.read_pos += 1;
        if self.read_pos == self.buf.len() {
            self.read_pos = 0;
        }
        self.size -= 1;
        self.bytes_out += 1;
        Some(byte)
    }

    /// Peeks `offset` bytes ahead of the read cursor without consuming.
    /// `None` when the offset is at or past the buffered size.
    pub fn peek_unsigned(&self, offset: usize) -> Option<u8> {
        if offset >= self.size {
            return None;
        }
        let mut pos = self.read_pos + offset;
        if pos >= self.buf.len() {
            pos -= self.buf.len();
        }
        Some(self.buf[pos])
    }

    /// Skips up to `n` bytes, returning how many were actually skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        let skipped = n.min(self.size);
        self.read_pos = (self.read_pos + skipped) % self.buf.len();
        self.size -= skipped;
        self.bytes_out += skipped as u64;
        skipped
    }

    /// Overwrites the byte at `offset` within the buffered span `[0, size)`.
    ///
    /// Used to back-patch a frame's placeholder length once the payload size
    /// is known. Patching outside the span is a caller contract violation.
    pub fn set(&mut self, offset: usize, byte: u8) {
        assert!(
            offset < self.size,
            "patch offset {} outside buffered span of {} bytes",
            offset,
            self.size
        );
        let mut pos = self.read_pos + offset;
        if pos >= self.buf.len() {
            pos -= self.buf.len();
        }
        self.buf[pos] = byte;
    }

    /// Drains the entire buffered span in FIFO order.
    pub fn take_all(&mut self) -> Vec<u8> {
        let mut drained = Vec::with_capacity(self.size);
        while let Some(byte) = self.pop() {
            drained.push(byte);
        }
        drained
    }

    fn grow(&mut self) {
        let mut replacement = vec![0; self.buf.len() * 2];
        for (i, slot) in replacement.iter_mut().take(self.size).enumerate() {
            let mut pos = self.read_pos + i;
            if pos >= self.buf.len() {
                pos -= self.buf.len();
            }
            *slot = self.buf[pos];
        }
        self.buf = replacement;
        self.read_pos = 0;
        self.write_pos = self.size;
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        RingBuffer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let mut ring = RingBuffer::with_capacity(4);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.pop(), Some(1));
        ring.push(3);
        ring.push(4);
        ring.push(5); // wraps around the read cursor
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), Some(5));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn growth_preserves_content_and_available() {
        let mut ring = RingBuffer::with_capacity(4);
        // stagger the cursors so the logical span wraps before growing
        ring.push_slice(&[9, 9]);
        assert_eq!(ring.skip(2), 2);
        ring.push_slice(&[1, 2, 3, 4]);

        let before = ring.available();
        ring.push(5); // forces the 2x growth copy
        assert_eq!(ring.available(), before + 1);
        for expected in 1..=5 {
            assert_eq!(ring.pop(), Some(expected));
        }
    }

    #[test]
    fn peek_unsigned_maps_signed_bytes() {
        let mut ring = RingBuffer::new();
        for b in i8::MIN..=i8::MAX {
            ring.push(b as u8);
        }
        for (offset, b) in (i8::MIN..=i8::MAX).enumerate() {
            assert_eq!(ring.peek_unsigned(offset), Some(b as u8));
        }
        assert_eq!(ring.peek_unsigned(256), None);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut ring = RingBuffer::new();
        ring.push_slice(&[10, 20]);
        assert_eq!(ring.peek_unsigned(0), Some(10));
        assert_eq!(ring.peek_unsigned(1), Some(20));
        assert_eq!(ring.peek_unsigned(2), None);
        assert_eq!(ring.available(), 2);
    }

    #[test]
    fn skip_reports_actual_count() {
        let mut ring = RingBuffer::new();
        ring.push_slice(&[1, 2, 3]);
        assert_eq!(ring.skip(2), 2);
        assert_eq!(ring.skip(5), 1);
        assert_eq!(ring.skip(1), 0);
    }

    #[test]
    fn set_patches_in_place() {
        let mut ring = RingBuffer::with_capacity(4);
        ring.push_slice(&[0, 0]);
        ring.skip(1); // move the read cursor so patching is cursor-relative
        ring.push_slice(&[7, 8]);
        ring.set(0, 42);
        assert_eq!(ring.pop(), Some(42));
        assert_eq!(ring.pop(), Some(7));
    }

    #[test]
    #[should_panic(expected = "outside buffered span")]
    fn set_outside_span_is_a_fault() {
        let mut ring = RingBuffer::new();
        ring.push(1);
        ring.set(1, 0);
    }

    #[test]
    fn totals_track_traffic() {
        let mut ring = RingBuffer::new();
        ring.push_slice(&[1, 2, 3, 4]);
        ring.pop();
        ring.skip(2);
        assert_eq!(ring.bytes_in(), 4);
        assert_eq!(ring.bytes_out(), 3);
        assert_eq!(ring.take_all(), vec![4]);
        assert_eq!(ring.bytes_out(), 4);
    }
}
