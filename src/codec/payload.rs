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

use crate::io::RingBuffer;
use crate::service::{AppError, AppResult};

/// Typed reads over one frame's payload.
///
/// The reader is bounded to the payload span the framer measured from the
/// frame header: reading past it is a malformed-payload error, never a bleed
/// into the next frame. Unconsumed remainder is skipped by the framer after
/// dispatch.
pub struct PayloadReader<'a> {
    ring: &'a mut RingBuffer,
    remaining: usize,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(ring: &'a mut RingBuffer, payload_len: usize) -> PayloadReader<'a> {
        PayloadReader {
            ring,
            remaining: payload_len,
        }
    }

    /// Payload bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn take(&mut self) -> AppResult<u8> {
        if self.remaining == 0 {
            return Err(AppError::MalformedPayload(
                "read past the end of the frame payload".to_string(),
            ));
        }
        match self.ring.pop() {
            Some(byte) => {
                self.remaining -= 1;
                Ok(byte)
            }
            // the framer only dispatches complete frames, so the buffered
            // data running out mid-payload means the caller broke that
            // contract
            None => Err(AppError::MalformedPayload(
                "frame payload missing from buffer".to_string(),
            )),
        }
    }

    fn take_array<const N: usize>(&mut self) -> AppResult<[u8; N]> {
        let mut bytes = [0u8; N];
        for slot in &mut bytes {
            *slot = self.take()?;
        }
        Ok(bytes)
    }

    pub fn read_bool(&mut self) -> AppResult<bool> {
        Ok(self.take()? == 1)
    }

    pub fn read_u8(&mut self) -> AppResult<u8> {
        self.take()
    }

    pub fn read_i8(&mut self) -> AppResult<i8> {
        Ok(self.take()? as i8)
    }

    pub fn read_i16(&mut self) -> AppResult<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_u16(&mut self) -> AppResult<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> AppResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> AppResult<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> AppResult<f32> {
        Ok(f32::from_bits(u32::from_be_bytes(self.take_array()?)))
    }

    pub fn read_f64(&mut self) -> AppResult<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.take_array()?)))
    }

    /// 4-byte big-endian length followed by that many UTF-8 bytes.
    pub fn read_string(&mut self) -> AppResult<String> {
        let length = self.read_i32()?;
        if length < 0 {
            return Err(AppError::MalformedPayload(format!(
                "string length {} is negative",
                length
            )));
        }
        let length = length as usize;
        if length > self.remaining {
            return Err(AppError::MalformedPayload(format!(
                "string length {} exceeds the remaining payload of {} bytes",
                length, self.remaining
            )));
        }
        let mut bytes = Vec::with_capacity(length);
        for _ in 0..length {
            bytes.push(self.take()?);
        }
        String::from_utf8(bytes).map_err(|e| AppError::MalformedPayload(e.to_string()))
    }
}

/// Typed writes into the write-side buffer. Writes go to memory and cannot
/// fail; the writer pump carries any I/O failure.
pub struct PayloadWriter<'a> {
    ring: &'a mut RingBuffer,
}

impl<'a> PayloadWriter<'a> {
    pub(crate) fn new(ring: &'a mut RingBuffer) -> PayloadWriter<'a> {
        PayloadWriter { ring }
    }

    pub fn write_bool(&mut self, v: bool) {
        self.ring.push(u8::from(v));
    }

    pub fn write_u8(&mut self, v: u8) {
        self.ring.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.ring.push(v as u8);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.ring.push_slice(&v.to_be_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.ring.push_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.ring.push_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.ring.push_slice(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.ring.push_slice(&v.to_bits().to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.ring.push_slice(&v.to_bits().to_be_bytes());
    }

    pub fn write_string(&mut self, v: &str) {
        self.write_i32(v.len() as i32);
        self.ring.push_slice(v.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ring.push_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn reader_over(ring: &mut RingBuffer) -> PayloadReader<'_> {
        let len = ring.available();
        PayloadReader::new(ring, len)
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(-1)]
    #[case(i64::MIN)]
    #[case(i64::MAX)]
    fn i64_round_trip(#[case] v: i64) {
        let mut ring = RingBuffer::new();
        PayloadWriter::new(&mut ring).write_i64(v);
        assert_eq!(ring.available(), 8);
        assert_eq!(reader_over(&mut ring).read_i64().unwrap(), v);
    }

    #[rstest]
    #[case(i32::MIN)]
    #[case(i32::MAX)]
    #[case(0)]
    fn i32_round_trip(#[case] v: i32) {
        let mut ring = RingBuffer::new();
        PayloadWriter::new(&mut ring).write_i32(v);
        assert_eq!(reader_over(&mut ring).read_i32().unwrap(), v);
    }

    #[rstest]
    #[case(i16::MIN)]
    #[case(i16::MAX)]
    fn i16_round_trip(#[case] v: i16) {
        let mut ring = RingBuffer::new();
        PayloadWriter::new(&mut ring).write_i16(v);
        assert_eq!(reader_over(&mut ring).read_i16().unwrap(), v);
    }

    #[rstest]
    #[case(0.0f32)]
    #[case(-0.0f32)]
    #[case(f32::MIN)]
    #[case(f32::MAX)]
    fn f32_round_trip_preserves_bits(#[case] v: f32) {
        let mut ring = RingBuffer::new();
        PayloadWriter::new(&mut ring).write_f32(v);
        let decoded = reader_over(&mut ring).read_f32().unwrap();
        assert_eq!(decoded.to_bits(), v.to_bits());
    }

    #[rstest]
    #[case(0.0f64)]
    #[case(-0.0f64)]
    #[case(f64::MIN)]
    #[case(f64::MAX)]
    fn f64_round_trip_preserves_bits(#[case] v: f64) {
        let mut ring = RingBuffer::new();
        PayloadWriter::new(&mut ring).write_f64(v);
        let decoded = reader_over(&mut ring).read_f64().unwrap();
        assert_eq!(decoded.to_bits(), v.to_bits());
    }

    #[rstest]
    #[case("")]
    #[case("hello")]
    #[case("héllo wörld")]
    #[case("混合 text 💜")]
    fn string_round_trip(#[case] v: &str) {
        let mut ring = RingBuffer::new();
        PayloadWriter::new(&mut ring).write_string(v);
        assert_eq!(ring.available(), 4 + v.len());
        assert_eq!(reader_over(&mut ring).read_string().unwrap(), v);
    }

    #[test]
    fn bool_round_trip() {
        let mut ring = RingBuffer::new();
        {
            let mut w = PayloadWriter::new(&mut ring);
            w.write_bool(true);
            w.write_bool(false);
        }
        let mut r = reader_over(&mut ring);
        assert!(r.read_bool().unwrap());
        assert!(!r.read_bool().unwrap());
    }

    #[test]
    fn bounded_reader_refuses_overread() {
        let mut ring = RingBuffer::new();
        PayloadWriter::new(&mut ring).write_i64(7);
        // claim a payload shorter than what is buffered
        let mut r = PayloadReader::new(&mut ring, 4);
        assert!(r.read_i32().is_ok());
        let err = r.read_u8().unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }

    #[test]
    fn string_length_beyond_payload_is_malformed() {
        let mut ring = RingBuffer::new();
        PayloadWriter::new(&mut ring).write_i32(100);
        let mut r = PayloadReader::new(&mut ring, 4);
        assert!(matches!(
            r.read_string(),
            Err(AppError::MalformedPayload(_))
        ));
    }
}
