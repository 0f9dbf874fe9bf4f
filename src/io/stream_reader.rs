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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::io::RingBuffer;
use crate::service::CloseSignal;
use crate::util::{ErrorChain, ErrorEntry};

/// Fired exactly once when a pump has fully wound down.
pub type OnClosed = Box<dyn FnOnce() + Send>;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Handle to the read-side pump of one stream.
///
/// The pump task chunk-reads from the raw source into a shared ring buffer
/// for the life of the stream. Consumers (the packet framer) lock the buffer
/// directly; the handle only exposes lifecycle state.
#[derive(Clone)]
pub struct StreamReader {
    shared: Arc<ReaderShared>,
}

struct ReaderShared {
    buffer: Mutex<RingBuffer>,
    closed: AtomicBool,
    reached_end: AtomicBool,
    errors: ErrorChain,
    notify_close: broadcast::Sender<()>,
    on_closed: Mutex<Option<OnClosed>>,
}

impl ReaderShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // wakes a pump blocked in read; the resulting I/O error is expected
        let _ = self.notify_close.send(());
    }

    fn fire_on_closed(&self) {
        if let Some(callback) = self.on_closed.lock().take() {
            callback();
        }
    }
}

impl StreamReader {
    pub fn spawn<R>(source: R) -> StreamReader
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        StreamReader::spawn_with(source, None)
    }

    pub fn spawn_with<R>(source: R, on_closed: Option<OnClosed>) -> StreamReader
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (notify_close, close_rx) = broadcast::channel(1);
        let shared = Arc::new(ReaderShared {
            buffer: Mutex::new(RingBuffer::new()),
            closed: AtomicBool::new(false),
            reached_end: AtomicBool::new(false),
            errors: ErrorChain::new(),
            notify_close,
            on_closed: Mutex::new(on_closed),
        });
        tokio::spawn(pump(source, shared.clone(), CloseSignal::new(close_rx)));
        StreamReader { shared }
    }

    /// The shared ring buffer. All reads, peeks included, must happen under
    /// this lock.
    pub fn buffer(&self) -> &Mutex<RingBuffer> {
        &self.shared.buffer
    }

    pub fn available(&self) -> usize {
        self.shared.buffer.lock().available()
    }

    /// True once the peer ended the stream cleanly. Distinguishes orderly
    /// from abortive closure.
    pub fn reached_end(&self) -> bool {
        self.shared.reached_end.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Idempotent. Stops the pump; the raw source is dropped when the pump
    /// exits, after which `on_closed` fires exactly once.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn errors(&self) -> &ErrorChain {
        &self.shared.errors
    }

    pub fn bytes_in(&self) -> u64 {
        self.shared.buffer.lock().bytes_in()
    }
}

async fn pump<R>(mut source: R, shared: Arc<ReaderShared>, mut close: CloseSignal)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        if shared.is_closed() {
            break;
        }
        let read = tokio::select! {
            read = source.read_buf(&mut chunk) => read,
            _ = close.recv() => break,
        };
        match read {
            Ok(0) => {
                info!("reached end of input stream, closing stream reader");
                shared.reached_end.store(true, Ordering::SeqCst);
                shared.close();
                break;
            }
            Ok(_) => {
                let mut ring = shared.buffer.lock();
                ring.push_slice(&chunk);
                chunk.clear();
            }
            Err(err) => {
                if shared.is_closed() {
                    // interrupted by our own close
                    debug!("stream read interrupted after close: {}", err);
                } else {
                    error!("stream read failed, closing stream reader: {}", err);
                    shared.errors.record(ErrorEntry::with_message(
                        err.into(),
                        "read from stream failed",
                        "stream reader",
                    ));
                    shared.close();
                }
                break;
            }
        }
    }
    drop(source);
    shared.fire_on_closed();
}
