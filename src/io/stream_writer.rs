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
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, error};

use crate::io::stream_reader::OnClosed;
use crate::io::RingBuffer;
use crate::service::CloseSignal;
use crate::util::{ErrorChain, ErrorEntry};

/// Buffered output plus the flush gate the framer toggles while assembling
/// one frame. Guarded by a single mutex so a frame in progress can never
/// interleave with a flush or another sender's frame.
pub(crate) struct WriteState {
    pub(crate) ring: RingBuffer,
    pub(crate) flush_enabled: bool,
}

/// Handle to the write-side pump of one stream.
///
/// The pump task drains the shared ring buffer to the raw sink on a fixed
/// flush interval. Closing is idempotent: the pump performs a final flush,
/// shuts the sink down (half-close on TCP), and fires `on_closed` exactly
/// once.
#[derive(Clone)]
pub struct StreamWriter {
    shared: Arc<WriterShared>,
}

struct WriterShared {
    state: Mutex<WriteState>,
    closed: AtomicBool,
    errors: ErrorChain,
    notify_close: broadcast::Sender<()>,
    on_closed: Mutex<Option<OnClosed>>,
    flush_interval: Duration,
}

impl WriterShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.notify_close.send(());
    }

    fn fire_on_closed(&self) {
        if let Some(callback) = self.on_closed.lock().take() {
            callback();
        }
    }
}

impl StreamWriter {
    pub fn spawn<W>(sink: W, flush_interval: Duration) -> StreamWriter
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        StreamWriter::spawn_with(sink, flush_interval, None)
    }

    pub fn spawn_with<W>(
        sink: W,
        flush_interval: Duration,
        on_closed: Option<OnClosed>,
    ) -> StreamWriter
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (notify_close, close_rx) = broadcast::channel(1);
        let shared = Arc::new(WriterShared {
            state: Mutex::new(WriteState {
                ring: RingBuffer::new(),
                flush_enabled: true,
            }),
            closed: AtomicBool::new(false),
            errors: ErrorChain::new(),
            notify_close,
            on_closed: Mutex::new(on_closed),
            flush_interval,
        });
        tokio::spawn(pump(sink, shared.clone(), CloseSignal::new(close_rx)));
        StreamWriter { shared }
    }

    pub(crate) fn state(&self) -> &Mutex<WriteState> {
        &self.shared.state
    }

    /// Bytes buffered but not yet flushed to the sink.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().ring.available()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Idempotent. The pump flushes any pending span, shuts the sink down,
    /// then fires `on_closed` exactly once.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn errors(&self) -> &ErrorChain {
        &self.shared.errors
    }

    pub fn bytes_out(&self) -> u64 {
        self.shared.state.lock().ring.bytes_out()
    }
}

async fn pump<W>(mut sink: W, shared: Arc<WriterShared>, mut close: CloseSignal)
where
    W: AsyncWrite + Unpin,
{
    let mut failed = false;
    loop {
        tokio::select! {
            _ = time::sleep(shared.flush_interval) => {}
            _ = close.recv() => break,
        }
        if shared.is_closed() {
            break;
        }
        if let Err(err) = flush_pending(&mut sink, &shared).await {
            if shared.is_closed() {
                debug!("stream write interrupted after close: {}", err);
            } else {
                error!("stream write failed, closing stream writer: {}", err);
                shared.errors.record(ErrorEntry::with_message(
                    err.into(),
                    "write to stream failed",
                    "stream writer",
                ));
                shared.close();
            }
            failed = true;
            break;
        }
    }
    shared.close();
    if !failed {
        // drain whatever was buffered between the last tick and the close
        if let Err(err) = flush_pending(&mut sink, &shared).await {
            debug!("final flush after close failed: {}", err);
        }
    }
    let _ = sink.shutdown().await;
    drop(sink);
    shared.fire_on_closed();
}

async fn flush_pending<W>(sink: &mut W, shared: &WriterShared) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // take the span under the lock, write after releasing it; with flushing
    // enabled the buffer only ever holds whole frames, so draining it all at
    // once keeps frames contiguous on the wire
    let span = {
        let mut state = shared.state.lock();
        if !state.flush_enabled || state.ring.is_empty() {
            None
        } else {
            Some(state.ring.take_all())
        }
    };
    if let Some(bytes) = span {
        sink.write_all(&bytes).await?;
        sink.flush().await?;
    }
    Ok(())
}
