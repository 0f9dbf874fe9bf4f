//! Asynchronous buffered stream I/O.
//!
//! Each side of a stream gets a dedicated pump task decoupled from the
//! application: the reader pump pulls raw bytes into a growable circular
//! buffer, and the writer pump drains one on a fixed flush interval. The
//! pumps never raise across task boundaries; failures are recorded to their
//! error chains and surface through lifecycle state.

pub use ring_buffer::RingBuffer;
pub use stream_reader::{OnClosed, StreamReader};
pub use stream_writer::StreamWriter;

mod ring_buffer;
mod stream_reader;
mod stream_writer;
