//! Binary packet codec.
//!
//! All integers are fixed-width big-endian; floats round-trip through their
//! IEEE-754 bit patterns; strings are 4-byte-length-prefixed UTF-8.

pub use payload::{PayloadReader, PayloadWriter};

mod payload;
