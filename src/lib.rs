//! Framing for streaming a sequence of discrete binary messages over a single
//! ordered byte transport, such as a chunked HTTP response body.
//!
//! Every message is written as a frame: its length as an unsigned varint,
//! followed by exactly that many payload bytes. There is no stream header,
//! trailer, type tag or checksum.
//!
//! [`ChunkedWriter`] frames one buffer per call and forces delivery after each
//! one, and [`ChunkedReader`] pulls frames back out of any [`std::io::Read`].
//! For async transports the same wire format is available as a
//! [`tokio_util::codec`] pair, [`ChunkedEncoder`] and [`ChunkedDecoder`].

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod internal_events;

pub mod codec;
mod error;
pub mod reader;
pub mod varint;
pub mod writer;

pub use codec::{ChunkedDecoder, ChunkedDecoderConfig, ChunkedEncoder};
pub use error::{Error, Result};
pub use reader::{ChunkedReader, ChunkedReaderConfig};
pub use varint::MAX_VARINT_LEN64;
pub use writer::{ChunkedWriter, FlushWith, FlushingSink, IoSink};
