//! The sending half: one caller buffer in, one frame out, delivery forced.

use std::io;

use snafu::ResultExt;

use crate::{
    error::{Result, WriteSnafu},
    internal_events::{ChunkedFlushError, ChunkedFrameSent, ChunkedWriteError},
    varint::uvarint_bytes,
};

/// A byte sink that can be forced to hand buffered bytes to its transport.
///
/// This is deliberately narrower than [`io::Write`]: the flush cannot report
/// failure, matching streaming HTTP responses where a flush is a hint to push a
/// chunk out rather than a durability point.
pub trait FlushingSink {
    /// Writes some prefix of `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Forces previously written bytes onto the transport.
    fn force_flush(&mut self);
}

impl<S: FlushingSink + ?Sized> FlushingSink for &mut S {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn force_flush(&mut self) {
        (**self).force_flush()
    }
}

impl<S: FlushingSink + ?Sized> FlushingSink for Box<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn force_flush(&mut self) {
        (**self).force_flush()
    }
}

/// Adapts an [`io::Write`] into a [`FlushingSink`].
///
/// Flush errors are logged and counted, then discarded.
#[derive(Debug, Default)]
pub struct IoSink<W> {
    writer: W,
}

impl<W: io::Write> IoSink<W> {
    /// Wraps `writer`.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Gets a reference to the underlying writer.
    pub const fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Gets a mutable reference to the underlying writer.
    pub const fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Unwraps this `IoSink`, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: io::Write> FlushingSink for IoSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn force_flush(&mut self) {
        if let Err(error) = self.writer.flush() {
            emit!(ChunkedFlushError { error: &error });
        }
    }
}

/// Pairs a writer with a separate flush capability, e.g. a response body
/// handle and the connection that pushes its chunks out.
pub struct FlushWith<W, F> {
    writer: W,
    flush: F,
}

impl<W, F> FlushWith<W, F>
where
    W: io::Write,
    F: FnMut(&mut W),
{
    /// Pairs `writer` with `flush`, which is called after every frame.
    pub fn new(writer: W, flush: F) -> Self {
        Self { writer, flush }
    }

    /// Unwraps this `FlushWith`, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W, F> FlushingSink for FlushWith<W, F>
where
    W: io::Write,
    F: FnMut(&mut W),
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn force_flush(&mut self) {
        (self.flush)(&mut self.writer)
    }
}

impl<W: std::fmt::Debug, F> std::fmt::Debug for FlushWith<W, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushWith")
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

/// Writes each buffer as a uvarint length-delimited frame and flushes the
/// sink after every frame.
///
/// Calls must be serialized by the caller; one writer drives one sink.
#[derive(Debug)]
pub struct ChunkedWriter<S> {
    sink: S,
}

impl<W: io::Write> ChunkedWriter<IoSink<W>> {
    /// Creates a `ChunkedWriter` over a plain [`io::Write`], flushing it after
    /// every frame.
    pub const fn from_writer(writer: W) -> Self {
        Self::new(IoSink::new(writer))
    }
}

impl<S: FlushingSink> ChunkedWriter<S> {
    /// Creates a new `ChunkedWriter`.
    pub const fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Writes `buf` as a single frame and forces it onto the transport.
    ///
    /// Returns the number of payload bytes written, which never includes the
    /// length prefix. An empty `buf` writes nothing, does not flush, and
    /// returns `Ok(0)`: empty messages are not representable on the wire.
    ///
    /// If the prefix cannot be written, the payload is not attempted. If the
    /// payload fails partway, the error carries how many payload bytes made it
    /// out, see [`Error::written`](crate::Error::written). The sink is only
    /// flushed after a complete frame.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let (prefix, prefix_len) = uvarint_bytes(buf.len() as u64);
        if let Err((_, source)) = write_fully(&mut self.sink, &prefix[..prefix_len]) {
            emit!(ChunkedWriteError {
                error: &source,
                written: 0,
            });
            return Err(source).context(WriteSnafu { written: 0_usize });
        }

        if let Err((written, source)) = write_fully(&mut self.sink, buf) {
            emit!(ChunkedWriteError {
                error: &source,
                written,
            });
            return Err(source).context(WriteSnafu { written });
        }

        self.sink.force_flush();
        emit!(ChunkedFrameSent {
            byte_size: buf.len(),
        });
        Ok(buf.len())
    }

    /// Writes every buffer in `bufs` in order, stopping at the first error.
    ///
    /// Returns the total number of payload bytes written.
    pub fn write_all<I, B>(&mut self, bufs: I) -> Result<usize>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        bufs.into_iter()
            .try_fold(0, |total, buf| Ok(total + self.write(buf.as_ref())?))
    }

    /// Serializes `message` and writes it as a single frame.
    ///
    /// An empty encoding, such as a message with every field at its default,
    /// produces no frame at all.
    pub fn write_message<M: prost::Message>(&mut self, message: &M) -> Result<usize> {
        self.write(&message.encode_to_vec())
    }

    /// Gets a reference to the underlying sink.
    pub const fn get_ref(&self) -> &S {
        &self.sink
    }

    /// Gets a mutable reference to the underlying sink.
    ///
    /// Writing to the sink directly will corrupt the frame stream.
    pub const fn get_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Unwraps this `ChunkedWriter`, returning the underlying sink.
    pub fn into_inner(self) -> S {
        self.sink
    }
}

/// Like [`io::Write::write_all`], but reports how much was written on failure.
fn write_fully<S: FlushingSink>(sink: &mut S, mut buf: &[u8]) -> Result<(), (usize, io::Error)> {
    let mut written = 0;
    while !buf.is_empty() {
        match sink.write(buf) {
            Ok(0) => {
                return Err((
                    written,
                    io::Error::new(io::ErrorKind::WriteZero, "failed to write whole frame"),
                ));
            }
            Ok(n) => {
                written += n;
                buf = &buf[n..];
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err((written, error)),
        }
    }
    Ok(())
}
