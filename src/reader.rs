//! The receiving half: pulls uvarint length-delimited frames off a byte
//! source, one per call.

use std::io::{BufReader, Read};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::{
    error::{DecodeSnafu, Error, FrameTooLargeSnafu, IoSnafu, Result, TruncatedFrameSnafu},
    internal_events::{ChunkedDecodeError, ChunkedFrameReceived, ChunkedFramingError},
    varint::read_uvarint,
};

/// Config used to build a [`ChunkedReader`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkedReaderConfig {
    /// Capacity of the read buffer wrapped around the source, in bytes.
    #[serde(default = "default_read_buffer_capacity")]
    pub read_buffer_capacity: usize,

    /// Largest payload accepted, in bytes.
    ///
    /// Unlimited by default: the frame buffer grows to fit the largest frame
    /// announced by the stream.
    #[serde(default)]
    pub max_frame_length: Option<usize>,
}

const fn default_read_buffer_capacity() -> usize {
    8 * 1_024
}

/// Largest frame buffer reserved on the word of a length prefix alone.
const MAX_PREALLOCATION: usize = 1_024 * 1_024;

impl Default for ChunkedReaderConfig {
    fn default() -> Self {
        Self {
            read_buffer_capacity: default_read_buffer_capacity(),
            max_frame_length: None,
        }
    }
}

impl ChunkedReaderConfig {
    /// Build the `ChunkedReader` from this configuration.
    pub fn build<R: Read>(&self, reader: R) -> ChunkedReader<R> {
        ChunkedReader {
            reader: BufReader::with_capacity(self.read_buffer_capacity, reader),
            data: Vec::new(),
            max_frame_length: self.max_frame_length,
            state: State::Ready,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Ready,
    Eof,
    Faulted,
}

/// A buffered reader that expects a uvarint length before each frame.
///
/// Frames are read into a single buffer owned by the reader. That buffer grows
/// to the largest frame seen so far and is never shrunk, so steady-state
/// reading does not allocate. The slice handed out by
/// [`next_frame`](Self::next_frame) borrows that buffer and therefore cannot
/// outlive the next call; copy it out to keep it.
///
/// Once a frame is found to be truncated or malformed, the stream position is
/// unknown and every further call fails with [`Error::Faulted`].
#[derive(Debug)]
pub struct ChunkedReader<R> {
    reader: BufReader<R>,
    data: Vec<u8>,
    max_frame_length: Option<usize>,
    state: State,
}

impl<R: Read> ChunkedReader<R> {
    /// Creates a new `ChunkedReader` with the default configuration.
    pub fn new(reader: R) -> Self {
        ChunkedReaderConfig::default().build(reader)
    }

    /// Rejects frames longer than `max` bytes with [`Error::FrameTooLarge`]
    /// before allocating room for them.
    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = Some(max);
        self
    }

    /// Returns the next frame, or `None` once the stream ends cleanly at a frame
    /// boundary.
    ///
    /// A stream that ends inside a length prefix or a payload is an error, see
    /// [`Error::is_truncation`].
    pub fn next_frame(&mut self) -> Result<Option<&[u8]>> {
        match self.state {
            State::Ready => {}
            State::Eof => return Ok(None),
            State::Faulted => return Err(Error::Faulted),
        }

        match self.read_frame() {
            Ok(Some(length)) => {
                emit!(ChunkedFrameReceived { byte_size: length });
                Ok(Some(self.data.as_slice()))
            }
            Ok(None) => {
                debug!(message = "Chunked stream ended.");
                self.state = State::Eof;
                Ok(None)
            }
            Err(error) => {
                emit!(ChunkedFramingError { error: &error });
                if error.is_fatal() {
                    self.state = State::Faulted;
                }
                Err(error)
            }
        }
    }

    /// Like [`next_frame`](Self::next_frame), but copies the frame out so it
    /// can be kept across calls.
    pub fn next_frame_owned(&mut self) -> Result<Option<Bytes>> {
        Ok(self.next_frame()?.map(Bytes::copy_from_slice))
    }

    /// Reads the next frame and decodes it into `message`, replacing its
    /// previous contents.
    ///
    /// Returns `false`, leaving `message` untouched, once the stream has ended
    /// cleanly. A payload that fails to decode does not fault the stream.
    pub fn next_message_into<M: prost::Message>(&mut self, message: &mut M) -> Result<bool> {
        let Some(frame) = self.next_frame()? else {
            return Ok(false);
        };

        message.clear();
        message
            .merge(frame)
            .inspect_err(|error| {
                emit!(ChunkedDecodeError {
                    error,
                    byte_size: frame.len(),
                })
            })
            .context(DecodeSnafu)?;
        Ok(true)
    }

    /// Reads the next frame and decodes it as a new `M`.
    pub fn next_message<M: prost::Message + Default>(&mut self) -> Result<Option<M>> {
        let mut message = M::default();
        Ok(self
            .next_message_into(&mut message)?
            .then_some(message))
    }

    /// Turns this reader into an iterator of owned frames.
    ///
    /// The iterator ends after the stream ends or after the first error.
    pub fn into_frames(self) -> Frames<R> {
        Frames { reader: self }
    }

    /// Capacity of the frame buffer, which is at least the length of the
    /// largest frame read so far.
    pub fn buffer_capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Whether the stream has ended cleanly.
    pub fn is_eof(&self) -> bool {
        self.state == State::Eof
    }

    /// Gets a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Unwraps this `ChunkedReader`, returning the underlying reader.
    ///
    /// Bytes already pulled into the internal read buffer are lost.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// Reads one frame into `self.data`, returning its length.
    fn read_frame(&mut self) -> Result<Option<usize>> {
        let Some(size) = read_uvarint(&mut self.reader)? else {
            return Ok(None);
        };

        let length = match (usize::try_from(size), self.max_frame_length) {
            (Ok(length), Some(max)) if length > max => {
                return FrameTooLargeSnafu { length: size, max }.fail();
            }
            (Ok(length), _) => length,
            (Err(_), max) => {
                return FrameTooLargeSnafu {
                    length: size,
                    max: max.unwrap_or(usize::MAX),
                }
                .fail();
            }
        };

        // Past the preallocation the buffer only grows as payload arrives.
        self.data.clear();
        self.data.reserve_exact(length.min(MAX_PREALLOCATION));
        (&mut self.reader)
            .take(size)
            .read_to_end(&mut self.data)
            .context(IoSnafu)?;

        let received = self.data.len();
        if received < length {
            return TruncatedFrameSnafu {
                expected: length,
                received,
            }
            .fail();
        }

        Ok(Some(length))
    }
}

/// An iterator over the frames of a [`ChunkedReader`], created by
/// [`ChunkedReader::into_frames`].
#[derive(Debug)]
pub struct Frames<R> {
    reader: ChunkedReader<R>,
}

impl<R: Read> Iterator for Frames<R> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.state == State::Faulted {
            return None;
        }
        self.reader.next_frame_owned().transpose()
    }
}
