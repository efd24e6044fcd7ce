use std::io;

use snafu::Snafu;

/// A `Result` whose error defaults to the framing [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while writing or reading a chunked stream.
///
/// A clean end of stream at a frame boundary is not an error; readers report it
/// as `Ok(None)`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The underlying source failed while reading.
    #[snafu(display("Failed reading from stream: {source}"))]
    Io {
        /// The transport error.
        source: io::Error,
    },

    /// The underlying sink failed while writing a frame.
    #[snafu(display("Failed writing frame after {written} payload bytes: {source}"))]
    Write {
        /// Payload bytes handed to the sink before the failure. Never counts the
        /// length prefix.
        written: usize,
        /// The transport error.
        source: io::Error,
    },

    /// The stream ended partway through a frame's length prefix.
    #[snafu(display("Stream ended inside a frame length prefix"))]
    TruncatedLength,

    /// The length prefix does not fit in 64 bits.
    #[snafu(display("Varint too large"))]
    VarintOverflow,

    /// The stream ended before the full payload of a frame was read.
    #[snafu(display("Stream ended inside a frame: expected {expected} bytes, got {received}"))]
    TruncatedFrame {
        /// Payload length announced by the prefix.
        expected: usize,
        /// Payload bytes actually available.
        received: usize,
    },

    /// The length prefix exceeds the configured maximum frame length.
    #[snafu(display("Frame too large: {length} bytes (max: {max})"))]
    FrameTooLarge {
        /// Payload length announced by the prefix.
        length: u64,
        /// Configured limit.
        max: usize,
    },

    /// A frame's payload is not a valid protobuf message.
    #[snafu(display("Failed decoding frame payload: {source}"))]
    Decode {
        /// The deserialization error.
        source: prost::DecodeError,
    },

    /// The reader already hit an unrecoverable error.
    #[snafu(display("Stream is unusable after an earlier framing error"))]
    Faulted,
}

// Required by the `tokio_util::codec` traits, which surface transport errors
// through the codec's own error type.
impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

impl Error {
    /// Whether the stream ended in the middle of a frame, as opposed to failing
    /// for any other reason.
    pub const fn is_truncation(&self) -> bool {
        matches!(self, Self::TruncatedLength | Self::TruncatedFrame { .. })
    }

    /// Payload bytes written before a write failure, `0` for every other error.
    pub const fn written(&self) -> usize {
        match self {
            Self::Write { written, .. } => *written,
            _ => 0,
        }
    }

    /// Whether the error leaves the stream in an unknown position.
    ///
    /// Only a payload that failed to deserialize leaves the frame boundaries
    /// intact.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_is_distinguished() {
        assert!(Error::TruncatedLength.is_truncation());
        assert!(
            Error::TruncatedFrame {
                expected: 5,
                received: 2
            }
            .is_truncation()
        );
        assert!(!Error::VarintOverflow.is_truncation());
        assert!(!Error::Faulted.is_truncation());
    }

    #[test]
    fn written_only_reported_for_writes() {
        let error = Error::Write {
            written: 3,
            source: io::ErrorKind::BrokenPipe.into(),
        };
        assert_eq!(error.written(), 3);
        assert_eq!(Error::TruncatedLength.written(), 0);
    }

    #[test]
    fn only_decode_errors_are_recoverable() {
        let decode = prost::encoding::decode_varint(&mut &[0x80_u8][..]).unwrap_err();
        assert!(!Error::Decode { source: decode }.is_fatal());

        assert!(
            Error::TruncatedFrame {
                expected: 5,
                received: 2
            }
            .is_fatal()
        );
        assert!(Error::VarintOverflow.is_fatal());
        assert!(Error::from(io::Error::from(io::ErrorKind::ConnectionReset)).is_fatal());
    }

    #[test]
    fn display() {
        let error = Error::TruncatedFrame {
            expected: 5,
            received: 2,
        };
        assert_eq!(
            error.to_string(),
            "Stream ended inside a frame: expected 5 bytes, got 2"
        );
        let error = Error::FrameTooLarge {
            length: 2048,
            max: 1024,
        };
        assert_eq!(error.to_string(), "Frame too large: 2048 bytes (max: 1024)");
    }
}
