//! The same framing as a [`tokio_util::codec`] pair, for async transports.
//!
//! Wrap an async body in `FramedRead::new(body, ChunkedDecoder::default())` to
//! get a stream of frames, or use `FramedWrite` with [`ChunkedEncoder`] and
//! `SinkExt::send`, which flushes after every item.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    error::{Error, Result},
    internal_events::{ChunkedFrameReceived, ChunkedFrameSent, ChunkedFramingError},
    varint::{decode_uvarint, encode_uvarint, uvarint_len},
};

/// Config used to build a [`ChunkedDecoder`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkedDecoderConfig {
    /// Maximum frame length
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,
}

const fn default_max_frame_length() -> usize {
    8 * 1_024 * 1_024
}

impl Default for ChunkedDecoderConfig {
    fn default() -> Self {
        Self {
            max_frame_length: default_max_frame_length(),
        }
    }
}

impl ChunkedDecoderConfig {
    /// Build the `ChunkedDecoder` from this configuration.
    pub const fn build(&self) -> ChunkedDecoder {
        ChunkedDecoder::new(self.max_frame_length)
    }
}

/// A codec for byte sequences whose length is encoded as a uvarint prefix.
///
/// Unlike [`ChunkedReader`](crate::ChunkedReader), every frame is split off
/// the read buffer as its own [`Bytes`], so frames can be held onto freely.
#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    max_frame_length: usize,
    /// Length of the frame whose prefix was already consumed.
    pending: Option<usize>,
}

impl ChunkedDecoder {
    /// Creates a new `ChunkedDecoder`.
    pub const fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length,
            pending: None,
        }
    }

    /// Maximum frame length accepted by this decoder.
    pub const fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    fn decode_length(&mut self, src: &mut BytesMut) -> Result<Option<usize>> {
        if let Some(length) = self.pending {
            return Ok(Some(length));
        }

        let Some((size, used)) = decode_uvarint(src)? else {
            return Ok(None);
        };
        let length = usize::try_from(size)
            .ok()
            .filter(|length| *length <= self.max_frame_length)
            .ok_or(Error::FrameTooLarge {
                length: size,
                max: self.max_frame_length,
            })?;

        src.advance(used);
        src.reserve(length.saturating_sub(src.len()));
        self.pending = Some(length);
        Ok(Some(length))
    }

    fn decode_frame(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let Some(length) = self.decode_length(src)? else {
            return Ok(None);
        };
        if src.len() < length {
            return Ok(None);
        }

        self.pending = None;
        emit!(ChunkedFrameReceived { byte_size: length });
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new(default_max_frame_length())
    }
}

impl Decoder for ChunkedDecoder {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.decode_frame(src)
            .inspect_err(|error| emit!(ChunkedFramingError { error }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        let result = match self.pending {
            Some(expected) => Err(Error::TruncatedFrame {
                expected,
                received: src.len(),
            }),
            None if src.is_empty() => return Ok(None),
            None => Err(Error::TruncatedLength),
        };
        // Whatever is left can never form a frame.
        self.pending = None;
        src.clear();
        result.inspect_err(|error| emit!(ChunkedFramingError { error }))
    }
}

/// An encoder that prefixes every item with its length as a uvarint.
///
/// Empty items produce no bytes at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkedEncoder;

impl ChunkedEncoder {
    /// Creates a new `ChunkedEncoder`.
    pub const fn new() -> Self {
        Self
    }

    fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
        if payload.is_empty() {
            return;
        }

        let length = payload.len() as u64;
        dst.reserve(uvarint_len(length) + payload.len());
        encode_uvarint(length, dst);
        dst.put_slice(payload);
        emit!(ChunkedFrameSent {
            byte_size: payload.len(),
        });
    }
}

impl Encoder<Bytes> for ChunkedEncoder {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        Self::encode_frame(&item, dst);
        Ok(())
    }
}

impl Encoder<&[u8]> for ChunkedEncoder {
    type Error = Error;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<()> {
        Self::encode_frame(item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[test]
    fn decode_single_byte_varint() {
        let mut input = BytesMut::from(&[0x03, b'f', b'o', b'o'][..]);
        let mut decoder = ChunkedDecoder::default();

        assert_eq!(
            decoder.decode(&mut input).unwrap().unwrap(),
            Bytes::from("foo")
        );
        assert_eq!(decoder.decode(&mut input).unwrap(), None);
    }

    #[test]
    fn decode_multi_byte_varint() {
        let mut input = BytesMut::from(&[0xAC, 0x02][..]);
        input.extend_from_slice(&[b'x'; 300]);
        let mut decoder = ChunkedDecoder::default();

        let frame = decoder.decode(&mut input).unwrap().unwrap();
        assert_eq!(frame.len(), 300);
        assert_eq!(decoder.decode(&mut input).unwrap(), None);
    }

    #[test]
    fn decode_incomplete_varint_is_left_in_place() {
        let mut input = BytesMut::from(&[0xAC][..]);
        let mut decoder = ChunkedDecoder::default();

        assert_eq!(decoder.decode(&mut input).unwrap(), None);
        assert_eq!(&input[..], &[0xAC]);

        input.put_u8(0x02);
        input.extend_from_slice(&[b'x'; 300]);
        assert_eq!(decoder.decode(&mut input).unwrap().unwrap().len(), 300);
    }

    #[test]
    fn decode_remembers_length_across_partial_payloads() {
        let mut input = BytesMut::from(&[0x05, b'h', b'e'][..]);
        let mut decoder = ChunkedDecoder::default();

        assert_eq!(decoder.decode(&mut input).unwrap(), None);
        assert_eq!(&input[..], b"he");

        input.extend_from_slice(b"llo\x01!");
        assert_eq!(decoder.decode(&mut input).unwrap().unwrap(), "hello");
        assert_eq!(decoder.decode(&mut input).unwrap().unwrap(), "!");
    }

    #[test]
    fn decode_frame_too_large() {
        let mut input = BytesMut::from(&[0xE9, 0x07][..]);
        let mut decoder = ChunkedDecoderConfig {
            max_frame_length: 1000,
        }
        .build();

        assert!(matches!(
            decoder.decode(&mut input),
            Err(Error::FrameTooLarge {
                length: 1001,
                max: 1000
            })
        ));
    }

    #[test]
    fn decode_eof_clean() {
        let mut input = BytesMut::from(&[0x01, b'a'][..]);
        let mut decoder = ChunkedDecoder::default();

        assert_eq!(decoder.decode_eof(&mut input).unwrap().unwrap(), "a");
        assert_eq!(decoder.decode_eof(&mut input).unwrap(), None);
    }

    #[test]
    fn decode_eof_inside_payload() {
        let mut input = BytesMut::from(&[0x05, b'f', b'o'][..]);
        let mut decoder = ChunkedDecoder::default();

        assert!(matches!(
            decoder.decode_eof(&mut input),
            Err(Error::TruncatedFrame {
                expected: 5,
                received: 2
            })
        ));
        assert!(input.is_empty());
    }

    #[test]
    fn decode_eof_inside_length() {
        let mut input = BytesMut::from(&[0x80][..]);
        let mut decoder = ChunkedDecoder::default();

        assert!(matches!(
            decoder.decode_eof(&mut input),
            Err(Error::TruncatedLength)
        ));
    }

    #[test]
    fn encode_skips_empty_items() {
        let mut output = BytesMut::new();
        let mut encoder = ChunkedEncoder::new();

        encoder.encode(Bytes::from("hello"), &mut output).unwrap();
        encoder.encode(Bytes::new(), &mut output).unwrap();
        encoder.encode(&b"world"[..], &mut output).unwrap();

        assert_eq!(&output[..], b"\x05hello\x05world");
    }

    #[tokio::test]
    async fn framed_read() {
        let input: &[u8] = b"\x05hello\x05world";
        let mut reader = FramedRead::new(input, ChunkedDecoder::default());

        assert_eq!(reader.next().await.unwrap().unwrap(), "hello");
        assert_eq!(reader.next().await.unwrap().unwrap(), "world");
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_read_truncated() {
        let input: &[u8] = b"\x05hello\x05wor";
        let mut reader = FramedRead::new(input, ChunkedDecoder::default());

        assert_eq!(reader.next().await.unwrap().unwrap(), "hello");
        let error = reader.next().await.unwrap().unwrap_err();
        assert!(error.is_truncation());
    }

    #[tokio::test]
    async fn framed_write() {
        let mut writer = FramedWrite::new(Vec::new(), ChunkedEncoder::new());

        for item in ["hello", "", "world"] {
            writer.send(Bytes::from(item)).await.unwrap();
        }

        assert_eq!(writer.get_ref(), b"\x05hello\x05world");
    }
}
