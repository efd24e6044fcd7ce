// Shared between test binaries, each of which only uses some of the helpers.
#![allow(dead_code)]

use std::io;

use chunked_stream::{ChunkedReader, ChunkedWriter, Error, FlushingSink};

/// A sink that keeps everything in memory and remembers where each flush
/// happened.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub bytes: Vec<u8>,
    pub flush_offsets: Vec<usize>,
}

impl FlushingSink for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn force_flush(&mut self) {
        self.flush_offsets.push(self.bytes.len());
    }
}

/// Encodes `messages` in order, returning the wire bytes.
pub fn encode<B: AsRef<[u8]>>(messages: &[B]) -> Vec<u8> {
    let mut writer = ChunkedWriter::new(MemorySink::default());
    for message in messages {
        let written = writer.write(message.as_ref()).expect("in-memory write");
        assert_eq!(written, message.as_ref().len());
    }
    writer.into_inner().bytes
}

/// Decodes every frame in `stream`, copying each one out.
pub fn decode(stream: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let mut reader = ChunkedReader::new(stream);
    let mut frames = Vec::new();
    while let Some(frame) = reader.next_frame()? {
        frames.push(frame.to_vec());
    }
    Ok(frames)
}

/// Offsets at which each frame of a well-formed `stream` ends.
pub fn frame_boundaries(stream: &[u8]) -> Vec<usize> {
    let mut boundaries = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
        let (length, used) = chunked_stream::varint::decode_uvarint(&stream[offset..])
            .expect("valid varint")
            .expect("complete varint");
        offset += used + length as usize;
        boundaries.push(offset);
    }
    boundaries
}
