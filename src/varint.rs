//! Unsigned base-128 varints, as used for frame length prefixes.
//!
//! Values are split into 7-bit groups, least significant group first. Every
//! byte except the last has its high bit set. This is the same encoding
//! protobuf uses for `uint64`.

use std::io::{self, BufRead};

use bytes::BufMut;
use snafu::ResultExt;

use crate::error::{Error, IoSnafu, Result, TruncatedLengthSnafu};

/// The maximum number of bytes a varint-encoded `u64` can occupy.
pub const MAX_VARINT_LEN64: usize = 10;

const CONTINUATION: u8 = 0x80;

/// Number of bytes `value` takes once encoded.
pub const fn uvarint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Encodes `value` into `buf`.
///
/// # Panics
///
/// Panics if `buf` has fewer than [`uvarint_len`] bytes of remaining capacity,
/// same as any other `BufMut::put_*` call.
pub fn encode_uvarint<B: BufMut>(mut value: u64, buf: &mut B) {
    while value >= u64::from(CONTINUATION) {
        buf.put_u8((value as u8) | CONTINUATION);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Encodes `value` into a stack buffer, returning it along with the number of
/// bytes used.
pub fn uvarint_bytes(value: u64) -> ([u8; MAX_VARINT_LEN64], usize) {
    let mut prefix = [0; MAX_VARINT_LEN64];
    let remaining = {
        let mut cursor = &mut prefix[..];
        encode_uvarint(value, &mut cursor);
        cursor.len()
    };
    (prefix, MAX_VARINT_LEN64 - remaining)
}

/// Decodes a varint from the front of `buf` without consuming it.
///
/// Returns the value and the number of bytes it occupied, or `None` if `buf`
/// ends before the varint does.
pub fn decode_uvarint(buf: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value: u64 = 0;
    for (index, &byte) in buf.iter().enumerate() {
        if let Some(value) = accumulate(value, index, byte)? {
            return Ok(Some((value, index + 1)));
        }
        value |= u64::from(byte & !CONTINUATION) << (7 * index);
    }
    Ok(None)
}

/// Reads a varint from `reader`, one byte at a time.
///
/// Returns `None` if the reader is exhausted before the first byte, which marks
/// a clean end of stream. Running out of input after that is a
/// [`Error::TruncatedLength`].
pub fn read_uvarint<R: BufRead>(reader: &mut R) -> Result<Option<u64>> {
    let mut value: u64 = 0;
    for index in 0..MAX_VARINT_LEN64 {
        let byte = match read_byte(reader).context(IoSnafu)? {
            Some(byte) => byte,
            None if index == 0 => return Ok(None),
            None => return TruncatedLengthSnafu.fail(),
        };
        if let Some(value) = accumulate(value, index, byte)? {
            return Ok(Some(value));
        }
        value |= u64::from(byte & !CONTINUATION) << (7 * index);
    }
    Err(Error::VarintOverflow)
}

/// Folds the final byte of a varint into `value`. Returns `None` if `byte`
/// carries a continuation bit.
fn accumulate(value: u64, index: usize, byte: u8) -> Result<Option<u64>> {
    if index >= MAX_VARINT_LEN64 {
        return Err(Error::VarintOverflow);
    }
    if byte & CONTINUATION != 0 {
        return if index == MAX_VARINT_LEN64 - 1 {
            Err(Error::VarintOverflow)
        } else {
            Ok(None)
        };
    }
    // Only the lowest bit of the tenth byte still fits in a u64.
    if index == MAX_VARINT_LEN64 - 1 && byte > 1 {
        return Err(Error::VarintOverflow);
    }
    Ok(Some(value | (u64::from(byte) << (7 * index))))
}

fn read_byte<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    loop {
        let byte = match reader.fill_buf() {
            Ok(buf) => buf.first().copied(),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        if byte.is_some() {
            reader.consume(1);
        }
        return Ok(byte);
    }
}
