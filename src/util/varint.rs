//! Variable-length integer encoding utilities.
//!
//! Seven payload bits per byte, high bit set on every byte but the last
//! (LEB128). Signed values go through zig-zag encoding first so that small
//! negative numbers stay short.

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::error::{Result, TesseraError};

/// Maximum encoded length of a u64.
pub const MAX_VLONG_BYTES: usize = 10;

/// Encode a u64 into a stack buffer, returning the buffer and the used length.
pub fn encode_u64(value: u64) -> ([u8; MAX_VLONG_BYTES], usize) {
    let mut bytes = [0u8; MAX_VLONG_BYTES];
    let mut val = value;
    let mut len = 0;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;
        if val != 0 {
            byte |= 0x80;
        }
        bytes[len] = byte;
        len += 1;
        if val == 0 {
            break;
        }
    }

    (bytes, len)
}

/// Decode a u64 from the front of `bytes`, returning the value and the number
/// of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 || (shift == 63 && byte & 0x7E != 0) {
            return Err(TesseraError::corrupt("varint", "vlong overflows 64 bits"));
        }
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }

    Err(TesseraError::corrupt("varint", "incomplete vlong"))
}

/// Write a variable-length encoded u64 to a writer.
pub fn write_u64<W: Write + ?Sized>(writer: &mut W, value: u64) -> Result<usize> {
    let (bytes, len) = encode_u64(value);
    writer.write_all(&bytes[..len])?;
    Ok(len)
}

/// Append a variable-length encoded u64 to a byte buffer.
pub fn push_u64(out: &mut Vec<u8>, value: u64) {
    let (bytes, len) = encode_u64(value);
    out.extend_from_slice(&bytes[..len]);
}

/// Read a variable-length encoded u64 from a reader.
pub fn read_u64<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    loop {
        let byte = reader.read_u8()?;
        if shift >= 64 || (shift == 63 && byte & 0x7E != 0) {
            return Err(TesseraError::corrupt("varint", "vlong overflows 64 bits"));
        }
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Map signed to unsigned so that values close to zero encode short.
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
