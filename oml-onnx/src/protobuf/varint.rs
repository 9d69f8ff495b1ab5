//! Variable length integer decoding.
//!
//! Variable length integers (_varints_) are the default encoding of integers
//! in Protocol Buffers messages, including field tags and numbers.
//!
//! See <https://protobuf.dev/programming-guides/encoding/#varints>.

/// Maximum number of bytes for an encoded varint.
///
/// A decoded varint is a u64 value. Each byte contains 7 value bits and one
/// continuation bit. Hence we need 9 "full" bytes plus one bit from the 10th byte.
const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, PartialEq)]
pub enum VarintError {
    /// The input is empty.
    Eof,
    /// The varint length exceeds 64-bits, or the input ended before a full
    /// varint was read.
    InvalidVarint,
}

/// Read a varint value of up to 64-bits from the start of `buf`.
///
/// On success `buf` is advanced past the encoded value. On failure it is
/// left unchanged.
pub fn read_varint(buf: &mut &[u8]) -> Result<u64, VarintError> {
    if buf.is_empty() {
        return Err(VarintError::Eof);
    }

    let mut value = 0;
    for (i, byte) in buf.iter().copied().take(MAX_VARINT_LEN).enumerate() {
        // Only one value bit from the last byte may be used.
        if i + 1 == MAX_VARINT_LEN && byte > 0x01 {
            break;
        }

        // High bit is continuation bit. Low 7 bits are the payload.
        value |= ((byte & 0x7f) as u64) << (i * 7);
        if byte <= 0x7f {
            *buf = &buf[i + 1..];
            return Ok(value);
        }
    }

    Err(VarintError::InvalidVarint)
}
