//! Minimal Protocol Buffers encoder for building test messages.
//!
//! Only the encodings needed to construct ONNX models in tests are
//! supported. Fields are written in the order the methods are called.

/// Encode `val` as a varint.
pub fn encode_varint(mut val: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(10);
    loop {
        let byte = (val & 0x7f) as u8;
        val >>= 7;
        if val == 0 {
            bytes.push(byte);
            break;
        }
        bytes.push(byte | 0x80);
    }
    bytes
}

const WIRE_VARINT: u64 = 0;
const WIRE_I64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_I32: u64 = 5;

/// Builder for an encoded message.
///
/// ```
/// use oml_testing::proto::MessageWriter;
///
/// let msg = MessageWriter::new().varint(1, 150).finish();
/// assert_eq!(msg, [0x08, 0x96, 0x01]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(&mut self, number: u64, wire_type: u64) {
        self.buf.extend(encode_varint((number << 3) | wire_type));
    }

    /// Write an unsigned varint field.
    pub fn varint(mut self, number: u64, val: u64) -> Self {
        self.tag(number, WIRE_VARINT);
        self.buf.extend(encode_varint(val));
        self
    }

    /// Write an `int32`, `int64` or enum field.
    ///
    /// Negative values use the ten-byte two's complement encoding.
    pub fn int(self, number: u64, val: i64) -> Self {
        self.varint(number, val as u64)
    }

    /// Write a `float` field.
    pub fn float(mut self, number: u64, val: f32) -> Self {
        self.tag(number, WIRE_I32);
        self.buf.extend(val.to_le_bytes());
        self
    }

    /// Write a `double` field.
    pub fn double(mut self, number: u64, val: f64) -> Self {
        self.tag(number, WIRE_I64);
        self.buf.extend(val.to_le_bytes());
        self
    }

    /// Write a `bytes` field.
    pub fn bytes(mut self, number: u64, data: &[u8]) -> Self {
        self.tag(number, WIRE_LEN);
        self.buf.extend(encode_varint(data.len() as u64));
        self.buf.extend_from_slice(data);
        self
    }

    /// Write a `string` field.
    pub fn string(self, number: u64, val: &str) -> Self {
        self.bytes(number, val.as_bytes())
    }

    /// Write an embedded message field.
    pub fn message(self, number: u64, msg: MessageWriter) -> Self {
        self.bytes(number, &msg.buf)
    }

    /// Write a packed `repeated int64` field.
    pub fn packed_ints(self, number: u64, vals: &[i64]) -> Self {
        let data: Vec<u8> = vals
            .iter()
            .flat_map(|&v| encode_varint(v as u64))
            .collect();
        self.bytes(number, &data)
    }

    /// Write a packed `repeated float` field.
    pub fn packed_floats(self, number: u64, vals: &[f32]) -> Self {
        let data: Vec<u8> = vals.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.bytes(number, &data)
    }

    /// Write a packed `repeated double` field.
    pub fn packed_doubles(self, number: u64, vals: &[f64]) -> Self {
        let data: Vec<u8> = vals.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.bytes(number, &data)
    }

    /// Return the encoded message.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageWriter, encode_varint};

    #[test]
    fn test_encode_varint() {
        assert_eq!(encode_varint(0), [0]);
        assert_eq!(encode_varint(150), [0x96, 0x01]);
        assert_eq!(encode_varint(u64::MAX).len(), 10);
    }

    #[test]
    fn test_nested_message() {
        let inner = MessageWriter::new().string(1, "hi");
        let msg = MessageWriter::new().message(2, inner).finish();
        assert_eq!(msg, [0x12, 0x04, 0x0a, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_negative_int() {
        let msg = MessageWriter::new().int(1, -1).finish();
        // Tag byte followed by a ten-byte varint.
        assert_eq!(msg.len(), 11);
    }
}
