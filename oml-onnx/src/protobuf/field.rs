use crate::protobuf::errors::{ErrorKind, ProtobufError};
use crate::protobuf::varint::read_varint;

/// Maximum nesting depth of embedded messages.
///
/// ONNX graphs can contain sub-graphs (eg. for `If` and `Loop` operators),
/// which makes the message structure recursive. Decoding stops with
/// [`ErrorKind::RecursionLimit`] if this depth is exceeded.
pub const MAX_MESSAGE_DEPTH: usize = 100;

/// Wire-type and associated value of a field.
///
/// See <https://protobuf.dev/programming-guides/encoding/#structure>.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FieldValue<'a> {
    /// Integer value encoded as a varint.
    Varint(u64),

    /// 64-bit fixed-width value.
    I64([u8; 8]),

    /// A variable-length value.
    Len(&'a [u8]),

    /// Deprecated start-of-group type.
    Sgroup,

    /// Deprecated end-of-group type.
    Egroup,

    /// 32-bit fixed-width value.
    I32([u8; 4]),
}

/// A single field of a message.
///
/// `Field`s are produced by iterating over [`Fields`]. Variable-length values
/// borrow from the buffer being decoded.
///
/// # Repeated fields
///
/// Repeated fields with a primitive type may have either a packed or un-packed
/// representation. The `read_repeated_*` methods return iterators which handle
/// both cases. The returned iterators will yield a single value if the field
/// is unpacked, or all values in a packed block if the field is packed.
#[derive(Clone, Debug)]
pub struct Field<'a> {
    number: u64,
    value: FieldValue<'a>,

    /// Debug name of the message type this field belongs to.
    context: Option<&'static str>,

    /// Nesting depth of the message containing this field.
    depth: usize,
}

impl<'a> Field<'a> {
    /// Return the field number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Return the field value.
    pub fn value(&self) -> FieldValue<'a> {
        self.value
    }

    /// Return the contents of a `bytes` field.
    pub fn get_bytes(&self) -> Result<&'a [u8], ProtobufError> {
        match self.value {
            FieldValue::Len(data) => Ok(data),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    /// Return the UTF-8 encoded string in this field.
    pub fn read_string(&self) -> Result<String, ProtobufError> {
        let bytes = self.get_bytes()?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| self.error(ErrorKind::InvalidUtf8))
    }

    /// Begin reading the embedded message in this field.
    ///
    /// `context` is the name of the embedded message type being read. It is
    /// used to add context to any errors encountered.
    pub fn read_message(
        &self,
        context: Option<&'static str>,
    ) -> Result<Fields<'a>, ProtobufError> {
        let data = self.get_bytes()?;
        if self.depth + 1 >= MAX_MESSAGE_DEPTH {
            return Err(self.error(ErrorKind::RecursionLimit));
        }
        Ok(Fields {
            buf: data,
            context,
            depth: self.depth + 1,
        })
    }

    fn get_varint(&self) -> Result<u64, ProtobufError> {
        match self.value {
            FieldValue::Varint(val) => Ok(val),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    /// Get the value of a field with schema type `int32`.
    pub fn get_int32(&self) -> Result<i32, ProtobufError> {
        self.get_varint().map(|v| v as i32)
    }

    /// Get the value of a field where the schema type is an enum.
    pub fn get_enum(&self) -> Result<i32, ProtobufError> {
        self.get_int32()
    }

    /// Get the value of a field with schema type `int64`.
    pub fn get_int64(&self) -> Result<i64, ProtobufError> {
        self.get_varint().map(|v| v as i64)
    }

    /// Get the value of a field with schema type `float`.
    pub fn get_float(&self) -> Result<f32, ProtobufError> {
        match self.value {
            FieldValue::I32(bytes) => Ok(f32::from_le_bytes(bytes)),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    /// Get one or multiple values from a `repeated int32` field.
    pub fn read_repeated_int32(&self) -> Result<Repeated<'a, i32>, ProtobufError> {
        self.read_repeated_varint(|x| x as i32)
    }

    /// Get one or multiple values from a `repeated int64` field.
    pub fn read_repeated_int64(&self) -> Result<Repeated<'a, i64>, ProtobufError> {
        self.read_repeated_varint(|x| x as i64)
    }

    /// Get one or multiple values from a `repeated uint64` field.
    pub fn read_repeated_uint64(&self) -> Result<Repeated<'a, u64>, ProtobufError> {
        self.read_repeated_varint(|x| x)
    }

    /// Get one or multiple values from a `repeated float` field.
    pub fn read_repeated_float(&self) -> Result<Repeated<'a, f32>, ProtobufError> {
        match self.value {
            FieldValue::I32(bytes) => Ok(Repeated::single(f32::from_le_bytes(bytes))),
            FieldValue::Len(data) => self.packed(data, 4, |buf| {
                let (chunk, rest) = buf.split_first_chunk::<4>()?;
                *buf = rest;
                Some(f32::from_le_bytes(*chunk))
            }),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    /// Get one or multiple values from a `repeated double` field.
    pub fn read_repeated_double(&self) -> Result<Repeated<'a, f64>, ProtobufError> {
        match self.value {
            FieldValue::I64(bytes) => Ok(Repeated::single(f64::from_le_bytes(bytes))),
            FieldValue::Len(data) => self.packed(data, 8, |buf| {
                let (chunk, rest) = buf.split_first_chunk::<8>()?;
                *buf = rest;
                Some(f64::from_le_bytes(*chunk))
            }),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    fn read_repeated_varint<T>(
        &self,
        from_u64: fn(u64) -> T,
    ) -> Result<Repeated<'a, T>, ProtobufError> {
        match self.value {
            FieldValue::Varint(val) => Ok(Repeated::single(from_u64(val))),
            FieldValue::Len(data) => {
                // Validate the whole block up front, so the iterator cannot
                // fail part-way through.
                let mut values = Vec::new();
                let mut buf = data;
                while !buf.is_empty() {
                    let val = read_varint(&mut buf).map_err(|err| {
                        ProtobufError::from(err).with_context(self.context, Some(self.number))
                    })?;
                    values.push(from_u64(val));
                }
                Ok(Repeated::Values(values.into_iter()))
            }
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    fn packed<T>(
        &self,
        data: &'a [u8],
        elem_size: usize,
        read: fn(&mut &'a [u8]) -> Option<T>,
    ) -> Result<Repeated<'a, T>, ProtobufError> {
        if data.len() % elem_size != 0 {
            return Err(self.error(ErrorKind::FieldLengthMismatch));
        }
        Ok(Repeated::Fixed { buf: data, read })
    }

    fn error(&self, kind: ErrorKind) -> ProtobufError {
        ProtobufError::new(kind).with_context(self.context, Some(self.number))
    }
}

/// Iterator over the values of a repeated scalar field.
///
/// See <https://protobuf.dev/programming-guides/encoding/#repeated>.
pub enum Repeated<'a, T> {
    /// Values from an un-packed field, or a packed field of varints.
    Values(std::vec::IntoIter<T>),

    /// Remaining bytes of a packed block of fixed-width values.
    Fixed {
        buf: &'a [u8],
        read: fn(&mut &'a [u8]) -> Option<T>,
    },
}

impl<T> Repeated<'_, T> {
    fn single(val: T) -> Self {
        Self::Values(vec![val].into_iter())
    }
}

impl<T> Iterator for Repeated<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self {
            Self::Values(values) => values.next(),
            Self::Fixed { buf, read } => (*read)(buf),
        }
    }
}

/// Iterator over the fields of a message.
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use oml_onnx::protobuf::{FieldValue, Fields};
///
/// let message = [0x08, 0x96, 0x01];
/// for field in Fields::new(&message, None) {
///     let field = field?;
///     assert_eq!(field.number(), 1);
///     assert_eq!(field.value(), FieldValue::Varint(150));
/// }
/// # Ok(()) }
/// ```
///
/// Iteration stops after the first error.
pub struct Fields<'a> {
    buf: &'a [u8],

    /// Debug name of the message type.
    context: Option<&'static str>,

    depth: usize,
}

impl<'a> Fields<'a> {
    /// Read the fields of a top-level message stored in `buf`.
    ///
    /// `context` is the name of the message type being read, for debugging
    /// purposes.
    pub fn new(buf: &'a [u8], context: Option<&'static str>) -> Self {
        Self {
            buf,
            context,
            depth: 0,
        }
    }

    fn read_field(&mut self) -> Result<Field<'a>, ProtobufError> {
        let tag = read_varint(&mut self.buf)
            .map_err(|err| ProtobufError::from(err).with_context(self.context, None))?;
        let number = tag >> 3;
        let wire_type = tag & 0x7;

        let value = match wire_type {
            0 => read_varint(&mut self.buf)
                .map(FieldValue::Varint)
                .map_err(ProtobufError::from),
            1 => take_array(&mut self.buf).map(FieldValue::I64),
            2 => read_varint(&mut self.buf)
                .map_err(ProtobufError::from)
                .and_then(|len| take_slice(&mut self.buf, len))
                .map(FieldValue::Len),
            3 => Ok(FieldValue::Sgroup),
            4 => Ok(FieldValue::Egroup),
            5 => take_array(&mut self.buf).map(FieldValue::I32),
            _ => Err(ProtobufError::new(ErrorKind::InvalidWireType)),
        }
        .map_err(|err| err.with_context(self.context, Some(number)))?;

        Ok(Field {
            number,
            value,
            context: self.context,
            depth: self.depth,
        })
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<Field<'a>, ProtobufError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        let field = self.read_field();
        if field.is_err() {
            self.buf = &[];
        }
        Some(field)
    }
}

fn take_array<const N: usize>(buf: &mut &[u8]) -> Result<[u8; N], ProtobufError> {
    let (chunk, rest) = buf
        .split_first_chunk::<N>()
        .ok_or_else(|| ProtobufError::new(ErrorKind::Eof))?;
    *buf = rest;
    Ok(*chunk)
}

fn take_slice<'a>(buf: &mut &'a [u8], len: u64) -> Result<&'a [u8], ProtobufError> {
    let len = usize::try_from(len).map_err(|_| ProtobufError::new(ErrorKind::Eof))?;
    if len > buf.len() {
        return Err(ProtobufError::new(ErrorKind::Eof));
    }
    let (data, rest) = buf.split_at(len);
    *buf = rest;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use oml_testing::proto::{MessageWriter, encode_varint};

    use super::{FieldValue, Fields, MAX_MESSAGE_DEPTH};
    use crate::protobuf::{ErrorKind, ProtobufError};

    fn read_fields(buf: &[u8]) -> Result<Vec<(u64, FieldValue<'_>)>, ProtobufError> {
        Fields::new(buf, Some("TestMessage"))
            .map(|field| field.map(|f| (f.number(), f.value())))
            .collect()
    }

    #[test]
    fn test_iter_fields() {
        let mut buf = MessageWriter::new()
            .varint(1, 1234)
            .float(2, 1.5)
            .bytes(3, &[1, 2, 3, 4])
            .double(4, 2.5)
            .finish();
        // Group markers for field 5 and 6.
        buf.extend(encode_varint((5 << 3) | 3));
        buf.extend(encode_varint((6 << 3) | 4));

        let fields = read_fields(&buf).unwrap();

        assert_eq!(
            fields,
            [
                (1, FieldValue::Varint(1234)),
                (2, FieldValue::I32(1.5f32.to_le_bytes())),
                (3, FieldValue::Len(&[1, 2, 3, 4])),
                (4, FieldValue::I64(2.5f64.to_le_bytes())),
                (5, FieldValue::Sgroup),
                (6, FieldValue::Egroup),
            ]
        );
    }

    #[test]
    fn test_truncated_field() {
        let mut buf = MessageWriter::new().bytes(3, &[1, 2, 3, 4]).finish();
        buf.truncate(buf.len() - 1);

        let err = read_fields(&buf).err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::Eof);
        assert_eq!(err.context(), Some("TestMessage"));
        assert_eq!(err.field(), Some(3));
    }

    #[test]
    fn test_invalid_wire_type() {
        let buf = encode_varint((1 << 3) | 7);
        let err = read_fields(&buf).err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::InvalidWireType);
    }

    #[test]
    fn test_read_string() {
        let buf = MessageWriter::new().string(1, "hello").bytes(2, &[0xff]).finish();
        let mut fields = Fields::new(&buf, None);

        let field = fields.next().unwrap().unwrap();
        assert_eq!(field.read_string().unwrap(), "hello");

        let field = fields.next().unwrap().unwrap();
        let err = field.read_string().err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::InvalidUtf8);

        // Reading a non-length field as a string is a type mismatch.
        let buf = MessageWriter::new().varint(1, 5).finish();
        let field = Fields::new(&buf, None).next().unwrap().unwrap();
        let err = field.read_string().err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::FieldTypeMismatch);
    }

    #[test]
    fn test_read_message() {
        let sub_msg = MessageWriter::new().float(3, 1.).float(4, 2.);
        let buf = MessageWriter::new()
            .message(1, sub_msg)
            .varint(2, 3)
            .finish();

        let mut fields = Fields::new(&buf, Some("TestMessage"));
        let sub_field = fields.next().unwrap().unwrap();
        let sub_values: Vec<_> = sub_field
            .read_message(Some("SubMessage"))
            .unwrap()
            .map(|f| f.unwrap().get_float().unwrap())
            .collect();
        assert_eq!(sub_values, [1., 2.]);

        let final_field = fields.next().unwrap().unwrap();
        assert_eq!(final_field.number(), 2);
        assert!(fields.next().is_none());
    }

    #[test]
    fn test_message_depth_limit() {
        let mut msg = MessageWriter::new().varint(1, 1);
        for _ in 0..MAX_MESSAGE_DEPTH + 1 {
            msg = MessageWriter::new().message(2, msg);
        }
        let buf = msg.finish();

        // Descend until the limit is hit.
        fn descend(fields: Fields) -> Result<usize, ProtobufError> {
            let mut depth = 0;
            for field in fields {
                let field = field?;
                if field.number() == 2 {
                    depth = descend(field.read_message(None)?)? + 1;
                }
            }
            Ok(depth)
        }
        let err = descend(Fields::new(&buf, None)).err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::RecursionLimit);
    }

    #[test]
    fn test_read_repeated_varint() {
        // Non-packed value followed by a packed block.
        let buf = MessageWriter::new()
            .varint(1, 1)
            .packed_ints(1, &[2, 3, -1])
            .finish();

        let mut vals = Vec::new();
        for field in Fields::new(&buf, None) {
            vals.extend(field.unwrap().read_repeated_int64().unwrap());
        }
        assert_eq!(vals, [1, 2, 3, -1]);
    }

    #[test]
    fn test_read_repeated_fixed() {
        let buf = MessageWriter::new()
            .float(1, 0.)
            .packed_floats(1, &[1., 2.])
            .double(2, 0.)
            .packed_doubles(2, &[3., 4.])
            .finish();

        let mut floats = Vec::new();
        let mut doubles = Vec::new();
        for field in Fields::new(&buf, None) {
            let field = field.unwrap();
            match field.number() {
                1 => floats.extend(field.read_repeated_float().unwrap()),
                2 => doubles.extend(field.read_repeated_double().unwrap()),
                _ => unreachable!(),
            }
        }
        assert_eq!(floats, [0., 1., 2.]);
        assert_eq!(doubles, [0., 3., 4.]);
    }

    #[test]
    fn test_packed_length_mismatch() {
        let buf = MessageWriter::new().bytes(1, &[0, 0, 0, 0, 0]).finish();
        let field = Fields::new(&buf, None).next().unwrap().unwrap();
        let err = field.read_repeated_float().err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::FieldLengthMismatch);
    }
}
