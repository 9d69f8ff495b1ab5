//! Tensor element types and decoding of raw tensor payloads.

use std::fmt;

use half::{bf16, f16};
use serde::Serializer;

use crate::document::{serialize_f32, serialize_f64};
use crate::error::TensorError;

/// Element type of a tensor.
///
/// The values match the `TensorProto.DataType` enum in the ONNX schema. Unknown
/// values are preserved so they can be reported in the output document.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DataType(pub i32);

impl DataType {
    pub const UNDEFINED: Self = Self(0);
    pub const FLOAT: Self = Self(1);
    pub const UINT8: Self = Self(2);
    pub const INT8: Self = Self(3);
    pub const UINT16: Self = Self(4);
    pub const INT16: Self = Self(5);
    pub const INT32: Self = Self(6);
    pub const INT64: Self = Self(7);
    pub const STRING: Self = Self(8);
    pub const BOOL: Self = Self(9);
    pub const FLOAT16: Self = Self(10);
    pub const DOUBLE: Self = Self(11);
    pub const UINT32: Self = Self(12);
    pub const UINT64: Self = Self(13);
    pub const COMPLEX64: Self = Self(14);
    pub const COMPLEX128: Self = Self(15);
    pub const BFLOAT16: Self = Self(16);

    /// Size in bytes of one element in a raw payload.
    ///
    /// Returns `None` for types whose payloads cannot be decoded into
    /// elements (strings, complex numbers and unknown types).
    pub fn elem_size(self) -> Option<usize> {
        let size = match self {
            Self::UINT8 | Self::INT8 | Self::BOOL => 1,
            Self::UINT16 | Self::INT16 | Self::FLOAT16 | Self::BFLOAT16 => 2,
            Self::FLOAT | Self::INT32 | Self::UINT32 => 4,
            Self::INT64 | Self::DOUBLE | Self::UINT64 => 8,
            _ => return None,
        };
        Some(size)
    }

    /// Return the name of this type as used in the ONNX schema.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::UNDEFINED => "UNDEFINED",
            Self::FLOAT => "FLOAT",
            Self::UINT8 => "UINT8",
            Self::INT8 => "INT8",
            Self::UINT16 => "UINT16",
            Self::INT16 => "INT16",
            Self::INT32 => "INT32",
            Self::INT64 => "INT64",
            Self::STRING => "STRING",
            Self::BOOL => "BOOL",
            Self::FLOAT16 => "FLOAT16",
            Self::DOUBLE => "DOUBLE",
            Self::UINT32 => "UINT32",
            Self::UINT64 => "UINT64",
            Self::COMPLEX64 => "COMPLEX64",
            Self::COMPLEX128 => "COMPLEX128",
            Self::BFLOAT16 => "BFLOAT16",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "unknown type {}", self.0),
        }
    }
}

/// Decoded elements of a tensor, in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub enum Elements {
    Float(Vec<f32>),
    Uint8(Vec<u8>),
    Int8(Vec<i8>),
    Uint16(Vec<u16>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Bool(Vec<bool>),
    Float16(Vec<f16>),
    Double(Vec<f64>),
    Uint32(Vec<u32>),
    Uint64(Vec<u64>),
    BFloat16(Vec<bf16>),
}

/// Apply `$body` to the vector inside any variant of [`Elements`].
macro_rules! match_elements {
    ($elements:expr, $vec:ident => $body:expr) => {
        match $elements {
            Elements::Float($vec) => $body,
            Elements::Uint8($vec) => $body,
            Elements::Int8($vec) => $body,
            Elements::Uint16($vec) => $body,
            Elements::Int16($vec) => $body,
            Elements::Int32($vec) => $body,
            Elements::Int64($vec) => $body,
            Elements::Bool($vec) => $body,
            Elements::Float16($vec) => $body,
            Elements::Double($vec) => $body,
            Elements::Uint32($vec) => $body,
            Elements::Uint64($vec) => $body,
            Elements::BFloat16($vec) => $body,
        }
    };
}

impl Elements {
    pub fn len(&self) -> usize {
        match_elements!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::FLOAT,
            Self::Uint8(_) => DataType::UINT8,
            Self::Int8(_) => DataType::INT8,
            Self::Uint16(_) => DataType::UINT16,
            Self::Int16(_) => DataType::INT16,
            Self::Int32(_) => DataType::INT32,
            Self::Int64(_) => DataType::INT64,
            Self::Bool(_) => DataType::BOOL,
            Self::Float16(_) => DataType::FLOAT16,
            Self::Double(_) => DataType::DOUBLE,
            Self::Uint32(_) => DataType::UINT32,
            Self::Uint64(_) => DataType::UINT64,
            Self::BFloat16(_) => DataType::BFLOAT16,
        }
    }

    /// Encode the elements as a packed little-endian payload.
    ///
    /// This is the inverse of [`decode_elements`].
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bool(v) => v.iter().map(|&x| x as u8).collect(),
            Self::Float(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Uint8(v) => v.clone(),
            Self::Int8(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Uint16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Int16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Int32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Int64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Float16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Double(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Uint32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Uint64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::BFloat16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }

    /// Serialize the element at `index` as a JSON scalar.
    ///
    /// 16-bit floats are widened to `f32`. Non-finite floats are written as
    /// strings.
    pub(crate) fn serialize_element<S: Serializer>(
        &self,
        index: usize,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        use serde::ser::Error;

        let out_of_range = || S::Error::custom(format!("element index {} out of range", index));
        macro_rules! elem {
            ($values:expr) => {
                *$values.get(index).ok_or_else(out_of_range)?
            };
        }

        match self {
            Self::Float(v) => serialize_f32(&elem!(v), serializer),
            Self::Uint8(v) => serializer.serialize_u8(elem!(v)),
            Self::Int8(v) => serializer.serialize_i8(elem!(v)),
            Self::Uint16(v) => serializer.serialize_u16(elem!(v)),
            Self::Int16(v) => serializer.serialize_i16(elem!(v)),
            Self::Int32(v) => serializer.serialize_i32(elem!(v)),
            Self::Int64(v) => serializer.serialize_i64(elem!(v)),
            Self::Bool(v) => serializer.serialize_bool(elem!(v)),
            Self::Float16(v) => serialize_f32(&elem!(v).to_f32(), serializer),
            Self::Double(v) => serialize_f64(&elem!(v), serializer),
            Self::Uint32(v) => serializer.serialize_u32(elem!(v)),
            Self::Uint64(v) => serializer.serialize_u64(elem!(v)),
            Self::BFloat16(v) => serialize_f32(&elem!(v).to_f32(), serializer),
        }
    }
}

/// Decode a packed little-endian payload into elements of type `data_type`.
pub fn decode_elements(data_type: DataType, data: &[u8]) -> Result<Elements, TensorError> {
    let elem_size = data_type
        .elem_size()
        .ok_or(TensorError::UnsupportedDataType(data_type))?;
    if data.len() % elem_size != 0 {
        return Err(TensorError::InvalidLength {
            len: data.len(),
            elem_size,
        });
    }

    let elements = match data_type {
        DataType::FLOAT => Elements::Float(decode(data, f32::from_le_bytes)),
        DataType::UINT8 => Elements::Uint8(data.to_vec()),
        DataType::INT8 => Elements::Int8(decode(data, i8::from_le_bytes)),
        DataType::UINT16 => Elements::Uint16(decode(data, u16::from_le_bytes)),
        DataType::INT16 => Elements::Int16(decode(data, i16::from_le_bytes)),
        DataType::INT32 => Elements::Int32(decode(data, i32::from_le_bytes)),
        DataType::INT64 => Elements::Int64(decode(data, i64::from_le_bytes)),
        DataType::BOOL => Elements::Bool(data.iter().map(|&b| b != 0).collect()),
        DataType::FLOAT16 => Elements::Float16(decode(data, f16::from_le_bytes)),
        DataType::DOUBLE => Elements::Double(decode(data, f64::from_le_bytes)),
        DataType::UINT32 => Elements::Uint32(decode(data, u32::from_le_bytes)),
        DataType::UINT64 => Elements::Uint64(decode(data, u64::from_le_bytes)),
        DataType::BFLOAT16 => Elements::BFloat16(decode(data, bf16::from_le_bytes)),
        _ => return Err(TensorError::UnsupportedDataType(data_type)),
    };
    Ok(elements)
}

fn decode<T, const N: usize>(data: &[u8], convert: impl Fn([u8; N]) -> T) -> Vec<T> {
    data.chunks_exact(N)
        .map(|chunk| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(chunk);
            convert(bytes)
        })
        .collect()
}
