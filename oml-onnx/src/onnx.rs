//! ONNX model Protocol Buffers types.
//!
//! The types in this module correspond to Protocol Buffers messages defined
//! in [onnx.proto](https://github.com/onnx/onnx/blob/main/onnx/onnx.proto3).
//! See the `.proto` file for detailed information on each type and field.
//!
//! These types are not complete. They contain the messages and fields needed
//! to describe a model's metadata, graph structure and tensor data. Training
//! info, functions, quantization annotations and doc strings of individual
//! nodes are skipped.

use crate::protobuf::{DecodeMessage, Fields, ProtobufError};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AttributeType(pub i32);

impl AttributeType {
    pub const UNDEFINED: Self = Self(0);
    pub const FLOAT: Self = Self(1);
    pub const INT: Self = Self(2);
    pub const STRING: Self = Self(3);
    pub const TENSOR: Self = Self(4);
    pub const GRAPH: Self = Self(5);
    pub const FLOATS: Self = Self(6);
    pub const INTS: Self = Self(7);
    pub const STRINGS: Self = Self(8);
    pub const TENSORS: Self = Self(9);
    pub const GRAPHS: Self = Self(10);
    pub const SPARSE_TENSOR: Self = Self(11);
    pub const SPARSE_TENSORS: Self = Self(12);
    pub const TYPE_PROTO: Self = Self(13);
    pub const TYPE_PROTOS: Self = Self(14);
}

#[derive(Clone, Debug, Default)]
pub struct AttributeProto {
    pub name: Option<String>,
    pub f: Option<f32>,
    pub i: Option<i64>,

    /// String value. ONNX declares this as `bytes`, so it is not guaranteed
    /// to be valid UTF-8.
    pub s: Option<Vec<u8>>,
    pub t: Option<TensorProto>,
    pub g: Option<GraphProto>,
    pub floats: Vec<f32>,
    pub ints: Vec<i64>,
    pub strings: Vec<Vec<u8>>,
    pub tensors: Vec<TensorProto>,
    pub graphs: Vec<GraphProto>,
    pub r#type: Option<AttributeType>,
}

impl AttributeProto {
    const NAME: u64 = 1;
    const F: u64 = 2;
    const I: u64 = 3;
    const S: u64 = 4;
    const T: u64 = 5;
    const G: u64 = 6;
    const FLOATS: u64 = 7;
    const INTS: u64 = 8;
    const STRINGS: u64 = 9;
    const TENSORS: u64 = 10;
    const GRAPHS: u64 = 11;
    const TYPE: u64 = 20;
}

impl DecodeMessage for AttributeProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::NAME => {
                    msg.name = Some(field.read_string()?);
                }
                Self::F => {
                    msg.f = Some(field.get_float()?);
                }
                Self::I => {
                    msg.i = Some(field.get_int64()?);
                }
                Self::S => {
                    msg.s = Some(field.get_bytes()?.to_vec());
                }
                Self::T => {
                    msg.t = Some(TensorProto::decode_field(&field)?);
                }
                Self::G => {
                    msg.g = Some(GraphProto::decode_field(&field)?);
                }
                Self::FLOATS => {
                    msg.floats.extend(field.read_repeated_float()?);
                }
                Self::INTS => {
                    msg.ints.extend(field.read_repeated_int64()?);
                }
                Self::STRINGS => {
                    msg.strings.push(field.get_bytes()?.to_vec());
                }
                Self::TENSORS => {
                    msg.tensors.push(TensorProto::decode_field(&field)?);
                }
                Self::GRAPHS => {
                    msg.graphs.push(GraphProto::decode_field(&field)?);
                }
                Self::TYPE => {
                    msg.r#type = Some(AttributeType(field.get_enum()?));
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct NodeProto {
    pub name: Option<String>,
    pub input: Vec<String>,
    pub output: Vec<String>,
    pub op_type: Option<String>,
    pub domain: Option<String>,
    pub attribute: Vec<AttributeProto>,
}

impl NodeProto {
    const INPUT: u64 = 1;
    const OUTPUT: u64 = 2;
    const NAME: u64 = 3;
    const OP_TYPE: u64 = 4;
    const ATTRIBUTE: u64 = 5;
    const DOMAIN: u64 = 7;
}

impl DecodeMessage for NodeProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::INPUT => {
                    msg.input.push(field.read_string()?);
                }
                Self::OUTPUT => {
                    msg.output.push(field.read_string()?);
                }
                Self::NAME => {
                    msg.name = Some(field.read_string()?);
                }
                Self::OP_TYPE => {
                    msg.op_type = Some(field.read_string()?);
                }
                Self::ATTRIBUTE => {
                    msg.attribute.push(AttributeProto::decode_field(&field)?);
                }
                Self::DOMAIN => {
                    msg.domain = Some(field.read_string()?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Default)]
pub struct TensorProto {
    pub dims: Vec<i64>,
    pub data_type: Option<DataType>,

    /// Data for FLOAT and COMPLEX64 tensors.
    pub float_data: Vec<f32>,

    /// Data for INT32, and for smaller integer, BOOL and 16-bit float types
    /// (one element per value, 16-bit floats stored as their bit pattern).
    pub int32_data: Vec<i32>,

    /// Data for INT64 tensors.
    pub int64_data: Vec<i64>,

    /// Data for DOUBLE and COMPLEX128 tensors.
    pub double_data: Vec<f64>,

    /// Data for UINT32 and UINT64 tensors.
    pub uint64_data: Vec<u64>,

    /// Field containing tensor data as bytes in packed little-endian order.
    ///
    /// This is the field most often used to store data for large tensors.
    pub raw_data: Option<Vec<u8>>,

    pub name: Option<String>,
    pub external_data: Vec<StringStringEntryProto>,
    pub data_location: Option<DataLocation>,
}

impl TensorProto {
    const DIMS: u64 = 1;
    const DATA_TYPE: u64 = 2;
    const FLOAT_DATA: u64 = 4;
    const INT32_DATA: u64 = 5;
    const INT64_DATA: u64 = 7;
    const NAME: u64 = 8;
    const RAW_DATA: u64 = 9;
    const DOUBLE_DATA: u64 = 10;
    const UINT64_DATA: u64 = 11;
    const EXTERNAL_DATA: u64 = 13;
    const DATA_LOCATION: u64 = 14;
}

impl std::fmt::Debug for TensorProto {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("TensorProto")
            .field("dims", &self.dims)
            .field("data_type", &self.data_type)
            .field("name", &self.name)
            .field("raw_data_len", &self.raw_data.as_ref().map(|d| d.len()))
            .field("data_location", &self.data_location)
            .finish()
    }
}

impl DecodeMessage for TensorProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = TensorProto::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::DIMS => {
                    msg.dims.extend(field.read_repeated_int64()?);
                }
                Self::DATA_TYPE => {
                    msg.data_type = Some(DataType(field.get_enum()?));
                }
                Self::FLOAT_DATA => {
                    msg.float_data.extend(field.read_repeated_float()?);
                }
                Self::INT32_DATA => {
                    msg.int32_data.extend(field.read_repeated_int32()?);
                }
                Self::INT64_DATA => {
                    msg.int64_data.extend(field.read_repeated_int64()?);
                }
                Self::DOUBLE_DATA => {
                    msg.double_data.extend(field.read_repeated_double()?);
                }
                Self::UINT64_DATA => {
                    msg.uint64_data.extend(field.read_repeated_uint64()?);
                }
                Self::NAME => {
                    msg.name = Some(field.read_string()?);
                }
                Self::RAW_DATA => {
                    msg.raw_data = Some(field.get_bytes()?.to_vec());
                }
                Self::EXTERNAL_DATA => {
                    msg.external_data
                        .push(StringStringEntryProto::decode_field(&field)?);
                }
                Self::DATA_LOCATION => {
                    msg.data_location = Some(DataLocation(field.get_enum()?));
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SparseTensorProto {
    /// Non-default values, stored as a 1D tensor.
    pub values: Option<TensorProto>,

    /// Indices of the non-default values.
    pub indices: Option<TensorProto>,

    /// Shape of the dense tensor.
    pub dims: Vec<i64>,
}

impl SparseTensorProto {
    const VALUES: u64 = 1;
    const INDICES: u64 = 2;
    const DIMS: u64 = 3;
}

impl DecodeMessage for SparseTensorProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::VALUES => {
                    msg.values = Some(TensorProto::decode_field(&field)?);
                }
                Self::INDICES => {
                    msg.indices = Some(TensorProto::decode_field(&field)?);
                }
                Self::DIMS => {
                    msg.dims.extend(field.read_repeated_int64()?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DataLocation(pub i32);

impl DataLocation {
    pub const DEFAULT: Self = Self(0);
    pub const EXTERNAL: Self = Self(1);
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
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
}

#[derive(Clone, Debug, Default)]
pub struct Dimension {
    pub dim_value: Option<i64>,
    pub dim_param: Option<String>,
}

impl Dimension {
    const DIM_VALUE: u64 = 1;
    const DIM_PARAM: u64 = 2;
}

impl DecodeMessage for Dimension {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            // `dim_value` and `dim_param` are members of a oneof, so the
            // last one seen wins.
            match field.number() {
                Self::DIM_VALUE => {
                    msg.dim_value = Some(field.get_int64()?);
                    msg.dim_param = None;
                }
                Self::DIM_PARAM => {
                    msg.dim_param = Some(field.read_string()?);
                    msg.dim_value = None;
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct StringStringEntryProto {
    pub key: Option<String>,
    pub value: Option<String>,
}

impl StringStringEntryProto {
    const KEY: u64 = 1;
    const VALUE: u64 = 2;
}

impl DecodeMessage for StringStringEntryProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::KEY => {
                    msg.key = Some(field.read_string()?);
                }
                Self::VALUE => {
                    msg.value = Some(field.read_string()?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TensorShapeProto {
    pub dim: Vec<Dimension>,
}

impl TensorShapeProto {
    const DIM: u64 = 1;
}

impl DecodeMessage for TensorShapeProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            if field.number() == Self::DIM {
                msg.dim.push(Dimension::decode_field(&field)?);
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TypeProtoTensor {
    pub elem_type: Option<DataType>,
    pub shape: Option<TensorShapeProto>,
}

impl TypeProtoTensor {
    const ELEM_TYPE: u64 = 1; // DataType
    const SHAPE: u64 = 2; // TensorShapeProto
}

impl DecodeMessage for TypeProtoTensor {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::ELEM_TYPE => {
                    msg.elem_type = Some(DataType(field.get_enum()?));
                }
                Self::SHAPE => {
                    msg.shape = Some(TensorShapeProto::decode_field(&field)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TypeProto {
    pub tensor_type: Option<TypeProtoTensor>,
}

impl TypeProto {
    const TENSOR_TYPE: u64 = 1;
}

impl DecodeMessage for TypeProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            if field.number() == Self::TENSOR_TYPE {
                msg.tensor_type = Some(TypeProtoTensor::decode_field(&field)?);
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ValueInfoProto {
    pub name: Option<String>,
    pub r#type: Option<TypeProto>,
}

impl ValueInfoProto {
    const NAME: u64 = 1;
    const TYPE: u64 = 2;
}

impl DecodeMessage for ValueInfoProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::NAME => {
                    msg.name = Some(field.read_string()?);
                }
                Self::TYPE => {
                    msg.r#type = Some(TypeProto::decode_field(&field)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct GraphProto {
    pub name: Option<String>,
    pub node: Vec<NodeProto>,
    pub initializer: Vec<TensorProto>,
    pub sparse_initializer: Vec<SparseTensorProto>,
    pub input: Vec<ValueInfoProto>,
    pub output: Vec<ValueInfoProto>,
}

impl GraphProto {
    const NODE: u64 = 1;
    const NAME: u64 = 2;
    const INITIALIZER: u64 = 5;
    const INPUT: u64 = 11;
    const OUTPUT: u64 = 12;
    const SPARSE_INITIALIZER: u64 = 15;
}

impl DecodeMessage for GraphProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::NODE => {
                    msg.node.push(NodeProto::decode_field(&field)?);
                }
                Self::NAME => {
                    msg.name = Some(field.read_string()?);
                }
                Self::INITIALIZER => {
                    msg.initializer.push(TensorProto::decode_field(&field)?);
                }
                Self::INPUT => {
                    msg.input.push(ValueInfoProto::decode_field(&field)?);
                }
                Self::OUTPUT => {
                    msg.output.push(ValueInfoProto::decode_field(&field)?);
                }
                Self::SPARSE_INITIALIZER => {
                    msg.sparse_initializer
                        .push(SparseTensorProto::decode_field(&field)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct OperatorSetIdProto {
    pub domain: Option<String>,
    pub version: Option<i64>,
}

impl OperatorSetIdProto {
    const DOMAIN: u64 = 1;
    const VERSION: u64 = 2;
}

impl DecodeMessage for OperatorSetIdProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::DOMAIN => {
                    msg.domain = Some(field.read_string()?);
                }
                Self::VERSION => {
                    msg.version = Some(field.get_int64()?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelProto {
    pub ir_version: Option<i64>,
    pub opset_import: Vec<OperatorSetIdProto>,
    pub producer_name: Option<String>,
    pub producer_version: Option<String>,
    pub domain: Option<String>,
    pub model_version: Option<i64>,
    pub doc_string: Option<String>,
    pub graph: Option<GraphProto>,
    pub metadata_props: Vec<StringStringEntryProto>,
}

impl ModelProto {
    const IR_VERSION: u64 = 1;
    const PRODUCER_NAME: u64 = 2;
    const PRODUCER_VERSION: u64 = 3;
    const DOMAIN: u64 = 4;
    const MODEL_VERSION: u64 = 5;
    const DOC_STRING: u64 = 6;
    const GRAPH: u64 = 7;
    const OPSET_IMPORT: u64 = 8;
    const METADATA_PROPS: u64 = 14;
}

impl DecodeMessage for ModelProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::IR_VERSION => {
                    msg.ir_version = Some(field.get_int64()?);
                }
                Self::PRODUCER_NAME => {
                    msg.producer_name = Some(field.read_string()?);
                }
                Self::PRODUCER_VERSION => {
                    msg.producer_version = Some(field.read_string()?);
                }
                Self::DOMAIN => {
                    msg.domain = Some(field.read_string()?);
                }
                Self::MODEL_VERSION => {
                    msg.model_version = Some(field.get_int64()?);
                }
                Self::DOC_STRING => {
                    msg.doc_string = Some(field.read_string()?);
                }
                Self::GRAPH => {
                    msg.graph = Some(GraphProto::decode_field(&field)?);
                }
                Self::OPSET_IMPORT => {
                    msg.opset_import
                        .push(OperatorSetIdProto::decode_field(&field)?);
                }
                Self::METADATA_PROPS => {
                    msg.metadata_props
                        .push(StringStringEntryProto::decode_field(&field)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

/// Simplified version of [`ModelProto`] used for file type detection.
#[derive(Debug, Default)]
struct SlimModelProto {
    pub ir_version: Option<i64>,
    pub graph: bool,
}

impl DecodeMessage for SlimModelProto {
    fn decode_fields(fields: Fields<'_>) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                ModelProto::IR_VERSION => {
                    msg.ir_version = Some(field.get_int64()?);
                }
                ModelProto::GRAPH => {
                    // Check the wire type without decoding the graph.
                    field.get_bytes()?;
                    msg.graph = true;
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

/// Test whether a buffer contains an ONNX model.
///
/// ONNX models do not contain any magic bytes that would make detection simple.
/// Instead this function attempts to parse the data as a simplified version of
/// the `ModelProto` message type, testing for the presence of a few key fields
/// but skipping over the main graph.
///
/// ```
/// use oml_onnx::onnx::is_onnx_model;
///
/// assert!(!is_onnx_model(b"NOT AN ONNX MODEL"));
/// ```
pub fn is_onnx_model(buf: &[u8]) -> bool {
    let Ok(model) = SlimModelProto::decode(buf) else {
        return false;
    };
    // The `ir_version` field is required, and a model without a graph is not
    // useful.
    model.ir_version.is_some() && model.graph
}
