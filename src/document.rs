//! Types describing the JSON document produced by a conversion.
//!
//! Field order in each struct is the order in which fields are written.
//! Element type and attribute type tags are written as decimal strings.

use serde::ser::{Error as _, SerializeSeq, Serializer};
use serde::Serialize;

use crate::dtype::{DataType, Elements};
use crate::model::{MetadataEntry, OperatorSetId};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelJson {
    pub ir_version: i64,
    pub opset_import: Vec<OperatorSetId>,
    pub producer_name: String,
    pub producer_version: String,
    pub domain: String,
    pub model_version: i64,
    pub doc_string: String,
    pub graph: GraphJson,
    pub metadata_props: Vec<MetadataEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphJson {
    pub name: String,
    pub inputs: Vec<ValueInfoJson>,
    pub outputs: Vec<ValueInfoJson>,
    pub initializers: Vec<TensorJson>,
    pub nodes: Vec<NodeJson>,
    pub sparse_initializers: Vec<TensorJson>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeJson {
    pub name: String,
    pub op_type: String,
    pub domain: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: Vec<AttributeJson>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttributeJson {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: String,
    pub value: AttributeValueJson,
}

/// Value of an attribute.
///
/// Each variant corresponds to one `AttributeValue` variant. The variant is
/// not written; it is identified by the attribute's `type` field.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValueJson {
    Float(#[serde(serialize_with = "serialize_f32")] f32),
    Int(i64),
    String(String),
    Tensor(Box<TensorJson>),
    Graph(Box<GraphJson>),
    Floats(#[serde(serialize_with = "serialize_f32_slice")] Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
    Tensors(Vec<TensorJson>),
    Graphs(Vec<GraphJson>),
}

/// JSON representation of one tensor.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TensorJson {
    /// Tensor whose elements are written inline, or which has no data.
    Embedded(EmbeddedTensor),

    /// Tensor whose payload is stored in the side-car file.
    SideCar(TensorRef),

    /// Tensor whose payload could not be converted.
    Failed(FailedTensor),
}

impl TensorJson {
    pub fn name(&self) -> &str {
        match self {
            Self::Embedded(t) => &t.name,
            Self::SideCar(t) => &t.name,
            Self::Failed(t) => &t.name,
        }
    }

    /// Return the side-car reference if this tensor's data was externalized.
    pub fn sidecar_ref(&self) -> Option<&TensorRef> {
        match self {
            Self::SideCar(t) => Some(t),
            _ => None,
        }
    }

    /// Return the diagnostic message if this tensor failed to convert.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(t) => Some(&t.error),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmbeddedTensor {
    pub name: String,
    pub data_type: String,
    pub dims: Vec<i64>,

    /// Logical shape, or `None` if the tensor has no payload.
    pub shape: Option<Vec<usize>>,
    pub data: Option<TensorData>,
}

/// Reference to a tensor payload stored in the side-car file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TensorRef {
    pub name: String,
    pub data_type: String,
    pub dims: Vec<i64>,
    pub shape: Vec<usize>,
    pub compressed: bool,

    /// Size of the payload before compression. Only present if compressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    pub weights_offset: u64,
    pub weights_size: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailedTensor {
    pub name: String,
    pub data_type: String,
    pub dims: Vec<i64>,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValueInfoJson {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: TypeJson,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TypeJson {
    pub tensor_type: TensorTypeJson,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TensorTypeJson {
    pub elem_type: String,

    /// Shape, or `None` if the shape is unknown.
    pub shape: Option<ShapeJson>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShapeJson {
    pub dim: Vec<DimJson>,
}

/// One dimension of a value's shape. At most one field is set.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DimJson {
    pub dim_value: Option<i64>,
    pub dim_param: Option<String>,
}

/// Format an element type tag as it appears in the document.
pub(crate) fn type_tag(data_type: DataType) -> String {
    data_type.0.to_string()
}

/// Maximum number of dims of a tensor whose data is embedded in a document.
///
/// Each dim adds a level of array nesting to the JSON.
pub const MAX_TENSOR_RANK: usize = 32;

/// Return the number of elements in a tensor with the given shape.
///
/// Returns `None` if the element count of any trailing run of dims overflows,
/// as these are the strides used when nesting elements.
pub(crate) fn element_count(shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .rev()
        .try_fold(1usize, |acc, &size| acc.checked_mul(size))
}

/// Tensor elements together with the shape used to nest them.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorData {
    elements: Elements,
    shape: Vec<usize>,
}

impl TensorData {
    /// Create tensor data from elements and a shape.
    ///
    /// Returns `None` if the number of elements does not match the shape, or
    /// the shape has more than [`MAX_TENSOR_RANK`] dims.
    pub fn new(elements: Elements, shape: Vec<usize>) -> Option<Self> {
        if shape.len() > MAX_TENSOR_RANK {
            return None;
        }
        let len = element_count(&shape)?;
        (len == elements.len()).then_some(Self { elements, shape })
    }

    pub fn elements(&self) -> &Elements {
        &self.elements
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

impl Serialize for TensorData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NestedArray {
            elements: &self.elements,
            shape: &self.shape,
            start: 0,
        }
        .serialize(serializer)
    }
}

/// View of `elements` starting at `start` as a nested array with a given
/// shape. A 0-d view is a single scalar.
struct NestedArray<'a> {
    elements: &'a Elements,
    shape: &'a [usize],
    start: usize,
}

impl Serialize for NestedArray<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Some((&len, inner_shape)) = self.shape.split_first() else {
            return self.elements.serialize_element(self.start, serializer);
        };
        let stride = element_count(inner_shape)
            .ok_or_else(|| S::Error::custom("tensor shape is too large"))?;
        let mut seq = serializer.serialize_seq(Some(len))?;
        for i in 0..len {
            seq.serialize_element(&NestedArray {
                elements: self.elements,
                shape: inner_shape,
                start: self.start + i * stride,
            })?;
        }
        seq.end()
    }
}

fn non_finite_name(is_nan: bool, is_positive: bool) -> &'static str {
    match (is_nan, is_positive) {
        (true, _) => "NaN",
        (false, true) => "Infinity",
        (false, false) => "-Infinity",
    }
}

/// Serialize a float, writing non-finite values as strings.
///
/// JSON has no representation for NaN or infinity. The strings used are the
/// ones accepted by JavaScript's `Number` and Python's `float`.
pub(crate) fn serialize_f32<S: Serializer>(val: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    if val.is_finite() {
        serializer.serialize_f32(*val)
    } else {
        serializer.serialize_str(non_finite_name(val.is_nan(), val.is_sign_positive()))
    }
}

pub(crate) fn serialize_f64<S: Serializer>(val: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if val.is_finite() {
        serializer.serialize_f64(*val)
    } else {
        serializer.serialize_str(non_finite_name(val.is_nan(), val.is_sign_positive()))
    }
}

fn serialize_f32_slice<S: Serializer>(vals: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(vals.len()))?;
    for val in vals {
        seq.serialize_element(&JsonFloat(*val))?;
    }
    seq.end()
}

struct JsonFloat(f32);

impl Serialize for JsonFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_f32(&self.0, serializer)
    }
}
