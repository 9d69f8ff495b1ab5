//! In-memory representation of a model.
//!
//! A [`Model`] is built from an ONNX file using [`Model::load_file`] or
//! [`Model::load`], or constructed directly. It is read-only input to the
//! conversion functions, which never modify it.

use std::path::Path;

use serde::Serialize;

use crate::dtype::DataType;

mod external_data;
mod load_error;
mod onnx_loader;

pub use external_data::{DataLoader, DataLocation, ExternalDataError, FileLoader, NoExternalData};
pub use load_error::{LoadError, LoadErrorKind};

/// A model, consisting of metadata and a root graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub ir_version: i64,
    pub opset_import: Vec<OperatorSetId>,
    pub producer_name: String,
    pub producer_version: String,
    pub domain: String,
    pub model_version: i64,
    pub doc_string: String,
    pub graph: Graph,
    pub metadata_props: Vec<MetadataEntry>,
}

impl Model {
    /// Load a model from an ONNX file.
    ///
    /// Tensor data stored in external files is resolved relative to the
    /// directory containing `path`.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Model, LoadError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let loader = FileLoader::new(path)?;
        onnx_loader::load(&data, &loader)
    }

    /// Load a model from a serialized ONNX model.
    ///
    /// Models that reference external data files cannot be loaded this way.
    /// Use [`Model::load_file`] or [`Model::load_with_loader`] instead.
    pub fn load(data: &[u8]) -> Result<Model, LoadError> {
        onnx_loader::load(data, &NoExternalData)
    }

    /// Load a model from a serialized ONNX model, reading external tensor data
    /// using `loader`.
    pub fn load_with_loader(data: &[u8], loader: &dyn DataLoader) -> Result<Model, LoadError> {
        onnx_loader::load(data, loader)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OperatorSetId {
    pub domain: String,
    pub version: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

/// A graph of operator nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    pub name: String,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    pub initializers: Vec<Tensor>,
    pub nodes: Vec<Node>,
    pub sparse_initializers: Vec<Tensor>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub name: String,
    pub op_type: String,
    pub domain: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Value of a node attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),

    /// A string. The bytes are not guaranteed to be valid UTF-8.
    String(Vec<u8>),
    Tensor(Tensor),
    Graph(Graph),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<Vec<u8>>),
    Tensors(Vec<Tensor>),
    Graphs(Vec<Graph>),
}

impl AttributeValue {
    /// Return the type tag corresponding to this value.
    pub fn attr_type(&self) -> AttributeType {
        match self {
            Self::Float(_) => AttributeType::Float,
            Self::Int(_) => AttributeType::Int,
            Self::String(_) => AttributeType::String,
            Self::Tensor(_) => AttributeType::Tensor,
            Self::Graph(_) => AttributeType::Graph,
            Self::Floats(_) => AttributeType::Floats,
            Self::Ints(_) => AttributeType::Ints,
            Self::Strings(_) => AttributeType::Strings,
            Self::Tensors(_) => AttributeType::Tensors,
            Self::Graphs(_) => AttributeType::Graphs,
        }
    }
}

/// Attribute type tags.
///
/// The discriminants match `AttributeProto.AttributeType` in the ONNX schema.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributeType {
    Float = 1,
    Int = 2,
    String = 3,
    Tensor = 4,
    Graph = 5,
    Floats = 6,
    Ints = 7,
    Strings = 8,
    Tensors = 9,
    Graphs = 10,
}

impl AttributeType {
    pub fn tag(self) -> i32 {
        self as i32
    }
}

/// A tensor with an optional payload.
#[derive(Clone, Default, PartialEq)]
pub struct Tensor {
    pub name: String,
    pub data_type: DataType,
    pub dims: Vec<i64>,

    /// Elements in packed little-endian order.
    ///
    /// When present, the number of elements it contains should equal the
    /// product of `dims`. Tensors that violate this are still representable
    /// and are reported when converted.
    pub raw_data: Option<Vec<u8>>,
}

impl Tensor {
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        dims: &[i64],
        raw_data: Option<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            dims: dims.to_vec(),
            raw_data,
        }
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Tensor")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("dims", &self.dims)
            .field("raw_data_len", &self.raw_data.as_ref().map(|d| d.len()))
            .finish()
    }
}

/// Name, element type and shape of a graph input or output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueInfo {
    pub name: String,
    pub elem_type: DataType,

    /// Shape of the value, or `None` if unknown.
    pub shape: Option<Vec<Dimension>>,
}

/// Size of one dimension of a value.
#[derive(Clone, Debug, PartialEq)]
pub enum Dimension {
    Fixed(i64),

    /// A dimension whose size is given by a named parameter, such as a batch
    /// size.
    Symbolic(String),

    /// A dimension with no size or name.
    Unknown,
}
