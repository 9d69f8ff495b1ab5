//! oml-format converts [ONNX](https://onnx.ai) models into JSON documents.
//!
//! The document contains everything from the model: metadata, the graph's
//! inputs and outputs, initializers, nodes with their attributes and any
//! subgraphs. Tensor data is either embedded in the document as nested
//! arrays, or stored in a binary side-car file (`.nnp`) which the document
//! references by byte offset. Side-car data can optionally be compressed
//! with zlib.
//!
//! # Converting files
//!
//! The simplest way to convert a model is [`convert_file`]:
//!
//! ```no_run
//! use std::path::Path;
//! use oml_format::ConvertOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut options = ConvertOptions::new();
//! options.separate_weights(true).compress_weights(true);
//!
//! // Writes model.json and model.nnp.
//! let report = options.convert_file(Path::new("model.onnx"), None)?;
//! println!("{}", report);
//! # Ok(()) }
//! ```
//!
//! # Converting in memory
//!
//! Models can also be loaded with [`Model::load`] and converted with
//! [`convert_model`] or [`write_document`]. A [`SideCar`] wraps any writer
//! that receives tensor payloads.
//!
//! ```
//! use oml_format::{DataType, Graph, Model, SideCar, Tensor, convert_model};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let weights = Tensor::new("w", DataType::UINT8, &[3], Some(vec![1, 2, 3]));
//! let model = Model {
//!     graph: Graph {
//!         initializers: vec![weights],
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//!
//! let mut payloads = Vec::new();
//! let mut sidecar = SideCar::new(&mut payloads);
//! let (document, offset) = convert_model(&model, Some(&mut sidecar))?;
//!
//! assert_eq!(offset, 3);
//! assert_eq!(payloads, [1, 2, 3]);
//! let entry = document.graph.initializers[0].sidecar_ref().unwrap();
//! assert_eq!(entry.weights_size, 3);
//! # Ok(()) }
//! ```
//!
//! # Errors
//!
//! Problems that affect the whole conversion, such as an unreadable model or
//! a failed write, are returned as a [`ConvertError`]. A tensor whose data
//! does not match its type and shape does not stop the conversion. Instead
//! its entry in the document has an `error` field describing the problem.

mod assemble;
mod attribute;
mod document;
mod error;
mod tensor;
mod walker;

pub mod dtype;
pub mod env;
pub mod model;
pub mod sidecar;
pub mod validate;

pub use assemble::{
    ConversionReport, ConvertOptions, convert_file, json_path_for, sidecar_path_for,
    write_document,
};
pub use attribute::convert_attribute;
pub use document::{
    AttributeJson, AttributeValueJson, DimJson, EmbeddedTensor, FailedTensor, GraphJson,
    MAX_TENSOR_RANK, ModelJson, NodeJson, ShapeJson, TensorData, TensorJson, TensorRef,
    TensorTypeJson, TypeJson, ValueInfoJson,
};
pub use dtype::{DataType, Elements};
pub use error::{ConvertError, TensorError};
pub use model::{
    Attribute, AttributeType, AttributeValue, Dimension, Graph, LoadError, LoadErrorKind,
    MetadataEntry, Model, Node, OperatorSetId, Tensor, ValueInfo,
};
pub use sidecar::SideCar;
pub use tensor::convert_tensor;
pub use walker::{MAX_GRAPH_DEPTH, convert_graph, convert_model};
