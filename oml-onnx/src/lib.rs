//! This crate provides a parser for [ONNX][onnx] ML model files.
//!
//! ONNX models are [Protocol Buffers][protobuf] messages using the `ModelProto`
//! schema from
//! [onnx.proto](https://github.com/onnx/onnx/blob/main/onnx/onnx.proto3). The
//! message describes the model structure as a graph of operators. Weights are
//! usually stored inline as `bytes` fields in `TensorProto.raw_data`, or in
//! external data files referenced by `TensorProto.external_data`.
//!
//! # Usage
//!
//! ```no_run
//! use oml_onnx::onnx::ModelProto;
//! use oml_onnx::protobuf::DecodeMessage;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let buf = std::fs::read("model.onnx")?;
//!     let model = ModelProto::decode(&buf)?;
//!
//!     let op_count = model.graph.as_ref().map(|g| g.node.len()).unwrap_or(0);
//!     println!("Model has {} operators", op_count);
//!     Ok(())
//! }
//! ```
//!
//! # Design
//!
//! The decoder works on an in-memory buffer holding the whole file. Messages
//! are decoded into owned types ([`onnx::ModelProto`] and friends) in a single
//! pass. Fields which are not needed to describe a model's structure and
//! weights are skipped. Embedded messages are decoded recursively, with a
//! fixed limit on nesting depth so that malformed input produces an error
//! rather than exhausting the stack.
//!
//! [onnx]: https://onnx.ai/onnx/
//! [protobuf]: https://protobuf.dev/

// This is a crate for parsing potentially untrusted files, so it is preferable
// to avoid unsafe code.
#![forbid(unsafe_code)]

pub mod onnx;
pub mod protobuf;
