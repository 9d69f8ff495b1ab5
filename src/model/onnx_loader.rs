use oml_onnx::onnx;
use oml_onnx::onnx::{ModelProto, is_onnx_model};
use oml_onnx::protobuf::DecodeMessage;

use super::external_data::{DataLoader, DataLocation};
use super::load_error::{LoadError, LoadErrorImpl, load_error};
use super::{
    Attribute, AttributeValue, Dimension, Graph, MetadataEntry, Model, Node, OperatorSetId,
    Tensor, ValueInfo,
};
use crate::dtype::{DataType, Elements};

/// Load a model from a serialized ONNX model.
///
/// An ONNX model is the serialized `ModelProto` Protocol Buffers message
/// defined in https://github.com/onnx/onnx/blob/main/onnx/onnx.proto3.
pub fn load(data: &[u8], data_loader: &dyn DataLoader) -> Result<Model, LoadError> {
    if !is_onnx_model(data) {
        return Err(LoadErrorImpl::UnknownFileType.into());
    }
    let model =
        ModelProto::decode(data).map_err(|err| LoadErrorImpl::ParseFailed(Box::new(err)))?;

    let ModelProto {
        ir_version,
        opset_import,
        producer_name,
        producer_version,
        domain,
        model_version,
        doc_string,
        graph,
        metadata_props,
    } = model;

    let onnx_graph = graph.ok_or_else(|| load_error!(GraphError, None, "model has no graph"))?;
    let graph = load_graph(onnx_graph, data_loader)?;

    Ok(Model {
        ir_version: ir_version.unwrap_or_default(),
        opset_import: opset_import
            .into_iter()
            .map(|opset| OperatorSetId {
                domain: opset.domain.unwrap_or_default(),
                version: opset.version.unwrap_or_default(),
            })
            .collect(),
        producer_name: producer_name.unwrap_or_default(),
        producer_version: producer_version.unwrap_or_default(),
        domain: domain.unwrap_or_default(),
        model_version: model_version.unwrap_or_default(),
        doc_string: doc_string.unwrap_or_default(),
        graph,
        metadata_props: metadata_props
            .into_iter()
            .map(|prop| MetadataEntry {
                key: prop.key.unwrap_or_default(),
                value: prop.value.unwrap_or_default(),
            })
            .collect(),
    })
}

fn load_graph(
    onnx_graph: onnx::GraphProto,
    data_loader: &dyn DataLoader,
) -> Result<Graph, LoadError> {
    let onnx::GraphProto {
        name,
        node,
        initializer,
        sparse_initializer,
        input,
        output,
    } = onnx_graph;

    let initializers = initializer
        .into_iter()
        .map(|tensor| load_tensor(tensor, data_loader))
        .collect::<Result<Vec<_>, _>>()?;

    let nodes = node
        .into_iter()
        .map(|node| load_node(node, data_loader))
        .collect::<Result<Vec<_>, _>>()?;

    // Only the values of sparse tensors are kept. The indices are not part of
    // the converted representation.
    let sparse_initializers = sparse_initializer
        .into_iter()
        .map(|sparse| {
            let values = sparse.values.ok_or_else(|| {
                load_error!(GraphError, None, "sparse initializer is missing values")
            })?;
            load_tensor(values, data_loader)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Graph {
        name: name.unwrap_or_default(),
        inputs: input.iter().map(load_value_info).collect(),
        outputs: output.iter().map(load_value_info).collect(),
        initializers,
        nodes,
        sparse_initializers,
    })
}

/// Convert data type and shape information from an ONNX value.
fn load_value_info(value: &onnx::ValueInfoProto) -> ValueInfo {
    let tensor_type = value
        .r#type
        .as_ref()
        .and_then(|type_info| type_info.tensor_type.as_ref());

    let elem_type = tensor_type
        .and_then(|tensor_type| tensor_type.elem_type)
        .map_or(DataType::UNDEFINED, |dtype| DataType(dtype.0));

    let shape = tensor_type
        .and_then(|tensor_type| tensor_type.shape.as_ref())
        .map(|shape| {
            shape
                .dim
                .iter()
                .map(|dim| {
                    if let Some(size) = dim.dim_value {
                        Dimension::Fixed(size)
                    } else if let Some(name) = &dim.dim_param {
                        Dimension::Symbolic(name.clone())
                    } else {
                        Dimension::Unknown
                    }
                })
                .collect()
        });

    ValueInfo {
        name: value.name.clone().unwrap_or_default(),
        elem_type,
        shape,
    }
}

fn load_node(node: onnx::NodeProto, data_loader: &dyn DataLoader) -> Result<Node, LoadError> {
    let name = node.name.unwrap_or_default();
    let attributes = node
        .attribute
        .into_iter()
        .map(|attr| load_attribute(attr, &name, data_loader))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Node {
        name,
        op_type: node.op_type.unwrap_or_default(),
        domain: node.domain.unwrap_or_default(),
        inputs: node.input,
        outputs: node.output,
        attributes,
    })
}

/// Infer the type of an attribute that has no `type` field from the fields
/// that are set.
fn infer_attr_type(attr: &onnx::AttributeProto) -> Option<onnx::AttributeType> {
    type Type = onnx::AttributeType;

    let attr_type = if attr.f.is_some() {
        Type::FLOAT
    } else if attr.i.is_some() {
        Type::INT
    } else if attr.s.is_some() {
        Type::STRING
    } else if attr.t.is_some() {
        Type::TENSOR
    } else if attr.g.is_some() {
        Type::GRAPH
    } else if !attr.floats.is_empty() {
        Type::FLOATS
    } else if !attr.ints.is_empty() {
        Type::INTS
    } else if !attr.strings.is_empty() {
        Type::STRINGS
    } else if !attr.tensors.is_empty() {
        Type::TENSORS
    } else if !attr.graphs.is_empty() {
        Type::GRAPHS
    } else {
        return None;
    };
    Some(attr_type)
}

fn load_attribute(
    attr: onnx::AttributeProto,
    node_name: &str,
    data_loader: &dyn DataLoader,
) -> Result<Attribute, LoadError> {
    type Type = onnx::AttributeType;

    let node = Some(node_name);
    let name = attr.name.clone().unwrap_or_default();

    let attr_type = match attr.r#type {
        Some(attr_type) if attr_type != Type::UNDEFINED => attr_type,
        _ => infer_attr_type(&attr).ok_or_else(|| {
            load_error!(AttributeError, node, "attribute \"{}\" has no value", name)
        })?,
    };

    let value = match attr_type {
        Type::FLOAT => AttributeValue::Float(attr.f.unwrap_or_default()),
        Type::INT => AttributeValue::Int(attr.i.unwrap_or_default()),
        Type::STRING => AttributeValue::String(attr.s.unwrap_or_default()),
        Type::TENSOR => {
            let Some(tensor) = attr.t else {
                return Err(load_error!(
                    AttributeError,
                    node,
                    "attribute \"{}\" is missing its tensor",
                    name
                ));
            };
            AttributeValue::Tensor(load_tensor(tensor, data_loader)?)
        }
        Type::GRAPH => {
            let Some(graph) = attr.g else {
                return Err(load_error!(
                    AttributeError,
                    node,
                    "attribute \"{}\" is missing its graph",
                    name
                ));
            };
            AttributeValue::Graph(load_graph(graph, data_loader)?)
        }
        Type::FLOATS => AttributeValue::Floats(attr.floats),
        Type::INTS => AttributeValue::Ints(attr.ints),
        Type::STRINGS => AttributeValue::Strings(attr.strings),
        Type::TENSORS => AttributeValue::Tensors(
            attr.tensors
                .into_iter()
                .map(|tensor| load_tensor(tensor, data_loader))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Type::GRAPHS => AttributeValue::Graphs(
            attr.graphs
                .into_iter()
                .map(|graph| load_graph(graph, data_loader))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        // Known unsupported types: sparse tensors and type protos.
        other => {
            return Err(load_error!(
                AttributeError,
                node,
                "attribute \"{}\" has unsupported type {}",
                name,
                other.0
            ));
        }
    };

    Ok(Attribute { name, value })
}

/// Load an ONNX tensor.
///
/// The payload is taken from the `raw_data` field, an external data file or
/// one of the typed `*_data` fields, in that order of preference. Payloads
/// from typed fields are converted to packed little-endian form.
///
/// The payload is not checked against the tensor's dims here. Mismatches are
/// reported when the tensor is converted.
fn load_tensor(
    mut tensor: onnx::TensorProto,
    data_loader: &dyn DataLoader,
) -> Result<Tensor, LoadError> {
    let name = std::mem::take(&mut tensor.name).unwrap_or_default();
    let data_type = tensor
        .data_type
        .map_or(DataType::UNDEFINED, |dtype| DataType(dtype.0));

    let data_location = tensor
        .data_location
        .unwrap_or(onnx::DataLocation::DEFAULT);
    let raw_data = match data_location {
        onnx::DataLocation::DEFAULT => tensor
            .raw_data
            .take()
            .or_else(|| pack_typed_data(data_type, &tensor)),
        onnx::DataLocation::EXTERNAL => {
            let location = DataLocation::from_entries(Some(name.as_str()), &tensor.external_data)?;
            let data = data_loader
                .load(&location)
                .map_err(|err| load_error!(ExternalDataError, Some(name.as_str()), err))?;
            Some(data)
        }
        other => {
            return Err(load_error!(
                GraphError,
                Some(name.as_str()),
                "unsupported data location {}",
                other.0
            ));
        }
    };

    Ok(Tensor {
        name,
        data_type,
        dims: tensor.dims,
        raw_data,
    })
}

/// Convert tensor data stored in the typed `*_data` fields of a `TensorProto`
/// into a packed little-endian payload.
///
/// Returns `None` if the field used by `data_type` is empty.
fn pack_typed_data(data_type: DataType, tensor: &onnx::TensorProto) -> Option<Vec<u8>> {
    let int32s = &tensor.int32_data;

    let elements = match data_type {
        // Complex numbers are stored as interleaved real and imaginary parts.
        DataType::FLOAT | DataType::COMPLEX64 => Elements::Float(tensor.float_data.clone()),
        DataType::DOUBLE | DataType::COMPLEX128 => Elements::Double(tensor.double_data.clone()),
        DataType::INT32 => Elements::Int32(int32s.clone()),
        DataType::INT16 => Elements::Int16(int32s.iter().map(|&x| x as i16).collect()),
        DataType::INT8 => Elements::Int8(int32s.iter().map(|&x| x as i8).collect()),
        DataType::UINT8 => Elements::Uint8(int32s.iter().map(|&x| x as u8).collect()),
        DataType::BOOL => Elements::Bool(int32s.iter().map(|&x| x != 0).collect()),

        // 16-bit floats are stored as their bit patterns.
        DataType::UINT16 | DataType::FLOAT16 | DataType::BFLOAT16 => {
            Elements::Uint16(int32s.iter().map(|&x| x as u16).collect())
        }
        DataType::INT64 => Elements::Int64(tensor.int64_data.clone()),
        DataType::UINT32 => {
            Elements::Uint32(tensor.uint64_data.iter().map(|&x| x as u32).collect())
        }
        DataType::UINT64 => Elements::Uint64(tensor.uint64_data.clone()),
        _ => return None,
    };

    (!elements.is_empty()).then(|| elements.to_le_bytes())
}
