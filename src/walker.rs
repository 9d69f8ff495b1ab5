use crate::attribute::convert_attribute_at_depth;
use crate::document::{
    DimJson, GraphJson, ModelJson, NodeJson, ShapeJson, TensorJson, TensorTypeJson, TypeJson,
    ValueInfoJson, type_tag,
};
use crate::error::ConvertError;
use crate::model::{Dimension, Graph, Model, Node, Tensor, ValueInfo};
use crate::sidecar::SideCar;
use crate::tensor::convert_tensor;

/// Maximum depth of nested graphs, not counting the root graph.
///
/// Subgraphs appear in the attributes of control flow operators such as `If`
/// and `Loop`.
pub const MAX_GRAPH_DEPTH: usize = 32;

/// Convert a model to its JSON document.
///
/// If `sink` is present, tensor payloads are appended to it in traversal
/// order, starting at its current length. The traversal order is graph
/// inputs, outputs, initializers, nodes (and within each node, its
/// attributes) and finally sparse initializers.
///
/// Returns the document and the side-car offset after the last payload.
pub fn convert_model(
    model: &Model,
    mut sink: Option<&mut SideCar<'_>>,
) -> Result<(ModelJson, u64), ConvertError> {
    let offset = sink.as_deref().map_or(0, |sidecar| sidecar.len());
    let (graph, offset) = convert_graph(&model.graph, offset, sink.as_deref_mut())?;

    let json = ModelJson {
        ir_version: model.ir_version,
        opset_import: model.opset_import.clone(),
        producer_name: model.producer_name.clone(),
        producer_version: model.producer_version.clone(),
        domain: model.domain.clone(),
        model_version: model.model_version,
        doc_string: model.doc_string.clone(),
        graph,
        metadata_props: model.metadata_props.clone(),
    };
    Ok((json, offset))
}

/// Convert a root graph, writing tensor payloads to `sink` starting at
/// `offset`.
pub fn convert_graph(
    graph: &Graph,
    offset: u64,
    sink: Option<&mut SideCar<'_>>,
) -> Result<(GraphJson, u64), ConvertError> {
    convert_graph_at_depth(graph, offset, sink, 0)
}

pub(crate) fn convert_graph_at_depth(
    graph: &Graph,
    offset: u64,
    mut sink: Option<&mut SideCar<'_>>,
    depth: usize,
) -> Result<(GraphJson, u64), ConvertError> {
    if depth > MAX_GRAPH_DEPTH {
        return Err(ConvertError::NestingTooDeep {
            graph: graph.name.clone(),
        });
    }

    let inputs = graph.inputs.iter().map(convert_value_info).collect();
    let outputs = graph.outputs.iter().map(convert_value_info).collect();

    let (initializers, mut offset) =
        convert_tensors(&graph.initializers, offset, sink.as_deref_mut())?;

    let mut nodes = Vec::with_capacity(graph.nodes.len());
    for node in &graph.nodes {
        let (json, next_offset) = convert_node(node, offset, sink.as_deref_mut(), depth)?;
        offset = next_offset;
        nodes.push(json);
    }

    let (sparse_initializers, offset) =
        convert_tensors(&graph.sparse_initializers, offset, sink.as_deref_mut())?;

    let json = GraphJson {
        name: graph.name.clone(),
        inputs,
        outputs,
        initializers,
        nodes,
        sparse_initializers,
    };
    Ok((json, offset))
}

fn convert_tensors(
    tensors: &[Tensor],
    mut offset: u64,
    mut sink: Option<&mut SideCar<'_>>,
) -> Result<(Vec<TensorJson>, u64), ConvertError> {
    let mut items = Vec::with_capacity(tensors.len());
    for tensor in tensors {
        let (json, next_offset) = convert_tensor(tensor, offset, sink.as_deref_mut())?;
        offset = next_offset;
        items.push(json);
    }
    Ok((items, offset))
}

fn convert_node(
    node: &Node,
    mut offset: u64,
    mut sink: Option<&mut SideCar<'_>>,
    depth: usize,
) -> Result<(NodeJson, u64), ConvertError> {
    let mut attributes = Vec::with_capacity(node.attributes.len());
    for attr in &node.attributes {
        let (json, next_offset) =
            convert_attribute_at_depth(attr, offset, sink.as_deref_mut(), depth)?;
        offset = next_offset;
        attributes.push(json);
    }

    let json = NodeJson {
        name: node.name.clone(),
        op_type: node.op_type.clone(),
        domain: node.domain.clone(),
        inputs: node.inputs.clone(),
        outputs: node.outputs.clone(),
        attributes,
    };
    Ok((json, offset))
}

fn convert_value_info(value: &ValueInfo) -> ValueInfoJson {
    let shape = value.shape.as_ref().map(|dims| ShapeJson {
        dim: dims
            .iter()
            .map(|dim| match dim {
                Dimension::Fixed(size) => DimJson {
                    dim_value: Some(*size),
                    dim_param: None,
                },
                Dimension::Symbolic(name) => DimJson {
                    dim_value: None,
                    dim_param: Some(name.clone()),
                },
                Dimension::Unknown => DimJson {
                    dim_value: None,
                    dim_param: None,
                },
            })
            .collect(),
    });

    ValueInfoJson {
        name: value.name.clone(),
        value_type: TypeJson {
            tensor_type: TensorTypeJson {
                elem_type: type_tag(value.elem_type),
                shape,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{convert_graph, convert_model};
    use crate::dtype::DataType;
    use crate::model::{
        Attribute, AttributeValue, Dimension, Graph, MetadataEntry, Model, Node, OperatorSetId,
        Tensor, ValueInfo,
    };
    use crate::sidecar::SideCar;

    fn u8_tensor(name: &str, data: &[u8]) -> Tensor {
        Tensor::new(name, DataType::UINT8, &[data.len() as i64], Some(data.to_vec()))
    }

    /// Build a graph where every place a tensor can appear holds a tensor
    /// with a distinct byte value, so the side-car contents show the order in
    /// which tensors were visited.
    fn ordering_graph() -> Graph {
        let subgraph = Graph {
            name: "sub".into(),
            initializers: vec![u8_tensor("sub_init", &[3])],
            ..Default::default()
        };
        Graph {
            name: "main".into(),
            initializers: vec![u8_tensor("init_0", &[1]), u8_tensor("init_1", &[2, 2])],
            nodes: vec![
                Node {
                    name: "if_0".into(),
                    op_type: "If".into(),
                    attributes: vec![Attribute::new("then_branch", AttributeValue::Graph(subgraph))],
                    ..Default::default()
                },
                Node {
                    name: "const_0".into(),
                    op_type: "Constant".into(),
                    attributes: vec![Attribute::new(
                        "value",
                        AttributeValue::Tensor(u8_tensor("const", &[4])),
                    )],
                    ..Default::default()
                },
            ],
            sparse_initializers: vec![u8_tensor("sparse", &[5])],
            ..Default::default()
        }
    }

    #[test]
    fn test_convert_model() {
        let model = Model {
            ir_version: 8,
            opset_import: vec![OperatorSetId {
                domain: String::new(),
                version: 17,
            }],
            producer_name: "pytorch".into(),
            producer_version: "2.1".into(),
            domain: String::new(),
            model_version: 1,
            doc_string: String::new(),
            graph: Graph {
                name: "main".into(),
                inputs: vec![ValueInfo {
                    name: "x".into(),
                    elem_type: DataType::FLOAT,
                    shape: Some(vec![
                        Dimension::Symbolic("batch".into()),
                        Dimension::Fixed(3),
                        Dimension::Unknown,
                    ]),
                }],
                outputs: vec![ValueInfo {
                    name: "y".into(),
                    elem_type: DataType::FLOAT,
                    shape: None,
                }],
                nodes: vec![Node {
                    name: "relu".into(),
                    op_type: "Relu".into(),
                    domain: String::new(),
                    inputs: vec!["x".into()],
                    outputs: vec!["y".into()],
                    attributes: vec![],
                }],
                ..Default::default()
            },
            metadata_props: vec![MetadataEntry {
                key: "author".into(),
                value: "me".into(),
            }],
        };

        let (json, offset) = convert_model(&model, None).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(
            serde_json::to_value(&json).unwrap(),
            json!({
                "ir_version": 8,
                "opset_import": [{"domain": "", "version": 17}],
                "producer_name": "pytorch",
                "producer_version": "2.1",
                "domain": "",
                "model_version": 1,
                "doc_string": "",
                "graph": {
                    "name": "main",
                    "inputs": [{
                        "name": "x",
                        "type": {"tensor_type": {"elem_type": "1", "shape": {"dim": [
                            {"dim_value": null, "dim_param": "batch"},
                            {"dim_value": 3, "dim_param": null},
                            {"dim_value": null, "dim_param": null},
                        ]}}},
                    }],
                    "outputs": [{
                        "name": "y",
                        "type": {"tensor_type": {"elem_type": "1", "shape": null}},
                    }],
                    "initializers": [],
                    "nodes": [{
                        "name": "relu",
                        "op_type": "Relu",
                        "domain": "",
                        "inputs": ["x"],
                        "outputs": ["y"],
                        "attributes": [],
                    }],
                    "sparse_initializers": [],
                },
                "metadata_props": [{"key": "author", "value": "me"}],
            })
        );
    }

    #[test]
    fn test_traversal_order() {
        let graph = ordering_graph();

        let mut buf = Vec::new();
        let mut sidecar = SideCar::new(&mut buf);
        let (json, offset) = convert_graph(&graph, 0, Some(&mut sidecar)).unwrap();
        assert_eq!(offset, 6);
        assert_eq!(buf, [1, 2, 2, 3, 4, 5]);

        let json = serde_json::to_value(&json).unwrap();
        assert_eq!(json["initializers"][1]["weights_offset"], 1);
        assert_eq!(json["initializers"][1]["weights_size"], 2);
        let sub_init = &json["nodes"][0]["attributes"][0]["value"]["initializers"][0];
        assert_eq!(sub_init["weights_offset"], 3);
        assert_eq!(json["sparse_initializers"][0]["weights_offset"], 5);
    }

    #[test]
    fn test_start_offset_is_sidecar_length() {
        let model = Model {
            graph: ordering_graph(),
            ..Default::default()
        };

        let mut buf = Vec::new();
        let mut sidecar = SideCar::new(&mut buf);
        sidecar.append(0, &[0; 10]).unwrap();

        let (json, offset) = convert_model(&model, Some(&mut sidecar)).unwrap();
        assert_eq!(offset, 16);
        assert_eq!(sidecar.len(), 16);
        let first = json.graph.initializers[0].sidecar_ref().unwrap();
        assert_eq!(first.weights_offset, 10);
    }
}
