use crate::document::{AttributeJson, AttributeValueJson};
use crate::error::ConvertError;
use crate::model::{Attribute, AttributeValue};
use crate::sidecar::SideCar;
use crate::tensor::convert_tensor;
use crate::walker::convert_graph_at_depth;

/// Convert a node attribute to its JSON representation.
///
/// Tensor payloads are written to `sink` if present, starting at `offset`.
/// The returned offset is the end of the last payload written. Strings are
/// decoded as UTF-8, with invalid sequences replaced by U+FFFD.
///
/// Graph-valued attributes are converted as if the node belonged to a root
/// graph. Use [`convert_model`](crate::convert_model) to convert attributes
/// in context.
pub fn convert_attribute(
    attr: &Attribute,
    offset: u64,
    sink: Option<&mut SideCar<'_>>,
) -> Result<(AttributeJson, u64), ConvertError> {
    convert_attribute_at_depth(attr, offset, sink, 0)
}

/// Convert an attribute of a node in a graph nested `depth` levels below the
/// root graph.
pub(crate) fn convert_attribute_at_depth(
    attr: &Attribute,
    offset: u64,
    mut sink: Option<&mut SideCar<'_>>,
    depth: usize,
) -> Result<(AttributeJson, u64), ConvertError> {
    let mut offset = offset;

    let value = match &attr.value {
        AttributeValue::Float(val) => AttributeValueJson::Float(*val),
        AttributeValue::Int(val) => AttributeValueJson::Int(*val),
        AttributeValue::String(bytes) => AttributeValueJson::String(utf8_lossy(bytes)),
        AttributeValue::Tensor(tensor) => {
            let (json, next_offset) = convert_tensor(tensor, offset, sink)?;
            offset = next_offset;
            AttributeValueJson::Tensor(Box::new(json))
        }
        AttributeValue::Graph(graph) => {
            let (json, next_offset) = convert_graph_at_depth(graph, offset, sink, depth + 1)?;
            offset = next_offset;
            AttributeValueJson::Graph(Box::new(json))
        }
        AttributeValue::Floats(vals) => AttributeValueJson::Floats(vals.clone()),
        AttributeValue::Ints(vals) => AttributeValueJson::Ints(vals.clone()),
        AttributeValue::Strings(vals) => {
            AttributeValueJson::Strings(vals.iter().map(|bytes| utf8_lossy(bytes)).collect())
        }
        AttributeValue::Tensors(tensors) => {
            let mut items = Vec::with_capacity(tensors.len());
            for tensor in tensors {
                let (json, next_offset) = convert_tensor(tensor, offset, sink.as_deref_mut())?;
                offset = next_offset;
                items.push(json);
            }
            AttributeValueJson::Tensors(items)
        }
        AttributeValue::Graphs(graphs) => {
            let mut items = Vec::with_capacity(graphs.len());
            for graph in graphs {
                let (json, next_offset) =
                    convert_graph_at_depth(graph, offset, sink.as_deref_mut(), depth + 1)?;
                offset = next_offset;
                items.push(json);
            }
            AttributeValueJson::Graphs(items)
        }
    };

    let json = AttributeJson {
        name: attr.name.clone(),
        attr_type: attr.value.attr_type().tag().to_string(),
        value,
    };
    Ok((json, offset))
}

fn utf8_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
