//! Structural validation of models.
//!
//! These checks catch models that are malformed as graphs, such as nodes
//! without an operator type or values produced by more than one node. They
//! do not check operator semantics or types.

use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::model::{AttributeValue, Graph, Model, Node, Tensor};

/// Reasons why a model failed validation.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    /// The model's IR version is missing or not positive.
    InvalidIrVersion(i64),

    /// The model does not import any operator sets.
    MissingOpsetImport,

    /// A node has an empty operator type.
    MissingOpType { node: String },

    /// Two initializers in the same graph have the same name.
    DuplicateInitializer { name: String },

    /// A value is produced by more than one node in the same graph.
    DuplicateOutput { name: String },

    /// A graph input or output has no name.
    UnnamedValue { graph: String },

    /// A node has an attribute with an empty name.
    UnnamedAttribute { node: String },

    /// A node has two attributes with the same name.
    DuplicateAttribute { node: String, name: String },

    /// A tensor has a negative dimension size.
    NegativeDim { tensor: String, dim: i64 },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIrVersion(version) => write!(f, "invalid IR version {}", version),
            Self::MissingOpsetImport => write!(f, "model has no opset imports"),
            Self::MissingOpType { node } => write!(f, "node \"{}\" has no operator type", node),
            Self::DuplicateInitializer { name } => {
                write!(f, "duplicate initializer \"{}\"", name)
            }
            Self::DuplicateOutput { name } => {
                write!(f, "value \"{}\" is produced by more than one node", name)
            }
            Self::UnnamedValue { graph } => {
                write!(f, "graph \"{}\" has an unnamed input or output", graph)
            }
            Self::UnnamedAttribute { node } => {
                write!(f, "node \"{}\" has an unnamed attribute", node)
            }
            Self::DuplicateAttribute { node, name } => {
                write!(f, "node \"{}\" has duplicate attribute \"{}\"", node, name)
            }
            Self::NegativeDim { tensor, dim } => {
                write!(f, "tensor \"{}\" has negative dimension {}", tensor, dim)
            }
        }
    }
}

impl Error for ValidationError {}

/// Check a model for structural problems.
///
/// Subgraphs in node attributes are checked with the same rules as the root
/// graph.
pub fn check_model(model: &Model) -> Result<(), ValidationError> {
    if model.ir_version <= 0 {
        return Err(ValidationError::InvalidIrVersion(model.ir_version));
    }
    if model.opset_import.is_empty() {
        return Err(ValidationError::MissingOpsetImport);
    }
    check_graph(&model.graph)
}

fn check_graph(graph: &Graph) -> Result<(), ValidationError> {
    if graph
        .inputs
        .iter()
        .chain(&graph.outputs)
        .any(|value| value.name.is_empty())
    {
        return Err(ValidationError::UnnamedValue {
            graph: graph.name.clone(),
        });
    }

    let mut initializer_names = HashSet::new();
    for tensor in &graph.initializers {
        if !initializer_names.insert(tensor.name.as_str()) {
            return Err(ValidationError::DuplicateInitializer {
                name: tensor.name.clone(),
            });
        }
        check_tensor(tensor)?;
    }
    for tensor in &graph.sparse_initializers {
        check_tensor(tensor)?;
    }

    let mut output_names = HashSet::new();
    for node in &graph.nodes {
        // Empty names mark omitted optional outputs.
        for output in node.outputs.iter().filter(|name| !name.is_empty()) {
            if !output_names.insert(output.as_str()) {
                return Err(ValidationError::DuplicateOutput {
                    name: output.clone(),
                });
            }
        }
        check_node(node)?;
    }

    Ok(())
}

fn check_node(node: &Node) -> Result<(), ValidationError> {
    if node.op_type.is_empty() {
        return Err(ValidationError::MissingOpType {
            node: node.name.clone(),
        });
    }

    let mut attr_names = HashSet::new();
    for attr in &node.attributes {
        if attr.name.is_empty() {
            return Err(ValidationError::UnnamedAttribute {
                node: node.name.clone(),
            });
        }
        if !attr_names.insert(attr.name.as_str()) {
            return Err(ValidationError::DuplicateAttribute {
                node: node.name.clone(),
                name: attr.name.clone(),
            });
        }

        match &attr.value {
            AttributeValue::Tensor(tensor) => check_tensor(tensor)?,
            AttributeValue::Tensors(tensors) => tensors.iter().try_for_each(check_tensor)?,
            AttributeValue::Graph(graph) => check_graph(graph)?,
            AttributeValue::Graphs(graphs) => graphs.iter().try_for_each(check_graph)?,
            _ => {}
        }
    }

    Ok(())
}

fn check_tensor(tensor: &Tensor) -> Result<(), ValidationError> {
    match tensor.dims.iter().find(|&&dim| dim < 0) {
        Some(&dim) => Err(ValidationError::NegativeDim {
            tensor: tensor.name.clone(),
            dim,
        }),
        None => Ok(()),
    }
}
