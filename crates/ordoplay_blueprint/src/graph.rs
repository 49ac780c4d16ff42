// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure and its persisted description.
//!
//! A [`GraphDescription`] is what lives on disk as JSON. Turning it
//! into a [`Graph`] decodes every node descriptor by its kind tag and
//! resolves nested-graph calls against already loaded callables.

use crate::callable::CallableGraph;
use crate::connection::Link;
use crate::node::{
    CallTarget, ConstantProps, FunctionInputProps, FunctionOutputProps, MathOp, Node, NodeId,
    NodeKind, TextureProps,
};
use crate::output::SemanticBlock;
use crate::port::{SlotId, SlotValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A blueprint graph: nodes, links and the evaluation sinks
#[derive(Debug, Clone)]
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, Node>,
    /// Links between nodes
    links: Vec<Link>,
    /// Nodes marked as evaluation sinks
    roots: Vec<NodeId>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            links: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Add a node to the graph, replacing any node with the same ID
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Add a node and mark it as an evaluation sink
    pub fn add_root(&mut self, node: Node) -> NodeId {
        let id = self.add_node(node);
        self.mark_root(id);
        id
    }

    /// Mark an existing node ID as an evaluation sink
    pub fn mark_root(&mut self, node_id: NodeId) {
        if !self.roots.contains(&node_id) {
            self.roots.push(node_id);
        }
    }

    /// Add a link. Links are validated when the DAG is built.
    pub fn connect(
        &mut self,
        start_node: NodeId,
        start_slot: SlotId,
        end_node: NodeId,
        end_slot: SlotId,
    ) {
        self.links.push(Link::new(start_node, start_slot, end_node, end_slot));
    }

    /// Remove a node and its links
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.links.retain(|l| !l.involves_node(node_id));
        self.roots.retain(|r| *r != node_id);
        self.nodes.shift_remove(&node_id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes, in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get all links
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Get the evaluation sinks
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Build a graph from its persisted description.
    ///
    /// `resolve` maps a nested-graph path to its loaded [`CallableGraph`], or
    /// to the reason it is unavailable. Unavailable callees become
    /// unresolved call nodes rather than failing the whole graph.
    pub fn from_description(
        description: &GraphDescription,
        mut resolve: impl FnMut(&str) -> Result<Arc<CallableGraph>, String>,
    ) -> Result<Self, GraphError> {
        let mut graph = Graph::new(description.name.clone().unwrap_or_else(|| "Untitled".to_string()));

        for entry in &description.nodes {
            if graph.nodes.contains_key(&entry.id) {
                return Err(GraphError::DuplicateNode(entry.id));
            }

            let kind = entry.node.decode(&mut resolve);
            let mut node = Node::new(entry.id, kind);
            if let Some(name) = &entry.name {
                node.name = name.clone();
            }
            for default in &entry.defaults {
                let input = node.input_mut(default.slot).ok_or(GraphError::UnknownInput {
                    node: entry.id,
                    slot: default.slot,
                })?;
                input.default = Some(default.value);
            }

            if entry.locked {
                graph.add_root(node);
            } else {
                graph.add_node(node);
            }
        }

        graph.links = description.links.clone();
        Ok(graph)
    }

    /// Convert back to the persisted description
    pub fn to_description(&self) -> GraphDescription {
        GraphDescription {
            name: Some(self.name.clone()),
            nodes: self
                .nodes
                .values()
                .map(|node| {
                    let (template, _) = node.kind.layout();
                    let defaults = node
                        .inputs
                        .iter()
                        .filter_map(|input| {
                            let value = input.default?;
                            let unchanged = template
                                .iter()
                                .any(|t| t.id == input.id && t.default == Some(value));
                            (!unchanged).then_some(InputDefault {
                                slot: input.id,
                                value,
                            })
                        })
                        .collect();
                    NodeEntry {
                        id: node.id,
                        locked: self.roots.contains(&node.id),
                        name: (node.name != node.kind.display_name()).then(|| node.name.clone()),
                        node: NodeDescriptor::from_kind(&node.kind),
                        defaults,
                    }
                })
                .collect(),
            links: self.links.clone(),
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Persisted graph format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    /// Optional graph name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Node entries
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    /// Links
    #[serde(default)]
    pub links: Vec<Link>,
}

/// One node entry in a persisted graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Node ID, unique within the graph
    pub id: NodeId,
    /// Marks the node as an evaluation sink
    #[serde(default)]
    pub locked: bool,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Kind tag + properties
    pub node: NodeDescriptor,
    /// Input default overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaults: Vec<InputDefault>,
}

/// Default literal override for one input slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputDefault {
    /// Input slot ID
    pub slot: SlotId,
    /// Literal value
    pub value: SlotValue,
}

/// Serializable node kind, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDescriptor {
    /// Constant literal or uniform parameter
    Constant(ConstantProps),
    /// Bound texture
    TextureRef(TextureProps),
    /// Texture sample
    TextureSample,
    /// Arithmetic / intrinsic
    Math {
        /// Operation
        op: MathOp,
    },
    /// Semantic output block
    Output {
        /// Block whose port catalog the node exposes
        block: SemanticBlock,
    },
    /// Formal input placeholder
    FunctionInput(FunctionInputProps),
    /// Formal output placeholder
    FunctionOutput(FunctionOutputProps),
    /// Call of a nested graph
    FunctionCall {
        /// Library path of the callee
        path: String,
    },
}

impl NodeDescriptor {
    /// Describe a decoded node kind
    pub fn from_kind(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Constant(props) => Self::Constant(props.clone()),
            NodeKind::TextureRef(props) => Self::TextureRef(props.clone()),
            NodeKind::TextureSample => Self::TextureSample,
            NodeKind::Math(op) => Self::Math { op: *op },
            NodeKind::Output(block) => Self::Output { block: *block },
            NodeKind::FunctionInput(props) => Self::FunctionInput(props.clone()),
            NodeKind::FunctionOutput(props) => Self::FunctionOutput(props.clone()),
            NodeKind::FunctionCall(target) => Self::FunctionCall {
                path: target.path().to_string(),
            },
        }
    }

    fn decode(
        &self,
        resolve: &mut impl FnMut(&str) -> Result<Arc<CallableGraph>, String>,
    ) -> NodeKind {
        match self {
            Self::Constant(props) => NodeKind::Constant(props.clone()),
            Self::TextureRef(props) => NodeKind::TextureRef(props.clone()),
            Self::TextureSample => NodeKind::TextureSample,
            Self::Math { op } => NodeKind::Math(*op),
            Self::Output { block } => NodeKind::Output(*block),
            Self::FunctionInput(props) => NodeKind::FunctionInput(props.clone()),
            Self::FunctionOutput(props) => NodeKind::FunctionOutput(props.clone()),
            Self::FunctionCall { path } => NodeKind::FunctionCall(match resolve(path) {
                Ok(callable) => CallTarget::Resolved(callable),
                Err(reason) => CallTarget::Unresolved {
                    path: path.clone(),
                    reason,
                },
            }),
        }
    }
}

impl GraphDescription {
    /// Parse a JSON description
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Paths of every nested graph this description calls
    pub fn call_paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|entry| match &entry.node {
            NodeDescriptor::FunctionCall { path } => Some(path.as_str()),
            _ => None,
        })
    }
}

/// Error when building a graph from its description
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Two entries share an ID
    #[error("Duplicate node ID {0}")]
    DuplicateNode(NodeId),

    /// A default override names a missing input
    #[error("Node {node} has no input slot {slot}")]
    UnknownInput {
        /// Node
        node: NodeId,
        /// Slot
        slot: SlotId,
    },

    /// Text could not be decoded
    #[error("Invalid graph description: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_A: &str = r#"{
        "nodes": [
            { "id": 1, "node": { "kind": "constant", "value": { "Scalar": 5.0 } } },
            { "id": 2, "locked": true, "node": { "kind": "output", "block": "Surface" } }
        ],
        "links": [ { "startNodeId": 1, "startSlotId": 0, "endNodeId": 2, "endSlotId": 0 } ]
    }"#;

    fn no_library(path: &str) -> Result<Arc<CallableGraph>, String> {
        Err(format!("`{path}` is not loaded"))
    }

    #[test]
    fn test_parse_json_description() {
        let description = GraphDescription::from_json(SCENARIO_A).unwrap();
        let graph = Graph::from_description(&description, no_library).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.roots(), &[NodeId(2)]);
        assert_eq!(graph.links().len(), 1);
        assert!(matches!(graph.node(NodeId(1)).unwrap().kind, NodeKind::Constant(_)));
    }

    #[test]
    fn test_description_round_trip() {
        let description = GraphDescription::from_json(SCENARIO_A).unwrap();
        let graph = Graph::from_description(&description, no_library).unwrap();
        let text = graph.to_description().to_json().unwrap();
        let loaded = GraphDescription::from_json(&text).unwrap();
        assert_eq!(loaded.nodes, description.nodes);
        assert_eq!(loaded.links, description.links);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut description = GraphDescription::from_json(SCENARIO_A).unwrap();
        let mut duplicate = description.nodes[0].clone();
        duplicate.locked = true;
        description.nodes.push(duplicate);
        let err = Graph::from_description(&description, no_library).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode(NodeId(1))));
    }

    #[test]
    fn test_unresolved_call() {
        let description = GraphDescription {
            name: None,
            nodes: vec![NodeEntry {
                id: NodeId(7),
                locked: false,
                name: None,
                node: NodeDescriptor::FunctionCall {
                    path: "lib/tint.json".to_string(),
                },
                defaults: vec![],
            }],
            links: vec![],
        };
        assert_eq!(description.call_paths().collect::<Vec<_>>(), vec!["lib/tint.json"]);
        let graph = Graph::from_description(&description, no_library).unwrap();
        match &graph.node(NodeId(7)).unwrap().kind {
            NodeKind::FunctionCall(CallTarget::Unresolved { path, reason }) => {
                assert_eq!(path, "lib/tint.json");
                assert!(reason.contains("not loaded"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_default_override_applied() {
        let description = GraphDescription {
            name: Some("defaults".to_string()),
            nodes: vec![NodeEntry {
                id: NodeId(1),
                locked: false,
                name: None,
                node: NodeDescriptor::Math { op: MathOp::Multiply },
                defaults: vec![InputDefault {
                    slot: 1,
                    value: SlotValue::Scalar(2.0),
                }],
            }],
            links: vec![],
        };
        let graph = Graph::from_description(&description, no_library).unwrap();
        let node = graph.node(NodeId(1)).unwrap();
        assert_eq!(node.input(1).unwrap().default, Some(SlotValue::Scalar(2.0)));
        assert_eq!(graph.to_description().nodes[0].defaults.len(), 1);
    }
}
