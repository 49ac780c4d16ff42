// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the blueprint graph.
//!
//! Node behaviour is a closed set of kinds. Each kind declares its slot
//! layout here; type rules live in [`crate::types`] and IR lowering in
//! [`crate::ir`], both as exhaustive matches over [`NodeKind`].

use crate::callable::CallableGraph;
use crate::output::SemanticBlock;
use crate::port::{InputSlot, OutputSlot, SlotId, SlotValue, TypeSet, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a node within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Properties of a constant node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantProps {
    /// Literal value
    pub value: SlotValue,
    /// When set, the value is exposed as a uniform parameter of this name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// Properties of a texture reference node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureProps {
    /// Binding name in the generated shader
    pub name: String,
    /// Asset the renderer binds (opaque to the compiler)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Properties of a function-input placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInputProps {
    /// Port name, `arg_<index>` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Type fixed when the graph was authored
    pub value_type: ValueType,
    /// Value used when a call site leaves the argument unconnected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<SlotValue>,
}

/// Properties of a function-output placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionOutputProps {
    /// Port name, `out_<index>` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Types the placeholder accepts
    #[serde(default = "numeric")]
    pub accepts: TypeSet,
}

fn numeric() -> TypeSet {
    TypeSet::NUMERIC
}

/// Arithmetic and intrinsic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathOp {
    /// A + B
    Add,
    /// A - B
    Subtract,
    /// A * B
    Multiply,
    /// A / B
    Divide,
    /// Component-wise minimum
    Min,
    /// Component-wise maximum
    Max,
    /// A raised to B
    Power,
    /// Linear interpolation between A and B by T
    Lerp,
    /// Dot product
    Dot,
    /// Sine (radians)
    Sin,
    /// Cosine (radians)
    Cos,
    /// Absolute value
    Abs,
    /// Normalize to unit length
    Normalize,
    /// 1 - x
    OneMinus,
    /// Clamp to [0, 1]
    Saturate,
}

impl MathOp {
    /// Names of the operand slots, in slot-id order
    pub fn operand_names(self) -> &'static [&'static str] {
        match self {
            Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::Min
            | Self::Max
            | Self::Power
            | Self::Dot => &["A", "B"],
            Self::Lerp => &["A", "B", "T"],
            Self::Sin | Self::Cos | Self::Abs | Self::Normalize | Self::OneMinus | Self::Saturate => {
                &["Value"]
            }
        }
    }

    /// Types accepted by every operand
    pub fn operand_types(self) -> TypeSet {
        match self {
            Self::Normalize | Self::Dot => TypeSet::VECTORS,
            _ => TypeSet::NUMERIC,
        }
    }

    /// Display name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::Min => "Minimum",
            Self::Max => "Maximum",
            Self::Power => "Power",
            Self::Lerp => "Lerp",
            Self::Dot => "Dot Product",
            Self::Sin => "Sine",
            Self::Cos => "Cosine",
            Self::Abs => "Absolute",
            Self::Normalize => "Normalize",
            Self::OneMinus => "One Minus",
            Self::Saturate => "Saturate",
        }
    }
}

/// Node kind with its decoded properties
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Constant literal or uniform parameter
    Constant(ConstantProps),
    /// Bound texture
    TextureRef(TextureProps),
    /// Texture sample at a coordinate, with optional level of detail
    TextureSample,
    /// Arithmetic / intrinsic
    Math(MathOp),
    /// Semantic output block (evaluation sink)
    Output(SemanticBlock),
    /// Formal input of a callable graph
    FunctionInput(FunctionInputProps),
    /// Formal output of a callable graph
    FunctionOutput(FunctionOutputProps),
    /// Inlined call of a nested graph
    FunctionCall(CallTarget),
}

/// Callee of a function-call node
#[derive(Debug, Clone)]
pub enum CallTarget {
    /// Loaded and validated nested graph
    Resolved(Arc<CallableGraph>),
    /// Nested graph that failed to load; compiling a root that reaches it fails
    Unresolved {
        /// Library path of the callee
        path: String,
        /// Why loading failed
        reason: String,
    },
}

impl CallTarget {
    /// Library path of the callee
    pub fn path(&self) -> &str {
        match self {
            Self::Resolved(callable) => callable.path(),
            Self::Unresolved { path, .. } => path,
        }
    }

    /// The loaded callee, if any
    pub fn callable(&self) -> Option<&Arc<CallableGraph>> {
        match self {
            Self::Resolved(callable) => Some(callable),
            Self::Unresolved { .. } => None,
        }
    }
}

/// Texture-sample output slots
pub mod sample_slot {
    use crate::port::SlotId;

    /// Texture input
    pub const TEXTURE: SlotId = 0;
    /// Coordinate input
    pub const UV: SlotId = 1;
    /// Level-of-detail input
    pub const LOD: SlotId = 2;
    /// Full RGBA output
    pub const RGBA: SlotId = 0;
}

impl NodeKind {
    /// Default display name
    pub fn display_name(&self) -> String {
        match self {
            Self::Constant(_) => "Constant".to_string(),
            Self::TextureRef(props) => format!("Texture {}", props.name),
            Self::TextureSample => "Texture Sample".to_string(),
            Self::Math(op) => op.display_name().to_string(),
            Self::Output(block) => block.display_name().to_string(),
            Self::FunctionInput(_) => "Function Input".to_string(),
            Self::FunctionOutput(_) => "Function Output".to_string(),
            Self::FunctionCall(target) => format!("Call {}", target.path()),
        }
    }

    /// Slot layout for this kind
    pub fn layout(&self) -> (Vec<InputSlot>, Vec<OutputSlot>) {
        match self {
            Self::Constant(props) => (
                vec![],
                vec![OutputSlot::typed(0, "Value", props.value.value_type())],
            ),
            Self::TextureRef(_) => (
                vec![],
                vec![OutputSlot::typed(0, "Texture", ValueType::Texture)],
            ),
            Self::TextureSample => (
                vec![
                    InputSlot::new(sample_slot::TEXTURE, "Texture", TypeSet::TEXTURE).required(),
                    InputSlot::new(sample_slot::UV, "UV", TypeSet::single(ValueType::Vec2)).required(),
                    InputSlot::new(sample_slot::LOD, "Lod", TypeSet::single(ValueType::Scalar)),
                ],
                vec![
                    OutputSlot::typed(sample_slot::RGBA, "RGBA", ValueType::Vec4),
                    OutputSlot::typed(1, "RGB", ValueType::Vec3),
                    OutputSlot::typed(2, "R", ValueType::Scalar),
                    OutputSlot::typed(3, "G", ValueType::Scalar),
                    OutputSlot::typed(4, "B", ValueType::Scalar),
                    OutputSlot::typed(5, "A", ValueType::Scalar),
                ],
            ),
            Self::Math(op) => (
                op.operand_names()
                    .iter()
                    .zip(0..)
                    .map(|(name, id)| InputSlot::new(id, *name, op.operand_types()).required())
                    .collect(),
                vec![OutputSlot::inferred(0, "Result")],
            ),
            Self::Output(block) => (
                block
                    .ports()
                    .iter()
                    .zip(0..)
                    .map(|(port, id)| InputSlot::new(id, port.name, port.accepts))
                    .collect(),
                vec![],
            ),
            Self::FunctionInput(props) => {
                let name = props.name.clone().unwrap_or_else(|| "Value".to_string());
                (vec![], vec![OutputSlot::typed(0, name, props.value_type)])
            }
            Self::FunctionOutput(props) => (
                vec![InputSlot::new(0, "Value", props.accepts).required()],
                vec![OutputSlot::inferred(0, "Value")],
            ),
            Self::FunctionCall(CallTarget::Unresolved { .. }) => (vec![], vec![]),
            Self::FunctionCall(CallTarget::Resolved(callable)) => (
                callable
                    .inputs()
                    .iter()
                    .map(|formal| {
                        let slot = InputSlot::new(
                            formal.index,
                            formal.name.clone(),
                            TypeSet::single(formal.value_type),
                        );
                        match formal.default {
                            Some(value) => slot.with_default(value),
                            None => slot.required(),
                        }
                    })
                    .collect(),
                callable
                    .outputs()
                    .iter()
                    .map(|formal| OutputSlot::typed(formal.index, formal.name.clone(), formal.value_type))
                    .collect(),
            ),
        }
    }

    /// Whether this kind is a function-input placeholder
    pub fn is_function_input(&self) -> bool {
        matches!(self, Self::FunctionInput(_))
    }

    /// Whether this kind is a function-output placeholder
    pub fn is_function_output(&self) -> bool {
        matches!(self, Self::FunctionOutput(_))
    }

    /// Whether this is a call whose callee failed to load
    pub fn is_unresolved_call(&self) -> bool {
        matches!(self, Self::FunctionCall(CallTarget::Unresolved { .. }))
    }
}

/// A node instance in the graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Display name
    pub name: String,
    /// Kind and properties
    pub kind: NodeKind,
    /// Input slots
    pub inputs: Vec<InputSlot>,
    /// Output slots
    pub outputs: Vec<OutputSlot>,
}

impl Node {
    /// Create a node with the default slot layout of its kind
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        let (inputs, outputs) = kind.layout();
        Self {
            id,
            name: kind.display_name(),
            kind,
            inputs,
            outputs,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the default literal of an input slot
    pub fn with_input_default(mut self, slot: SlotId, value: SlotValue) -> Self {
        if let Some(input) = self.input_mut(slot) {
            input.default = Some(value);
        }
        self
    }

    /// Get an input slot by ID
    pub fn input(&self, slot: SlotId) -> Option<&InputSlot> {
        self.inputs.iter().find(|s| s.id == slot)
    }

    /// Get a mutable input slot by ID
    pub fn input_mut(&mut self, slot: SlotId) -> Option<&mut InputSlot> {
        self.inputs.iter_mut().find(|s| s.id == slot)
    }

    /// Get an output slot by ID
    pub fn output(&self, slot: SlotId) -> Option<&OutputSlot> {
        self.outputs.iter().find(|s| s.id == slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_layout() {
        let node = Node::new(NodeId(3), NodeKind::Math(MathOp::Lerp));
        assert_eq!(node.inputs.len(), 3);
        assert_eq!(node.input(2).map(|s| s.name.as_str()), Some("T"));
        assert!(node.inputs.iter().all(|s| s.required));
        assert_eq!(node.outputs[0].value_type, None);
    }

    #[test]
    fn test_texture_sample_layout() {
        let node = Node::new(NodeId(1), NodeKind::TextureSample);
        assert!(!node.input(sample_slot::LOD).unwrap().required);
        assert_eq!(node.output(1).unwrap().value_type, Some(ValueType::Vec3));
        assert_eq!(node.outputs.len(), 6);
    }

    #[test]
    fn test_normalize_accepts_vectors_only() {
        let node = Node::new(NodeId(2), NodeKind::Math(MathOp::Normalize));
        assert!(!node.inputs[0].allowed.contains(ValueType::Scalar));
        assert!(node.inputs[0].allowed.contains(ValueType::Vec3));
    }

    #[test]
    fn test_unresolved_call_has_no_slots() {
        let node = Node::new(
            NodeId(9),
            NodeKind::FunctionCall(CallTarget::Unresolved {
                path: "missing.json".to_string(),
                reason: "not found".to_string(),
            }),
        );
        assert!(node.inputs.is_empty() && node.outputs.is_empty());
        assert!(node.kind.is_unresolved_call());
        assert_eq!(node.name, "Call missing.json");
    }

    #[test]
    fn test_input_default_override() {
        let node = Node::new(NodeId(1), NodeKind::Math(MathOp::Add))
            .with_input_default(1, SlotValue::Scalar(1.0));
        assert_eq!(node.input(1).unwrap().default, Some(SlotValue::Scalar(1.0)));
        assert_eq!(node.input(0).unwrap().default, None);
    }

    #[test]
    fn test_call_layout_uses_formal_defaults() {
        use crate::dag::LinkPolicy;
        use crate::graph::Graph;

        let mut body = Graph::new("scale");
        body.add_node(Node::new(
            NodeId(1),
            NodeKind::FunctionInput(FunctionInputProps {
                name: Some("value".to_string()),
                value_type: ValueType::Vec3,
                default: None,
            }),
        ));
        body.add_node(Node::new(
            NodeId(2),
            NodeKind::FunctionInput(FunctionInputProps {
                name: Some("gain".to_string()),
                value_type: ValueType::Scalar,
                default: Some(SlotValue::Scalar(2.0)),
            }),
        ));
        body.add_node(Node::new(NodeId(3), NodeKind::Math(MathOp::Multiply)));
        body.add_node(Node::new(
            NodeId(4),
            NodeKind::FunctionOutput(FunctionOutputProps {
                name: Some("scaled".to_string()),
                accepts: TypeSet::NUMERIC,
            }),
        ));
        body.connect(NodeId(1), 0, NodeId(3), 0);
        body.connect(NodeId(2), 0, NodeId(3), 1);
        body.connect(NodeId(3), 0, NodeId(4), 0);
        let callable = CallableGraph::new("lib/scale.json", body, LinkPolicy::Strict).unwrap();

        let node = Node::new(NodeId(7), NodeKind::FunctionCall(CallTarget::Resolved(Arc::new(callable))));
        let value = node.input(0).unwrap();
        assert!(value.required);
        assert_eq!(value.default, None);
        let gain = node.input(1).unwrap();
        assert!(!gain.required);
        assert_eq!(gain.default, Some(SlotValue::Scalar(2.0)));
    }
}
