// SPDX-License-Identifier: MIT OR Apache-2.0
//! Intermediate representation and per-node expression cache.
//!
//! Expressions are shared through `Rc`: a producer feeding several
//! consumers is lowered once and every consumer holds the same instance.
//! Each expression also carries a use counter that the target lowering
//! reads to decide whether a value is worth binding to a local.

use crate::callable::CallableGraph;
use crate::dag::Dag;
use crate::node::{sample_slot, CallTarget, MathOp, Node, NodeId, NodeKind};
use crate::port::{SlotId, SlotValue, ValueType};
use crate::types::TypeTable;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to an expression
pub type ExprRef = Rc<IrExpr>;

/// Vector component selector, with constant fill values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// First component
    X,
    /// Second component
    Y,
    /// Third component
    Z,
    /// Fourth component
    W,
    /// Literal 0
    Zero,
    /// Literal 1
    One,
}

impl Component {
    /// Component at a vector index
    pub fn at(index: usize) -> Self {
        match index {
            0 => Self::X,
            1 => Self::Y,
            2 => Self::Z,
            _ => Self::W,
        }
    }
}

/// Components that convert a value of type `from` into `to`.
///
/// Scalars are splatted, wider vectors truncated and narrower vectors
/// padded with zero (and one in the fourth lane).
pub fn cast_components(from: ValueType, to: ValueType) -> Vec<Component> {
    let (Some(source), Some(target)) = (from.components(), to.components()) else {
        return Vec::new();
    };
    (0..target)
        .map(|i| match (source, i) {
            (1, _) => Component::X,
            (_, i) if i < source => Component::at(i),
            (_, 3) => Component::One,
            _ => Component::Zero,
        })
        .collect()
}

/// Expression variants
#[derive(Debug)]
pub enum IrKind {
    /// Literal, or a uniform parameter when `parameter` is set
    Constant {
        /// Literal (or parameter default)
        value: SlotValue,
        /// Uniform name
        parameter: Option<String>,
    },
    /// Texture binding
    Texture {
        /// Binding name
        name: String,
    },
    /// Texture sample
    TextureSample {
        /// Sampled texture
        texture: ExprRef,
        /// Coordinate
        coord: ExprRef,
        /// Explicit level of detail
        lod: Option<ExprRef>,
    },
    /// Component selection / cast
    Swizzle {
        /// Source value
        source: ExprRef,
        /// Selected components
        components: Vec<Component>,
    },
    /// Arithmetic / intrinsic
    Math {
        /// Operation
        op: MathOp,
        /// Operands, in slot order
        args: Vec<ExprRef>,
    },
    /// Inlined nested graph, carrying the expressions of its formal outputs
    Call {
        /// Callee name
        function: String,
        /// Formal output expressions, in slot order
        outputs: Vec<ExprRef>,
    },
    /// One result of a call
    CallResult {
        /// The call
        call: ExprRef,
        /// Formal output index
        index: usize,
    },
}

impl IrKind {
    fn operands(&self) -> Vec<&ExprRef> {
        match self {
            Self::Constant { .. } | Self::Texture { .. } => vec![],
            Self::TextureSample {
                texture,
                coord,
                lod,
            } => {
                let mut operands = vec![texture, coord];
                operands.extend(lod);
                operands
            }
            Self::Swizzle { source, .. } => vec![source],
            Self::Math { args, .. } => args.iter().collect(),
            Self::Call { outputs, .. } => outputs.iter().collect(),
            Self::CallResult { call, .. } => vec![call],
        }
    }
}

/// A node of the expression tree
#[derive(Debug)]
pub struct IrExpr {
    index: usize,
    value_type: Option<ValueType>,
    kind: IrKind,
    refs: Cell<u32>,
}

impl IrExpr {
    /// Position in the owning [`ExpressionList`]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Result type; `None` only for call aggregates
    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    /// Variant and operands
    pub fn kind(&self) -> &IrKind {
        &self.kind
    }

    /// Number of consumers holding this expression
    pub fn ref_count(&self) -> u32 {
        self.refs.get()
    }

    /// Record one more consumer
    pub fn add_ref(&self) {
        self.refs.set(self.refs.get() + 1);
    }

    /// Whether lowering may bind this value to a local
    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            IrKind::TextureSample { .. } | IrKind::Math { .. }
        )
    }

    /// Uniform parameter name and type, for named constants
    pub fn parameter(&self) -> Option<(&str, ValueType)> {
        match &self.kind {
            IrKind::Constant {
                value,
                parameter: Some(name),
            } => Some((name, self.value_type.unwrap_or(value.value_type()))),
            _ => None,
        }
    }
}

/// Append-only store of every expression created for one root
#[derive(Debug, Default)]
pub struct ExpressionList {
    exprs: Vec<ExprRef>,
}

impl ExpressionList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expression; its operands gain a reference each
    pub fn push(&mut self, kind: IrKind, value_type: Option<ValueType>) -> ExprRef {
        for operand in kind.operands() {
            operand.add_ref();
        }
        let expr = Rc::new(IrExpr {
            index: self.exprs.len(),
            value_type,
            kind,
            refs: Cell::new(0),
        });
        self.exprs.push(expr.clone());
        expr
    }

    /// All expressions, in creation order
    pub fn iter(&self) -> impl Iterator<Item = &ExprRef> {
        self.exprs.iter()
    }

    /// Number of expressions
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

/// A uniform parameter name bound at two different types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Parameter `{name}` is used as {first:?} and as {second:?}")]
pub struct ParameterConflict {
    /// Parameter name
    pub name: String,
    /// Type of the first use
    pub first: ValueType,
    /// Conflicting type
    pub second: ValueType,
}

/// Uniform parameters by name, each with the single type it is used at.
///
/// Textures live in their own namespace and are not tracked here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterTable {
    types: HashMap<String, ValueType>,
}

impl ParameterTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` at `value_type`; returns whether the name is new
    pub fn declare(&mut self, name: &str, value_type: ValueType) -> Result<bool, ParameterConflict> {
        match self.types.get(name) {
            Some(first) if *first == value_type => Ok(false),
            Some(first) => Err(ParameterConflict {
                name: name.to_string(),
                first: *first,
                second: value_type,
            }),
            None => {
                self.types.insert(name.to_string(), value_type);
                Ok(true)
            }
        }
    }

    /// Record every parameter referenced by `exprs`
    pub fn collect<'e>(
        &mut self,
        exprs: impl IntoIterator<Item = &'e ExprRef>,
    ) -> Result<(), ParameterConflict> {
        for expr in exprs {
            if let Some((name, value_type)) = expr.parameter() {
                self.declare(name, value_type)?;
            }
        }
        Ok(())
    }

    /// Add every entry of `other`, or nothing if any of them conflicts
    pub fn merge(&mut self, other: &ParameterTable) -> Result<(), ParameterConflict> {
        let mut names: Vec<&String> = other.types.keys().collect();
        names.sort();
        for name in &names {
            if let Some(first) = self.types.get(*name) {
                let second = other.types[*name];
                if *first != second {
                    return Err(ParameterConflict {
                        name: (*name).clone(),
                        first: *first,
                        second,
                    });
                }
            }
        }
        for (name, value_type) in &other.types {
            self.types.insert(name.clone(), *value_type);
        }
        Ok(())
    }

    /// Type a parameter is used at
    pub fn get(&self, name: &str) -> Option<ValueType> {
        self.types.get(name).copied()
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no parameter is recorded
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Error while lowering validated nodes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// Node is not in the graph
    #[error("Node {0} not found")]
    MissingNode(NodeId),

    /// Node kind produces no value
    #[error("Node {0} has no value")]
    NoValue(NodeId),

    /// Input slot is not part of the node's layout
    #[error("Node {node} has no input slot {slot}")]
    MissingSlot {
        /// Node
        node: NodeId,
        /// Slot
        slot: SlotId,
    },

    /// Required input is unconnected and has no default
    #[error("Node {node} has no operand for slot {slot}")]
    MissingOperand {
        /// Node
        node: NodeId,
        /// Slot
        slot: SlotId,
    },

    /// Output type was never resolved
    #[error("Type of node {node} output {slot} is unresolved")]
    UnresolvedType {
        /// Node
        node: NodeId,
        /// Output slot
        slot: SlotId,
    },

    /// Call node whose callee did not load
    #[error("Node {node} calls `{path}`, which did not load")]
    UnresolvedCall {
        /// Calling node
        node: NodeId,
        /// Callee path
        path: String,
    },
}

/// Lowers nodes to expressions, one cached instance per node.
///
/// A builder lowers one graph body. Calls lower their callee with a nested
/// builder that shares the expression list, binds the callee's function
/// inputs to the call-site arguments and prefixes its parameter and texture
/// names with the call scope.
pub struct IrBuilder<'a> {
    dag: &'a Dag,
    types: &'a TypeTable,
    list: &'a mut ExpressionList,
    nodes: HashMap<NodeId, ExprRef>,
    projections: HashMap<(NodeId, SlotId), ExprRef>,
    literals: HashMap<(NodeId, SlotId), ExprRef>,
    arguments: HashMap<NodeId, ExprRef>,
    scope: String,
}

impl<'a> IrBuilder<'a> {
    /// Builder for a top-level graph
    pub fn new(dag: &'a Dag, types: &'a TypeTable, list: &'a mut ExpressionList) -> Self {
        Self::nested(dag, types, list, HashMap::new(), String::new())
    }

    fn nested(
        dag: &'a Dag,
        types: &'a TypeTable,
        list: &'a mut ExpressionList,
        arguments: HashMap<NodeId, ExprRef>,
        scope: String,
    ) -> Self {
        Self {
            dag,
            types,
            list,
            nodes: HashMap::new(),
            projections: HashMap::new(),
            literals: HashMap::new(),
            arguments,
            scope,
        }
    }

    /// The DAG being lowered
    pub fn dag(&self) -> &'a Dag {
        self.dag
    }

    /// Lower every node of `order`
    pub fn build(&mut self, order: &[NodeId]) -> Result<(), IrError> {
        for node_id in order {
            self.get_or_create(*node_id)?;
        }
        Ok(())
    }

    /// Cached expression of a node, if it has been lowered
    pub fn node_expr(&self, node_id: NodeId) -> Option<ExprRef> {
        self.nodes.get(&node_id).cloned()
    }

    /// Lower a node, reusing the cached expression when present.
    ///
    /// Returns `None` for kinds that produce no value (output blocks).
    pub fn get_or_create(&mut self, node_id: NodeId) -> Result<Option<ExprRef>, IrError> {
        if let Some(expr) = self.nodes.get(&node_id) {
            return Ok(Some(expr.clone()));
        }

        let dag = self.dag;
        let node = dag.node(node_id).ok_or(IrError::MissingNode(node_id))?;
        let expr = match &node.kind {
            NodeKind::Output(_) => return Ok(None),
            NodeKind::Constant(props) => {
                let parameter = props.parameter.as_ref().map(|p| self.scoped(p));
                self.list.push(
                    IrKind::Constant {
                        value: props.value,
                        parameter,
                    },
                    Some(props.value.value_type()),
                )
            }
            NodeKind::TextureRef(props) => {
                let name = self.scoped(&props.name);
                self.list.push(IrKind::Texture { name }, Some(ValueType::Texture))
            }
            NodeKind::TextureSample => {
                let texture = self.required_input(node, sample_slot::TEXTURE)?;
                let coord = self.required_input(node, sample_slot::UV)?;
                let lod = self.input_expr(node_id, sample_slot::LOD)?;
                self.list.push(
                    IrKind::TextureSample {
                        texture,
                        coord,
                        lod,
                    },
                    Some(ValueType::Vec4),
                )
            }
            NodeKind::Math(op) => {
                let mut args = Vec::with_capacity(node.inputs.len());
                for input in &node.inputs {
                    args.push(self.required_input(node, input.id)?);
                }
                let value_type = self
                    .types
                    .get(node_id, 0)
                    .ok_or(IrError::UnresolvedType { node: node_id, slot: 0 })?;
                self.list.push(IrKind::Math { op: *op, args }, Some(value_type))
            }
            NodeKind::FunctionInput(props) => match self.arguments.get(&node_id).cloned() {
                Some(argument) => argument,
                None => {
                    let name = props
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("arg_{}", node_id.0));
                    let name = self.scoped(&name);
                    match SlotValue::zero(props.value_type) {
                        Some(zero) => self.list.push(
                            IrKind::Constant {
                                value: props.default.unwrap_or(zero),
                                parameter: Some(name),
                            },
                            Some(props.value_type),
                        ),
                        None => self
                            .list
                            .push(IrKind::Texture { name }, Some(ValueType::Texture)),
                    }
                }
            },
            NodeKind::FunctionOutput(_) => self.required_input(node, 0)?,
            NodeKind::FunctionCall(CallTarget::Resolved(callable)) => {
                self.lower_call(node, callable)?
            }
            NodeKind::FunctionCall(CallTarget::Unresolved { path, .. }) => {
                return Err(IrError::UnresolvedCall {
                    node: node_id,
                    path: path.clone(),
                });
            }
        };

        self.nodes.insert(node_id, expr.clone());
        Ok(Some(expr))
    }

    fn lower_call(&mut self, node: &Node, callable: &CallableGraph) -> Result<ExprRef, IrError> {
        let mut arguments = HashMap::new();
        for formal in callable.inputs() {
            arguments.insert(formal.node, self.required_input(node, formal.index)?);
        }

        let scope = format!("{}call{}_", self.scope, node.id.0);
        let mut outputs = Vec::with_capacity(callable.outputs().len());
        {
            let mut callee = IrBuilder::nested(
                callable.dag(),
                callable.types(),
                &mut *self.list,
                arguments,
                scope,
            );
            callee.build(&callable.schedule().order)?;
            for formal in callable.outputs() {
                let expr = callee
                    .node_expr(formal.node)
                    .ok_or(IrError::NoValue(formal.node))?;
                outputs.push(expr);
            }
        }

        Ok(self.list.push(
            IrKind::Call {
                function: callable.name().to_string(),
                outputs,
            },
            None,
        ))
    }

    /// Expression for one output slot of a node.
    ///
    /// Single-output kinds return the node expression itself. Texture
    /// component outputs and call results are projections, cached per slot.
    pub fn output_expr(&mut self, node_id: NodeId, slot: SlotId) -> Result<ExprRef, IrError> {
        let base = self.get_or_create(node_id)?.ok_or(IrError::NoValue(node_id))?;
        if let Some(expr) = self.projections.get(&(node_id, slot)) {
            return Ok(expr.clone());
        }

        let dag = self.dag;
        let node = dag.node(node_id).ok_or(IrError::MissingNode(node_id))?;
        let value_type = node.output(slot).and_then(|o| o.value_type);
        let kind = match &node.kind {
            NodeKind::TextureSample if slot != sample_slot::RGBA => IrKind::Swizzle {
                source: base,
                components: match slot {
                    1 => vec![Component::X, Component::Y, Component::Z],
                    2 => vec![Component::X],
                    3 => vec![Component::Y],
                    4 => vec![Component::Z],
                    _ => vec![Component::W],
                },
            },
            NodeKind::FunctionCall(_) => IrKind::CallResult {
                call: base,
                index: slot as usize,
            },
            _ => return Ok(base),
        };

        let expr = self.list.push(kind, value_type);
        self.projections.insert((node_id, slot), expr.clone());
        Ok(expr)
    }

    /// Expression feeding an input slot: the bound producer, else the
    /// slot's default literal, else `None`
    pub fn input_expr(&mut self, node_id: NodeId, slot: SlotId) -> Result<Option<ExprRef>, IrError> {
        let dag = self.dag;
        let input = dag
            .node(node_id)
            .and_then(|n| n.input(slot))
            .ok_or(IrError::MissingSlot { node: node_id, slot })?;

        if let Some(binding) = input.binding {
            return self.output_expr(binding.node, binding.output).map(Some);
        }
        let Some(value) = input.default else {
            return Ok(None);
        };
        if let Some(expr) = self.literals.get(&(node_id, slot)) {
            return Ok(Some(expr.clone()));
        }
        let expr = self.list.push(
            IrKind::Constant {
                value,
                parameter: None,
            },
            Some(value.value_type()),
        );
        self.literals.insert((node_id, slot), expr.clone());
        Ok(Some(expr))
    }

    fn required_input(&mut self, node: &Node, slot: SlotId) -> Result<ExprRef, IrError> {
        self.input_expr(node.id, slot)?.ok_or(IrError::MissingOperand {
            node: node.id,
            slot,
        })
    }

    fn scoped(&self, name: &str) -> String {
        format!("{}{name}", self.scope)
    }
}
