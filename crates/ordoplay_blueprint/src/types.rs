// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-node validation and output type propagation.
//!
//! Nodes are checked in evaluation order so producer types are known
//! before their consumers are validated. A node that fails validation
//! records no output types; anything downstream of it then reports
//! `CannotDetermineType` rather than guessing.

use crate::dag::Dag;
use crate::node::{MathOp, Node, NodeId, NodeKind};
use crate::port::{InputSlot, SlotId, TypeSet, ValueType};
use std::collections::HashMap;
use std::fmt;

/// Resolved output types, keyed by `(node, output slot)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeTable {
    types: HashMap<(NodeId, SlotId), ValueType>,
}

impl TypeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Type of an output slot, `None` while unresolved
    pub fn get(&self, node: NodeId, slot: SlotId) -> Option<ValueType> {
        self.types.get(&(node, slot)).copied()
    }

    /// Record the type of an output slot
    pub fn set(&mut self, node: NodeId, slot: SlotId, value_type: ValueType) {
        self.types.insert((node, slot), value_type);
    }

    /// Number of resolved slots
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing is resolved
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Reason a node failed validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Required input is neither connected nor defaulted
    #[error("Missing argument `{input}`")]
    MissingArgument {
        /// Input slot name
        input: String,
    },

    /// Connected producer has no resolved type
    #[error("Cannot determine type of `{input}`")]
    CannotDetermineType {
        /// Input slot name
        input: String,
    },

    /// Input type outside the slot's allowed set
    #[error("Invalid input type for `{input}`: {found} is not one of {allowed}")]
    InvalidInputType {
        /// Input slot name
        input: String,
        /// Type that arrived
        found: ValueType,
        /// Types the slot accepts
        allowed: TypeSet,
    },

    /// Operand types cannot be combined
    #[error("Incompatible operands for {op}: {left} and {right}")]
    IncompatibleOperands {
        /// Operation display name
        op: &'static str,
        /// First operand type
        left: ValueType,
        /// Second operand type
        right: ValueType,
    },
}

/// Validation failure attributed to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDiagnostic {
    /// Failing node
    pub node: NodeId,
    /// What went wrong
    pub error: ValidationError,
}

impl fmt::Display for NodeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}: {}", self.node, self.error)
    }
}

/// Validates nodes and fills a [`TypeTable`]
pub struct TypeChecker<'a> {
    dag: &'a Dag,
    table: TypeTable,
}

impl<'a> TypeChecker<'a> {
    /// Create a checker over a built DAG
    pub fn new(dag: &'a Dag) -> Self {
        Self {
            dag,
            table: TypeTable::new(),
        }
    }

    /// Validate one node and record its output types on success.
    ///
    /// Producers must have been checked first.
    pub fn check(&mut self, node_id: NodeId) -> Result<(), ValidationError> {
        let Some(node) = self.dag.node(node_id) else {
            return Ok(());
        };

        let mut operand_types = Vec::with_capacity(node.inputs.len());
        for input in &node.inputs {
            operand_types.push(self.input_type(input)?);
        }

        let inferred = match &node.kind {
            NodeKind::Math(op) => Some(math_result(*op, &operand_types)?),
            NodeKind::FunctionOutput(_) => operand_types.first().copied().flatten(),
            _ => None,
        };

        self.record(node, inferred);
        Ok(())
    }

    /// Check every node of `order`, collecting diagnostics.
    ///
    /// With `stop_at_first` the walk ends after the first failure.
    pub fn check_all(&mut self, order: &[NodeId], stop_at_first: bool) -> Vec<NodeDiagnostic> {
        let mut diagnostics = Vec::new();
        for node_id in order {
            if let Err(error) = self.check(*node_id) {
                tracing::warn!("Validation failed for node {node_id}: {error}");
                diagnostics.push(NodeDiagnostic {
                    node: *node_id,
                    error,
                });
                if stop_at_first {
                    break;
                }
            }
        }
        diagnostics
    }

    /// Consume the checker, keeping its table
    pub fn into_table(self) -> TypeTable {
        self.table
    }

    fn input_type(&self, input: &InputSlot) -> Result<Option<ValueType>, ValidationError> {
        let found = if let Some(binding) = input.binding {
            let resolved = self.table.get(binding.node, binding.output).ok_or_else(|| {
                ValidationError::CannotDetermineType {
                    input: input.name.clone(),
                }
            })?;
            Some(resolved)
        } else if let Some(default) = input.default {
            Some(default.value_type())
        } else if input.required {
            return Err(ValidationError::MissingArgument {
                input: input.name.clone(),
            });
        } else {
            None
        };

        if let Some(found) = found {
            if !input.allowed.contains(found) {
                return Err(ValidationError::InvalidInputType {
                    input: input.name.clone(),
                    found,
                    allowed: input.allowed,
                });
            }
        }
        Ok(found)
    }

    fn record(&mut self, node: &Node, inferred: Option<ValueType>) {
        for output in &node.outputs {
            if let Some(value_type) = output.value_type.or(inferred) {
                self.table.set(node.id, output.id, value_type);
            }
        }
    }
}

/// Combine two operand types component-wise, broadcasting scalars
fn widen(op: MathOp, left: ValueType, right: ValueType) -> Result<ValueType, ValidationError> {
    match (left, right) {
        _ if left == right => Ok(left),
        (ValueType::Scalar, other) | (other, ValueType::Scalar) => Ok(other),
        _ => Err(ValidationError::IncompatibleOperands {
            op: op.display_name(),
            left,
            right,
        }),
    }
}

fn math_result(op: MathOp, operands: &[Option<ValueType>]) -> Result<ValueType, ValidationError> {
    // Required operands were checked above; all are present here.
    let types: Vec<ValueType> = operands.iter().copied().flatten().collect();
    match (op, types.as_slice()) {
        (MathOp::Dot, [left, right]) => {
            if left != right {
                return Err(ValidationError::IncompatibleOperands {
                    op: op.display_name(),
                    left: *left,
                    right: *right,
                });
            }
            Ok(ValueType::Scalar)
        }
        (MathOp::Lerp, [a, b, t]) => {
            let result = widen(op, *a, *b)?;
            if *t != ValueType::Scalar && *t != result {
                return Err(ValidationError::IncompatibleOperands {
                    op: op.display_name(),
                    left: result,
                    right: *t,
                });
            }
            Ok(result)
        }
        (_, [left, right]) => widen(op, *left, *right),
        (_, [value]) => Ok(*value),
        _ => Ok(ValueType::Scalar),
    }
}
