// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graphs used as functions.
//!
//! A callable graph exposes its function-input placeholders as formal
//! inputs and its function-output placeholders as formal outputs. Formal
//! ports are numbered in node-id order, so the slot layout of a call node
//! does not depend on how the nested graph happens to be stored.

use crate::compiler::{structural_hash, CompileError, StructuralHash};
use crate::dag::{Dag, LinkPolicy, Schedule};
use crate::graph::Graph;
use crate::node::{NodeId, NodeKind};
use crate::port::{SlotId, SlotValue, ValueType};
use crate::types::{TypeChecker, TypeTable};

/// A formal input or output of a callable graph
#[derive(Debug, Clone, PartialEq)]
pub struct FormalPort {
    /// Slot id on call nodes
    pub index: SlotId,
    /// Port name
    pub name: String,
    /// Placeholder node inside the callable
    pub node: NodeId,
    /// Resolved type
    pub value_type: ValueType,
    /// Value used when a call site leaves the input unconnected
    pub default: Option<SlotValue>,
}

/// A validated, pre-scheduled nested graph
#[derive(Debug)]
pub struct CallableGraph {
    name: String,
    path: String,
    dag: Dag,
    schedule: Schedule,
    types: TypeTable,
    inputs: Vec<FormalPort>,
    outputs: Vec<FormalPort>,
    hash: StructuralHash,
}

impl CallableGraph {
    /// Validate `graph` as a function body.
    ///
    /// Function outputs are added to the graph's roots. Any structural,
    /// cycle or validation failure rejects the whole callable.
    pub fn new(
        path: impl Into<String>,
        graph: Graph,
        policy: LinkPolicy,
    ) -> Result<Self, CompileError> {
        let path = path.into();
        let name = graph.name.clone();

        let mut roots = graph.roots().to_vec();
        let mut placeholders: Vec<NodeId> = graph
            .nodes()
            .filter(|n| n.kind.is_function_input() || n.kind.is_function_output())
            .map(|n| n.id)
            .collect();
        placeholders.sort();
        for id in &placeholders {
            let is_output = graph.node(*id).is_some_and(|n| n.kind.is_function_output());
            if is_output && !roots.contains(id) {
                roots.push(*id);
            }
        }

        let dag = Dag::build(graph, policy)?;
        let schedule = dag.schedule(&roots)?;
        if let Some(node) = schedule
            .order
            .iter()
            .filter_map(|id| dag.node(*id))
            .find(|n| n.kind.is_unresolved_call())
        {
            return Err(CompileError::unresolved_call(node));
        }

        let mut checker = TypeChecker::new(&dag);
        let diagnostics = checker.check_all(&schedule.order, false);
        if !diagnostics.is_empty() {
            return Err(CompileError::Validation(diagnostics));
        }
        let types = checker.into_table();

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for id in placeholders {
            let Some(node) = dag.node(id) else {
                continue;
            };
            match &node.kind {
                NodeKind::FunctionInput(props) => {
                    let index = inputs.len() as SlotId;
                    inputs.push(FormalPort {
                        index,
                        name: props.name.clone().unwrap_or_else(|| format!("arg_{index}")),
                        node: id,
                        value_type: props.value_type,
                        default: props.default,
                    });
                }
                NodeKind::FunctionOutput(props) => {
                    let index = outputs.len() as SlotId;
                    let value_type = types
                        .get(id, 0)
                        .ok_or(CompileError::UnresolvedOutput { node: id })?;
                    outputs.push(FormalPort {
                        index,
                        name: props.name.clone().unwrap_or_else(|| format!("out_{index}")),
                        node: id,
                        value_type,
                        default: None,
                    });
                }
                _ => {}
            }
        }

        let hash = structural_hash(&dag, &roots)?;
        tracing::debug!(
            "Callable `{path}` ready: {} input(s), {} output(s), {} scheduled node(s)",
            inputs.len(),
            outputs.len(),
            schedule.len()
        );

        Ok(Self {
            name,
            path,
            dag,
            schedule,
            types,
            inputs,
            outputs,
            hash,
        })
    }

    /// Graph name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Library path the graph was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Formal inputs, in slot order
    pub fn inputs(&self) -> &[FormalPort] {
        &self.inputs
    }

    /// Formal outputs, in slot order
    pub fn outputs(&self) -> &[FormalPort] {
        &self.outputs
    }

    /// Wired body
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Evaluation order of the body
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Resolved output types of the body
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Structural hash of the body
    pub fn hash(&self) -> StructuralHash {
        self.hash
    }
}
