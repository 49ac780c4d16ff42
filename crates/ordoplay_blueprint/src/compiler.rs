// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-root compile pipeline.
//!
//! For every root: prune to the nodes feeding it, schedule them, validate
//! and type them in order, lower them to IR and resolve the root's outputs.
//! Each root succeeds or fails on its own, so one broken output block does
//! not take its siblings down.

use crate::dag::{CycleError, Dag, Schedule, StructuralError};
use crate::graph::{Graph, NodeDescriptor};
use crate::ir::{ExpressionList, IrBuilder, IrError, ParameterConflict, ParameterTable};
use crate::node::{CallTarget, Node, NodeId, NodeKind};
use crate::output::{bind_outputs, OutputBinding};
use crate::port::{Binding, SlotId, SlotValue};
use crate::settings::CompilerSettings;
use crate::types::{NodeDiagnostic, TypeChecker, TypeTable};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// How validation failures inside one root are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Stop at the first failing node
    AbortOnFirst,
    /// Check every scheduled node and report all failures
    #[default]
    CollectAll,
}

/// Why a graph or one of its roots failed to compile
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A link does not fit the graph (strict link policy)
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// The subgraph feeding a root contains a cycle
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// Root id is not a node of the graph
    #[error("Root {0} is not in the graph")]
    UnknownRoot(NodeId),

    /// A call reachable from the root references a graph that did not load
    #[error("Node {node} calls `{path}`, which failed to load: {reason}")]
    UnresolvedCall {
        /// Calling node
        node: NodeId,
        /// Callee path
        path: String,
        /// Load failure
        reason: String,
    },

    /// One or more nodes failed validation
    #[error("{} node(s) failed validation: {}", .0.len(), first_diagnostic(.0))]
    Validation(Vec<NodeDiagnostic>),

    /// A function output's type could not be resolved
    #[error("Function output {node} has no resolved type")]
    UnresolvedOutput {
        /// Placeholder node
        node: NodeId,
    },

    /// IR construction failed on validated input
    #[error("Lowering failed: {0}")]
    Lowering(#[from] IrError),

    /// A uniform parameter is used at two types, within the root or
    /// against an earlier root
    #[error(transparent)]
    Parameter(#[from] ParameterConflict),

    /// Canonical encoding for the structural hash failed
    #[error("Failed to encode graph for hashing: {0}")]
    Hash(#[from] bincode::Error),
}

fn first_diagnostic(diagnostics: &[NodeDiagnostic]) -> String {
    diagnostics.first().map(ToString::to_string).unwrap_or_default()
}

impl CompileError {
    pub(crate) fn unresolved_call(node: &Node) -> Self {
        match &node.kind {
            NodeKind::FunctionCall(CallTarget::Unresolved { path, reason }) => {
                Self::UnresolvedCall {
                    node: node.id,
                    path: path.clone(),
                    reason: reason.clone(),
                }
            }
            _ => Self::UnresolvedCall {
                node: node.id,
                path: String::new(),
                reason: "not a call".to_string(),
            },
        }
    }
}

/// Content hash of a graph's structure, used as a shader cache key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructuralHash([u8; 32]);

impl StructuralHash {
    /// Raw digest
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for StructuralHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}

impl fmt::Debug for StructuralHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructuralHash({self})")
    }
}

#[derive(Serialize)]
struct CanonicalInput {
    slot: SlotId,
    binding: Option<Binding>,
    default: Option<SlotValue>,
}

#[derive(Serialize)]
struct CanonicalNode {
    id: NodeId,
    root: bool,
    kind: NodeDescriptor,
    callee: Option<[u8; 32]>,
    inputs: Vec<CanonicalInput>,
}

/// Hash the nodes reachable from `roots`, in id order.
///
/// Display names and unreachable nodes do not contribute. Calls fold in
/// the hash of their callee.
pub fn structural_hash(dag: &Dag, roots: &[NodeId]) -> Result<StructuralHash, CompileError> {
    let mut ids: Vec<NodeId> = dag.reachable(roots).into_iter().collect();
    ids.sort();

    let mut hasher = Sha256::new();
    for id in ids {
        let Some(node) = dag.node(id) else {
            continue;
        };
        let callee = match &node.kind {
            NodeKind::FunctionCall(target) => target.callable().map(|c| c.hash().0),
            _ => None,
        };
        let canonical = CanonicalNode {
            id,
            root: roots.contains(&id),
            kind: NodeDescriptor::from_kind(&node.kind),
            callee,
            inputs: node
                .inputs
                .iter()
                .map(|input| CanonicalInput {
                    slot: input.id,
                    binding: input.binding,
                    default: input.default,
                })
                .collect(),
        };
        hasher.update(bincode::serialize(&canonical)?);
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    Ok(StructuralHash(digest))
}

/// A successfully compiled root
#[derive(Debug)]
pub struct CompiledRoot {
    /// Root node
    pub root: NodeId,
    /// Nodes feeding the root, producers first
    pub schedule: Schedule,
    /// Resolved output types
    pub types: TypeTable,
    /// Every expression created for the root
    pub expressions: ExpressionList,
    /// Uniform parameters the root reads
    pub parameters: ParameterTable,
    /// Named results of the root
    pub outputs: Vec<OutputBinding>,
}

impl CompiledRoot {
    /// Look up a named result
    pub fn output(&self, name: &str) -> Option<&OutputBinding> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// Outcome of one root
#[derive(Debug)]
pub struct RootResult {
    /// Root node
    pub root: NodeId,
    /// Compiled root or the reason it failed
    pub outcome: Result<CompiledRoot, CompileError>,
}

/// Result of compiling a graph
#[derive(Debug)]
pub struct CompiledGraph {
    /// The wired graph
    pub dag: Dag,
    /// Structural hash over every root
    pub hash: StructuralHash,
    /// One result per root, in root order
    pub roots: Vec<RootResult>,
}

impl CompiledGraph {
    /// Whether every root compiled
    pub fn is_success(&self) -> bool {
        self.roots.iter().all(|r| r.outcome.is_ok())
    }

    /// Successfully compiled roots
    pub fn compiled(&self) -> impl Iterator<Item = &CompiledRoot> {
        self.roots.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    /// Failed roots with their errors
    pub fn failures(&self) -> impl Iterator<Item = (NodeId, &CompileError)> {
        self.roots
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.root, e)))
    }
}

/// Graph compiler
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    settings: CompilerSettings,
}

impl Compiler {
    /// Create a compiler with the given settings
    pub fn new(settings: CompilerSettings) -> Self {
        Self { settings }
    }

    /// Active settings
    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Compile every root of `graph`.
    ///
    /// Only DAG construction (strict link policy) and hashing fail the
    /// whole graph; everything else is reported per root. Roots share one
    /// uniform block, so a root using a parameter at a different type than
    /// an earlier root fails.
    pub fn compile(&self, graph: &Graph) -> Result<CompiledGraph, CompileError> {
        let dag = Dag::build(graph.clone(), self.settings.link_policy)?;
        let hash = structural_hash(&dag, graph.roots())?;

        let mut shared = ParameterTable::new();
        let roots = graph
            .roots()
            .iter()
            .map(|root| {
                let outcome = self.compile_root(&dag, *root).and_then(|compiled| {
                    match shared.merge(&compiled.parameters) {
                        Ok(()) => Ok(compiled),
                        Err(conflict) => {
                            tracing::error!("Root {root} failed: {conflict}");
                            Err(conflict.into())
                        }
                    }
                });
                RootResult {
                    root: *root,
                    outcome,
                }
            })
            .collect();

        let compiled = CompiledGraph { dag, hash, roots };
        tracing::info!(
            "Compiled `{}`: {} of {} root(s) succeeded, hash {}",
            graph.name,
            compiled.compiled().count(),
            compiled.roots.len(),
            compiled.hash
        );
        Ok(compiled)
    }

    /// Compile a single root of an already wired DAG
    pub fn compile_root(&self, dag: &Dag, root: NodeId) -> Result<CompiledRoot, CompileError> {
        tracing::debug!("Compiling root {root}");
        let result = self.compile_root_inner(dag, root);
        match &result {
            Ok(compiled) => tracing::debug!(
                "Root {root} compiled: {} node(s), {} expression(s), {} output(s)",
                compiled.schedule.len(),
                compiled.expressions.len(),
                compiled.outputs.len()
            ),
            Err(err) => tracing::error!("Root {root} failed: {err}"),
        }
        result
    }

    fn compile_root_inner(&self, dag: &Dag, root: NodeId) -> Result<CompiledRoot, CompileError> {
        if dag.node(root).is_none() {
            return Err(CompileError::UnknownRoot(root));
        }

        let schedule = dag.schedule(&[root])?;
        if let Some(node) = schedule
            .order
            .iter()
            .filter_map(|id| dag.node(*id))
            .find(|n| n.kind.is_unresolved_call())
        {
            return Err(CompileError::unresolved_call(node));
        }

        let mut checker = TypeChecker::new(dag);
        let stop_at_first = self.settings.error_policy == ErrorPolicy::AbortOnFirst;
        let diagnostics = checker.check_all(&schedule.order, stop_at_first);
        if !diagnostics.is_empty() {
            return Err(CompileError::Validation(diagnostics));
        }
        let types = checker.into_table();

        let mut expressions = ExpressionList::new();
        let outputs = {
            let mut builder = IrBuilder::new(dag, &types, &mut expressions);
            builder.build(&schedule.order)?;
            bind_outputs(&mut builder, root)?
        };
        let mut parameters = ParameterTable::new();
        parameters.collect(expressions.iter())?;

        Ok(CompiledRoot {
            root,
            schedule,
            types,
            expressions,
            parameters,
            outputs,
        })
    }

    /// Evaluation order over every root of `graph` at once
    pub fn plan(&self, graph: &Graph) -> Result<Schedule, CompileError> {
        let dag = Dag::build(graph.clone(), self.settings.link_policy)?;
        Ok(dag.schedule(graph.roots())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::MaterialAssembler;
    use crate::callable::CallableGraph;
    use crate::dag::LinkPolicy;
    use crate::ir::IrKind;
    use crate::node::{ConstantProps, FunctionInputProps, FunctionOutputProps, MathOp, TextureProps};
    use crate::output::SemanticBlock;
    use crate::port::{TypeSet, ValueType};
    use crate::types::ValidationError;
    use std::rc::Rc;
    use std::sync::Arc;

    fn constant(id: u32, value: SlotValue) -> Node {
        Node::new(
            NodeId(id),
            NodeKind::Constant(ConstantProps {
                value,
                parameter: None,
            }),
        )
    }

    fn parameter(id: u32, name: &str, value: SlotValue) -> Node {
        Node::new(
            NodeId(id),
            NodeKind::Constant(ConstantProps {
                value,
                parameter: Some(name.to_string()),
            }),
        )
    }

    fn compile(graph: &Graph) -> CompiledGraph {
        Compiler::default().compile(graph).unwrap()
    }

    fn scenario_a() -> Graph {
        let mut graph = Graph::new("scenario a");
        graph.add_node(constant(1, SlotValue::Scalar(5.0)));
        graph.add_root(Node::new(NodeId(2), NodeKind::Output(SemanticBlock::Surface)));
        graph.connect(NodeId(1), 0, NodeId(2), 0);
        graph
    }

    fn scenario_b() -> Graph {
        let mut graph = Graph::new("scenario b");
        graph.add_node(constant(1, SlotValue::Vec3([1.0, 0.0, 0.0])));
        graph.add_node(constant(2, SlotValue::Vec3([0.0, 0.5, 0.0])));
        graph.add_node(Node::new(NodeId(3), NodeKind::Math(MathOp::Add)));
        graph.add_root(Node::new(NodeId(4), NodeKind::Output(SemanticBlock::Unlit)));
        graph.connect(NodeId(1), 0, NodeId(3), 0);
        graph.connect(NodeId(2), 0, NodeId(3), 1);
        graph.connect(NodeId(3), 0, NodeId(4), 0);
        graph
    }

    #[test]
    fn test_scenario_a_single_constant() {
        let compiled = compile(&scenario_a());
        let root = compiled.compiled().next().unwrap();
        assert_eq!(root.schedule.order, vec![NodeId(1), NodeId(2)]);
        assert_eq!(root.outputs.len(), 1);
        assert_eq!(root.outputs[0].name, "BaseColor");
        assert!(matches!(
            root.outputs[0].expr.kind(),
            IrKind::Constant {
                value: SlotValue::Scalar(v),
                parameter: None
            } if *v == 5.0
        ));
    }

    #[test]
    fn test_scenario_b_diamond() {
        let compiled = compile(&scenario_b());
        assert!(compiled.is_success());
        let root = compiled.compiled().next().unwrap();
        let order = &root.schedule.order;
        assert!(
            *order == vec![NodeId(1), NodeId(2), NodeId(3), NodeId(4)]
                || *order == vec![NodeId(2), NodeId(1), NodeId(3), NodeId(4)]
        );
        assert_eq!(root.output("Color").and_then(|o| o.expr.value_type()), Some(ValueType::Vec3));
    }

    #[test]
    fn test_scenario_c_cycle_fails() {
        let mut graph = Graph::new("scenario c");
        graph.add_node(Node::new(NodeId(1), NodeKind::Math(MathOp::Sin)));
        graph.add_root(Node::new(NodeId(2), NodeKind::Math(MathOp::Cos)));
        graph.connect(NodeId(1), 0, NodeId(2), 0);
        graph.connect(NodeId(2), 0, NodeId(1), 0);
        let compiled = compile(&graph);
        let (root, err) = compiled.failures().next().unwrap();
        assert_eq!(root, NodeId(2));
        match err {
            CompileError::Cycle(cycle) => assert_eq!(cycle.unscheduled.len(), 2),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_scenario_d_unreachable_ignored() {
        let mut graph = scenario_a();
        // Malformed on purpose: a required input with nothing bound.
        graph.add_node(Node::new(NodeId(5), NodeKind::Math(MathOp::Add)));
        let compiled = compile(&graph);
        assert!(compiled.is_success());
        let root = compiled.compiled().next().unwrap();
        assert!(!root.schedule.contains(NodeId(5)));
    }

    #[test]
    fn test_determinism() {
        let graph = scenario_b();
        let first = compile(&graph);
        let second = compile(&graph);
        assert_eq!(first.hash, second.hash);
        assert_eq!(
            first.compiled().next().unwrap().schedule,
            second.compiled().next().unwrap().schedule
        );
    }

    #[test]
    fn test_hash_tracks_structure() {
        let base = compile(&scenario_b()).hash;

        let mut renamed = scenario_b();
        renamed.name = "renamed".to_string();
        renamed.add_node(constant(9, SlotValue::Scalar(1.0)));
        assert_eq!(compile(&renamed).hash, base);

        let mut changed = scenario_b();
        changed.add_node(constant(2, SlotValue::Vec3([0.0, 0.0, 1.0])));
        assert_ne!(compile(&changed).hash, base);
        assert_eq!(base.to_string().len(), 64);
    }

    #[test]
    fn test_topological_correctness() {
        let mut graph = scenario_b();
        graph.add_node(Node::new(NodeId(5), NodeKind::Math(MathOp::Saturate)));
        graph.add_root(Node::new(NodeId(6), NodeKind::Output(SemanticBlock::Surface)));
        graph.connect(NodeId(3), 0, NodeId(5), 0);
        graph.connect(NodeId(5), 0, NodeId(6), 0);
        graph.connect(NodeId(1), 0, NodeId(6), 6);

        let schedule = Compiler::default().plan(&graph).unwrap();
        for link in graph.links() {
            let start = schedule.position(link.start_node_id).unwrap();
            let end = schedule.position(link.end_node_id).unwrap();
            assert!(start < end, "{link} out of order");
        }
    }

    #[test]
    fn test_cache_sharing() {
        let mut graph = Graph::new("shared");
        graph.add_node(parameter(1, "tint", SlotValue::Vec3([1.0, 1.0, 1.0])));
        graph.add_node(Node::new(NodeId(2), NodeKind::Math(MathOp::Multiply)));
        graph.add_root(Node::new(NodeId(3), NodeKind::Output(SemanticBlock::Surface)));
        graph.connect(NodeId(1), 0, NodeId(2), 0);
        graph.connect(NodeId(1), 0, NodeId(2), 1);
        graph.connect(NodeId(1), 0, NodeId(3), 6);
        graph.connect(NodeId(2), 0, NodeId(3), 0);

        let compiled = compile(&graph);
        let root = compiled.compiled().next().unwrap();
        let emissive = &root.output("Emissive").unwrap().expr;
        let IrKind::Math { args, .. } = root.output("BaseColor").unwrap().expr.kind() else {
            panic!("expected math");
        };
        assert!(Rc::ptr_eq(&args[0], &args[1]));
        assert!(Rc::ptr_eq(&args[0], emissive));

        let mut wgsl = crate::target::WgslBuilder::new(Default::default());
        {
            let mut cx = crate::target::LoweringContext::new(&mut wgsl, 1);
            for output in &root.outputs {
                output.expr.create(&mut cx).unwrap();
            }
        }
        assert_eq!(wgsl.uniforms().len(), 1);
    }

    #[test]
    fn test_output_resolution_subset() {
        let mut graph = scenario_a();
        graph.add_node(constant(3, SlotValue::Scalar(0.25)));
        graph.connect(NodeId(3), 0, NodeId(2), 2);
        let compiled = compile(&graph);
        let root = compiled.compiled().next().unwrap();
        let names: Vec<&str> = root.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["BaseColor", "Roughness"]);
        assert!(SemanticBlock::Surface.ports().len() > names.len());
    }

    #[test]
    fn test_sibling_root_survives_validation_error() {
        let mut graph = scenario_b();
        graph.add_node(Node::new(NodeId(7), NodeKind::Math(MathOp::Sin)));
        graph.add_root(Node::new(NodeId(8), NodeKind::Output(SemanticBlock::Vertex)));
        graph.connect(NodeId(7), 0, NodeId(8), 0);

        let compiled = compile(&graph);
        assert!(!compiled.is_success());
        assert_eq!(compiled.compiled().map(|r| r.root).collect::<Vec<_>>(), vec![NodeId(4)]);
        let (root, err) = compiled.failures().next().unwrap();
        assert_eq!(root, NodeId(8));
        let CompileError::Validation(diagnostics) = err else {
            panic!("expected validation error, got {err}");
        };
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].node, NodeId(7));
    }

    #[test]
    fn test_abort_on_first() {
        let mut graph = Graph::new("two errors");
        graph.add_node(Node::new(NodeId(1), NodeKind::Math(MathOp::Sin)));
        graph.add_root(Node::new(NodeId(2), NodeKind::Output(SemanticBlock::Unlit)));
        graph.connect(NodeId(1), 0, NodeId(2), 0);
        let mut settings = CompilerSettings::default();
        settings.error_policy = ErrorPolicy::AbortOnFirst;
        let compiled = Compiler::new(settings).compile(&graph).unwrap();
        let (_, err) = compiled.failures().next().unwrap();
        assert!(matches!(err, CompileError::Validation(d) if d.len() == 1));
    }

    #[test]
    fn test_unknown_root() {
        let mut graph = scenario_a();
        graph.mark_root(NodeId(42));
        let compiled = compile(&graph);
        assert!(matches!(
            compiled.failures().next(),
            Some((NodeId(42), CompileError::UnknownRoot(NodeId(42))))
        ));
    }

    #[test]
    fn test_strict_links_fail_graph() {
        let mut graph = scenario_a();
        graph.connect(NodeId(1), 0, NodeId(2), 99);
        let mut settings = CompilerSettings::default();
        settings.link_policy = LinkPolicy::Strict;
        assert!(matches!(
            Compiler::new(settings).compile(&graph),
            Err(CompileError::Structural(_))
        ));
        assert!(compile(&graph).is_success());
    }

    fn scale_callable() -> Arc<CallableGraph> {
        let mut body = Graph::new("scale");
        body.add_node(Node::new(
            NodeId(1),
            NodeKind::FunctionInput(FunctionInputProps {
                name: Some("value".to_string()),
                value_type: ValueType::Vec3,
                default: None,
            }),
        ));
        body.add_node(parameter(2, "factor", SlotValue::Scalar(2.0)));
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
        Arc::new(CallableGraph::new("lib/scale.json", body, LinkPolicy::Strict).unwrap())
    }

    #[test]
    fn test_function_call_inlined() {
        let callable = scale_callable();
        let mut graph = Graph::new("caller");
        graph.add_node(constant(1, SlotValue::Vec3([0.2, 0.4, 0.6])));
        graph.add_node(Node::new(
            NodeId(2),
            NodeKind::FunctionCall(CallTarget::Resolved(callable.clone())),
        ));
        graph.add_root(Node::new(NodeId(3), NodeKind::Output(SemanticBlock::Surface)));
        graph.connect(NodeId(1), 0, NodeId(2), 0);
        graph.connect(NodeId(2), 0, NodeId(3), 0);

        let compiled = compile(&graph);
        let root = compiled.compiled().next().unwrap();
        let base = &root.output("BaseColor").unwrap().expr;
        assert_eq!(base.value_type(), Some(ValueType::Vec3));
        let IrKind::CallResult { call, index: 0 } = base.kind() else {
            panic!("expected call result, got {:?}", base.kind());
        };
        let IrKind::Call { function, outputs } = call.kind() else {
            panic!("expected call");
        };
        assert_eq!(function, "scale");
        let IrKind::Math { args, .. } = outputs[0].kind() else {
            panic!("expected math in callee");
        };
        assert!(matches!(args[0].kind(), IrKind::Constant { parameter: None, .. }));
        assert!(matches!(
            args[1].kind(),
            IrKind::Constant { parameter: Some(name), .. } if name == "call2_factor"
        ));
    }

    #[test]
    fn test_call_argument_type_mismatch() {
        let mut graph = Graph::new("caller");
        graph.add_node(constant(1, SlotValue::Vec2([0.0, 0.0])));
        graph.add_root(Node::new(
            NodeId(2),
            NodeKind::FunctionCall(CallTarget::Resolved(scale_callable())),
        ));
        graph.connect(NodeId(1), 0, NodeId(2), 0);
        let compiled = compile(&graph);
        let (_, err) = compiled.failures().next().unwrap();
        let CompileError::Validation(diagnostics) = err else {
            panic!("expected validation error, got {err}");
        };
        assert!(matches!(diagnostics[0].error, ValidationError::InvalidInputType { .. }));
    }

    #[test]
    fn test_callee_hash_folded_into_caller() {
        let build = |callable: Arc<CallableGraph>| {
            let mut graph = Graph::new("caller");
            graph.add_node(constant(1, SlotValue::Vec3([0.0; 3])));
            graph.add_root(Node::new(
                NodeId(2),
                NodeKind::FunctionCall(CallTarget::Resolved(callable)),
            ));
            graph.connect(NodeId(1), 0, NodeId(2), 0);
            compile(&graph).hash
        };

        let mut other_body = Graph::new("scale");
        other_body.add_node(Node::new(
            NodeId(1),
            NodeKind::FunctionInput(FunctionInputProps {
                name: Some("value".to_string()),
                value_type: ValueType::Vec3,
                default: None,
            }),
        ));
        other_body.add_node(Node::new(NodeId(3), NodeKind::Math(MathOp::Normalize)));
        other_body.add_node(Node::new(
            NodeId(4),
            NodeKind::FunctionOutput(FunctionOutputProps {
                name: Some("scaled".to_string()),
                accepts: TypeSet::NUMERIC,
            }),
        ));
        other_body.connect(NodeId(1), 0, NodeId(3), 0);
        other_body.connect(NodeId(3), 0, NodeId(4), 0);
        let other = Arc::new(
            CallableGraph::new("lib/scale.json", other_body, LinkPolicy::Strict).unwrap(),
        );

        assert_eq!(build(scale_callable()), build(scale_callable()));
        assert_ne!(build(scale_callable()), build(other));
    }

    #[test]
    fn test_unresolved_call_fails_only_its_root() {
        let mut graph = scenario_a();
        graph.add_node(Node::new(
            NodeId(10),
            NodeKind::FunctionCall(CallTarget::Unresolved {
                path: "lib/missing.json".to_string(),
                reason: "file not found".to_string(),
            }),
        ));
        graph.add_root(Node::new(NodeId(11), NodeKind::Output(SemanticBlock::Unlit)));
        graph.connect(NodeId(10), 0, NodeId(11), 0);

        let compiled = compile(&graph);
        assert_eq!(compiled.compiled().count(), 1);
        let (root, err) = compiled.failures().next().unwrap();
        assert_eq!(root, NodeId(11));
        assert!(err.to_string().contains("lib/missing.json"));
    }

    #[test]
    fn test_texture_sample_root() {
        let mut graph = Graph::new("sampled");
        graph.add_node(Node::new(
            NodeId(1),
            NodeKind::TextureRef(TextureProps {
                name: "albedo".to_string(),
                source: Some("textures/albedo.png".to_string()),
            }),
        ));
        graph.add_node(parameter(2, "uv", SlotValue::Vec2([0.0, 0.0])));
        graph.add_node(Node::new(NodeId(3), NodeKind::TextureSample));
        graph.add_root(Node::new(NodeId(4), NodeKind::Output(SemanticBlock::Surface)));
        graph.connect(NodeId(1), 0, NodeId(3), 0);
        graph.connect(NodeId(2), 0, NodeId(3), 1);
        graph.connect(NodeId(3), 1, NodeId(4), 0);
        graph.connect(NodeId(3), 5, NodeId(4), 5);

        let compiled = compile(&graph);
        let root = compiled.compiled().next().unwrap();
        let base = &root.output("BaseColor").unwrap().expr;
        let opacity = &root.output("Opacity").unwrap().expr;
        let (
            IrKind::Swizzle { source: rgb, .. },
            IrKind::Swizzle { source: alpha, .. },
        ) = (base.kind(), opacity.kind())
        else {
            panic!("expected swizzles");
        };
        assert!(Rc::ptr_eq(rgb, alpha));
        assert_eq!(rgb.ref_count(), 2);
    }

    #[test]
    fn test_parameter_type_conflict_fails_root() {
        let mut graph = Graph::new("k twice");
        graph.add_node(parameter(1, "k", SlotValue::Scalar(0.5)));
        graph.add_node(parameter(2, "k", SlotValue::Vec3([1.0, 1.0, 1.0])));
        graph.add_root(Node::new(NodeId(3), NodeKind::Output(SemanticBlock::Surface)));
        graph.connect(NodeId(1), 0, NodeId(3), 1);
        graph.connect(NodeId(2), 0, NodeId(3), 0);

        let compiled = compile(&graph);
        let (root, err) = compiled.failures().next().unwrap();
        assert_eq!(root, NodeId(3));
        let CompileError::Parameter(conflict) = err else {
            panic!("expected parameter conflict, got {err}");
        };
        assert_eq!(conflict.name, "k");
        assert_ne!(conflict.first, conflict.second);
    }

    #[test]
    fn test_parameter_type_conflict_across_roots() {
        let mut graph = Graph::new("k per root");
        graph.add_node(parameter(1, "k", SlotValue::Scalar(0.5)));
        graph.add_root(Node::new(NodeId(2), NodeKind::Output(SemanticBlock::Surface)));
        graph.add_node(parameter(3, "k", SlotValue::Vec3([1.0, 1.0, 1.0])));
        graph.add_root(Node::new(NodeId(4), NodeKind::Output(SemanticBlock::Surface)));
        graph.connect(NodeId(1), 0, NodeId(2), 1);
        graph.connect(NodeId(3), 0, NodeId(4), 0);

        let compiled = compile(&graph);
        assert_eq!(compiled.compiled().map(|r| r.root).collect::<Vec<_>>(), vec![NodeId(2)]);
        let (root, err) = compiled.failures().next().unwrap();
        assert_eq!(root, NodeId(4));
        assert!(matches!(
            err,
            CompileError::Parameter(c) if c.first == ValueType::Scalar && c.second == ValueType::Vec3
        ));

        let shader = MaterialAssembler::default().assemble(&compiled).unwrap();
        assert!(shader.source.contains("    k: f32,"));
    }

    #[test]
    fn test_texture_sample_with_lod() {
        let mut graph = Graph::new("mip");
        graph.add_node(Node::new(
            NodeId(1),
            NodeKind::TextureRef(TextureProps {
                name: "albedo".to_string(),
                source: None,
            }),
        ));
        graph.add_node(parameter(2, "uv", SlotValue::Vec2([0.0, 0.0])));
        graph.add_node(parameter(3, "lod", SlotValue::Scalar(2.0)));
        graph.add_node(Node::new(NodeId(4), NodeKind::TextureSample));
        graph.add_root(Node::new(NodeId(5), NodeKind::Output(SemanticBlock::Surface)));
        graph.connect(NodeId(1), 0, NodeId(4), 0);
        graph.connect(NodeId(2), 0, NodeId(4), 1);
        graph.connect(NodeId(3), 0, NodeId(4), 2);
        graph.connect(NodeId(4), 1, NodeId(5), 0);

        let compiled = compile(&graph);
        let root = compiled.compiled().next().unwrap();
        let IrKind::Swizzle { source, .. } = root.output("BaseColor").unwrap().expr.kind() else {
            panic!("expected swizzle");
        };
        let IrKind::TextureSample { lod: Some(lod), .. } = source.kind() else {
            panic!("expected sample with lod, got {:?}", source.kind());
        };
        assert_eq!(lod.parameter(), Some(("lod", ValueType::Scalar)));

        let shader = MaterialAssembler::default().assemble(&compiled).unwrap();
        assert!(shader
            .source
            .contains("textureSampleLevel(albedo, albedo_sampler, material.uv, material.lod)"));
    }

    #[test]
    fn test_top_level_function_inputs_become_parameters() {
        let mut graph = Graph::new("inputs");
        graph.add_node(Node::new(
            NodeId(1),
            NodeKind::FunctionInput(FunctionInputProps {
                name: Some("tint".to_string()),
                value_type: ValueType::Vec3,
                default: Some(SlotValue::Vec3([1.0, 0.5, 0.25])),
            }),
        ));
        graph.add_node(Node::new(
            NodeId(2),
            NodeKind::FunctionInput(FunctionInputProps {
                name: None,
                value_type: ValueType::Scalar,
                default: None,
            }),
        ));
        graph.add_root(Node::new(NodeId(3), NodeKind::Output(SemanticBlock::Surface)));
        graph.connect(NodeId(1), 0, NodeId(3), 0);
        graph.connect(NodeId(2), 0, NodeId(3), 1);

        let compiled = compile(&graph);
        let root = compiled.compiled().next().unwrap();
        assert!(matches!(
            root.output("BaseColor").unwrap().expr.kind(),
            IrKind::Constant {
                value: SlotValue::Vec3(v),
                parameter: Some(name),
            } if name == "tint" && *v == [1.0, 0.5, 0.25]
        ));
        assert!(matches!(
            root.output("Metallic").unwrap().expr.kind(),
            IrKind::Constant {
                value: SlotValue::Scalar(v),
                parameter: Some(name),
            } if name == "arg_2" && *v == 0.0
        ));
        assert_eq!(root.parameters.get("arg_2"), Some(ValueType::Scalar));

        let source = MaterialAssembler::default().assemble(&compiled).unwrap().source;
        assert!(source.contains("    tint: vec3<f32>,"));
        assert!(source.contains("    out.metallic = material.arg_2;"));
    }
}
