// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blueprint compiler for `OrdoPlay` material graphs.
//!
//! Turns a node graph (constants, textures, math, nested function calls and
//! semantic output blocks) into a typed, shared expression IR and from there
//! into WGSL.
//!
//! ## Pipeline
//!
//! 1. [`Dag::build`] wires links into input bindings and adjacency.
//! 2. [`Dag::schedule`] orders the nodes reachable from a root.
//! 3. [`TypeChecker`] resolves output types and validates every input.
//! 4. [`IrBuilder`] creates one shared expression per node.
//! 5. [`bind_outputs`] maps root inputs to named results.
//! 6. [`MaterialAssembler`] lowers the results through a [`TargetBuilder`].
//!
//! Nested graphs are loaded up front through a [`GraphLibrary`]; a call the
//! library cannot resolve fails only the roots that depend on it.

pub mod assembly;
pub mod callable;
pub mod compiler;
pub mod connection;
pub mod dag;
pub mod graph;
pub mod ir;
pub mod library;
pub mod node;
pub mod output;
pub mod port;
pub mod settings;
pub mod target;
pub mod types;

pub use assembly::{AssembledShader, MaterialAssembler};
pub use callable::{CallableGraph, FormalPort};
pub use compiler::{
    CompileError, CompiledGraph, CompiledRoot, Compiler, ErrorPolicy, RootResult, StructuralHash,
};
pub use connection::Link;
pub use dag::{Dag, LinkPolicy, Schedule};
pub use graph::{Graph, GraphDescription, GraphError};
pub use ir::{ExprRef, ExpressionList, IrBuilder, IrExpr, IrKind, ParameterConflict, ParameterTable};
pub use library::{FsGraphSource, GraphLibrary, GraphSource, LoadError, MemoryGraphSource};
pub use node::{CallTarget, MathOp, Node, NodeId, NodeKind};
pub use output::{bind_outputs, OutputBinding, SemanticBlock};
pub use port::{SlotId, SlotValue, TypeSet, ValueType};
pub use settings::{CompilerSettings, TargetSettings};
pub use target::{LoweringContext, TargetBuilder, WgslBuilder};
pub use types::{TypeChecker, TypeTable, ValidationError};
