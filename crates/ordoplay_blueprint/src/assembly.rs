// SPDX-License-Identifier: MIT OR Apache-2.0
//! Material shader assembly.
//!
//! Turns a compiled graph into a WGSL module: one function per compiled
//! root, each returning a struct with every port of its block. Ports the
//! graph leaves unconnected get the block's fallback value here, on the
//! consumer side of the compiler. A scalar driving a four-lane port is
//! widened to an opaque grey.

use crate::compiler::{CompiledGraph, CompiledRoot};
use crate::ir::{Component, ParameterConflict};
use crate::node::NodeKind;
use crate::output::{SemanticBlock, SemanticPort};
use crate::port::{SlotValue, ValueType};
use crate::settings::TargetSettings;
use crate::target::{wgsl_type, LoweringContext, WgslBuilder};
use std::fmt::Write;

/// Fallback value of an unconnected port
pub fn port_fallback(block: SemanticBlock, port: &str) -> SlotValue {
    match (block, port) {
        (SemanticBlock::Surface, "BaseColor") => SlotValue::Vec3([0.8, 0.8, 0.8]),
        (SemanticBlock::Surface, "Roughness") => SlotValue::Scalar(0.5),
        (_, "Normal") => SlotValue::Vec3([0.0, 0.0, 1.0]),
        (_, "Tangent") => SlotValue::Vec4([1.0, 0.0, 0.0, 1.0]),
        (_, "Opacity" | "Occlusion") => SlotValue::Scalar(1.0),
        (_, "Color") => SlotValue::Vec4([1.0, 1.0, 1.0, 1.0]),
        (_, name) => block
            .port(name)
            .and_then(|p| SlotValue::zero(p.storage))
            .unwrap_or(SlotValue::Scalar(0.0)),
    }
}

fn field_name(port: &str) -> String {
    let mut field = String::new();
    let mut previous_lower = false;
    for c in port.chars() {
        if c.is_ascii_uppercase() && previous_lower {
            field.push('_');
        }
        previous_lower = c.is_ascii_lowercase();
        field.push(c.to_ascii_lowercase());
    }
    field
}

fn struct_name(block: SemanticBlock) -> &'static str {
    match block {
        SemanticBlock::Surface => "SurfaceOutput",
        SemanticBlock::Unlit => "UnlitOutput",
        SemanticBlock::Vertex => "VertexOutput",
    }
}

fn function_prefix(block: SemanticBlock) -> &'static str {
    match block {
        SemanticBlock::Surface => "surface",
        SemanticBlock::Unlit => "unlit",
        SemanticBlock::Vertex => "vertex",
    }
}

/// Assembled shader module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledShader {
    /// Complete WGSL source
    pub source: String,
    /// Names of the generated entry functions, in root order
    pub functions: Vec<String>,
}

/// Builds WGSL modules from compiled graphs
#[derive(Debug, Clone, Default)]
pub struct MaterialAssembler {
    settings: TargetSettings,
}

impl MaterialAssembler {
    /// Create an assembler for a target layout
    pub fn new(settings: TargetSettings) -> Self {
        Self { settings }
    }

    /// Assemble every successfully compiled root; failed roots are skipped.
    ///
    /// Fails when two roots use one parameter name at different types.
    pub fn assemble(&self, compiled: &CompiledGraph) -> Result<AssembledShader, ParameterConflict> {
        let mut wgsl = WgslBuilder::new(self.settings.clone());
        let mut blocks = Vec::new();
        let mut bodies = Vec::new();
        let mut functions = Vec::new();

        {
            let mut cx = LoweringContext::new(&mut wgsl, self.settings.share_threshold);
            for root in compiled.compiled() {
                let block = match compiled.dag.node(root.root).map(|n| &n.kind) {
                    Some(NodeKind::Output(block)) => Some(*block),
                    _ => None,
                };
                let (name, body) = match block {
                    Some(block) => {
                        if !blocks.contains(&block) {
                            blocks.push(block);
                        }
                        Self::block_function(&mut cx, root, block)?
                    }
                    None => Self::preview_function(&mut cx, root)?,
                };
                tracing::debug!("Assembled {name} for root {}", root.root);
                functions.push(name);
                bodies.push(body);
            }
        }

        let mut source = format!("// blueprint {}\n\n", compiled.hash);
        source.push_str(&wgsl.declarations());
        for block in blocks {
            source.push('\n');
            source.push_str(&Self::block_struct(block));
        }
        for body in bodies {
            source.push('\n');
            source.push_str(&body);
        }

        Ok(AssembledShader { source, functions })
    }

    fn block_struct(block: SemanticBlock) -> String {
        let mut out = format!("struct {} {{\n", struct_name(block));
        for port in block.ports() {
            let _ = writeln!(out, "    {}: {},", field_name(port.name), wgsl_type(port.storage));
        }
        out.push_str("}\n");
        out
    }

    fn block_function(
        cx: &mut LoweringContext<'_>,
        root: &CompiledRoot,
        block: SemanticBlock,
    ) -> Result<(String, String), ParameterConflict> {
        cx.begin_function();
        let name = format!("{}_{}", function_prefix(block), root.root.0);

        let mut assignments = Vec::with_capacity(block.ports().len());
        for port in block.ports() {
            let value = Self::port_value(cx, root, block, port)?;
            assignments.push(format!("    out.{} = {value};", field_name(port.name)));
        }
        let locals = cx.target().take_statements();

        let mut out = format!("fn {name}() -> {} {{\n", struct_name(block));
        for local in locals {
            let _ = writeln!(out, "    {local}");
        }
        let _ = writeln!(out, "    var out: {};", struct_name(block));
        for assignment in assignments {
            out.push_str(&assignment);
            out.push('\n');
        }
        out.push_str("    return out;\n}\n");
        Ok((name, out))
    }

    fn port_value(
        cx: &mut LoweringContext<'_>,
        root: &CompiledRoot,
        block: SemanticBlock,
        port: &SemanticPort,
    ) -> Result<String, ParameterConflict> {
        Ok(match root.output(port.name) {
            Some(binding) => {
                let from = binding.expr.value_type().unwrap_or(port.storage);
                let code = binding.expr.create(cx)?;
                Self::widen(cx, &code, from, port.storage)
            }
            None => {
                let fallback = port_fallback(block, port.name);
                let code = cx.target().literal(&fallback);
                Self::widen(cx, &code, fallback.value_type(), port.storage)
            }
        })
    }

    /// Convert `code` for a port; a scalar fills the colour lanes of a
    /// four-lane port and leaves alpha at one
    fn widen(cx: &mut LoweringContext<'_>, code: &str, from: ValueType, to: ValueType) -> String {
        if from == ValueType::Scalar && to == ValueType::Vec4 {
            let grey = [Component::X, Component::X, Component::X, Component::One];
            return cx.target().swizzle(code, from, &grey);
        }
        cx.target().convert(code, from, to)
    }

    fn preview_function(
        cx: &mut LoweringContext<'_>,
        root: &CompiledRoot,
    ) -> Result<(String, String), ParameterConflict> {
        cx.begin_function();
        let name = format!("preview_{}", root.root.0);
        let value = match root.outputs.first() {
            Some(binding) => {
                let from = binding.expr.value_type().unwrap_or(ValueType::Vec4);
                let code = binding.expr.create(cx)?;
                Self::widen(cx, &code, from, ValueType::Vec4)
            }
            None => "vec4<f32>(0.0, 0.0, 0.0, 1.0)".to_string(),
        };
        let locals = cx.target().take_statements();

        let mut out = format!("fn {name}() -> vec4<f32> {{\n");
        for local in locals {
            let _ = writeln!(out, "    {local}");
        }
        let _ = writeln!(out, "    return {value};\n}}");
        Ok((name, out))
    }
}
