// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lowering IR expressions into target shader code.
//!
//! [`TargetBuilder`] is the seam between the IR and a concrete shading
//! language. [`WgslBuilder`] is the bundled implementation. Lowering goes
//! through a [`LoweringContext`], which remembers which uniforms and
//! textures were declared and which expressions already live in locals.
//! Uniforms and textures are separate namespaces; a uniform reused at a
//! second type is an error.

use crate::ir::{cast_components, Component, IrExpr, IrKind, ParameterConflict, ParameterTable};
use crate::node::MathOp;
use crate::port::{SlotValue, ValueType};
use crate::settings::TargetSettings;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

/// Target-language syntax and declarations
pub trait TargetBuilder {
    /// Declare a uniform parameter (called once per name)
    fn declare_uniform(&mut self, name: &str, value_type: ValueType);

    /// Declare a texture and its sampler (called once per name)
    fn declare_texture(&mut self, name: &str);

    /// Reference to a declared uniform
    fn uniform(&self, name: &str) -> String;

    /// Reference to a declared texture
    fn texture(&self, name: &str) -> String;

    /// Literal value
    fn literal(&self, value: &SlotValue) -> String;

    /// Sample `texture` at `coord`, at an explicit level when `lod` is set
    fn sample(&self, texture: &str, coord: &str, lod: Option<&str>) -> String;

    /// Select or fill components of `source`
    fn swizzle(&self, source: &str, from: ValueType, components: &[Component]) -> String;

    /// Apply a math operation; scalar operands may need broadcasting to `result`
    fn math(&self, op: MathOp, args: &[(String, ValueType)], result: ValueType) -> String;

    /// Bind `value` to a local in the current function body
    fn bind_local(&mut self, name: &str, value_type: ValueType, value: &str);

    /// Take the statements bound since the last call
    fn take_statements(&mut self) -> Vec<String>;

    /// Convert a value between numeric types
    fn convert(&self, value: &str, from: ValueType, to: ValueType) -> String {
        if from == to {
            return value.to_string();
        }
        self.swizzle(value, from, &cast_components(from, to))
    }
}

/// State shared by every expression lowered into one module
pub struct LoweringContext<'t> {
    target: &'t mut dyn TargetBuilder,
    parameters: ParameterTable,
    textures: HashSet<String>,
    locals: HashMap<usize, String>,
    share_threshold: u32,
}

impl<'t> LoweringContext<'t> {
    /// Create a context writing into `target`.
    ///
    /// Composite expressions used more than `share_threshold` times are
    /// bound to a local.
    pub fn new(target: &'t mut dyn TargetBuilder, share_threshold: u32) -> Self {
        Self {
            target,
            parameters: ParameterTable::new(),
            textures: HashSet::new(),
            locals: HashMap::new(),
            share_threshold,
        }
    }

    /// Start a new function body; locals of the previous body go out of scope
    pub fn begin_function(&mut self) {
        self.locals.clear();
    }

    /// Declared uniforms and their types
    pub fn parameters(&self) -> &ParameterTable {
        &self.parameters
    }

    /// Names of every declared texture
    pub fn textures(&self) -> &HashSet<String> {
        &self.textures
    }

    /// The target being written
    pub fn target(&mut self) -> &mut dyn TargetBuilder {
        &mut *self.target
    }

    fn declare_uniform(&mut self, name: &str, value_type: ValueType) -> Result<(), ParameterConflict> {
        if self.parameters.declare(name, value_type)? {
            self.target.declare_uniform(name, value_type);
        }
        Ok(())
    }

    fn declare_texture(&mut self, name: &str) {
        if self.textures.insert(name.to_string()) {
            self.target.declare_texture(name);
        }
    }
}

impl IrExpr {
    /// Lower this expression, declaring what it needs on first use
    pub fn create(&self, cx: &mut LoweringContext<'_>) -> Result<String, ParameterConflict> {
        if let Some(local) = cx.locals.get(&self.index()) {
            return Ok(local.clone());
        }

        let code = match self.kind() {
            IrKind::Constant { value, .. } => match self.parameter() {
                Some((name, value_type)) => {
                    cx.declare_uniform(name, value_type)?;
                    cx.target.uniform(name)
                }
                None => cx.target.literal(value),
            },
            IrKind::Texture { name } => {
                cx.declare_texture(name);
                cx.target.texture(name)
            }
            IrKind::TextureSample {
                texture,
                coord,
                lod,
            } => {
                let texture = texture.create(cx)?;
                let coord = coord.create(cx)?;
                let lod = lod.as_ref().map(|l| l.create(cx)).transpose()?;
                cx.target.sample(&texture, &coord, lod.as_deref())
            }
            IrKind::Swizzle { source, components } => {
                let from = source.value_type().unwrap_or(ValueType::Vec4);
                let code = source.create(cx)?;
                cx.target.swizzle(&code, from, components)
            }
            IrKind::Math { op, args } => {
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push((arg.create(cx)?, arg.value_type().unwrap_or(ValueType::Scalar)));
                }
                let result = self.value_type().unwrap_or(ValueType::Scalar);
                cx.target.math(*op, &lowered, result)
            }
            // A call aggregate is only consumed through its results; lower
            // every output so their declarations happen in call order.
            IrKind::Call { outputs, .. } => {
                let lowered = outputs
                    .iter()
                    .map(|o| o.create(cx))
                    .collect::<Result<Vec<String>, ParameterConflict>>()?;
                lowered.into_iter().next().unwrap_or_default()
            }
            IrKind::CallResult { call, index } => match call.kind() {
                IrKind::Call { outputs, .. } => match outputs.get(*index) {
                    Some(output) => output.create(cx)?,
                    None => String::new(),
                },
                _ => call.create(cx)?,
            },
        };

        match self.value_type() {
            Some(value_type) if self.is_composite() && self.ref_count() > cx.share_threshold => {
                let name = format!("e{}", self.index());
                cx.target.bind_local(&name, value_type, &code);
                cx.locals.insert(self.index(), name.clone());
                Ok(name)
            }
            _ => Ok(code),
        }
    }
}

/// WGSL type name
pub fn wgsl_type(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Scalar => "f32",
        ValueType::Vec2 => "vec2<f32>",
        ValueType::Vec3 => "vec3<f32>",
        ValueType::Vec4 => "vec4<f32>",
        ValueType::Texture => "texture_2d<f32>",
    }
}

fn wgsl_float(value: f32) -> String {
    format!("{value:?}")
}

/// Writes WGSL: a uniform struct, texture/sampler bindings and function bodies
#[derive(Debug, Clone)]
pub struct WgslBuilder {
    settings: TargetSettings,
    uniforms: Vec<(String, ValueType)>,
    textures: Vec<String>,
    body: Vec<String>,
}

impl WgslBuilder {
    /// Create an empty builder
    pub fn new(settings: TargetSettings) -> Self {
        Self {
            settings,
            uniforms: Vec::new(),
            textures: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Declared uniforms, in declaration order
    pub fn uniforms(&self) -> &[(String, ValueType)] {
        &self.uniforms
    }

    /// Declared textures, in declaration order
    pub fn textures(&self) -> &[String] {
        &self.textures
    }

    /// Module-scope declarations for everything declared so far
    pub fn declarations(&self) -> String {
        let mut out = String::new();
        let group = self.settings.bind_group;
        let mut binding = 0;

        if !self.uniforms.is_empty() {
            let _ = writeln!(out, "struct {} {{", self.settings.uniform_struct);
            for (name, value_type) in &self.uniforms {
                let _ = writeln!(out, "    {name}: {},", wgsl_type(*value_type));
            }
            let _ = writeln!(out, "}}\n");
            let _ = writeln!(
                out,
                "@group({group}) @binding({binding}) var<uniform> {}: {};",
                self.settings.uniform_binding, self.settings.uniform_struct
            );
            binding += 1;
        }

        for name in &self.textures {
            let _ = writeln!(
                out,
                "@group({group}) @binding({binding}) var {name}: texture_2d<f32>;"
            );
            let _ = writeln!(
                out,
                "@group({group}) @binding({}) var {name}_sampler: sampler;",
                binding + 1
            );
            binding += 2;
        }
        out
    }
}

impl TargetBuilder for WgslBuilder {
    fn declare_uniform(&mut self, name: &str, value_type: ValueType) {
        self.uniforms.push((name.to_string(), value_type));
    }

    fn declare_texture(&mut self, name: &str) {
        self.textures.push(name.to_string());
    }

    fn uniform(&self, name: &str) -> String {
        format!("{}.{name}", self.settings.uniform_binding)
    }

    fn texture(&self, name: &str) -> String {
        name.to_string()
    }

    fn literal(&self, value: &SlotValue) -> String {
        let components: Vec<String> = value.components().into_iter().map(wgsl_float).collect();
        match value {
            SlotValue::Scalar(_) => components.join(""),
            _ => format!("{}({})", wgsl_type(value.value_type()), components.join(", ")),
        }
    }

    fn sample(&self, texture: &str, coord: &str, lod: Option<&str>) -> String {
        match lod {
            Some(lod) => format!("textureSampleLevel({texture}, {texture}_sampler, {coord}, {lod})"),
            None => format!("textureSample({texture}, {texture}_sampler, {coord})"),
        }
    }

    fn swizzle(&self, source: &str, from: ValueType, components: &[Component]) -> String {
        let selects_only = components
            .iter()
            .all(|c| matches!(c, Component::X | Component::Y | Component::Z | Component::W));

        if from == ValueType::Scalar && components.iter().all(|c| *c == Component::X) {
            return match ValueType::from_components(components.len()) {
                Some(ValueType::Scalar) | None => source.to_string(),
                Some(vector) => format!("{}({source})", wgsl_type(vector)),
            };
        }
        if selects_only && from != ValueType::Scalar {
            let mask: String = components
                .iter()
                .map(|c| match c {
                    Component::X => 'x',
                    Component::Y => 'y',
                    Component::Z => 'z',
                    _ => 'w',
                })
                .collect();
            return format!("{source}.{mask}");
        }

        let parts: Vec<String> = components
            .iter()
            .map(|c| match c {
                Component::Zero => "0.0".to_string(),
                Component::One => "1.0".to_string(),
                Component::X if from == ValueType::Scalar => source.to_string(),
                Component::X => format!("{source}.x"),
                Component::Y => format!("{source}.y"),
                Component::Z => format!("{source}.z"),
                Component::W => format!("{source}.w"),
            })
            .collect();
        match ValueType::from_components(parts.len()) {
            Some(ValueType::Scalar) | None => parts.join(""),
            Some(vector) => format!("{}({})", wgsl_type(vector), parts.join(", ")),
        }
    }

    fn math(&self, op: MathOp, args: &[(String, ValueType)], result: ValueType) -> String {
        let widened = |i: usize| -> String {
            args.get(i)
                .map(|(code, value_type)| self.convert(code, *value_type, result))
                .unwrap_or_default()
        };
        let raw = |i: usize| -> String { args.get(i).map(|(code, _)| code.clone()).unwrap_or_default() };

        match op {
            MathOp::Add => format!("({} + {})", raw(0), raw(1)),
            MathOp::Subtract => format!("({} - {})", raw(0), raw(1)),
            MathOp::Multiply => format!("({} * {})", raw(0), raw(1)),
            MathOp::Divide => format!("({} / {})", raw(0), raw(1)),
            MathOp::Min => format!("min({}, {})", widened(0), widened(1)),
            MathOp::Max => format!("max({}, {})", widened(0), widened(1)),
            MathOp::Power => format!("pow({}, {})", widened(0), widened(1)),
            MathOp::Lerp => format!("mix({}, {}, {})", widened(0), widened(1), raw(2)),
            MathOp::Dot => format!("dot({}, {})", raw(0), raw(1)),
            MathOp::Sin => format!("sin({})", raw(0)),
            MathOp::Cos => format!("cos({})", raw(0)),
            MathOp::Abs => format!("abs({})", raw(0)),
            MathOp::Normalize => format!("normalize({})", raw(0)),
            MathOp::OneMinus => format!("(1.0 - {})", raw(0)),
            MathOp::Saturate => format!("saturate({})", raw(0)),
        }
    }

    fn bind_local(&mut self, name: &str, value_type: ValueType, value: &str) {
        self.body
            .push(format!("let {name}: {} = {value};", wgsl_type(value_type)));
    }

    fn take_statements(&mut self) -> Vec<String> {
        std::mem::take(&mut self.body)
    }
}
