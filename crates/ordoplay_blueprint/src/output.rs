// SPDX-License-Identifier: MIT OR Apache-2.0
//! Semantic output blocks and output resolution.
//!
//! An output block is an evaluation sink whose input ports carry fixed
//! meanings (base color, roughness, vertex position, ...). After a root has
//! been lowered, [`bind_outputs`] collects the IR expression feeding each
//! connected port so a consumer can assemble the final shader.

use crate::ir::{ExprRef, IrBuilder, IrError};
use crate::node::{NodeId, NodeKind};
use crate::port::{TypeSet, ValueType};
use serde::{Deserialize, Serialize};

/// A fixed-meaning input port of an output block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticPort {
    /// Port name, also used as the binding name
    pub name: &'static str,
    /// Types that may be connected
    pub accepts: TypeSet,
    /// Type the consumer stores the value as
    pub storage: ValueType,
}

const fn port(name: &'static str, accepts: TypeSet, storage: ValueType) -> SemanticPort {
    SemanticPort {
        name,
        accepts,
        storage,
    }
}

const SCALAR: TypeSet = TypeSet::single(ValueType::Scalar);
const VEC2: TypeSet = TypeSet::single(ValueType::Vec2);
const VEC3: TypeSet = TypeSet::single(ValueType::Vec3);
const VEC3_OR_4: TypeSet = VEC3.union(TypeSet::single(ValueType::Vec4));

const SURFACE_PORTS: &[SemanticPort] = &[
    port("BaseColor", TypeSet::COLOR, ValueType::Vec3),
    port("Metallic", SCALAR, ValueType::Scalar),
    port("Roughness", SCALAR, ValueType::Scalar),
    port("Normal", VEC3, ValueType::Vec3),
    port("Tangent", VEC3_OR_4, ValueType::Vec4),
    port("Opacity", SCALAR, ValueType::Scalar),
    port("Emissive", TypeSet::COLOR, ValueType::Vec3),
    port("Occlusion", SCALAR, ValueType::Scalar),
];

const UNLIT_PORTS: &[SemanticPort] = &[
    port("Color", TypeSet::COLOR, ValueType::Vec4),
    port("Opacity", SCALAR, ValueType::Scalar),
];

const VERTEX_PORTS: &[SemanticPort] = &[
    port("Position", VEC3_OR_4, ValueType::Vec3),
    port("Color", TypeSet::COLOR, ValueType::Vec4),
    port("UV", VEC2, ValueType::Vec2),
    port("Normal", VEC3, ValueType::Vec3),
    port("Tangent", VEC3_OR_4, ValueType::Vec4),
];

/// Kinds of semantic output block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticBlock {
    /// Lit surface (PBR metallic-roughness)
    Surface,
    /// Unlit color
    Unlit,
    /// Per-vertex attributes
    Vertex,
}

impl SemanticBlock {
    /// Ports in catalog order; the slot id of a port is its index
    pub fn ports(self) -> &'static [SemanticPort] {
        match self {
            Self::Surface => SURFACE_PORTS,
            Self::Unlit => UNLIT_PORTS,
            Self::Vertex => VERTEX_PORTS,
        }
    }

    /// Look up a port by name
    pub fn port(self, name: &str) -> Option<&'static SemanticPort> {
        self.ports().iter().find(|p| p.name == name)
    }

    /// Display name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Surface => "Surface Output",
            Self::Unlit => "Unlit Output",
            Self::Vertex => "Vertex Output",
        }
    }
}

/// A named result of a compiled root
#[derive(Debug, Clone)]
pub struct OutputBinding {
    /// Port (or output slot) name
    pub name: String,
    /// Expression producing the value
    pub expr: ExprRef,
}

/// Collect the expressions feeding a root.
///
/// For output blocks this yields one binding per connected port in catalog
/// order; unconnected ports are left to the consumer's defaults. Any other
/// root exposes its own output slots, which makes previewing an arbitrary
/// node possible.
pub fn bind_outputs(
    builder: &mut IrBuilder<'_>,
    root: NodeId,
) -> Result<Vec<OutputBinding>, IrError> {
    let node = builder.dag().node(root).ok_or(IrError::MissingNode(root))?;

    let mut bindings = Vec::new();
    if let NodeKind::Output(_) = node.kind {
        for input in &node.inputs {
            if !input.is_bound() {
                continue;
            }
            if let Some(expr) = builder.input_expr(root, input.id)? {
                expr.add_ref();
                bindings.push(OutputBinding {
                    name: input.name.clone(),
                    expr,
                });
            }
        }
    } else {
        for output in &node.outputs {
            let expr = builder.output_expr(root, output.id)?;
            expr.add_ref();
            bindings.push(OutputBinding {
                name: output.name.clone(),
                expr,
            });
        }
    }
    Ok(bindings)
}
