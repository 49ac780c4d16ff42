// SPDX-License-Identifier: MIT OR Apache-2.0
//! Slot definitions for node inputs/outputs.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a slot, unique among the inputs (or outputs) of one node
pub type SlotId = u32;

/// Data type that can flow through slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    /// Single float
    Scalar,
    /// 2D vector
    Vec2,
    /// 3D vector / RGB
    Vec3,
    /// 4D vector / RGBA
    Vec4,
    /// Bound texture + sampler pair
    Texture,
}

impl ValueType {
    /// All value types, in bit order
    pub const ALL: [ValueType; 5] = [
        ValueType::Scalar,
        ValueType::Vec2,
        ValueType::Vec3,
        ValueType::Vec4,
        ValueType::Texture,
    ];

    /// Number of float components, `None` for non-numeric types
    pub fn components(self) -> Option<usize> {
        match self {
            Self::Scalar => Some(1),
            Self::Vec2 => Some(2),
            Self::Vec3 => Some(3),
            Self::Vec4 => Some(4),
            Self::Texture => None,
        }
    }

    /// Numeric type with the given component count
    pub fn from_components(count: usize) -> Option<Self> {
        match count {
            1 => Some(Self::Scalar),
            2 => Some(Self::Vec2),
            3 => Some(Self::Vec3),
            4 => Some(Self::Vec4),
            _ => None,
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scalar => "scalar",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Texture => "texture",
        };
        f.write_str(name)
    }
}

/// Set of value types an input slot accepts
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ValueType>", into = "Vec<ValueType>")]
pub struct TypeSet(u8);

impl TypeSet {
    /// Scalar and every vector width
    pub const NUMERIC: TypeSet = TypeSet(0b0_1111);
    /// Vectors only
    pub const VECTORS: TypeSet = TypeSet(0b0_1110);
    /// Scalar (grey), RGB or RGBA
    pub const COLOR: TypeSet = TypeSet(0b0_1101);
    /// Textures only
    pub const TEXTURE: TypeSet = TypeSet(0b1_0000);

    /// Set containing a single type
    pub const fn single(value_type: ValueType) -> Self {
        Self(value_type.bit())
    }

    /// Members of either set
    pub const fn union(self, other: TypeSet) -> Self {
        Self(self.0 | other.0)
    }

    /// Set containing the given types
    pub fn of(types: &[ValueType]) -> Self {
        types.iter().copied().collect()
    }

    /// Check membership
    pub fn contains(self, value_type: ValueType) -> bool {
        self.0 & value_type.bit() != 0
    }

    /// Iterate the member types in declaration order
    pub fn iter(self) -> impl Iterator<Item = ValueType> {
        ValueType::ALL.into_iter().filter(move |t| self.contains(*t))
    }

    /// Whether the set accepts nothing
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<ValueType> for TypeSet {
    fn from_iter<I: IntoIterator<Item = ValueType>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |bits, t| bits | t.bit()))
    }
}

impl From<Vec<ValueType>> for TypeSet {
    fn from(types: Vec<ValueType>) -> Self {
        types.into_iter().collect()
    }
}

impl From<TypeSet> for Vec<ValueType> {
    fn from(set: TypeSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|t| t.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Literal value that can be stored in a slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SlotValue {
    /// Single float
    Scalar(f32),
    /// 2D vector
    Vec2([f32; 2]),
    /// 3D vector
    Vec3([f32; 3]),
    /// 4D vector
    Vec4([f32; 4]),
}

impl SlotValue {
    /// Get the value type for this literal
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Scalar(_) => ValueType::Scalar,
            Self::Vec2(_) => ValueType::Vec2,
            Self::Vec3(_) => ValueType::Vec3,
            Self::Vec4(_) => ValueType::Vec4,
        }
    }

    /// Flattened components
    pub fn components(&self) -> Vec<f32> {
        match self {
            Self::Scalar(v) => vec![*v],
            Self::Vec2(v) => v.to_vec(),
            Self::Vec3(v) => v.to_vec(),
            Self::Vec4(v) => v.to_vec(),
        }
    }

    /// Zero literal of a numeric type
    pub fn zero(value_type: ValueType) -> Option<Self> {
        match value_type {
            ValueType::Scalar => Some(Self::Scalar(0.0)),
            ValueType::Vec2 => Some(Self::Vec2([0.0; 2])),
            ValueType::Vec3 => Some(Self::Vec3([0.0; 3])),
            ValueType::Vec4 => Some(Self::Vec4([0.0; 4])),
            ValueType::Texture => None,
        }
    }
}

/// Producer feeding an input slot, resolved by the DAG builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    /// Producing node
    pub node: NodeId,
    /// Output slot on the producing node
    pub output: SlotId,
}

/// An input slot on a node
#[derive(Debug, Clone, PartialEq)]
pub struct InputSlot {
    /// Slot ID, unique among the node's inputs
    pub id: SlotId,
    /// Display name
    pub name: String,
    /// Accepted value types
    pub allowed: TypeSet,
    /// Literal used when nothing is connected
    pub default: Option<SlotValue>,
    /// Whether a missing connection (without default) is an error
    pub required: bool,
    /// Producer link, set while building the DAG
    pub binding: Option<Binding>,
}

impl InputSlot {
    /// Create a new optional input slot
    pub fn new(id: SlotId, name: impl Into<String>, allowed: TypeSet) -> Self {
        Self {
            id,
            name: name.into(),
            allowed,
            default: None,
            required: false,
            binding: None,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: SlotValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Whether the slot has a producer
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }
}

/// An output slot on a node
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSlot {
    /// Slot ID, unique among the node's outputs
    pub id: SlotId,
    /// Display name
    pub name: String,
    /// Declared type, `None` when inferred from the inputs
    pub value_type: Option<ValueType>,
}

impl OutputSlot {
    /// Output with a fixed type
    pub fn typed(id: SlotId, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            id,
            name: name.into(),
            value_type: Some(value_type),
        }
    }

    /// Output whose type is inferred from the node's inputs
    pub fn inferred(id: SlotId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            value_type: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_set_membership() {
        assert!(TypeSet::NUMERIC.contains(ValueType::Vec3));
        assert!(!TypeSet::NUMERIC.contains(ValueType::Texture));
        assert!(TypeSet::COLOR.contains(ValueType::Scalar));
        assert!(!TypeSet::COLOR.contains(ValueType::Vec2));
        assert_eq!(
            TypeSet::of(&[ValueType::Vec2, ValueType::Scalar]).iter().collect::<Vec<_>>(),
            vec![ValueType::Scalar, ValueType::Vec2]
        );
    }

    #[test]
    fn test_type_set_serializes_as_list() {
        let ron_str = ron::to_string(&TypeSet::COLOR).unwrap();
        assert_eq!(ron_str, "[Scalar,Vec3,Vec4]");
        let loaded: TypeSet = ron::from_str(&ron_str).unwrap();
        assert_eq!(loaded, TypeSet::COLOR);
    }

    #[test]
    fn test_slot_value_type() {
        assert_eq!(SlotValue::Vec3([1.0, 2.0, 3.0]).value_type(), ValueType::Vec3);
        assert_eq!(SlotValue::Scalar(5.0).components(), vec![5.0]);
        assert_eq!(SlotValue::zero(ValueType::Texture), None);
    }
}
