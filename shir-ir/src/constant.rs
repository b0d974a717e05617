//! Constant values and the constant manager
//!
//! Constants are immutable and interned: equal constants share a [`ConstId`].
//! Floating point scalars compare by bit pattern, so `-0.0` and `0.0` are
//! distinct constants and a NaN equals itself.

use crate::types::{ArrayCount, Type, TypeId, TypeManager};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A scalar literal. `F16` values are carried widened to `f32`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    F16(f32),
}

impl Scalar {
    pub fn ty(self) -> TypeId {
        match self {
            Scalar::Bool(_) => TypeId::BOOL,
            Scalar::I32(_) => TypeId::I32,
            Scalar::U32(_) => TypeId::U32,
            Scalar::F32(_) => TypeId::F32,
            Scalar::F16(_) => TypeId::F16,
        }
    }

    fn bits(self) -> (u8, u32) {
        match self {
            Scalar::Bool(v) => (0, v as u32),
            Scalar::I32(v) => (1, v as u32),
            Scalar::U32(v) => (2, v),
            Scalar::F32(v) => (3, v.to_bits()),
            Scalar::F16(v) => (4, v.to_bits()),
        }
    }

    /// The zero value of a scalar type
    pub fn zero(ty: TypeId) -> Option<Scalar> {
        match ty {
            TypeId::BOOL => Some(Scalar::Bool(false)),
            TypeId::I32 => Some(Scalar::I32(0)),
            TypeId::U32 => Some(Scalar::U32(0)),
            TypeId::F32 => Some(Scalar::F32(0.0)),
            TypeId::F16 => Some(Scalar::F16(0.0)),
            _ => None,
        }
    }

    /// Integer scalars widened to `i64`
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Scalar::I32(v) => Some(v as i64),
            Scalar::U32(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn is_integer_one(self) -> bool {
        self.as_i64() == Some(1)
    }

    /// Whether this is the largest value of its integer type
    pub fn is_integer_max(self) -> bool {
        matches!(self, Scalar::I32(i32::MAX) | Scalar::U32(u32::MAX))
    }

    /// Whether this is the smallest value of its integer type
    pub fn is_integer_min(self) -> bool {
        matches!(self, Scalar::I32(i32::MIN) | Scalar::U32(0))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::I32(v) => write!(f, "{}i", v),
            Scalar::U32(v) => write!(f, "{}u", v),
            Scalar::F32(v) => write!(f, "{:?}f", v),
            Scalar::F16(v) => write!(f, "{:?}h", v),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::I32(v)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::U32(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::F32(v)
    }
}

/// Interned constant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstId(u32);

impl ConstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Scalar(Scalar),
    /// One constant per element of `ty`
    Composite { ty: TypeId, elements: Vec<ConstId> },
    /// Every element of `ty` is `element`
    Splat { ty: TypeId, element: ConstId },
}

/// Interner for constant values
#[derive(Debug, Clone, Default)]
pub struct ConstantManager {
    values: Vec<ConstValue>,
    lookup: HashMap<ConstValue, ConstId>,
}

impl ConstantManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, value: ConstValue) -> ConstId {
        if let Some(id) = self.lookup.get(&value) {
            return *id;
        }
        let id = ConstId(self.values.len() as u32);
        self.values.push(value.clone());
        self.lookup.insert(value, id);
        id
    }

    pub fn scalar(&mut self, scalar: impl Into<Scalar>) -> ConstId {
        self.intern(ConstValue::Scalar(scalar.into()))
    }

    pub fn composite(&mut self, ty: TypeId, elements: Vec<ConstId>) -> ConstId {
        assert!(!elements.is_empty(), "composite constant must have at least one element");
        self.intern(ConstValue::Composite { ty, elements })
    }

    pub fn splat(&mut self, ty: TypeId, element: ConstId) -> ConstId {
        self.intern(ConstValue::Splat { ty, element })
    }

    /// The zero value of a constructible type
    pub fn zero(&mut self, types: &TypeManager, ty: TypeId) -> Option<ConstId> {
        if let Some(scalar) = Scalar::zero(ty) {
            return Some(self.scalar(scalar));
        }
        match types.ty(ty) {
            Type::Vector { elem, .. } => {
                let element = self.zero(types, *elem)?;
                Some(self.splat(ty, element))
            }
            Type::Matrix { column, .. } => {
                let element = self.zero(types, *column)?;
                Some(self.splat(ty, element))
            }
            Type::Array { elem, count: ArrayCount::Fixed(_), .. } => {
                let element = self.zero(types, *elem)?;
                Some(self.splat(ty, element))
            }
            Type::Struct { members, .. } => {
                let mut elements = Vec::with_capacity(members.len());
                for member in members {
                    elements.push(self.zero(types, member.ty)?);
                }
                Some(self.composite(ty, elements))
            }
            _ => None,
        }
    }

    pub fn value(&self, id: ConstId) -> &ConstValue {
        self.values
            .get(id.index())
            .unwrap_or_else(|| panic!("unknown constant id {}", id.0))
    }

    pub fn try_value(&self, id: ConstId) -> Option<&ConstValue> {
        self.values.get(id.index())
    }

    /// Constant id for a raw index, if it is in range
    pub fn id_at(&self, index: usize) -> Option<ConstId> {
        (index < self.values.len()).then_some(ConstId(index as u32))
    }

    pub fn ty(&self, id: ConstId) -> TypeId {
        match self.value(id) {
            ConstValue::Scalar(s) => s.ty(),
            ConstValue::Composite { ty, .. } | ConstValue::Splat { ty, .. } => *ty,
        }
    }

    pub fn as_scalar(&self, id: ConstId) -> Option<Scalar> {
        match self.value(id) {
            ConstValue::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// The element at `index` of a composite or splat constant
    pub fn element(&self, id: ConstId, index: usize) -> Option<ConstId> {
        match self.value(id) {
            ConstValue::Scalar(_) => None,
            ConstValue::Composite { elements, .. } => elements.get(index).copied(),
            ConstValue::Splat { element, .. } => Some(*element),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over constants in interning order (elements before composites)
    pub fn iter(&self) -> impl Iterator<Item = (ConstId, &ConstValue)> + '_ {
        self.values.iter().enumerate().map(|(i, v)| (ConstId(i as u32), v))
    }

    /// Textual form, e.g. `vec2<f32>(1.0f, 2.0f)`
    pub fn display(&self, types: &TypeManager, id: ConstId) -> String {
        match self.value(id) {
            ConstValue::Scalar(s) => s.to_string(),
            ConstValue::Composite { ty, elements } => {
                let elements: Vec<String> = elements.iter().map(|e| self.display(types, *e)).collect();
                format!("{}({})", types.name(*ty), elements.join(", "))
            }
            ConstValue::Splat { ty, element } => {
                format!("{}({})", types.name(*ty), self.display(types, *element))
            }
        }
    }
}
