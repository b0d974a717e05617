//! Type system and the type manager
//!
//! Every type is interned by the module's [`TypeManager`], so two
//! structurally identical types always share one [`TypeId`] and type identity
//! can be compared by id. Struct layouts (member offsets, size, alignment)
//! are computed once when the struct is interned.

use crate::attributes::IoAttributes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Interned type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub const VOID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const I32: TypeId = TypeId(2);
    pub const U32: TypeId = TypeId(3);
    pub const F32: TypeId = TypeId(4);
    pub const F16: TypeId = TypeId(5);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Function,
    Private,
    Workgroup,
    Uniform,
    Storage,
    Handle,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressSpace::Function => "function",
            AddressSpace::Private => "private",
            AddressSpace::Workgroup => "workgroup",
            AddressSpace::Uniform => "uniform",
            AddressSpace::Storage => "storage",
            AddressSpace::Handle => "handle",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn can_read(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
            Access::ReadWrite => write!(f, "read_write"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureDimension {
    D1,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

impl fmt::Display for TextureDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextureDimension::D1 => "1d",
            TextureDimension::D2 => "2d",
            TextureDimension::D2Array => "2d_array",
            TextureDimension::D3 => "3d",
            TextureDimension::Cube => "cube",
            TextureDimension::CubeArray => "cube_array",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TexelFormat {
    Rgba8Unorm,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Sint,
    Bgra8Unorm,
    Rgba16Float,
    R32Uint,
    R32Sint,
    R32Float,
    Rgba32Float,
}

impl fmt::Display for TexelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TexelFormat::Rgba8Unorm => "rgba8unorm",
            TexelFormat::Rgba8Snorm => "rgba8snorm",
            TexelFormat::Rgba8Uint => "rgba8uint",
            TexelFormat::Rgba8Sint => "rgba8sint",
            TexelFormat::Bgra8Unorm => "bgra8unorm",
            TexelFormat::Rgba16Float => "rgba16float",
            TexelFormat::R32Uint => "r32uint",
            TexelFormat::R32Sint => "r32sint",
            TexelFormat::R32Float => "r32float",
            TexelFormat::Rgba32Float => "rgba32float",
        };
        write!(f, "{}", name)
    }
}

/// Element count of an array type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayCount {
    Fixed(u32),
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
    pub attributes: IoAttributes,
    pub offset: u32,
    pub size: u32,
    pub align: u32,
}

/// Type shapes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    I32,
    U32,
    F32,
    F16,
    Vector { elem: TypeId, width: u32 },
    /// `columns` columns, each of the vector type `column`
    Matrix { column: TypeId, columns: u32 },
    Array { elem: TypeId, count: ArrayCount, stride: u32 },
    Struct { name: String, members: Vec<StructMember>, size: u32, align: u32 },
    Pointer { space: AddressSpace, store: TypeId, access: Access },
    Atomic { elem: TypeId },
    SampledTexture { dim: TextureDimension, sampled: TypeId },
    MultisampledTexture { dim: TextureDimension, sampled: TypeId },
    DepthTexture { dim: TextureDimension },
    DepthMultisampledTexture { dim: TextureDimension },
    StorageTexture { dim: TextureDimension, format: TexelFormat, access: Access },
    ExternalTexture,
    Sampler { comparison: bool },
}

/// `value` rounded up to a multiple of `align`, or `None` past `u32::MAX`
fn round_up(align: u32, value: u32) -> Option<u32> {
    if align == 0 {
        Some(value)
    } else {
        value.div_ceil(align).checked_mul(align)
    }
}

/// Interner for all types of a module
#[derive(Debug, Clone)]
pub struct TypeManager {
    types: Vec<Type>,
    lookup: HashMap<Type, TypeId>,
}

impl Default for TypeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeManager {
    pub fn new() -> Self {
        let mut manager = Self {
            types: Vec::new(),
            lookup: HashMap::new(),
        };
        // Order matches the TypeId constants.
        for ty in [Type::Void, Type::Bool, Type::I32, Type::U32, Type::F32, Type::F16] {
            manager.get(ty);
        }
        manager
    }

    /// Interns a type, returning the id of the canonical instance
    pub fn get(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.lookup.get(&ty) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.lookup.insert(ty, id);
        id
    }

    /// Looks up an interned type
    pub fn ty(&self, id: TypeId) -> &Type {
        self.types
            .get(id.index())
            .unwrap_or_else(|| panic!("unknown type id {}", id.0))
    }

    pub fn try_ty(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.index())
    }

    /// Type id for a raw index, if it is in range
    pub fn id_at(&self, index: usize) -> Option<TypeId> {
        (index < self.types.len()).then_some(TypeId(index as u32))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterates over all types in interning order (components before composites)
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> + '_ {
        self.types.iter().enumerate().map(|(i, ty)| (TypeId(i as u32), ty))
    }

    // ===== Constructors =====

    pub fn vec(&mut self, elem: TypeId, width: u32) -> TypeId {
        assert!(self.is_scalar(elem), "vector element must be a scalar, got {}", self.name(elem));
        assert!((2..=4).contains(&width), "vector width must be 2, 3 or 4, got {}", width);
        self.get(Type::Vector { elem, width })
    }

    pub fn vec2(&mut self, elem: TypeId) -> TypeId {
        self.vec(elem, 2)
    }

    pub fn vec3(&mut self, elem: TypeId) -> TypeId {
        self.vec(elem, 3)
    }

    pub fn vec4(&mut self, elem: TypeId) -> TypeId {
        self.vec(elem, 4)
    }

    /// A `columns` x `rows` matrix of floating point `elem`
    pub fn mat(&mut self, elem: TypeId, columns: u32, rows: u32) -> TypeId {
        assert!(self.is_float_scalar(elem), "matrix element must be f32 or f16, got {}", self.name(elem));
        assert!((2..=4).contains(&columns), "matrix column count must be 2, 3 or 4, got {}", columns);
        let column = self.vec(elem, rows);
        self.get(Type::Matrix { column, columns })
    }

    pub fn array(&mut self, elem: TypeId, count: u32) -> TypeId {
        match self.try_array(elem, count) {
            Some(id) => id,
            None => panic!("array<{}, {}> is larger than 4GiB", self.name(elem), count),
        }
    }

    /// Like [`array`](Self::array), but `None` when the array size does not
    /// fit in `u32`
    pub fn try_array(&mut self, elem: TypeId, count: u32) -> Option<TypeId> {
        assert!(count > 0, "array element count must be greater than zero");
        let stride = self.stride_of(elem)?;
        stride.checked_mul(count)?;
        Some(self.get(Type::Array { elem, count: ArrayCount::Fixed(count), stride }))
    }

    pub fn runtime_array(&mut self, elem: TypeId) -> TypeId {
        match self.try_runtime_array(elem) {
            Some(id) => id,
            None => panic!("array<{}> has an element stride larger than 4GiB", self.name(elem)),
        }
    }

    pub fn try_runtime_array(&mut self, elem: TypeId) -> Option<TypeId> {
        let stride = self.stride_of(elem)?;
        Some(self.get(Type::Array { elem, count: ArrayCount::Runtime, stride }))
    }

    fn stride_of(&self, elem: TypeId) -> Option<u32> {
        round_up(self.align(elem), self.size(elem))
    }

    pub fn ptr(&mut self, space: AddressSpace, store: TypeId, access: Access) -> TypeId {
        self.get(Type::Pointer { space, store, access })
    }

    pub fn atomic(&mut self, elem: TypeId) -> TypeId {
        assert!(self.is_integer_scalar(elem), "atomic element must be i32 or u32, got {}", self.name(elem));
        self.get(Type::Atomic { elem })
    }

    /// Interns a struct, computing member offsets and the struct layout
    pub fn structure(&mut self, name: &str, members: Vec<(String, TypeId, IoAttributes)>) -> TypeId {
        match self.try_structure(name, members) {
            Some(id) => id,
            None => panic!("struct '{}' is larger than 4GiB", name),
        }
    }

    /// Like [`structure`](Self::structure), but `None` when a member offset
    /// or the struct size does not fit in `u32`
    pub fn try_structure(&mut self, name: &str, members: Vec<(String, TypeId, IoAttributes)>) -> Option<TypeId> {
        assert!(!members.is_empty(), "struct '{}' must have at least one member", name);
        let mut laid_out = Vec::with_capacity(members.len());
        let mut offset = 0u32;
        let mut align = 1;
        for (member_name, ty, attributes) in members {
            let member_align = self.align(ty);
            let member_size = self.size(ty);
            offset = round_up(member_align, offset)?;
            laid_out.push(StructMember {
                name: member_name,
                ty,
                attributes,
                offset,
                size: member_size,
                align: member_align,
            });
            offset = offset.checked_add(member_size)?;
            align = align.max(member_align);
        }
        let size = round_up(align, offset)?;
        Some(self.get(Type::Struct {
            name: name.to_string(),
            members: laid_out,
            size,
            align,
        }))
    }

    pub fn sampler(&mut self) -> TypeId {
        self.get(Type::Sampler { comparison: false })
    }

    pub fn comparison_sampler(&mut self) -> TypeId {
        self.get(Type::Sampler { comparison: true })
    }

    pub fn sampled_texture(&mut self, dim: TextureDimension, sampled: TypeId) -> TypeId {
        assert!(self.is_numeric_scalar(sampled), "sampled type must be a numeric scalar");
        self.get(Type::SampledTexture { dim, sampled })
    }

    pub fn storage_texture(&mut self, dim: TextureDimension, format: TexelFormat, access: Access) -> TypeId {
        self.get(Type::StorageTexture { dim, format, access })
    }

    pub fn depth_texture(&mut self, dim: TextureDimension) -> TypeId {
        self.get(Type::DepthTexture { dim })
    }

    // ===== Queries =====

    pub fn is_scalar(&self, id: TypeId) -> bool {
        matches!(self.ty(id), Type::Bool | Type::I32 | Type::U32 | Type::F32 | Type::F16)
    }

    pub fn is_integer_scalar(&self, id: TypeId) -> bool {
        matches!(self.ty(id), Type::I32 | Type::U32)
    }

    pub fn is_float_scalar(&self, id: TypeId) -> bool {
        matches!(self.ty(id), Type::F32 | Type::F16)
    }

    pub fn is_numeric_scalar(&self, id: TypeId) -> bool {
        self.is_integer_scalar(id) || self.is_float_scalar(id)
    }

    /// The scalar of a scalar or vector type
    pub fn scalar_of(&self, id: TypeId) -> Option<TypeId> {
        match self.ty(id) {
            Type::Vector { elem, .. } => Some(*elem),
            _ if self.is_scalar(id) => Some(id),
            _ => None,
        }
    }

    /// The innermost element of vectors, matrices and arrays
    pub fn deepest_element(&self, id: TypeId) -> TypeId {
        match self.ty(id) {
            Type::Vector { elem, .. } => *elem,
            Type::Matrix { column, .. } => self.deepest_element(*column),
            Type::Array { elem, .. } => self.deepest_element(*elem),
            _ => id,
        }
    }

    pub fn width(&self, id: TypeId) -> Option<u32> {
        match self.ty(id) {
            Type::Vector { width, .. } => Some(*width),
            _ => None,
        }
    }

    pub fn is_vector(&self, id: TypeId) -> bool {
        matches!(self.ty(id), Type::Vector { .. })
    }

    pub fn is_bool_scalar_or_vector(&self, id: TypeId) -> bool {
        self.scalar_of(id) == Some(TypeId::BOOL)
    }

    pub fn is_handle(&self, id: TypeId) -> bool {
        matches!(
            self.ty(id),
            Type::SampledTexture { .. }
                | Type::MultisampledTexture { .. }
                | Type::DepthTexture { .. }
                | Type::DepthMultisampledTexture { .. }
                | Type::StorageTexture { .. }
                | Type::ExternalTexture
                | Type::Sampler { .. }
        )
    }

    /// Returns `(address space, store type, access)` for pointer types
    pub fn pointer(&self, id: TypeId) -> Option<(AddressSpace, TypeId, Access)> {
        match self.ty(id) {
            Type::Pointer { space, store, access } => Some((*space, *store, *access)),
            _ => None,
        }
    }

    /// The store type of a pointer, or the type itself
    pub fn unwrap_ptr(&self, id: TypeId) -> TypeId {
        self.pointer(id).map_or(id, |(_, store, _)| store)
    }

    pub fn struct_members(&self, id: TypeId) -> Option<&[StructMember]> {
        match self.ty(id) {
            Type::Struct { members, .. } => Some(members),
            _ => None,
        }
    }

    /// The type of the element at `index` of a composite
    pub fn element_at(&self, id: TypeId, index: u32) -> Option<TypeId> {
        match self.ty(id) {
            Type::Vector { elem, width } => (index < *width).then_some(*elem),
            Type::Matrix { column, columns } => (index < *columns).then_some(*column),
            Type::Array { elem, count: ArrayCount::Fixed(n), .. } => (index < *n).then_some(*elem),
            Type::Array { elem, count: ArrayCount::Runtime, .. } => Some(*elem),
            Type::Struct { members, .. } => members.get(index as usize).map(|m| m.ty),
            _ => None,
        }
    }

    /// The element type when indexing with a non-constant index
    pub fn dynamic_element(&self, id: TypeId) -> Option<TypeId> {
        match self.ty(id) {
            Type::Vector { elem, .. } => Some(*elem),
            Type::Matrix { column, .. } => Some(*column),
            Type::Array { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    /// Number of elements of a composite with a fixed shape
    pub fn element_count(&self, id: TypeId) -> Option<u32> {
        match self.ty(id) {
            Type::Vector { width, .. } => Some(*width),
            Type::Matrix { columns, .. } => Some(*columns),
            Type::Array { count: ArrayCount::Fixed(n), .. } => Some(*n),
            Type::Struct { members, .. } => Some(members.len() as u32),
            _ => None,
        }
    }

    /// Whether a value of this type can be built by a construct instruction
    pub fn is_constructible(&self, id: TypeId) -> bool {
        match self.ty(id) {
            Type::Bool | Type::I32 | Type::U32 | Type::F32 | Type::F16 => true,
            Type::Vector { .. } | Type::Matrix { .. } => true,
            Type::Array { elem, count: ArrayCount::Fixed(_), .. } => self.is_constructible(*elem),
            Type::Struct { members, .. } => members.iter().all(|m| self.is_constructible(m.ty)),
            _ => false,
        }
    }

    /// Whether the type holds a pointer anywhere inside
    pub fn contains_pointer(&self, id: TypeId) -> bool {
        match self.ty(id) {
            Type::Pointer { .. } => true,
            Type::Array { elem, .. } => self.contains_pointer(*elem),
            Type::Struct { members, .. } => members.iter().any(|m| self.contains_pointer(m.ty)),
            _ => false,
        }
    }

    // ===== Layout =====

    pub fn size(&self, id: TypeId) -> u32 {
        match self.ty(id) {
            Type::Bool | Type::I32 | Type::U32 | Type::F32 => 4,
            Type::F16 => 2,
            Type::Vector { elem, width } => self.size(*elem) * width,
            Type::Matrix { column, columns } => self.size(*column).div_ceil(self.align(*column)) * self.align(*column) * columns,
            Type::Array { count: ArrayCount::Fixed(n), stride, .. } => stride * n,
            Type::Array { count: ArrayCount::Runtime, stride, .. } => *stride,
            Type::Struct { size, .. } => *size,
            Type::Atomic { .. } => 4,
            _ => 0,
        }
    }

    pub fn align(&self, id: TypeId) -> u32 {
        match self.ty(id) {
            Type::Bool | Type::I32 | Type::U32 | Type::F32 => 4,
            Type::F16 => 2,
            Type::Vector { elem, width } => self.align(*elem) * if *width == 2 { 2 } else { 4 },
            Type::Matrix { column, .. } => self.align(*column),
            Type::Array { elem, .. } => self.align(*elem),
            Type::Struct { align, .. } => *align,
            Type::Atomic { .. } => 4,
            _ => 1,
        }
    }

    // ===== Names =====

    /// The textual name of a type, e.g. `ptr<function, vec3<f32>, read_write>`
    pub fn name(&self, id: TypeId) -> String {
        match self.ty(id) {
            Type::Void => "void".to_string(),
            Type::Bool => "bool".to_string(),
            Type::I32 => "i32".to_string(),
            Type::U32 => "u32".to_string(),
            Type::F32 => "f32".to_string(),
            Type::F16 => "f16".to_string(),
            Type::Vector { elem, width } => format!("vec{}<{}>", width, self.name(*elem)),
            Type::Matrix { column, columns } => {
                let rows = self.width(*column).unwrap_or(0);
                format!("mat{}x{}<{}>", columns, rows, self.name(self.deepest_element(*column)))
            }
            Type::Array { elem, count: ArrayCount::Fixed(n), .. } => {
                format!("array<{}, {}>", self.name(*elem), n)
            }
            Type::Array { elem, count: ArrayCount::Runtime, .. } => format!("array<{}>", self.name(*elem)),
            Type::Struct { name, .. } => name.clone(),
            Type::Pointer { space, store, access } => {
                format!("ptr<{}, {}, {}>", space, self.name(*store), access)
            }
            Type::Atomic { elem } => format!("atomic<{}>", self.name(*elem)),
            Type::SampledTexture { dim, sampled } => format!("texture_{}<{}>", dim, self.name(*sampled)),
            Type::MultisampledTexture { dim, sampled } => {
                format!("texture_multisampled_{}<{}>", dim, self.name(*sampled))
            }
            Type::DepthTexture { dim } => format!("texture_depth_{}", dim),
            Type::DepthMultisampledTexture { dim } => format!("texture_depth_multisampled_{}", dim),
            Type::StorageTexture { dim, format, access } => {
                format!("texture_storage_{}<{}, {}>", dim, format, access)
            }
            Type::ExternalTexture => "texture_external".to_string(),
            Type::Sampler { comparison: false } => "sampler".to_string(),
            Type::Sampler { comparison: true } => "sampler_comparison".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_preinterned() {
        let types = TypeManager::new();
        assert_eq!(types.ty(TypeId::I32), &Type::I32);
        assert_eq!(types.ty(TypeId::F16), &Type::F16);
        assert_eq!(types.name(TypeId::VOID), "void");
    }

    #[test]
    fn test_interning_gives_identity() {
        let mut types = TypeManager::new();
        let a = types.vec3(TypeId::F32);
        let b = types.vec3(TypeId::F32);
        let c = types.vec3(TypeId::I32);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let p1 = types.ptr(AddressSpace::Function, a, Access::ReadWrite);
        let p2 = types.ptr(AddressSpace::Function, b, Access::ReadWrite);
        assert_eq!(p1, p2);
        assert_eq!(types.name(p1), "ptr<function, vec3<f32>, read_write>");
    }

    #[test]
    fn test_struct_layout() {
        let mut types = TypeManager::new();
        let vec3f = types.vec3(TypeId::F32);
        let s = types.structure(
            "S",
            vec![
                ("a".to_string(), TypeId::F32, IoAttributes::default()),
                ("b".to_string(), vec3f, IoAttributes::default()),
                ("c".to_string(), TypeId::F32, IoAttributes::default()),
            ],
        );
        let members = types.struct_members(s).unwrap();
        assert_eq!(members.iter().map(|m| m.offset).collect::<Vec<_>>(), vec![0, 16, 28]);
        assert_eq!(types.size(s), 32);
        assert_eq!(types.align(s), 16);
    }

    #[test]
    fn test_matrix_and_array_layout() {
        let mut types = TypeManager::new();
        let m = types.mat(TypeId::F32, 3, 3);
        assert_eq!(types.name(m), "mat3x3<f32>");
        assert_eq!(types.size(m), 48);

        let arr = types.array(TypeId::F32, 4);
        assert_eq!(types.size(arr), 16);
        let vec3f = types.vec3(TypeId::F32);
        let arr3 = types.array(vec3f, 2);
        assert_eq!(types.size(arr3), 32);
    }

    #[test]
    fn test_oversized_layouts_are_refused() {
        let mut types = TypeManager::new();
        let vec4f = types.vec4(TypeId::F32);
        assert_eq!(types.try_array(vec4f, u32::MAX), None);

        let big = types.try_array(vec4f, u32::MAX / 16).unwrap();
        assert_eq!(types.try_array(big, 2), None);
        let pair = vec![
            ("a".to_string(), big, IoAttributes::default()),
            ("b".to_string(), big, IoAttributes::default()),
        ];
        assert_eq!(types.try_structure("Pair", pair), None);
    }

    #[test]
    fn test_element_access() {
        let mut types = TypeManager::new();
        let v = types.vec4(TypeId::U32);
        assert_eq!(types.element_at(v, 3), Some(TypeId::U32));
        assert_eq!(types.element_at(v, 4), None);
        assert_eq!(types.element_count(v), Some(4));
        assert!(types.is_constructible(v));

        let rta = types.runtime_array(TypeId::I32);
        assert_eq!(types.name(rta), "array<i32>");
        assert!(!types.is_constructible(rta));
    }

    #[test]
    #[should_panic(expected = "vector width must be 2, 3 or 4")]
    fn test_bad_vector_width_panics() {
        let mut types = TypeManager::new();
        types.vec(TypeId::F32, 5);
    }
}
