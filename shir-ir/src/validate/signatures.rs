//! Builtin function signature table and overload matching
//!
//! Each builtin has one or more overloads written over a scalar type variable
//! `T` (restricted to a family such as "float") and a vector width `N`.
//! Matching binds `T` and `N` from the first argument that fixes them; later
//! arguments must agree.

use crate::ops::BuiltinFn;
use crate::types::{AddressSpace, Access, ArrayCount, TextureDimension, Type, TypeId, TypeManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Float,
    Integer,
    Numeric,
    Any,
}

impl Family {
    fn accepts(self, ty: TypeId) -> bool {
        match self {
            Family::Float => matches!(ty, TypeId::F32 | TypeId::F16),
            Family::Integer => matches!(ty, TypeId::I32 | TypeId::U32),
            Family::Numeric => matches!(ty, TypeId::F32 | TypeId::F16 | TypeId::I32 | TypeId::U32),
            Family::Any => matches!(
                ty,
                TypeId::F32 | TypeId::F16 | TypeId::I32 | TypeId::U32 | TypeId::BOOL
            ),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Family::Float => "f32 or f16",
            Family::Integer => "i32 or u32",
            Family::Numeric => "f32, f16, i32 or u32",
            Family::Any => "any scalar",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Param {
    T,
    VecN,
    Vec3,
    Bool,
    VecNBool,
    AtomicPtr,
    RuntimeArrayPtr,
    Texture2d,
    Sampler,
    Vec2F32,
    Vec2Int,
    Int,
}

impl Param {
    fn describe(self) -> &'static str {
        match self {
            Param::T => "T",
            Param::VecN => "vecN<T>",
            Param::Vec3 => "vec3<T>",
            Param::Bool => "bool",
            Param::VecNBool => "vecN<bool>",
            Param::AtomicPtr => "ptr<S, atomic<T>, read_write>",
            Param::RuntimeArrayPtr => "ptr<storage, array<E>, A>",
            Param::Texture2d => "texture_2d<T>",
            Param::Sampler => "sampler",
            Param::Vec2F32 => "vec2<f32>",
            Param::Vec2Int => "vec2<i32 or u32>",
            Param::Int => "i32 or u32",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Ret {
    Void,
    T,
    VecN,
    Vec3,
    Vec4,
    Bool,
    U32,
}

impl Ret {
    fn describe(self) -> &'static str {
        match self {
            Ret::Void => "void",
            Ret::T => "T",
            Ret::VecN => "vecN<T>",
            Ret::Vec3 => "vec3<T>",
            Ret::Vec4 => "vec4<T>",
            Ret::Bool => "bool",
            Ret::U32 => "u32",
        }
    }
}

#[derive(Debug)]
struct Overload {
    params: &'static [Param],
    ret: Ret,
}

const fn ov(params: &'static [Param], ret: Ret) -> Overload {
    Overload { params, ret }
}

const UNARY: &[Overload] = &[ov(&[Param::T], Ret::T), ov(&[Param::VecN], Ret::VecN)];
const BINARY: &[Overload] = &[
    ov(&[Param::T, Param::T], Ret::T),
    ov(&[Param::VecN, Param::VecN], Ret::VecN),
];
const TERNARY: &[Overload] = &[
    ov(&[Param::T, Param::T, Param::T], Ret::T),
    ov(&[Param::VecN, Param::VecN, Param::VecN], Ret::VecN),
];
const MIX: &[Overload] = &[
    ov(&[Param::T, Param::T, Param::T], Ret::T),
    ov(&[Param::VecN, Param::VecN, Param::VecN], Ret::VecN),
    ov(&[Param::VecN, Param::VecN, Param::T], Ret::VecN),
];
const DOT: &[Overload] = &[ov(&[Param::VecN, Param::VecN], Ret::T)];
const CROSS: &[Overload] = &[ov(&[Param::Vec3, Param::Vec3], Ret::Vec3)];
const LENGTH: &[Overload] = &[ov(&[Param::T], Ret::T), ov(&[Param::VecN], Ret::T)];
const NORMALIZE: &[Overload] = &[ov(&[Param::VecN], Ret::VecN)];
const DISTANCE: &[Overload] = &[
    ov(&[Param::T, Param::T], Ret::T),
    ov(&[Param::VecN, Param::VecN], Ret::T),
];
const SELECT: &[Overload] = &[
    ov(&[Param::T, Param::T, Param::Bool], Ret::T),
    ov(&[Param::VecN, Param::VecN, Param::Bool], Ret::VecN),
    ov(&[Param::VecN, Param::VecN, Param::VecNBool], Ret::VecN),
];
const ALL_ANY: &[Overload] = &[ov(&[Param::Bool], Ret::Bool), ov(&[Param::VecNBool], Ret::Bool)];
const TEXTURE_SAMPLE: &[Overload] = &[ov(&[Param::Texture2d, Param::Sampler, Param::Vec2F32], Ret::Vec4)];
const TEXTURE_LOAD: &[Overload] = &[ov(&[Param::Texture2d, Param::Vec2Int, Param::Int], Ret::Vec4)];
const ATOMIC_RMW: &[Overload] = &[ov(&[Param::AtomicPtr, Param::T], Ret::T)];
const ATOMIC_LOAD: &[Overload] = &[ov(&[Param::AtomicPtr], Ret::T)];
const ATOMIC_STORE: &[Overload] = &[ov(&[Param::AtomicPtr, Param::T], Ret::Void)];
const ARRAY_LENGTH: &[Overload] = &[ov(&[Param::RuntimeArrayPtr], Ret::U32)];
const BARRIER: &[Overload] = &[ov(&[], Ret::Void)];

fn signature(builtin: BuiltinFn) -> (Family, &'static [Overload]) {
    match builtin {
        BuiltinFn::Abs => (Family::Numeric, UNARY),
        BuiltinFn::Min | BuiltinFn::Max => (Family::Numeric, BINARY),
        BuiltinFn::Clamp => (Family::Numeric, TERNARY),
        BuiltinFn::Dot => (Family::Numeric, DOT),
        BuiltinFn::Cross => (Family::Float, CROSS),
        BuiltinFn::Length => (Family::Float, LENGTH),
        BuiltinFn::Normalize => (Family::Float, NORMALIZE),
        BuiltinFn::Sqrt | BuiltinFn::Sin | BuiltinFn::Cos | BuiltinFn::Floor | BuiltinFn::Ceil => {
            (Family::Float, UNARY)
        }
        BuiltinFn::Mix => (Family::Float, MIX),
        BuiltinFn::Select => (Family::Any, SELECT),
        BuiltinFn::All | BuiltinFn::Any => (Family::Any, ALL_ANY),
        BuiltinFn::Distance => (Family::Float, DISTANCE),
        BuiltinFn::Pow => (Family::Float, BINARY),
        BuiltinFn::TextureSample => (Family::Float, TEXTURE_SAMPLE),
        BuiltinFn::TextureLoad => (Family::Numeric, TEXTURE_LOAD),
        BuiltinFn::AtomicAdd => (Family::Integer, ATOMIC_RMW),
        BuiltinFn::AtomicLoad => (Family::Integer, ATOMIC_LOAD),
        BuiltinFn::AtomicStore => (Family::Integer, ATOMIC_STORE),
        BuiltinFn::ArrayLength => (Family::Any, ARRAY_LENGTH),
        BuiltinFn::WorkgroupBarrier | BuiltinFn::StorageBarrier => (Family::Any, BARRIER),
    }
}

#[derive(Debug, Default)]
struct Bindings {
    t: Option<TypeId>,
    n: Option<u32>,
}

impl Bindings {
    fn bind_t(&mut self, family: Family, ty: TypeId) -> bool {
        if !family.accepts(ty) {
            return false;
        }
        match self.t {
            Some(t) => t == ty,
            None => {
                self.t = Some(ty);
                true
            }
        }
    }

    fn bind_n(&mut self, width: u32) -> bool {
        match self.n {
            Some(n) => n == width,
            None => {
                self.n = Some(width);
                true
            }
        }
    }
}

fn match_param(types: &TypeManager, family: Family, param: Param, ty: TypeId, b: &mut Bindings) -> bool {
    match (param, types.ty(ty)) {
        (Param::T, _) => b.bind_t(family, ty),
        (Param::VecN, Type::Vector { elem, width }) => b.bind_n(*width) && b.bind_t(family, *elem),
        (Param::Vec3, Type::Vector { elem, width: 3 }) => b.bind_t(family, *elem),
        (Param::Bool, Type::Bool) => true,
        (Param::VecNBool, Type::Vector { elem: TypeId::BOOL, width }) => b.bind_n(*width),
        (Param::AtomicPtr, Type::Pointer { space, store, access: Access::ReadWrite }) => {
            matches!(space, AddressSpace::Workgroup | AddressSpace::Storage)
                && match types.ty(*store) {
                    Type::Atomic { elem } => b.bind_t(family, *elem),
                    _ => false,
                }
        }
        (Param::RuntimeArrayPtr, Type::Pointer { space: AddressSpace::Storage, store, .. }) => matches!(
            types.ty(*store),
            Type::Array { count: ArrayCount::Runtime, .. }
        ),
        (Param::Texture2d, Type::SampledTexture { dim: TextureDimension::D2, sampled }) => {
            b.bind_t(family, *sampled)
        }
        (Param::Sampler, Type::Sampler { comparison: false }) => true,
        (Param::Vec2F32, Type::Vector { elem: TypeId::F32, width: 2 }) => true,
        (Param::Vec2Int, Type::Vector { elem: TypeId::I32 | TypeId::U32, width: 2 }) => true,
        (Param::Int, Type::I32 | Type::U32) => true,
        _ => false,
    }
}

fn ret_matches(types: &TypeManager, ret: Ret, result: Option<TypeId>, b: &Bindings) -> bool {
    let Some(result) = result else {
        return matches!(ret, Ret::Void);
    };
    let ty = types.ty(result);
    match ret {
        Ret::Void => false,
        Ret::T => b.t == Some(result),
        Ret::VecN => matches!(ty, Type::Vector { elem, width } if Some(*elem) == b.t && Some(*width) == b.n),
        Ret::Vec3 => matches!(ty, Type::Vector { elem, width: 3 } if Some(*elem) == b.t),
        Ret::Vec4 => matches!(ty, Type::Vector { elem, width: 4 } if Some(*elem) == b.t),
        Ret::Bool => result == TypeId::BOOL,
        Ret::U32 => result == TypeId::U32,
    }
}

fn candidate(builtin: BuiltinFn, overload: &Overload) -> String {
    let params: Vec<&str> = overload.params.iter().map(|p| p.describe()).collect();
    format!("{}({}) -> {}", builtin.name(), params.join(", "), overload.ret.describe())
}

/// Why a builtin call does not type check
#[derive(Debug, Clone, PartialEq)]
pub struct CallMismatch {
    pub message: String,
    pub notes: Vec<String>,
}

/// Checks a builtin call with argument types `args` and result type `result`
/// (`None` for a call without a result) against the builtin's overloads
pub fn check_builtin_call(
    types: &TypeManager,
    builtin: BuiltinFn,
    args: &[TypeId],
    result: Option<TypeId>,
) -> Result<(), CallMismatch> {
    let (family, overloads) = signature(builtin);
    let mut notes = Vec::new();
    for overload in overloads {
        let mut bindings = Bindings::default();
        let failing = if overload.params.len() != args.len() {
            Some(format!(
                "expects {} argument{}, got {}",
                overload.params.len(),
                if overload.params.len() == 1 { "" } else { "s" },
                args.len()
            ))
        } else {
            overload
                .params
                .iter()
                .zip(args)
                .position(|(param, arg)| !match_param(types, family, *param, *arg, &mut bindings))
                .map(|i| format!("parameter {} ({}) does not match {}", i + 1, types.name(args[i]), overload.params[i].describe()))
        };
        match failing {
            None if ret_matches(types, overload.ret, result, &bindings) => return Ok(()),
            None => {
                let got = result.map_or("void".to_string(), |r| types.name(r));
                return Err(CallMismatch {
                    message: format!(
                        "result type {} does not match '{}'",
                        got,
                        candidate(builtin, overload)
                    ),
                    notes: vec![format!("T is {}", bindings.t.map_or("unbound".to_string(), |t| types.name(t)))],
                });
            }
            Some(reason) => notes.push(format!(
                "candidate '{}' where T is {}: {}",
                candidate(builtin, overload),
                family.describe(),
                reason
            )),
        }
    }
    let arg_names: Vec<String> = args.iter().map(|a| types.name(*a)).collect();
    Err(CallMismatch {
        message: format!("no matching call to '{}({})'", builtin.name(), arg_names.join(", ")),
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_and_vector_overloads() {
        let mut types = TypeManager::new();
        let v3 = types.vec3(TypeId::F32);
        assert!(check_builtin_call(&types, BuiltinFn::Abs, &[TypeId::I32], Some(TypeId::I32)).is_ok());
        assert!(check_builtin_call(&types, BuiltinFn::Abs, &[v3], Some(v3)).is_ok());
        assert!(check_builtin_call(&types, BuiltinFn::Dot, &[v3, v3], Some(TypeId::F32)).is_ok());
        assert!(check_builtin_call(&types, BuiltinFn::Mix, &[v3, v3, TypeId::F32], Some(v3)).is_ok());
    }

    #[test]
    fn test_mismatch_lists_candidates() {
        let types = TypeManager::new();
        let err = check_builtin_call(&types, BuiltinFn::Abs, &[TypeId::BOOL], Some(TypeId::BOOL)).unwrap_err();
        assert_eq!(err.message, "no matching call to 'abs(bool)'");
        assert_eq!(
            err.notes,
            vec![
                "candidate 'abs(T) -> T' where T is f32, f16, i32 or u32: parameter 1 (bool) does not match T"
                    .to_string(),
                "candidate 'abs(vecN<T>) -> vecN<T>' where T is f32, f16, i32 or u32: parameter 1 (bool) does not match vecN<T>"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_type_variable_must_agree() {
        let types = TypeManager::new();
        let err = check_builtin_call(&types, BuiltinFn::Min, &[TypeId::I32, TypeId::U32], Some(TypeId::I32));
        assert!(err.is_err());
    }

    #[test]
    fn test_wrong_result_type() {
        let types = TypeManager::new();
        let err = check_builtin_call(&types, BuiltinFn::Sqrt, &[TypeId::F32], Some(TypeId::I32)).unwrap_err();
        assert_eq!(err.message, "result type i32 does not match 'sqrt(T) -> T'");
    }

    #[test]
    fn test_atomics_and_barriers() {
        let mut types = TypeManager::new();
        let atomic = types.atomic(TypeId::U32);
        let ptr = types.ptr(AddressSpace::Workgroup, atomic, Access::ReadWrite);
        assert!(check_builtin_call(&types, BuiltinFn::AtomicAdd, &[ptr, TypeId::U32], Some(TypeId::U32)).is_ok());
        assert!(check_builtin_call(&types, BuiltinFn::AtomicStore, &[ptr, TypeId::U32], None).is_ok());
        assert!(check_builtin_call(&types, BuiltinFn::WorkgroupBarrier, &[], None).is_ok());
        assert!(check_builtin_call(&types, BuiltinFn::WorkgroupBarrier, &[], Some(TypeId::U32)).is_err());
    }
}
