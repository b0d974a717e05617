//! Serializable records mirroring the module graph
//!
//! Types and constants are referenced by their interning index. The six
//! primitive types every type manager starts with are implied and not
//! recorded, so type record `i` describes type index `i + 6`. Non-constant
//! values are numbered by the encoder as they are defined; a definition
//! carries its number so the decoder can reject references to values that
//! were never defined. Exit-like instructions name their target by the
//! pre-order position of that control instruction in the module.

use crate::attributes::{BindingPoint, IoAttributes, PipelineStage};
use crate::constant::Scalar;
use crate::ops::{BinaryOp, BuiltinFn, UnaryOp};
use crate::types::{Access, AddressSpace, TexelFormat, TextureDimension};
use serde::{Deserialize, Serialize};

/// Number of types every type manager is created with
pub const PRIMITIVE_TYPES: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub types: Vec<TypeRecord>,
    pub constants: Vec<ConstRecord>,
    pub root: BlockRecord,
    pub functions: Vec<FunctionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub name: String,
    pub ty: u32,
    pub attributes: IoAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeRecord {
    Vector { elem: u32, width: u32 },
    Matrix { column: u32, columns: u32 },
    /// `count` is `None` for runtime-sized arrays
    Array { elem: u32, count: Option<u32> },
    Struct { name: String, members: Vec<MemberRecord> },
    Pointer { space: AddressSpace, store: u32, access: Access },
    Atomic { elem: u32 },
    SampledTexture { dim: TextureDimension, sampled: u32 },
    MultisampledTexture { dim: TextureDimension, sampled: u32 },
    DepthTexture { dim: TextureDimension },
    DepthMultisampledTexture { dim: TextureDimension },
    StorageTexture { dim: TextureDimension, format: TexelFormat, access: Access },
    ExternalTexture,
    Sampler { comparison: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstRecord {
    Scalar(Scalar),
    Composite { ty: u32, elements: Vec<u32> },
    Splat { ty: u32, element: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueRef {
    Constant(u32),
    Local(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDef {
    pub id: u32,
    pub ty: u32,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRecord {
    pub def: ValueDef,
    pub attributes: IoAttributes,
    pub binding: Option<BindingPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub name: String,
    pub return_type: u32,
    pub stage: Option<PipelineStage>,
    pub workgroup_size: Option<[ValueRef; 3]>,
    pub return_attributes: IoAttributes,
    pub params: Vec<ParamRecord>,
    pub body: BlockRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub multi_in: bool,
    pub params: Vec<ValueDef>,
    pub insts: Vec<InstRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Constant indices; `None` is the default selector
    pub selectors: Vec<Option<u32>>,
    pub block: BlockRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstRecord {
    pub kind: KindRecord,
    pub operands: Vec<ValueRef>,
    pub results: Vec<ValueDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KindRecord {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Bitcast,
    Convert,
    Construct,
    Access,
    Swizzle { indices: Vec<u32> },
    Load,
    LoadVectorElement,
    Store,
    StoreVectorElement,
    Var { binding: Option<BindingPoint>, attributes: IoAttributes },
    Let,
    Override { id: Option<u16> },
    /// Index into the module's function list
    UserCall { target: u32 },
    BuiltinCall(BuiltinFn),
    Discard,
    TerminateInvocation,
    Return,
    Unreachable,
    If { true_block: BlockRecord, false_block: BlockRecord },
    Loop { initializer: Option<BlockRecord>, body: BlockRecord, continuing: BlockRecord },
    Switch { cases: Vec<CaseRecord> },
    ExitIf { target: u32 },
    ExitLoop { target: u32 },
    ExitSwitch { target: u32 },
    Continue { target: u32 },
    NextIteration { target: u32 },
    BreakIf { target: u32, next_iter_count: u32 },
}
