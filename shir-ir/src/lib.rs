//! Shader IR - Module Graph
//!
//! This crate holds the intermediate representation a shader compiler works
//! on between its front end and its backends: a module of typed values,
//! instructions with use-lists, structured control flow blocks and
//! functions, together with the tooling around it. That is a builder, a
//! clone engine, a textual disassembler, a validator, a binary codec and a
//! few read-only analyses.
//!
//! Every node is owned by its [`Module`] and addressed through a handle.

pub mod arena;
pub mod attributes;
pub mod ops;
pub mod types;
pub mod constant;
pub mod value;
pub mod instruction;
pub mod block;
pub mod function;
pub mod module;
pub mod builder;
pub mod clone;
pub mod disasm;
pub mod validate;
pub mod codec;
pub mod analysis;
#[cfg(test)]
mod tests;

pub use attributes::{BindingPoint, BuiltinValue, Interpolation, IoAttributes, PipelineStage};
pub use block::{Block, BlockData};
pub use builder::{Builder, Cursor};
pub use clone::CloneContext;
pub use constant::{ConstId, ConstValue, Scalar};
pub use disasm::{disassemble, disassemble_with_map, Disassembly};
pub use function::{Function, FunctionData};
pub use instruction::{Case, Inst, InstData, InstKind};
pub use module::Module;
pub use ops::{BinaryOp, BuiltinFn, UnaryOp};
pub use types::{Access, AddressSpace, Type, TypeId, TypeManager};
pub use validate::{validate, validate_with, Capabilities};
pub use value::{Usage, Value, ValueData, ValueKind};
