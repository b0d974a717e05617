//! Unary, binary and builtin-function operators

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add, Subtract, Multiply, Divide, Modulo,

    // Bitwise (also logical on bool)
    And, Or, Xor,
    ShiftLeft, ShiftRight,

    // Comparison
    Equal, NotEqual,
    LessThan, GreaterThan,
    LessThanEqual, GreaterThanEqual,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::GreaterThan
                | BinaryOp::LessThanEqual
                | BinaryOp::GreaterThanEqual
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::ShiftLeft | BinaryOp::ShiftRight)
    }

    /// The comparison with its operands swapped (`a < b` == `b > a`)
    pub fn swapped(self) -> BinaryOp {
        match self {
            BinaryOp::LessThan => BinaryOp::GreaterThan,
            BinaryOp::GreaterThan => BinaryOp::LessThan,
            BinaryOp::LessThanEqual => BinaryOp::GreaterThanEqual,
            BinaryOp::GreaterThanEqual => BinaryOp::LessThanEqual,
            other => other,
        }
    }

    /// The logical negation of a comparison (`!(a < b)` == `a >= b`)
    pub fn negated(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::LessThan => Some(BinaryOp::GreaterThanEqual),
            BinaryOp::GreaterThan => Some(BinaryOp::LessThanEqual),
            BinaryOp::LessThanEqual => Some(BinaryOp::GreaterThan),
            BinaryOp::GreaterThanEqual => Some(BinaryOp::LessThan),
            BinaryOp::Equal => Some(BinaryOp::NotEqual),
            BinaryOp::NotEqual => Some(BinaryOp::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "sub",
            BinaryOp::Multiply => "mul",
            BinaryOp::Divide => "div",
            BinaryOp::Modulo => "mod",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::ShiftLeft => "shl",
            BinaryOp::ShiftRight => "shr",
            BinaryOp::Equal => "eq",
            BinaryOp::NotEqual => "neq",
            BinaryOp::LessThan => "lt",
            BinaryOp::GreaterThan => "gt",
            BinaryOp::LessThanEqual => "lte",
            BinaryOp::GreaterThanEqual => "gte",
        };
        write!(f, "{}", op_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Complement, // Bitwise NOT
    Negation,   // Arithmetic negation
    Not,        // Logical NOT
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            UnaryOp::Complement => "complement",
            UnaryOp::Negation => "negation",
            UnaryOp::Not => "not",
        };
        write!(f, "{}", op_str)
    }
}

/// Builtin functions callable through a builtin call instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinFn {
    Abs,
    Min,
    Max,
    Clamp,
    Dot,
    Cross,
    Length,
    Normalize,
    Sqrt,
    Sin,
    Cos,
    Floor,
    Ceil,
    Mix,
    Select,
    All,
    Any,
    Distance,
    Pow,
    TextureSample,
    TextureLoad,
    AtomicAdd,
    AtomicLoad,
    AtomicStore,
    ArrayLength,
    WorkgroupBarrier,
    StorageBarrier,
}

impl BuiltinFn {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinFn::Abs => "abs",
            BuiltinFn::Min => "min",
            BuiltinFn::Max => "max",
            BuiltinFn::Clamp => "clamp",
            BuiltinFn::Dot => "dot",
            BuiltinFn::Cross => "cross",
            BuiltinFn::Length => "length",
            BuiltinFn::Normalize => "normalize",
            BuiltinFn::Sqrt => "sqrt",
            BuiltinFn::Sin => "sin",
            BuiltinFn::Cos => "cos",
            BuiltinFn::Floor => "floor",
            BuiltinFn::Ceil => "ceil",
            BuiltinFn::Mix => "mix",
            BuiltinFn::Select => "select",
            BuiltinFn::All => "all",
            BuiltinFn::Any => "any",
            BuiltinFn::Distance => "distance",
            BuiltinFn::Pow => "pow",
            BuiltinFn::TextureSample => "textureSample",
            BuiltinFn::TextureLoad => "textureLoad",
            BuiltinFn::AtomicAdd => "atomicAdd",
            BuiltinFn::AtomicLoad => "atomicLoad",
            BuiltinFn::AtomicStore => "atomicStore",
            BuiltinFn::ArrayLength => "arrayLength",
            BuiltinFn::WorkgroupBarrier => "workgroupBarrier",
            BuiltinFn::StorageBarrier => "storageBarrier",
        }
    }
}

impl fmt::Display for BuiltinFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
