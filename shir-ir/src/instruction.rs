//! Instruction kinds
//!
//! Operand layouts per kind:
//!
//! | kind                     | operands                                   |
//! |--------------------------|--------------------------------------------|
//! | unary, bitcast, convert, let, load | `[value]`                        |
//! | binary                   | `[lhs, rhs]`                               |
//! | construct, user/builtin call | arguments                              |
//! | access                   | `[object, indices...]`                     |
//! | swizzle                  | `[vector]`                                 |
//! | load_vector_element      | `[pointer, index]`                         |
//! | store                    | `[pointer, value]`                         |
//! | store_vector_element     | `[pointer, index, value]`                  |
//! | var, override            | `[]` or `[initializer]`                    |
//! | return                   | `[]` or `[value]`                          |
//! | if, switch               | `[condition]`                              |
//! | exit_*, continue, next_iteration | arguments                          |
//! | break_if                 | `[condition, next-iteration args..., exit args...]` |

use crate::arena::Handle;
use crate::attributes::{BindingPoint, IoAttributes};
use crate::block::Block;
use crate::constant::ConstId;
use crate::function::Function;
use crate::ops::{BinaryOp, BuiltinFn, UnaryOp};
use crate::value::Value;

pub type Inst = Handle<InstData>;

/// A switch case. A `None` selector is the default selector.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub selectors: Vec<Option<ConstId>>,
    pub block: Block,
}

impl Case {
    pub fn is_default(&self) -> bool {
        self.selectors.iter().any(Option::is_none)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
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
    UserCall { target: Function },
    BuiltinCall(BuiltinFn),
    Discard,
    TerminateInvocation,
    Return { func: Function },
    Unreachable,
    If { true_block: Block, false_block: Block },
    Loop { initializer: Option<Block>, body: Block, continuing: Block },
    Switch { cases: Vec<Case> },
    ExitIf { target: Inst },
    ExitLoop { target: Inst },
    ExitSwitch { target: Inst },
    Continue { target: Inst },
    NextIteration { target: Inst },
    /// `next_iter_count` operands after the condition go to the loop body,
    /// the rest become the loop results
    BreakIf { target: Inst, next_iter_count: u32 },
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Return { .. }
                | InstKind::Unreachable
                | InstKind::ExitIf { .. }
                | InstKind::ExitLoop { .. }
                | InstKind::ExitSwitch { .. }
                | InstKind::Continue { .. }
                | InstKind::NextIteration { .. }
                | InstKind::BreakIf { .. }
        )
    }

    /// If, loop or switch
    pub fn is_control(&self) -> bool {
        matches!(self, InstKind::If { .. } | InstKind::Loop { .. } | InstKind::Switch { .. })
    }

    /// The control instruction an exit, continue, next_iteration or break_if jumps relative to
    pub fn exit_target(&self) -> Option<Inst> {
        match self {
            InstKind::ExitIf { target }
            | InstKind::ExitLoop { target }
            | InstKind::ExitSwitch { target }
            | InstKind::Continue { target }
            | InstKind::NextIteration { target }
            | InstKind::BreakIf { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub(crate) fn exit_target_mut(&mut self) -> Option<&mut Inst> {
        match self {
            InstKind::ExitIf { target }
            | InstKind::ExitLoop { target }
            | InstKind::ExitSwitch { target }
            | InstKind::Continue { target }
            | InstKind::NextIteration { target }
            | InstKind::BreakIf { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Blocks owned by a control instruction, in textual order
    pub fn nested_blocks(&self) -> Vec<Block> {
        match self {
            InstKind::If { true_block, false_block } => vec![*true_block, *false_block],
            InstKind::Loop { initializer, body, continuing } => {
                let mut blocks: Vec<Block> = initializer.iter().copied().collect();
                blocks.push(*body);
                blocks.push(*continuing);
                blocks
            }
            InstKind::Switch { cases } => cases.iter().map(|c| c.block).collect(),
            _ => Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstKind::Unary(_) => "unary",
            InstKind::Binary(_) => "binary",
            InstKind::Bitcast => "bitcast",
            InstKind::Convert => "convert",
            InstKind::Construct => "construct",
            InstKind::Access => "access",
            InstKind::Swizzle { .. } => "swizzle",
            InstKind::Load => "load",
            InstKind::LoadVectorElement => "load_vector_element",
            InstKind::Store => "store",
            InstKind::StoreVectorElement => "store_vector_element",
            InstKind::Var { .. } => "var",
            InstKind::Let => "let",
            InstKind::Override { .. } => "override",
            InstKind::UserCall { .. } => "call",
            InstKind::BuiltinCall(_) => "builtin_call",
            InstKind::Discard => "discard",
            InstKind::TerminateInvocation => "terminate_invocation",
            InstKind::Return { .. } => "return",
            InstKind::Unreachable => "unreachable",
            InstKind::If { .. } => "if",
            InstKind::Loop { .. } => "loop",
            InstKind::Switch { .. } => "switch",
            InstKind::ExitIf { .. } => "exit_if",
            InstKind::ExitLoop { .. } => "exit_loop",
            InstKind::ExitSwitch { .. } => "exit_switch",
            InstKind::Continue { .. } => "continue",
            InstKind::NextIteration { .. } => "next_iteration",
            InstKind::BreakIf { .. } => "break_if",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstData {
    pub kind: InstKind,
    pub(crate) operands: Vec<Value>,
    pub(crate) results: Vec<Value>,
    pub(crate) block: Option<Block>,
    pub(crate) prev: Option<Inst>,
    pub(crate) next: Option<Inst>,
}

impl InstData {
    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    pub fn results(&self) -> &[Value] {
        &self.results
    }

    /// The owning block, `None` while detached
    pub fn block(&self) -> Option<Block> {
        self.block
    }

    pub fn prev(&self) -> Option<Inst> {
        self.prev
    }

    pub fn next(&self) -> Option<Inst> {
        self.next
    }
}
