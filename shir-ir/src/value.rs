//! Values and their use-lists

use crate::arena::Handle;
use crate::attributes::{BindingPoint, IoAttributes};
use crate::block::Block;
use crate::constant::ConstId;
use crate::function::Function;
use crate::instruction::Inst;
use crate::types::TypeId;

pub type Value = Handle<ValueData>;

/// One use of a value: operand `operand` of instruction `inst`
///
/// Ordering is by instruction creation order, then operand index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Usage {
    pub inst: Inst,
    pub operand: u32,
}

impl Usage {
    pub fn new(inst: Inst, operand: usize) -> Self {
        Self {
            inst,
            operand: operand as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Constant(ConstId),
    /// `inst` is `None` once the result has been detached
    InstructionResult { inst: Option<Inst> },
    FunctionParam {
        func: Option<Function>,
        index: u32,
        attributes: IoAttributes,
        binding: Option<BindingPoint>,
    },
    BlockParam { block: Option<Block> },
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub kind: ValueKind,
    pub ty: TypeId,
    usages: Vec<Usage>,
}

impl ValueData {
    pub(crate) fn new(kind: ValueKind, ty: TypeId) -> Self {
        Self {
            kind,
            ty,
            usages: Vec::new(),
        }
    }

    /// Records a use. Adding the same usage twice is a no-op.
    pub(crate) fn add_usage(&mut self, usage: Usage) {
        if !self.usages.contains(&usage) {
            self.usages.push(usage);
        }
    }

    pub(crate) fn remove_usage(&mut self, usage: Usage) {
        self.usages.retain(|u| *u != usage);
    }

    pub(crate) fn take_usages(&mut self) -> Vec<Usage> {
        std::mem::take(&mut self.usages)
    }

    /// Usages in the order they were added
    pub fn usages_unsorted(&self) -> &[Usage] {
        &self.usages
    }

    /// Usages ordered by instruction creation order, then operand index
    pub fn usages_sorted(&self) -> Vec<Usage> {
        let mut usages = self.usages.clone();
        usages.sort();
        usages
    }

    pub fn is_used(&self) -> bool {
        !self.usages.is_empty()
    }

    pub fn constant(&self) -> Option<ConstId> {
        match self.kind {
            ValueKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// The instruction producing this value, if it is an attached result
    pub fn instruction(&self) -> Option<Inst> {
        match self.kind {
            ValueKind::InstructionResult { inst } => inst,
            _ => None,
        }
    }
}
