//! Loop Finiteness Analysis
//!
//! Recognizes counted loops whose termination follows from their shape:
//! an integer index variable declared in the loop initializer, an exit check
//! comparing it against a bound at the top of the body, and a single `+ 1` or
//! `- 1` step stored at the top level of the continuing block.
//!
//! The analysis is conservative. A loop that is not recognized is reported as
//! not finite, which means "not proven" rather than "infinite". Index
//! variables declared outside the initializer are never considered.

use crate::block::Block;
use crate::constant::Scalar;
use crate::function::Function;
use crate::instruction::{Inst, InstKind};
use crate::module::Module;
use crate::ops::BinaryOp;
use crate::types::{AddressSpace, TypeId};
use crate::value::{Value, ValueKind};
use log::{debug, trace};
use std::collections::HashMap;

/// What the analysis found for one loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopInfo {
    /// The `var` of the proven index variable
    pub index_var: Option<Inst>,
}

impl LoopInfo {
    pub fn is_finite(&self) -> bool {
        self.index_var.is_some()
    }
}

/// Finiteness of every loop in one function
#[derive(Debug, Clone, Default)]
pub struct LoopAnalysis {
    loops: HashMap<Inst, LoopInfo>,
    order: Vec<Inst>,
}

impl LoopAnalysis {
    /// Analyzes every loop nested anywhere in `func`
    pub fn new(module: &Module, func: Function) -> Self {
        let mut analysis = Self::default();
        for inst in module.walk(module.function(func).block()) {
            if !matches!(module.inst(inst).kind, InstKind::Loop { .. }) {
                continue;
            }
            let info = LoopMatcher::new(module, inst).run();
            debug!(
                "loop {:?} in '{}': {}",
                inst,
                module.function(func).name,
                if info.is_finite() { "finite" } else { "not proven finite" }
            );
            analysis.loops.insert(inst, info);
            analysis.order.push(inst);
        }
        analysis
    }

    pub fn get(&self, loop_inst: Inst) -> Option<&LoopInfo> {
        self.loops.get(&loop_inst)
    }

    /// Loops in pre-order, each with its result
    pub fn iter(&self) -> impl Iterator<Item = (Inst, &LoopInfo)> + '_ {
        self.order.iter().map(|inst| (*inst, &self.loops[inst]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Increasing,
    Decreasing,
}

/// The comparison keeping the loop running, normalized to `index OP bound`
struct ExitCheck {
    var: Inst,
    op: BinaryOp,
    bound: Value,
}

struct LoopMatcher<'a> {
    module: &'a Module,
    loop_inst: Inst,
    initializer: Option<Block>,
    body: Block,
    continuing: Block,
}

impl<'a> LoopMatcher<'a> {
    fn new(module: &'a Module, loop_inst: Inst) -> Self {
        Self {
            module,
            loop_inst,
            initializer: module.loop_initializer(loop_inst),
            body: module.loop_body(loop_inst),
            continuing: module.loop_continuing(loop_inst),
        }
    }

    fn run(&self) -> LoopInfo {
        let Some(initializer) = self.initializer else {
            trace!("loop {:?} has no initializer", self.loop_inst);
            return LoopInfo::default();
        };
        let candidates = self.candidates(initializer);
        if candidates.is_empty() {
            return LoopInfo::default();
        }

        let checks = self.exit_checks(&candidates);
        if checks.is_empty() {
            trace!("loop {:?}: no recognizable exit check", self.loop_inst);
            return LoopInfo::default();
        }
        for check in &checks {
            let Some(direction) = self.step(check.var) else {
                trace!("loop {:?}: index variable {:?} has no unit step", self.loop_inst, check.var);
                continue;
            };
            if self.bound_is_safe(check, direction) {
                return LoopInfo {
                    index_var: Some(check.var),
                };
            }
            trace!("loop {:?}: exit check does not bound the step of {:?}", self.loop_inst, check.var);
        }
        LoopInfo::default()
    }

    // ===== Index variable candidates =====

    /// Integer `function` variables declared at the top of the initializer
    /// whose pointer is only loaded from or stored to
    fn candidates(&self, initializer: Block) -> Vec<Inst> {
        let module = self.module;
        module
            .block_insts(initializer)
            .filter(|&inst| {
                let data = module.inst(inst);
                if !matches!(data.kind, InstKind::Var { .. }) || data.results().len() != 1 {
                    return false;
                }
                let ptr = data.results()[0];
                match module.types.pointer(module.ty(ptr)) {
                    Some((AddressSpace::Function, store, _)) => {
                        module.types.is_integer_scalar(store) && !self.escapes(ptr)
                    }
                    _ => false,
                }
            })
            .collect()
    }

    /// Whether `ptr` is used other than as a load source or store target
    fn escapes(&self, ptr: Value) -> bool {
        self.module.value(ptr).usages_unsorted().iter().any(|usage| {
            let kind = &self.module.inst(usage.inst).kind;
            !matches!(
                (kind, usage.operand),
                (InstKind::Load, 0) | (InstKind::Store, 0)
            )
        })
    }

    fn var_result(&self, var: Inst) -> Value {
        self.module.inst(var).results()[0]
    }

    fn store_type(&self, var: Inst) -> TypeId {
        let module = self.module;
        module.types.unwrap_ptr(module.ty(self.var_result(var)))
    }

    /// Whether `block` belongs to the body or continuing block of this loop
    fn in_loop(&self, block: Block) -> bool {
        self.module.is_nested_in(block, self.body) || self.module.is_nested_in(block, self.continuing)
    }

    fn inst_in_loop(&self, inst: Inst) -> bool {
        self.module.inst(inst).block().is_some_and(|b| self.in_loop(b))
    }

    /// Stores to `ptr` in the body or continuing block
    fn stores_in_loop(&self, ptr: Value) -> Vec<Inst> {
        self.module
            .value(ptr)
            .usages_unsorted()
            .iter()
            .filter(|u| u.operand == 0 && matches!(self.module.inst(u.inst).kind, InstKind::Store))
            .map(|u| u.inst)
            .filter(|inst| self.inst_in_loop(*inst))
            .collect()
    }

    // ===== Value shapes =====

    /// Follows bitcasts back to the value they were applied to
    fn strip_bitcasts(&self, mut value: Value) -> Value {
        while let Some(inst) = self.producer(value) {
            if !matches!(self.module.inst(inst).kind, InstKind::Bitcast) {
                break;
            }
            value = self.module.operand(inst, 0);
        }
        value
    }

    fn producer(&self, value: Value) -> Option<Inst> {
        match self.module.value(value).kind {
            ValueKind::InstructionResult { inst } => inst,
            _ => None,
        }
    }

    /// The variable among `candidates` that `value` loads, seeing through bitcasts
    fn loaded_var(&self, value: Value, candidates: &[Inst]) -> Option<Inst> {
        let load = self.producer(self.strip_bitcasts(value))?;
        if !matches!(self.module.inst(load).kind, InstKind::Load) {
            return None;
        }
        let ptr = self.module.operand(load, 0);
        candidates.iter().copied().find(|var| self.var_result(*var) == ptr)
    }

    fn constant_of(&self, value: Value) -> Option<Scalar> {
        self.module.scalar_of(self.strip_bitcasts(value))
    }

    // ===== Exit check =====

    /// Finds the `if` at the top of the body that leaves the loop when the
    /// index comparison fails, and reads its comparison both ways round
    fn exit_checks(&self, candidates: &[Inst]) -> Vec<ExitCheck> {
        self.guard_comparison()
            .map(|(lhs, rhs, op)| {
                let mut checks = Vec::new();
                checks.extend(self.oriented_check(lhs, rhs, op, candidates));
                if let Some(swapped) = swap_comparison(op) {
                    checks.extend(self.oriented_check(rhs, lhs, swapped, candidates));
                }
                checks
            })
            .unwrap_or_default()
    }

    /// `index OP bound` if `index` loads one of `candidates` in the body
    fn oriented_check(&self, index: Value, bound: Value, op: BinaryOp, candidates: &[Inst]) -> Option<ExitCheck> {
        let var = self.loaded_var(index, candidates)?;
        if !self.load_in_body(index) || self.module.ty(index) != self.store_type(var) {
            return None;
        }
        Some(ExitCheck { var, op, bound })
    }

    /// The operands of the loop guard's comparison and the operator that
    /// keeps the loop running
    fn guard_comparison(&self) -> Option<(Value, Value, BinaryOp)> {
        let module = self.module;
        let guard = module
            .block_insts(self.body)
            .find(|inst| module.inst(*inst).kind.is_control() || module.inst(*inst).kind.is_terminator())?;
        if !matches!(module.inst(guard).kind, InstKind::If { .. }) {
            return None;
        }

        let exits_in_true = self.exits_loop(module.true_block(guard));
        let exits_in_false = self.exits_loop(module.false_block(guard));
        let negate = match (exits_in_true, exits_in_false) {
            (false, true) => false,
            (true, false) => true,
            _ => return None,
        };

        let condition = module.operand(guard, 0);
        let compare = self.producer(condition)?;
        if module.inst(compare).block() != Some(self.body) {
            return None;
        }
        let op = match module.inst(compare).kind {
            InstKind::Binary(op) if op.is_comparison() => op,
            _ => return None,
        };
        let op = if negate { negate_comparison(op)? } else { op };
        Some((module.operand(compare, 0), module.operand(compare, 1), op))
    }

    /// Whether `block` leaves this loop right away
    fn exits_loop(&self, block: Block) -> bool {
        match self.module.block(block).first() {
            Some(first) => matches!(
                self.module.inst(first).kind,
                InstKind::ExitLoop { target } if target == self.loop_inst
            ),
            None => false,
        }
    }

    /// Whether the load behind `value` happens at the top level of the body,
    /// so it observes the index on every iteration
    fn load_in_body(&self, value: Value) -> bool {
        self.producer(self.strip_bitcasts(value))
            .and_then(|load| self.module.inst(load).block())
            == Some(self.body)
    }

    // ===== Step =====

    /// The direction of the single unit step of `var`, if it has one
    fn step(&self, var: Inst) -> Option<Direction> {
        let module = self.module;
        let ptr = self.var_result(var);
        let stores = self.stores_in_loop(ptr);
        let [store] = stores.as_slice() else {
            return None;
        };
        if module.inst(*store).block() != Some(self.continuing) {
            return None;
        }

        let stored = self.strip_bitcasts(module.operand(*store, 1));
        let step = self.producer(stored)?;
        let op = match module.inst(step).kind {
            InstKind::Binary(op @ (BinaryOp::Add | BinaryOp::Subtract)) => op,
            _ => return None,
        };
        if module.ty(stored) != self.store_type(var) {
            return None;
        }
        let lhs = module.operand(step, 0);
        let rhs = module.operand(step, 1);
        let loads_var = |value: Value| {
            self.loaded_var(value, &[var]).is_some() && self.loaded_before(value, *store)
        };
        let is_one = |value: Value| self.constant_of(value).is_some_and(Scalar::is_integer_one);

        match op {
            BinaryOp::Add if (loads_var(lhs) && is_one(rhs)) || (is_one(lhs) && loads_var(rhs)) => {
                Some(Direction::Increasing)
            }
            BinaryOp::Subtract if loads_var(lhs) && is_one(rhs) => Some(Direction::Decreasing),
            _ => None,
        }
    }

    /// Whether the load behind `value` sits at the top level of the
    /// continuing block ahead of `store`, so it reads this iteration's index
    fn loaded_before(&self, value: Value, store: Inst) -> bool {
        let Some(load) = self.producer(self.strip_bitcasts(value)) else {
            return false;
        };
        if self.module.inst(load).block() != Some(self.continuing) {
            return false;
        }
        self.module
            .block_insts(self.continuing)
            .take_while(|inst| *inst != store)
            .any(|inst| inst == load)
    }

    // ===== Bound =====

    fn bound_is_safe(&self, check: &ExitCheck, direction: Direction) -> bool {
        let inclusive = match (direction, check.op) {
            (Direction::Increasing, BinaryOp::LessThan) => false,
            (Direction::Increasing, BinaryOp::LessThanEqual) => true,
            (Direction::Decreasing, BinaryOp::GreaterThan) => false,
            (Direction::Decreasing, BinaryOp::GreaterThanEqual) => true,
            _ => return false,
        };

        if let Some(bound) = self.constant_of(check.bound) {
            if !inclusive {
                return true;
            }
            // An inclusive bound at the end of the range is always satisfied.
            return match direction {
                Direction::Increasing => !bound.is_integer_max(),
                Direction::Decreasing => !bound.is_integer_min(),
            };
        }
        // A non-constant bound could be the end of the range.
        !inclusive && self.is_loop_invariant(check.bound, check.var)
    }

    /// Whether `value` holds the same value on every iteration
    fn is_loop_invariant(&self, value: Value, index: Inst) -> bool {
        let module = self.module;
        let value = self.strip_bitcasts(value);
        let Some(inst) = self.producer(value) else {
            // Parameters and constants never change.
            return true;
        };
        if !self.inst_in_loop(inst) {
            return true;
        }
        if !matches!(module.inst(inst).kind, InstKind::Load) {
            return false;
        }
        let ptr = module.operand(inst, 0);
        let Some(var) = self.producer(ptr) else {
            return false;
        };
        if var == index || !matches!(module.inst(var).kind, InstKind::Var { .. }) {
            return false;
        }
        let local = matches!(
            module.types.pointer(module.ty(ptr)),
            Some((AddressSpace::Function, _, _))
        );
        local && !self.escapes(ptr) && self.stores_in_loop(ptr).is_empty()
    }
}

/// The comparison that holds exactly when `op` does not
fn negate_comparison(op: BinaryOp) -> Option<BinaryOp> {
    Some(match op {
        BinaryOp::LessThan => BinaryOp::GreaterThanEqual,
        BinaryOp::GreaterThanEqual => BinaryOp::LessThan,
        BinaryOp::GreaterThan => BinaryOp::LessThanEqual,
        BinaryOp::LessThanEqual => BinaryOp::GreaterThan,
        BinaryOp::Equal => BinaryOp::NotEqual,
        BinaryOp::NotEqual => BinaryOp::Equal,
        _ => return None,
    })
}

/// The comparison with its operands exchanged
fn swap_comparison(op: BinaryOp) -> Option<BinaryOp> {
    Some(match op {
        BinaryOp::LessThan => BinaryOp::GreaterThan,
        BinaryOp::GreaterThan => BinaryOp::LessThan,
        BinaryOp::LessThanEqual => BinaryOp::GreaterThanEqual,
        BinaryOp::GreaterThanEqual => BinaryOp::LessThanEqual,
        BinaryOp::Equal | BinaryOp::NotEqual => op,
        _ => return None,
    })
}
