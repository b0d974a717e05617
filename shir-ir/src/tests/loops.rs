use super::NO_ARGS;
use crate::analysis::LoopAnalysis;
use crate::builder::Builder;
use crate::constant::Scalar;
use crate::function::Function;
use crate::instruction::Inst;
use crate::module::Module;
use crate::ops::BinaryOp;
use crate::types::{AddressSpace, Access, TypeId};
use crate::validate::validate;
use pretty_assertions::assert_eq;

/// Shape of a `for`-style loop
#[derive(Clone, Copy)]
struct Counted {
    ty: TypeId,
    init: Scalar,
    compare: BinaryOp,
    bound: Scalar,
    index_on_left: bool,
    /// The comparison exits the loop when true instead of when false
    exit_on_true: bool,
    step: BinaryOp,
    amount: Scalar,
}

impl Counted {
    /// `for (var idx = 0u; idx < bound; idx = idx + 1u)`
    fn up_to(bound: u32) -> Self {
        Self {
            ty: TypeId::U32,
            init: Scalar::U32(0),
            compare: BinaryOp::LessThan,
            bound: Scalar::U32(bound),
            index_on_left: true,
            exit_on_true: false,
            step: BinaryOp::Add,
            amount: Scalar::U32(1),
        }
    }

    fn with_amount(self, amount: u32) -> Self {
        Self {
            amount: Scalar::U32(amount),
            ..self
        }
    }
}

/// Appends a counted loop at the cursor. `fill` adds to the body after the
/// exit check. Returns the loop and its index variable.
fn counted_loop(b: &mut Builder<'_>, shape: Counted, fill: impl FnOnce(&mut Builder<'_>)) -> (Inst, Inst) {
    let lp = b.loop_();
    let init = b.module_mut().ensure_initializer(lp);
    let idx = b.append(init, |b| {
        let idx = b.function_var("idx", shape.ty);
        b.store(idx, shape.init);
        b.next_iteration(lp, NO_ARGS);
        idx
    });

    let body = b.module().loop_body(lp);
    b.append(body, |b| {
        let current = b.load(idx);
        let cond = if shape.index_on_left {
            b.binary(shape.compare, TypeId::BOOL, current, shape.bound)
        } else {
            b.binary(shape.compare, TypeId::BOOL, shape.bound, current)
        };
        let guard = b.if_(cond);
        let (stay, leave) = if shape.exit_on_true {
            (b.module().false_block(guard), b.module().true_block(guard))
        } else {
            (b.module().true_block(guard), b.module().false_block(guard))
        };
        b.append(stay, |b| b.exit_if(guard, NO_ARGS));
        b.append(leave, |b| b.exit_loop(lp, NO_ARGS));
        fill(b);
        b.continue_(lp, NO_ARGS);
    });

    let continuing = b.module().loop_continuing(lp);
    b.append(continuing, |b| {
        let current = b.load(idx);
        let next = b.binary(shape.step, shape.ty, current, shape.amount);
        b.store(idx, next);
        b.next_iteration(lp, NO_ARGS);
    });
    (lp, idx)
}

/// A function holding only `shape`, checked to be valid
fn single_loop(shape: Counted) -> (Module, Function, Inst, Inst) {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let (lp, idx) = b.append(body, |b| {
        let found = counted_loop(b, shape, |_| {});
        b.return_(func);
        found
    });
    validate(&module).unwrap();
    (module, func, lp, idx)
}

fn finiteness(shape: Counted) -> (bool, Option<Inst>, Inst) {
    let (module, func, lp, idx) = single_loop(shape);
    let analysis = LoopAnalysis::new(&module, func);
    let info = analysis.get(lp).unwrap();
    (info.is_finite(), info.index_var, idx)
}

#[test]
fn test_unit_increment_below_constant_is_finite() {
    let (finite, index_var, idx) = finiteness(Counted::up_to(10));
    assert!(finite);
    assert_eq!(index_var, Some(idx));
}

#[test]
fn test_zero_increment_is_not_finite() {
    let (finite, index_var, _) = finiteness(Counted::up_to(10).with_amount(0));
    assert!(!finite);
    assert_eq!(index_var, None);
}

#[test]
fn test_increment_of_two_is_not_finite() {
    let (finite, _, _) = finiteness(Counted::up_to(10).with_amount(2));
    assert!(!finite);
}

#[test]
fn test_inclusive_bound_at_max_is_not_finite() {
    let shape = Counted {
        ty: TypeId::I32,
        init: Scalar::I32(1),
        compare: BinaryOp::LessThanEqual,
        bound: Scalar::I32(i32::MAX),
        amount: Scalar::I32(1),
        ..Counted::up_to(0)
    };
    let (finite, _, _) = finiteness(shape);
    assert!(!finite);
}

#[test]
fn test_inclusive_bound_below_max_is_finite() {
    let shape = Counted {
        ty: TypeId::I32,
        init: Scalar::I32(1),
        compare: BinaryOp::LessThanEqual,
        bound: Scalar::I32(100),
        amount: Scalar::I32(1),
        ..Counted::up_to(0)
    };
    let (finite, _, _) = finiteness(shape);
    assert!(finite);
}

#[test]
fn test_unit_decrement_down_to_one_is_finite() {
    let shape = Counted {
        init: Scalar::U32(10),
        compare: BinaryOp::GreaterThanEqual,
        bound: Scalar::U32(1),
        step: BinaryOp::Subtract,
        ..Counted::up_to(0)
    };
    let (finite, index_var, idx) = finiteness(shape);
    assert!(finite);
    assert_eq!(index_var, Some(idx));
}

#[test]
fn test_decrement_down_to_zero_inclusive_is_not_finite() {
    let shape = Counted {
        init: Scalar::U32(10),
        compare: BinaryOp::GreaterThanEqual,
        bound: Scalar::U32(0),
        step: BinaryOp::Subtract,
        ..Counted::up_to(0)
    };
    let (finite, _, _) = finiteness(shape);
    assert!(!finite);
}

#[test]
fn test_step_against_the_comparison_is_not_finite() {
    let shape = Counted {
        step: BinaryOp::Subtract,
        ..Counted::up_to(10)
    };
    let (finite, _, _) = finiteness(shape);
    assert!(!finite);
}

#[test]
fn test_bound_on_the_left_is_recognized() {
    // 10u > idx
    let shape = Counted {
        compare: BinaryOp::GreaterThan,
        index_on_left: false,
        ..Counted::up_to(10)
    };
    let (finite, _, _) = finiteness(shape);
    assert!(finite);
}

#[test]
fn test_exit_in_true_branch_is_recognized() {
    // if (idx >= 10u) { break; }
    let shape = Counted {
        compare: BinaryOp::GreaterThanEqual,
        exit_on_true: true,
        ..Counted::up_to(10)
    };
    let (finite, _, _) = finiteness(shape);
    assert!(finite);
}

#[test]
fn test_one_plus_index_is_recognized() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let lp = b.append(body, |b| {
        let (lp, _) = counted_loop(b, Counted::up_to(4), |_| {});
        // Rewrite the step as `1u + idx`.
        let continuing = b.module().loop_continuing(lp);
        let step = b.module().block_insts(continuing).nth(1).unwrap();
        let load = b.module().operand(step, 0);
        let one = b.constant(1u32);
        b.module_mut().set_operands(step, vec![one, load]);
        b.return_(func);
        lp
    });
    validate(&module).unwrap();
    assert!(LoopAnalysis::new(&module, func).get(lp).unwrap().is_finite());
}

#[test]
fn test_round_tripped_bitcasts_are_transparent() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let lp = b.append(body, |b| {
        let lp = b.loop_();
        let init = b.module_mut().ensure_initializer(lp);
        let idx = b.append(init, |b| {
            let idx = b.function_var("idx", TypeId::U32);
            b.store(idx, 0u32);
            b.next_iteration(lp, NO_ARGS);
            idx
        });
        let lp_body = b.module().loop_body(lp);
        b.append(lp_body, |b| {
            let current = b.load(idx);
            let signed = b.bitcast(TypeId::I32, current);
            let unsigned = b.bitcast(TypeId::U32, signed);
            let cond = b.less_than(TypeId::BOOL, unsigned, 8u32);
            let guard = b.if_(cond);
            let (stay, leave) = (b.module().true_block(guard), b.module().false_block(guard));
            b.append(stay, |b| b.exit_if(guard, NO_ARGS));
            b.append(leave, |b| b.exit_loop(lp, NO_ARGS));
            b.continue_(lp, NO_ARGS);
        });
        let continuing = b.module().loop_continuing(lp);
        b.append(continuing, |b| {
            let current = b.load(idx);
            let next = b.add(TypeId::U32, current, 1u32);
            let signed = b.bitcast(TypeId::I32, next);
            let unsigned = b.bitcast(TypeId::U32, signed);
            b.store(idx, unsigned);
            b.next_iteration(lp, NO_ARGS);
        });
        b.return_(func);
        lp
    });
    validate(&module).unwrap();
    assert!(LoopAnalysis::new(&module, func).get(lp).unwrap().is_finite());
}

#[test]
fn test_index_outside_initializer_is_not_found() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let lp = b.append(body, |b| {
        let idx = b.function_var("idx", TypeId::U32);
        b.store(idx, 0u32);
        let lp = b.loop_();
        let lp_body = b.module().loop_body(lp);
        b.append(lp_body, |b| {
            let current = b.load(idx);
            let cond = b.less_than(TypeId::BOOL, current, 10u32);
            let guard = b.if_(cond);
            let (stay, leave) = (b.module().true_block(guard), b.module().false_block(guard));
            b.append(stay, |b| b.exit_if(guard, NO_ARGS));
            b.append(leave, |b| b.exit_loop(lp, NO_ARGS));
            b.continue_(lp, NO_ARGS);
        });
        let continuing = b.module().loop_continuing(lp);
        b.append(continuing, |b| {
            let current = b.load(idx);
            let next = b.add(TypeId::U32, current, 1u32);
            b.store(idx, next);
            b.next_iteration(lp, NO_ARGS);
        });
        b.return_(func);
        lp
    });
    validate(&module).unwrap();
    let analysis = LoopAnalysis::new(&module, func);
    assert_eq!(analysis.get(lp).unwrap().index_var, None);
}

#[test]
fn test_second_store_in_body_is_not_finite() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let (lp, idx) = b.append(body, |b| {
        let found = counted_loop(b, Counted::up_to(10), |_| {});
        b.return_(func);
        found
    });
    let lp_body = b.module().loop_body(lp);
    let cont = b.module().block(lp_body).last().unwrap();
    b.insert_before(cont, |b| b.store(idx, 3u32));
    validate(&module).unwrap();
    assert!(!LoopAnalysis::new(&module, func).get(lp).unwrap().is_finite());
}

#[test]
fn test_index_passed_to_a_call_is_not_finite() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let ptr = b.types().ptr(AddressSpace::Function, TypeId::U32, Access::ReadWrite);
    let reset = b.function("reset", TypeId::VOID, None);
    let param = b.function_param(ptr);
    b.set_params(reset, vec![param]);
    let reset_body = b.function_block(reset);
    b.append(reset_body, |b| {
        b.store(param, 0u32);
        b.return_(reset);
    });

    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let lp = b.append(body, |b| {
        let lp = b.loop_();
        let init = b.module_mut().ensure_initializer(lp);
        let idx = b.append(init, |b| {
            let idx = b.function_var("idx", TypeId::U32);
            b.store(idx, 0u32);
            b.next_iteration(lp, NO_ARGS);
            idx
        });
        let lp_body = b.module().loop_body(lp);
        b.append(lp_body, |b| {
            let current = b.load(idx);
            let cond = b.less_than(TypeId::BOOL, current, 10u32);
            let guard = b.if_(cond);
            let (stay, leave) = (b.module().true_block(guard), b.module().false_block(guard));
            b.append(stay, |b| b.exit_if(guard, NO_ARGS));
            b.append(leave, |b| b.exit_loop(lp, NO_ARGS));
            b.call(reset, [idx]);
            b.continue_(lp, NO_ARGS);
        });
        let continuing = b.module().loop_continuing(lp);
        b.append(continuing, |b| {
            let current = b.load(idx);
            let next = b.add(TypeId::U32, current, 1u32);
            b.store(idx, next);
            b.next_iteration(lp, NO_ARGS);
        });
        b.return_(func);
        lp
    });
    validate(&module).unwrap();
    assert!(!LoopAnalysis::new(&module, func).get(lp).unwrap().is_finite());
}

/// Initializer with `i` and `j`; the check reads `checked` and the step writes `stepped`
fn two_candidates(checked: usize, stepped: usize) -> (Module, Function, Inst, [Inst; 2]) {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let (lp, vars) = b.append(body, |b| {
        let lp = b.loop_();
        let init = b.module_mut().ensure_initializer(lp);
        let vars = b.append(init, |b| {
            let i = b.function_var("i", TypeId::U32);
            let j = b.function_var("j", TypeId::U32);
            b.store(i, 0u32);
            b.store(j, 0u32);
            b.next_iteration(lp, NO_ARGS);
            [i, j]
        });
        let lp_body = b.module().loop_body(lp);
        b.append(lp_body, |b| {
            let current = b.load(vars[checked]);
            let cond = b.less_than(TypeId::BOOL, current, 10u32);
            let guard = b.if_(cond);
            let (stay, leave) = (b.module().true_block(guard), b.module().false_block(guard));
            b.append(stay, |b| b.exit_if(guard, NO_ARGS));
            b.append(leave, |b| b.exit_loop(lp, NO_ARGS));
            b.continue_(lp, NO_ARGS);
        });
        let continuing = b.module().loop_continuing(lp);
        b.append(continuing, |b| {
            let current = b.load(vars[stepped]);
            let next = b.add(TypeId::U32, current, 1u32);
            b.store(vars[stepped], next);
            b.next_iteration(lp, NO_ARGS);
        });
        b.return_(func);
        (lp, vars)
    });
    validate(&module).unwrap();
    (module, func, lp, vars)
}

#[test]
fn test_check_and_step_on_different_candidates_is_not_finite() {
    let (module, func, lp, _) = two_candidates(0, 1);
    assert!(!LoopAnalysis::new(&module, func).get(lp).unwrap().is_finite());
}

#[test]
fn test_matching_pair_among_candidates_is_found() {
    let (module, func, lp, vars) = two_candidates(1, 1);
    let analysis = LoopAnalysis::new(&module, func);
    assert_eq!(analysis.get(lp).unwrap().index_var, Some(vars[1]));
}

#[test]
fn test_nested_loops_are_classified_independently() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let loops = b.append(body, |b| {
        let mut inner_a = None;
        let (outer_a, _) = counted_loop(b, Counted::up_to(4), |b| {
            inner_a = Some(counted_loop(b, Counted::up_to(4).with_amount(2), |_| {}).0);
        });
        let mut inner_b = None;
        let (outer_b, _) = counted_loop(b, Counted::up_to(4).with_amount(0), |b| {
            inner_b = Some(counted_loop(b, Counted::up_to(4), |_| {}).0);
        });
        b.return_(func);
        [outer_a, inner_a.unwrap(), outer_b, inner_b.unwrap()]
    });
    validate(&module).unwrap();

    let analysis = LoopAnalysis::new(&module, func);
    assert_eq!(analysis.len(), 4);
    let finite: Vec<bool> = loops.iter().map(|lp| analysis.get(*lp).unwrap().is_finite()).collect();
    assert_eq!(finite, vec![true, false, false, true]);
}

#[test]
fn test_invariant_variable_bound_is_finite() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let n = b.function_param(TypeId::U32);
    b.set_params(func, vec![n]);
    let body = b.function_block(func);
    let lp = b.append(body, |b| {
        let lp = b.loop_();
        let init = b.module_mut().ensure_initializer(lp);
        let idx = b.append(init, |b| {
            let idx = b.function_var("idx", TypeId::U32);
            b.store(idx, 0u32);
            b.next_iteration(lp, NO_ARGS);
            idx
        });
        let lp_body = b.module().loop_body(lp);
        b.append(lp_body, |b| {
            let current = b.load(idx);
            let cond = b.less_than(TypeId::BOOL, current, n);
            let guard = b.if_(cond);
            let (stay, leave) = (b.module().true_block(guard), b.module().false_block(guard));
            b.append(stay, |b| b.exit_if(guard, NO_ARGS));
            b.append(leave, |b| b.exit_loop(lp, NO_ARGS));
            b.continue_(lp, NO_ARGS);
        });
        let continuing = b.module().loop_continuing(lp);
        b.append(continuing, |b| {
            let current = b.load(idx);
            let next = b.add(TypeId::U32, current, 1u32);
            b.store(idx, next);
            b.next_iteration(lp, NO_ARGS);
        });
        b.return_(func);
        lp
    });
    validate(&module).unwrap();
    assert!(LoopAnalysis::new(&module, func).get(lp).unwrap().is_finite());
}

#[test]
fn test_step_from_a_load_in_the_initializer_is_not_finite() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let lp = b.append(body, |b| {
        let lp = b.loop_();
        let init = b.module_mut().ensure_initializer(lp);
        let (idx, start) = b.append(init, |b| {
            let idx = b.function_var("idx", TypeId::U32);
            b.store(idx, 0u32);
            let start = b.load(idx);
            b.next_iteration(lp, NO_ARGS);
            (idx, start)
        });
        let lp_body = b.module().loop_body(lp);
        b.append(lp_body, |b| {
            let current = b.load(idx);
            let cond = b.less_than(TypeId::BOOL, current, 10u32);
            let guard = b.if_(cond);
            let (stay, leave) = (b.module().true_block(guard), b.module().false_block(guard));
            b.append(stay, |b| b.exit_if(guard, NO_ARGS));
            b.append(leave, |b| b.exit_loop(lp, NO_ARGS));
            b.continue_(lp, NO_ARGS);
        });
        // Stores `0 + 1` on every iteration.
        let continuing = b.module().loop_continuing(lp);
        b.append(continuing, |b| {
            let next = b.add(TypeId::U32, start, 1u32);
            b.store(idx, next);
            b.next_iteration(lp, NO_ARGS);
        });
        b.return_(func);
        lp
    });
    validate(&module).unwrap();
    let analysis = LoopAnalysis::new(&module, func);
    assert_eq!(analysis.get(lp).unwrap().index_var, None);
}

#[test]
fn test_index_on_the_right_of_another_candidate_is_found() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let (lp, i) = b.append(body, |b| {
        let lp = b.loop_();
        let init = b.module_mut().ensure_initializer(lp);
        let (i, n) = b.append(init, |b| {
            let i = b.function_var("i", TypeId::U32);
            let n = b.function_var("n", TypeId::U32);
            b.store(i, 0u32);
            b.store(n, 10u32);
            b.next_iteration(lp, NO_ARGS);
            (i, n)
        });
        let lp_body = b.module().loop_body(lp);
        b.append(lp_body, |b| {
            let bound = b.load(n);
            let current = b.load(i);
            let cond = b.greater_than(TypeId::BOOL, bound, current);
            let guard = b.if_(cond);
            let (stay, leave) = (b.module().true_block(guard), b.module().false_block(guard));
            b.append(stay, |b| b.exit_if(guard, NO_ARGS));
            b.append(leave, |b| b.exit_loop(lp, NO_ARGS));
            b.continue_(lp, NO_ARGS);
        });
        let continuing = b.module().loop_continuing(lp);
        b.append(continuing, |b| {
            let current = b.load(i);
            let next = b.add(TypeId::U32, current, 1u32);
            b.store(i, next);
            b.next_iteration(lp, NO_ARGS);
        });
        b.return_(func);
        (lp, i)
    });
    validate(&module).unwrap();
    let analysis = LoopAnalysis::new(&module, func);
    assert_eq!(analysis.get(lp).unwrap().index_var, Some(i));
}
