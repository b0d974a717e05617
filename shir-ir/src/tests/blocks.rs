use super::{add_function, caller, NO_ARGS};
use crate::builder::Builder;
use crate::instruction::InstKind;
use crate::module::Module;
use crate::types::TypeId;
use pretty_assertions::assert_eq;

#[test]
fn test_walk_is_pre_order() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let (guard, inner, ret) = b.append(body, |b| {
        let guard = b.if_(true);
        let (t, f) = (b.module().true_block(guard), b.module().false_block(guard));
        let inner = b.append(t, |b| {
            let inner = b.negation(TypeId::I32, 1i32);
            b.exit_if(guard, NO_ARGS);
            inner
        });
        b.append(f, |b| b.exit_if(guard, NO_ARGS));
        let ret = b.return_(func);
        (guard, inner, ret)
    });

    let walked = module.walk(body);
    assert_eq!(walked.len(), 5);
    assert_eq!(walked[0], guard);
    assert_eq!(walked[1], inner);
    assert_eq!(walked[4], ret);
}

#[test]
fn test_nesting_queries() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    let lp = b.append(body, |b| {
        let lp = b.loop_();
        b.return_(func);
        lp
    });
    let lp_body = module.loop_body(lp);
    let continuing = module.loop_continuing(lp);

    assert!(module.is_nested_in(lp_body, body));
    assert!(module.is_nested_in(body, body));
    assert!(!module.is_nested_in(body, lp_body));
    assert!(!module.is_nested_in(continuing, lp_body));
    assert_eq!(module.top_level_block(continuing), Some(body));
    assert_eq!(module.function_of_block(lp_body), Some(func));
    assert_eq!(module.function_of_block(module.root()), None);
    assert_eq!(module.block(lp_body).parent(), Some(lp));
}

#[test]
fn test_initializer_is_created_once() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let lp = b.append(block, |b| b.loop_());

    assert_eq!(module.loop_initializer(lp), None);
    let init = module.ensure_initializer(lp);
    assert_eq!(module.ensure_initializer(lp), init);
    assert_eq!(module.loop_initializer(lp), Some(init));
    assert!(!module.block(init).is_multi_in());
    assert!(module.block(module.loop_body(lp)).is_multi_in());
}

#[test]
fn test_destroying_a_control_destroys_its_blocks() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let (guard, nested) = b.append(block, |b| {
        let guard = b.if_(false);
        let t = b.module().true_block(guard);
        let nested = b.append(t, |b| b.exit_if(guard, NO_ARGS));
        (guard, nested)
    });
    let t = module.true_block(guard);

    // The exit targets the if itself, so nothing outside holds a use.
    module.destroy_inst(guard);
    assert!(!module.is_block_alive(t));
    assert!(!module.is_inst_alive(nested));
    assert!(module.block(block).is_empty());
}

#[test]
#[should_panic(expected = "cannot append exit_if to block")]
fn test_builder_respects_the_terminator() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    b.append(block, |b| {
        let guard = b.if_(true);
        b.unreachable();
        b.exit_if(guard, NO_ARGS);
    });
}

#[test]
fn test_insertion_cursors_keep_order() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let (first, last) = b.append(block, |b| {
        let first = b.negation(TypeId::I32, 1i32);
        let last = b.unreachable();
        (first, last)
    });
    let (a, c) = b.insert_after(first, |b| {
        let a = b.negation(TypeId::I32, 2i32);
        let c = b.negation(TypeId::I32, 3i32);
        (a, c)
    });
    let before = b.insert_before(first, |b| b.discard());

    let order: Vec<_> = module.block_insts(block).collect();
    assert_eq!(order, vec![before, first, a, c, last]);
    assert_eq!(module.terminator(block), Some(last));
}

#[test]
fn test_callees_precede_callers() {
    let mut module = Module::new();
    let leaf = add_function(&mut module, "leaf");
    let middle = caller(&mut module, "middle", &[leaf]);
    // Listed before its callees on purpose.
    let top = caller(&mut module, "top", &[middle, leaf]);
    let other = add_function(&mut module, "other");

    assert_eq!(module.direct_callees(top), vec![middle, leaf]);
    let order = module.dependency_ordered_functions();
    assert_eq!(order.len(), 4);
    let position = |f| order.iter().position(|g| *g == f).unwrap();
    for &func in &order {
        for callee in module.direct_callees(func) {
            assert!(position(callee) < position(func));
        }
    }
    assert!(order.contains(&other));
}

#[test]
fn test_call_results_follow_the_return_type() {
    let mut module = Module::new();
    let leaf = add_function(&mut module, "leaf");
    let top = caller(&mut module, "top", &[leaf]);
    let call = module
        .walk(module.function(top).block())
        .into_iter()
        .find(|inst| matches!(module.inst(*inst).kind, InstKind::UserCall { .. }))
        .unwrap();
    assert_eq!(module.ty(module.result(call)), TypeId::I32);
}
