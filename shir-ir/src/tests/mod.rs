//! Module-level tests that exercise several components together

mod blocks;
mod loops;
mod referenced;
mod values;

use crate::builder::Builder;
use crate::function::Function;
use crate::instruction::Inst;
use crate::module::Module;
use crate::types::TypeId;
use crate::value::Value;

pub(crate) const NO_ARGS: [Value; 0] = [];

/// `fn <name>() -> i32 { return 1i + 2i; }`
pub(crate) fn add_function(module: &mut Module, name: &str) -> Function {
    let mut b = Builder::new(module);
    let func = b.function(name, TypeId::I32, None);
    let body = b.function_block(func);
    b.append(body, |b| {
        let sum = b.add(TypeId::I32, 1i32, 2i32);
        b.return_value(func, sum);
    });
    func
}

/// A function that calls each of `callees` in order and returns
pub(crate) fn caller(module: &mut Module, name: &str, callees: &[Function]) -> Function {
    let mut b = Builder::new(module);
    let func = b.function(name, TypeId::VOID, None);
    let body = b.function_block(func);
    b.append(body, |b| {
        for &callee in callees {
            b.call(callee, NO_ARGS);
        }
        b.return_(func);
    });
    func
}

/// `for (var i = 0u; i < 16u; i++) {}` in a compute entry point
pub(crate) fn counted_loop_module() -> (Module, Inst) {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.compute_function("main", 64, 1, 1);
    let body = b.function_block(func);
    let lp = b.append(body, |b| {
        let lp = b.loop_();
        let init = b.module_mut().ensure_initializer(lp);
        let idx = b.append(init, |b| {
            let idx = b.function_var("i", TypeId::U32);
            b.store(idx, 0u32);
            b.next_iteration(lp, NO_ARGS);
            idx
        });
        let lp_body = b.module().loop_body(lp);
        b.append(lp_body, |b| {
            let current = b.load(idx);
            let cond = b.less_than(TypeId::BOOL, current, 16u32);
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
    (module, lp)
}
