//! Functions and module-scope declarations reachable from a function

use crate::function::Function;
use crate::instruction::{Inst, InstKind};
use crate::module::Module;
use crate::value::{Value, ValueKind};
use log::trace;
use std::collections::{HashMap, HashSet};

/// Transitive callees of functions, cached per function
pub struct ReferencedFunctions<'a> {
    module: &'a Module,
    cache: HashMap<Function, Vec<Function>>,
}

impl<'a> ReferencedFunctions<'a> {
    pub fn new(module: &'a Module) -> Self {
        Self {
            module,
            cache: HashMap::new(),
        }
    }

    /// Every function `func` calls directly or indirectly, in discovery order.
    /// `func` itself is only included when it is recursive.
    pub fn get(&mut self, func: Function) -> &[Function] {
        if !self.cache.contains_key(&func) {
            let callees = self.collect(func);
            self.cache.insert(func, callees);
        }
        &self.cache[&func]
    }

    fn collect(&self, func: Function) -> Vec<Function> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![func];
        while let Some(current) = stack.pop() {
            for callee in self.module.direct_callees(current) {
                if seen.insert(callee) {
                    order.push(callee);
                    stack.push(callee);
                }
            }
        }
        order
    }
}

/// Root block declarations (`var`, `override` and `let`) used by functions,
/// cached per function
pub struct ReferencedModuleDecls<'a> {
    module: &'a Module,
    functions: ReferencedFunctions<'a>,
    decls: HashSet<Inst>,
    cache: HashMap<Function, Vec<Inst>>,
}

impl<'a> ReferencedModuleDecls<'a> {
    pub fn new(module: &'a Module) -> Self {
        let decls = module
            .block_insts(module.root())
            .filter(|inst| {
                matches!(
                    module.inst(*inst).kind,
                    InstKind::Var { .. } | InstKind::Override { .. } | InstKind::Let
                )
            })
            .collect();
        Self {
            module,
            functions: ReferencedFunctions::new(module),
            decls,
            cache: HashMap::new(),
        }
    }

    /// Declarations used by `func` or anything it calls, in root block order.
    /// Uses through root `let`s and override initializers are followed.
    pub fn get(&mut self, func: Function) -> &[Inst] {
        if !self.cache.contains_key(&func) {
            let decls = self.collect(func);
            trace!(
                "'{}' references {} module declarations",
                self.module.function(func).name,
                decls.len()
            );
            self.cache.insert(func, decls);
        }
        &self.cache[&func]
    }

    fn collect(&mut self, func: Function) -> Vec<Inst> {
        let module = self.module;
        let mut functions = vec![func];
        functions.extend(self.functions.get(func).iter().copied().filter(|f| *f != func));

        let mut used = HashSet::new();
        for func in functions {
            let data = module.function(func);
            if let Some(size) = data.workgroup_size {
                for value in size {
                    self.mark(value, &mut used);
                }
            }
            for inst in module.walk(data.block()) {
                for &operand in module.operands(inst) {
                    self.mark(operand, &mut used);
                }
            }
        }

        module
            .block_insts(module.root())
            .filter(|inst| used.contains(inst))
            .collect()
    }

    fn mark(&self, value: Value, used: &mut HashSet<Inst>) {
        let ValueKind::InstructionResult { inst: Some(inst) } = self.module.value(value).kind else {
            return;
        };
        if !self.decls.contains(&inst) || !used.insert(inst) {
            return;
        }
        for &operand in self.module.operands(inst) {
            self.mark(operand, used);
        }
    }
}
