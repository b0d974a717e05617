//! Deep copies of instructions, blocks and functions
//!
//! A [`CloneContext`] remembers every node it has copied, so cloning the same
//! source twice yields the same copy and references between cloned nodes are
//! remapped onto the copies. References to nodes outside the cloned region are
//! kept as they are. Constants are interned and never copied.

use crate::block::Block;
use crate::function::Function;
use crate::instruction::{Case, Inst, InstData, InstKind};
use crate::module::Module;
use crate::value::{Value, ValueKind};
use log::{debug, trace};
use std::collections::HashMap;

pub struct CloneContext<'m> {
    module: &'m mut Module,
    values: HashMap<Value, Value>,
    insts: HashMap<Inst, Inst>,
    blocks: HashMap<Block, Block>,
    funcs: HashMap<Function, Function>,
}

impl<'m> CloneContext<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            values: HashMap::new(),
            insts: HashMap::new(),
            blocks: HashMap::new(),
            funcs: HashMap::new(),
        }
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    /// Pre-seeds a value mapping, e.g. to substitute arguments for parameters
    pub fn replace(&mut self, old: Value, new: Value) {
        self.values.insert(old, new);
    }

    /// The copy of `value` if one exists, otherwise `value` itself
    pub fn remap(&self, value: Value) -> Value {
        self.values.get(&value).copied().unwrap_or(value)
    }

    pub fn remap_inst(&self, inst: Inst) -> Inst {
        self.insts.get(&inst).copied().unwrap_or(inst)
    }

    pub fn remap_block(&self, block: Block) -> Block {
        self.blocks.get(&block).copied().unwrap_or(block)
    }

    pub fn remap_function(&self, func: Function) -> Function {
        self.funcs.get(&func).copied().unwrap_or(func)
    }

    /// A fresh, unused copy of a result or parameter value. Constants map to themselves.
    fn fresh_value(&mut self, old: Value) -> Value {
        if let Some(new) = self.values.get(&old) {
            return *new;
        }
        let ty = self.module.ty(old);
        let new = match self.module.value(old).kind.clone() {
            ValueKind::Constant(_) => return old,
            ValueKind::InstructionResult { .. } => self.module.create_result(ty),
            ValueKind::BlockParam { .. } => self.module.create_block_param(ty),
            ValueKind::FunctionParam { attributes, binding, .. } => {
                let new = self.module.create_function_param(ty);
                self.module.set_param_attributes(new, attributes);
                if let Some(binding) = binding {
                    self.module.set_param_binding_point(new, binding);
                }
                new
            }
        };
        if let Some(name) = self.module.name_of(old).map(str::to_string) {
            self.module.set_name(new, name);
        }
        self.values.insert(old, new);
        new
    }

    /// An empty copy of `block` with copied parameters, registered in the map
    fn shell_block(&mut self, old: Block) -> Block {
        let multi_in = self.module.block(old).is_multi_in();
        let new = self.module.create_block(multi_in);
        self.blocks.insert(old, new);
        let params: Vec<Value> = self.module.block(old).params().to_vec();
        let new_params = params.into_iter().map(|p| self.fresh_value(p)).collect();
        self.module.set_block_params(new, new_params);
        new
    }

    fn fill_block(&mut self, old: Block, new: Block) {
        let insts: Vec<Inst> = self.module.block_insts(old).collect();
        for inst in insts {
            let copy = self.clone_inst(inst);
            self.module.append(new, copy);
        }
    }

    /// Clones `inst` and everything nested in it. The copy is detached.
    pub fn clone_inst(&mut self, inst: Inst) -> Inst {
        if let Some(copy) = self.insts.get(&inst) {
            return *copy;
        }
        let InstData { kind, operands, results, .. } = self.module.inst(inst).clone();

        let results: Vec<Value> = results.into_iter().map(|r| self.fresh_value(r)).collect();
        let old_blocks = kind.nested_blocks();
        let new_blocks: Vec<Block> = old_blocks.iter().map(|b| self.shell_block(*b)).collect();

        let kind = match kind {
            InstKind::UserCall { target } => InstKind::UserCall {
                target: self.remap_function(target),
            },
            InstKind::Return { func } => InstKind::Return {
                func: self.remap_function(func),
            },
            InstKind::If { true_block, false_block } => InstKind::If {
                true_block: self.remap_block(true_block),
                false_block: self.remap_block(false_block),
            },
            InstKind::Loop { initializer, body, continuing } => InstKind::Loop {
                initializer: initializer.map(|b| self.remap_block(b)),
                body: self.remap_block(body),
                continuing: self.remap_block(continuing),
            },
            InstKind::Switch { cases } => InstKind::Switch {
                cases: cases
                    .into_iter()
                    .map(|case| Case {
                        selectors: case.selectors,
                        block: self.remap_block(case.block),
                    })
                    .collect(),
            },
            mut other => {
                if let Some(target) = other.exit_target_mut() {
                    *target = self.remap_inst(*target);
                }
                other
            }
        };
        let operands = operands.into_iter().map(|v| self.remap(v)).collect();
        let copy = self.module.create_inst(kind, operands, results);
        self.insts.insert(inst, copy);
        trace!("cloned {:?} -> {:?}", inst, copy);

        for (old, new) in old_blocks.into_iter().zip(new_blocks) {
            self.fill_block(old, new);
        }
        copy
    }

    /// Clones `block` and its contents. The copy has no parent.
    pub fn clone_block(&mut self, block: Block) -> Block {
        if let Some(copy) = self.blocks.get(&block) {
            return *copy;
        }
        let copy = self.shell_block(block);
        self.fill_block(block, copy);
        copy
    }

    /// Clones `func` with fresh parameters and body. The copy is not added to the module.
    pub fn clone_function(&mut self, func: Function) -> Function {
        if let Some(copy) = self.funcs.get(&func) {
            return *copy;
        }
        let data = self.module.function(func).clone();
        let copy = self.module.create_function(data.name.clone(), data.return_type);
        self.funcs.insert(func, copy);

        let params = data.params().iter().map(|p| self.fresh_value(*p)).collect();
        self.module.set_params(copy, params);
        let workgroup_size = data.workgroup_size.map(|size| size.map(|v| self.remap(v)));
        let target = self.module.function_mut(copy);
        target.stage = data.stage;
        target.return_attributes = data.return_attributes.clone();
        target.workgroup_size = workgroup_size;

        let body = self.module.function(copy).block();
        self.blocks.insert(data.block(), body);
        self.fill_block(data.block(), body);
        debug!("cloned function '{}'", data.name);
        copy
    }
}
