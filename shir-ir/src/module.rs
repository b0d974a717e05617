//! The module: owner of every value, instruction, block and function
//!
//! All graph nodes live in per-kind slot arenas inside the [`Module`] and are
//! addressed by handles. Operand edges are kept in sync with the use-lists of
//! the values they reference; every mutation that adds or removes an edge
//! updates both sides.

use crate::arena::Arena;
use crate::attributes::{BindingPoint, IoAttributes};
use crate::block::{Block, BlockData};
use crate::constant::{ConstId, ConstantManager, Scalar};
use crate::function::{Function, FunctionData};
use crate::instruction::{Case, Inst, InstData, InstKind};
use crate::types::{TypeId, TypeManager};
use crate::value::{Usage, Value, ValueData, ValueKind};
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct Module {
    pub types: TypeManager,
    pub constants: ConstantManager,
    values: Arena<ValueData>,
    insts: Arena<InstData>,
    blocks: Arena<BlockData>,
    funcs: Arena<FunctionData>,
    constant_values: HashMap<ConstId, Value>,
    root: Block,
    functions: Vec<Function>,
    names: HashMap<Value, String>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        let mut blocks = Arena::new("block");
        let root = blocks.alloc(BlockData::new(false));
        Self {
            types: TypeManager::new(),
            constants: ConstantManager::new(),
            values: Arena::new("value"),
            insts: Arena::new("instruction"),
            blocks,
            funcs: Arena::new("function"),
            constant_values: HashMap::new(),
            root,
            functions: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// The block holding module-scope declarations
    pub fn root(&self) -> Block {
        self.root
    }

    /// Functions of the module in declaration order
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    // ===== Node access =====

    pub fn value(&self, value: Value) -> &ValueData {
        self.values.get(value)
    }

    pub(crate) fn value_mut(&mut self, value: Value) -> &mut ValueData {
        self.values.get_mut(value)
    }

    pub fn inst(&self, inst: Inst) -> &InstData {
        self.insts.get(inst)
    }

    pub(crate) fn inst_mut(&mut self, inst: Inst) -> &mut InstData {
        self.insts.get_mut(inst)
    }

    pub fn block(&self, block: Block) -> &BlockData {
        self.blocks.get(block)
    }

    pub(crate) fn block_mut(&mut self, block: Block) -> &mut BlockData {
        self.blocks.get_mut(block)
    }

    pub fn function(&self, func: Function) -> &FunctionData {
        self.funcs.get(func)
    }

    /// Mutable access to the plain attributes of a function
    pub fn function_mut(&mut self, func: Function) -> &mut FunctionData {
        self.funcs.get_mut(func)
    }

    pub fn is_value_alive(&self, value: Value) -> bool {
        self.values.is_alive(value)
    }

    pub fn is_inst_alive(&self, inst: Inst) -> bool {
        self.insts.is_alive(inst)
    }

    pub fn is_block_alive(&self, block: Block) -> bool {
        self.blocks.is_alive(block)
    }

    pub fn is_function_alive(&self, func: Function) -> bool {
        self.funcs.is_alive(func)
    }

    /// Live values in creation order
    pub fn values(&self) -> impl Iterator<Item = (Value, &ValueData)> + '_ {
        self.values.iter()
    }

    /// Live instructions in creation order
    pub fn instructions(&self) -> impl Iterator<Item = (Inst, &InstData)> + '_ {
        self.insts.iter()
    }

    pub fn ty(&self, value: Value) -> TypeId {
        self.value(value).ty
    }

    pub fn operands(&self, inst: Inst) -> &[Value] {
        &self.inst(inst).operands
    }

    pub fn operand(&self, inst: Inst, index: usize) -> Value {
        match self.inst(inst).operands.get(index) {
            Some(value) => *value,
            None => panic!(
                "operand index {} out of range for {} {:?}",
                index,
                self.inst(inst).kind.name(),
                inst
            ),
        }
    }

    pub fn results(&self, inst: Inst) -> &[Value] {
        &self.inst(inst).results
    }

    /// The single result of `inst`
    pub fn result(&self, inst: Inst) -> Value {
        match self.inst(inst).results.as_slice() {
            [value] => *value,
            results => panic!(
                "{} {:?} has {} results, expected exactly one",
                self.inst(inst).kind.name(),
                inst,
                results.len()
            ),
        }
    }

    // ===== Values =====

    fn create_value(&mut self, kind: ValueKind, ty: TypeId) -> Value {
        self.values.alloc(ValueData::new(kind, ty))
    }

    /// A fresh result value, not yet owned by an instruction
    pub fn create_result(&mut self, ty: TypeId) -> Value {
        self.create_value(ValueKind::InstructionResult { inst: None }, ty)
    }

    pub fn create_block_param(&mut self, ty: TypeId) -> Value {
        self.create_value(ValueKind::BlockParam { block: None }, ty)
    }

    pub fn create_function_param(&mut self, ty: TypeId) -> Value {
        self.create_value(
            ValueKind::FunctionParam {
                func: None,
                index: 0,
                attributes: IoAttributes::default(),
                binding: None,
            },
            ty,
        )
    }

    /// The value of an interned constant. One constant always maps to one value.
    pub fn constant_value(&mut self, constant: ConstId) -> Value {
        if let Some(value) = self.constant_values.get(&constant) {
            return *value;
        }
        let ty = self.constants.ty(constant);
        let value = self.create_value(ValueKind::Constant(constant), ty);
        self.constant_values.insert(constant, value);
        value
    }

    pub fn constant(&mut self, scalar: impl Into<Scalar>) -> Value {
        let constant = self.constants.scalar(scalar);
        self.constant_value(constant)
    }

    /// The zero value of a constructible type
    pub fn zero_value(&mut self, ty: TypeId) -> Option<Value> {
        let constant = self.constants.zero(&self.types, ty)?;
        Some(self.constant_value(constant))
    }

    /// The scalar held by a constant value
    pub fn scalar_of(&self, value: Value) -> Option<Scalar> {
        self.constants.as_scalar(self.value(value).constant()?)
    }

    /// Gives `value` a name, replacing any previous one
    pub fn set_name(&mut self, value: Value, name: impl Into<String>) {
        self.names.insert(value, name.into());
    }

    pub fn clear_name(&mut self, value: Value) {
        self.names.remove(&value);
    }

    pub fn name_of(&self, value: Value) -> Option<&str> {
        self.names.get(&value).map(String::as_str)
    }

    /// Removes `value` from its instruction's results and hands it to the caller
    pub fn detach_result(&mut self, value: Value) {
        let inst = self
            .value(value)
            .instruction()
            .unwrap_or_else(|| panic!("value {:?} is not an attached instruction result", value));
        self.inst_mut(inst).results.retain(|r| *r != value);
        self.value_mut(value).kind = ValueKind::InstructionResult { inst: None };
    }

    /// Appends a fresh result of type `ty` to `inst`
    pub fn add_result(&mut self, inst: Inst, ty: TypeId) -> Value {
        let value = self.create_result(ty);
        self.inst_mut(inst).results.push(value);
        self.value_mut(value).kind = ValueKind::InstructionResult { inst: Some(inst) };
        value
    }

    /// Frees a value with no owner and no uses
    pub fn destroy_value(&mut self, value: Value) {
        match &self.value(value).kind {
            ValueKind::Constant(_) => {
                panic!("cannot destroy constant value {:?}: constants are owned by the module", value)
            }
            ValueKind::InstructionResult { inst: Some(inst) } => panic!(
                "cannot destroy value {:?}: it is still the result of instruction {:?}",
                value, inst
            ),
            ValueKind::FunctionParam { func: Some(func), .. } => panic!(
                "cannot destroy value {:?}: it is still a parameter of function {:?}",
                value, func
            ),
            ValueKind::BlockParam { block: Some(block) } => panic!(
                "cannot destroy value {:?}: it is still a parameter of block {:?}",
                value, block
            ),
            _ => {}
        }
        assert!(
            !self.value(value).is_used(),
            "cannot destroy value {:?}: it is still used",
            value
        );
        self.names.remove(&value);
        self.values.free(value);
    }

    // ===== Instructions =====

    /// Creates a detached instruction, connecting its operands and results
    pub fn create_inst(&mut self, kind: InstKind, operands: Vec<Value>, results: Vec<Value>) -> Inst {
        for &result in &results {
            match self.value(result).kind {
                ValueKind::InstructionResult { inst: None } => {}
                _ => panic!("value {:?} cannot become an instruction result", result),
            }
        }
        let nested = kind.nested_blocks();
        for &block in &nested {
            assert!(block != self.root, "the root block cannot be nested");
            assert!(
                self.block(block).parent.is_none(),
                "block {:?} already belongs to a control instruction",
                block
            );
        }

        let name = kind.name();
        let inst = self.insts.alloc(InstData {
            kind,
            operands: operands.clone(),
            results: results.clone(),
            block: None,
            prev: None,
            next: None,
        });
        for (index, &operand) in operands.iter().enumerate() {
            self.value_mut(operand).add_usage(Usage::new(inst, index));
        }
        for &result in &results {
            self.value_mut(result).kind = ValueKind::InstructionResult { inst: Some(inst) };
        }
        for block in nested {
            self.block_mut(block).parent = Some(inst);
        }
        trace!("created {} {:?}", name, inst);
        inst
    }

    /// Points operand `index` of `inst` at `value`, moving the usage record
    pub fn set_operand(&mut self, inst: Inst, index: usize, value: Value) {
        let old = self.operand(inst, index);
        self.value_mut(old).remove_usage(Usage::new(inst, index));
        self.inst_mut(inst).operands[index] = value;
        self.value_mut(value).add_usage(Usage::new(inst, index));
    }

    pub fn push_operand(&mut self, inst: Inst, value: Value) {
        let index = self.inst(inst).operands.len();
        self.inst_mut(inst).operands.push(value);
        self.value_mut(value).add_usage(Usage::new(inst, index));
    }

    /// Replaces every operand of `inst`
    pub fn set_operands(&mut self, inst: Inst, operands: Vec<Value>) {
        let old = std::mem::take(&mut self.inst_mut(inst).operands);
        for (index, value) in old.into_iter().enumerate() {
            self.value_mut(value).remove_usage(Usage::new(inst, index));
        }
        for (index, &value) in operands.iter().enumerate() {
            self.value_mut(value).add_usage(Usage::new(inst, index));
        }
        self.inst_mut(inst).operands = operands;
    }

    /// Rewrites every use of `old` to use `new`
    pub fn replace_all_uses_with(&mut self, old: Value, new: Value) {
        self.replace_all_uses_with_fn(old, |_| Some(new));
    }

    /// Rewrites every use of `old` with the value `replace` computes for it.
    /// Usages for which `replace` returns `None` are left alone.
    pub fn replace_all_uses_with_fn(&mut self, old: Value, mut replace: impl FnMut(Usage) -> Option<Value>) {
        for usage in self.value(old).usages_sorted() {
            if let Some(new) = replace(usage) {
                if new != old {
                    self.set_operand(usage.inst, usage.operand as usize, new);
                }
            }
        }
    }

    /// Destroys `inst`, everything nested in it and its results
    pub fn destroy_inst(&mut self, inst: Inst) {
        for &result in &self.inst(inst).results {
            assert!(
                !self.value(result).is_used(),
                "cannot destroy instruction {:?}: result {:?} is still in use",
                inst,
                result
            );
        }
        if self.inst(inst).block.is_some() {
            self.unlink(inst);
        }
        self.set_operands(inst, Vec::new());
        for block in self.inst(inst).kind.nested_blocks().into_iter().rev() {
            self.destroy_block(block);
        }
        let results = std::mem::take(&mut self.inst_mut(inst).results);
        for result in results {
            self.value_mut(result).kind = ValueKind::InstructionResult { inst: None };
            self.destroy_value(result);
        }
        trace!("destroyed {:?}", inst);
        self.insts.free(inst);
    }

    // ===== Blocks =====

    /// Creates an empty block. Multi-in blocks may carry parameters.
    pub fn create_block(&mut self, multi_in: bool) -> Block {
        self.blocks.alloc(BlockData::new(multi_in))
    }

    pub fn set_block_params(&mut self, block: Block, params: Vec<Value>) {
        assert!(
            params.is_empty() || self.block(block).multi_in,
            "block {:?} cannot take parameters: it is not a multi-in block",
            block
        );
        for old in std::mem::take(&mut self.block_mut(block).params) {
            self.value_mut(old).kind = ValueKind::BlockParam { block: None };
        }
        for &param in &params {
            match self.value(param).kind {
                ValueKind::BlockParam { block: None } => {}
                _ => panic!("value {:?} is not an unowned block parameter", param),
            }
            self.value_mut(param).kind = ValueKind::BlockParam { block: Some(block) };
        }
        self.block_mut(block).params = params;
    }

    pub(crate) fn destroy_block(&mut self, block: Block) {
        let insts: Vec<Inst> = self.block_insts(block).collect();
        for inst in insts.into_iter().rev() {
            self.destroy_inst(inst);
        }
        for param in std::mem::take(&mut self.block_mut(block).params) {
            self.value_mut(param).kind = ValueKind::BlockParam { block: None };
            self.destroy_value(param);
        }
        self.blocks.free(block);
    }

    // ===== Control instructions =====

    pub fn true_block(&self, inst: Inst) -> Block {
        match &self.inst(inst).kind {
            InstKind::If { true_block, .. } => *true_block,
            other => panic!("true_block of non-if instruction {}", other.name()),
        }
    }

    pub fn false_block(&self, inst: Inst) -> Block {
        match &self.inst(inst).kind {
            InstKind::If { false_block, .. } => *false_block,
            other => panic!("false_block of non-if instruction {}", other.name()),
        }
    }

    pub fn loop_initializer(&self, inst: Inst) -> Option<Block> {
        match &self.inst(inst).kind {
            InstKind::Loop { initializer, .. } => *initializer,
            other => panic!("initializer of non-loop instruction {}", other.name()),
        }
    }

    pub fn loop_body(&self, inst: Inst) -> Block {
        match &self.inst(inst).kind {
            InstKind::Loop { body, .. } => *body,
            other => panic!("body of non-loop instruction {}", other.name()),
        }
    }

    pub fn loop_continuing(&self, inst: Inst) -> Block {
        match &self.inst(inst).kind {
            InstKind::Loop { continuing, .. } => *continuing,
            other => panic!("continuing of non-loop instruction {}", other.name()),
        }
    }

    pub fn cases(&self, inst: Inst) -> &[Case] {
        match &self.inst(inst).kind {
            InstKind::Switch { cases } => cases,
            other => panic!("cases of non-switch instruction {}", other.name()),
        }
    }

    /// The initializer block of a loop, created on first request
    pub fn ensure_initializer(&mut self, inst: Inst) -> Block {
        if let Some(block) = self.loop_initializer(inst) {
            return block;
        }
        let block = self.create_block(false);
        self.block_mut(block).parent = Some(inst);
        if let InstKind::Loop { initializer, .. } = &mut self.inst_mut(inst).kind {
            *initializer = Some(block);
        }
        block
    }

    /// Adds a case to a switch and returns its block
    pub fn add_case(&mut self, inst: Inst, selectors: Vec<Option<ConstId>>) -> Block {
        assert!(!selectors.is_empty(), "a switch case needs at least one selector");
        let block = self.create_block(false);
        self.block_mut(block).parent = Some(inst);
        match &mut self.inst_mut(inst).kind {
            InstKind::Switch { cases } => cases.push(Case { selectors, block }),
            other => panic!("cannot add a case to {}", other.name()),
        }
        block
    }

    pub fn set_binding_point(&mut self, inst: Inst, point: BindingPoint) {
        match &mut self.inst_mut(inst).kind {
            InstKind::Var { binding, .. } => *binding = Some(point),
            other => panic!("binding point on non-var instruction {}", other.name()),
        }
    }

    pub fn set_var_attributes(&mut self, inst: Inst, attrs: IoAttributes) {
        match &mut self.inst_mut(inst).kind {
            InstKind::Var { attributes, .. } => *attributes = attrs,
            other => panic!("IO attributes on non-var instruction {}", other.name()),
        }
    }

    pub fn set_override_id(&mut self, inst: Inst, override_id: u16) {
        match &mut self.inst_mut(inst).kind {
            InstKind::Override { id } => *id = Some(override_id),
            other => panic!("override id on non-override instruction {}", other.name()),
        }
    }

    // ===== Functions =====

    /// Creates a function that is not yet part of the module's function list
    pub fn create_function(&mut self, name: impl Into<String>, return_type: TypeId) -> Function {
        let block = self.create_block(false);
        let name = name.into();
        debug!("created function '{}'", name);
        self.funcs.alloc(FunctionData::new(name, return_type, block))
    }

    /// Appends `func` to the function list
    pub fn add_function(&mut self, func: Function) {
        assert!(
            !self.functions.contains(&func),
            "function '{}' is already in the module",
            self.function(func).name
        );
        self.functions.push(func);
    }

    pub fn set_params(&mut self, func: Function, params: Vec<Value>) {
        for old in std::mem::take(&mut self.function_mut(func).params) {
            if let ValueKind::FunctionParam { func: owner, .. } = &mut self.value_mut(old).kind {
                *owner = None;
            }
        }
        for (i, &param) in params.iter().enumerate() {
            match &mut self.value_mut(param).kind {
                ValueKind::FunctionParam { func: owner @ None, index, .. } => {
                    *owner = Some(func);
                    *index = i as u32;
                }
                _ => panic!("value {:?} is not an unowned function parameter", param),
            }
        }
        self.function_mut(func).params = params;
    }

    pub fn set_param_attributes(&mut self, param: Value, attrs: IoAttributes) {
        match &mut self.value_mut(param).kind {
            ValueKind::FunctionParam { attributes, .. } => *attributes = attrs,
            _ => panic!("value {:?} is not a function parameter", param),
        }
    }

    pub fn set_param_binding_point(&mut self, param: Value, point: BindingPoint) {
        match &mut self.value_mut(param).kind {
            ValueKind::FunctionParam { binding, .. } => *binding = Some(point),
            _ => panic!("value {:?} is not a function parameter", param),
        }
    }

    /// Functions called directly from `func`, in first-call order
    pub fn direct_callees(&self, func: Function) -> Vec<Function> {
        let mut callees = Vec::new();
        for inst in self.walk(self.function(func).block) {
            if let InstKind::UserCall { target } = self.inst(inst).kind {
                if !callees.contains(&target) {
                    callees.push(target);
                }
            }
        }
        callees
    }

    /// Module functions ordered so that every callee precedes its callers
    pub fn dependency_ordered_functions(&self) -> Vec<Function> {
        let listed: HashSet<Function> = self.functions.iter().copied().collect();
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.functions.len());
        for &func in &self.functions {
            self.visit_callees(func, &listed, &mut visited, &mut order);
        }
        order
    }

    fn visit_callees(
        &self,
        func: Function,
        listed: &HashSet<Function>,
        visited: &mut HashSet<Function>,
        order: &mut Vec<Function>,
    ) {
        if !listed.contains(&func) || !visited.insert(func) {
            return;
        }
        for callee in self.direct_callees(func) {
            self.visit_callees(callee, listed, visited, order);
        }
        order.push(func);
    }

    // ===== Traversal =====

    /// Pre-order list of every instruction in `block` and its nested blocks
    pub fn walk(&self, block: Block) -> Vec<Inst> {
        let mut out = Vec::new();
        self.walk_into(block, &mut out);
        out
    }

    fn walk_into(&self, block: Block, out: &mut Vec<Inst>) {
        for inst in self.block_insts(block) {
            out.push(inst);
            for nested in self.inst(inst).kind.nested_blocks() {
                self.walk_into(nested, out);
            }
        }
    }

    /// The outermost block enclosing `block`
    pub fn top_level_block(&self, block: Block) -> Option<Block> {
        let mut current = block;
        while let Some(parent) = self.block(current).parent {
            current = self.inst(parent).block?;
        }
        Some(current)
    }

    /// The function whose body contains `block`
    pub fn function_of_block(&self, block: Block) -> Option<Function> {
        let top = self.top_level_block(block)?;
        self.funcs
            .iter()
            .find(|(_, data)| data.block == top)
            .map(|(func, _)| func)
    }

    /// Whether `block` is `ancestor` or nested inside it
    pub fn is_nested_in(&self, block: Block, ancestor: Block) -> bool {
        let mut current = block;
        loop {
            if current == ancestor {
                return true;
            }
            match self.block(current).parent.and_then(|p| self.inst(p).block) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }
}
