//! Module validation
//!
//! The validator walks the whole module read-only and collects a diagnostic
//! for every structural or type violation it finds. Each diagnostic points at
//! the offending instruction in the module's disassembly and names its
//! enclosing block; the disassembly itself is attached to the failure so the
//! rendered message can be read on its own.

pub mod signatures;

use crate::attributes::{BindingPoint, BuiltinValue, PipelineStage};
use crate::block::Block;
use crate::constant::Scalar;
use crate::disasm::{disassemble_with_map, Disassembly};
use crate::function::Function;
use crate::instruction::{Inst, InstKind};
use crate::module::Module;
use crate::ops::{BinaryOp, UnaryOp};
use crate::types::{AddressSpace, Type, TypeId};
use crate::value::{Usage, Value, ValueKind};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use shir_common::{Diagnostic, Diagnostics, Failure};
use std::collections::{HashMap, HashSet};

/// Opt-in relaxations of the validation rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Allow `let` instructions in the root block
    pub allow_root_lets: bool,
    /// Allow two resource variables to share a binding point
    pub allow_duplicate_bindings: bool,
    /// Allow pointer-typed struct members
    pub allow_pointers_in_structs: bool,
}

/// Validates `module` with the default capabilities
pub fn validate(module: &Module) -> Result<(), Failure> {
    validate_with(module, &Capabilities::default())
}

/// Validates `module`, returning every violation found
pub fn validate_with(module: &Module, capabilities: &Capabilities) -> Result<(), Failure> {
    let mut validator = Validator::new(module, capabilities);
    validator.run();
    if validator.diagnostics.has_errors() {
        debug!("validation failed: {}", validator.diagnostics.summary());
        let text = validator.dis.text;
        Err(Failure::from_diagnostics(validator.diagnostics).with_context(text))
    } else {
        debug!("validation passed");
        Ok(())
    }
}

/// Where an exit may appear relative to its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopPart {
    Initializer,
    Body,
    Continuing,
}

struct Validator<'a> {
    module: &'a Module,
    capabilities: &'a Capabilities,
    dis: Disassembly,
    diagnostics: Diagnostics,
    visited: HashSet<Block>,
    scopes: Vec<HashSet<Value>>,
    /// Enclosing control instructions with the nested block being checked
    control_stack: Vec<(Inst, Block)>,
    current_function: Option<Function>,
}

impl<'a> Validator<'a> {
    fn new(module: &'a Module, capabilities: &'a Capabilities) -> Self {
        Self {
            module,
            capabilities,
            dis: disassemble_with_map(module),
            diagnostics: Diagnostics::new(),
            visited: HashSet::new(),
            scopes: Vec::new(),
            control_stack: Vec::new(),
            current_function: None,
        }
    }

    // ===== Diagnostics =====

    fn error(&mut self, message: impl Into<String>) {
        self.diagnostics.add(Diagnostic::error(message));
    }

    fn inst_diagnostic(&self, inst: Inst, message: impl Into<String>) -> Diagnostic {
        let module = self.module;
        let data = module.inst(inst);
        let mut diag = Diagnostic::error(format!("{}: {}", data.kind.name(), message.into()));
        if let Some(span) = self.dis.inst_span(inst) {
            diag = diag.with_span(span.clone());
        }
        if let Some(name) = data.block().and_then(|b| self.dis.block_name(b)) {
            diag = diag.with_note(format!("in block {}", name));
        }
        diag
    }

    fn inst_error(&mut self, inst: Inst, message: impl Into<String>) {
        let diag = self.inst_diagnostic(inst, message);
        self.diagnostics.add(diag);
    }

    fn block_error(&mut self, block: Block, message: impl Into<String>) {
        let name = self.dis.block_name(block).unwrap_or("<unnamed>");
        let mut diag = Diagnostic::error(format!("block {}: {}", name, message.into()));
        if let Some(span) = self.dis.block_span(block) {
            diag = diag.with_span(span.clone());
        }
        self.diagnostics.add(diag);
    }

    fn function_error(&mut self, func: Function, message: impl Into<String>) {
        let module = self.module;
        let name = module.function(func).name.clone();
        let mut diag = Diagnostic::error(format!("function '{}': {}", name, message.into()));
        if let Some(span) = self.dis.function_span(func) {
            diag = diag.with_span(span.clone());
        }
        self.diagnostics.add(diag);
    }

    fn type_name(&self, ty: TypeId) -> String {
        let module = self.module;
        module.types.name(ty)
    }

    // ===== Driver =====

    fn run(&mut self) {
        self.check_types();
        self.check_root();
        self.check_functions();
        self.check_recursion();
    }

    fn check_types(&mut self) {
        let module = self.module;
        if self.capabilities.allow_pointers_in_structs {
            return;
        }
        let mut errors = Vec::new();
        for (_, ty) in module.types.iter() {
            if let Type::Struct { name, members, .. } = ty {
                for member in members {
                    if module.types.contains_pointer(member.ty) {
                        errors.push(format!(
                            "struct '{}' member '{}' holds a pointer ({})",
                            name,
                            member.name,
                            self.type_name(member.ty)
                        ));
                    }
                }
            }
        }
        for message in errors {
            self.error(message);
        }
    }

    fn check_root(&mut self) {
        let module = self.module;
        let root = module.root();
        self.visited.insert(root);
        self.scopes.push(HashSet::new());

        let mut bindings: HashMap<BindingPoint, Inst> = HashMap::new();
        let mut override_ids: HashMap<u16, Inst> = HashMap::new();
        let insts: Vec<Inst> = module.block_insts(root).collect();
        for inst in insts {
            if module.inst(inst).block() != Some(root) {
                self.inst_error(inst, "instruction is linked into the wrong block");
            }
            match &module.inst(inst).kind {
                InstKind::Var { binding, .. } => {
                    let binding = *binding;
                    self.check_root_var(inst, binding, &mut bindings);
                }
                InstKind::Override { id } => {
                    if let Some(id) = *id {
                        if override_ids.insert(id, inst).is_some() {
                            self.inst_error(inst, format!("override id @id({}) is already in use", id));
                        }
                    }
                }
                InstKind::Let if self.capabilities.allow_root_lets => {}
                other => {
                    let name = other.name();
                    self.inst_error(inst, format!("{} is not allowed in the root block", name));
                    continue;
                }
            }
            self.check_inst(inst);
            self.define_results(inst);
        }
        // The root scope stays open for every function body.
    }

    fn check_root_var(&mut self, inst: Inst, binding: Option<BindingPoint>, bindings: &mut HashMap<BindingPoint, Inst>) {
        let module = self.module;
        let Some(&result) = module.results(inst).first() else {
            return;
        };
        let Some((space, _, _)) = module.types.pointer(module.ty(result)) else {
            return;
        };
        match space {
            AddressSpace::Function => {
                self.inst_error(inst, "root block variables cannot be in the function address space");
            }
            AddressSpace::Uniform | AddressSpace::Storage | AddressSpace::Handle => match binding {
                None => self.inst_error(inst, format!("resource variable in the {} address space needs a binding point", space)),
                Some(point) => {
                    if bindings.insert(point, inst).is_some() && !self.capabilities.allow_duplicate_bindings {
                        self.inst_error(inst, format!("binding point {} is already used by another variable", point));
                    }
                }
            },
            AddressSpace::Private | AddressSpace::Workgroup => {
                if binding.is_some() {
                    self.inst_error(inst, format!("variables in the {} address space cannot have a binding point", space));
                }
            }
        }
    }

    fn check_functions(&mut self) {
        let module = self.module;
        let mut names: HashSet<String> = HashSet::new();
        for &func in module.functions() {
            if !module.is_function_alive(func) {
                self.error(format!("function list holds destroyed function {:?}", func));
                continue;
            }
            let name = module.function(func).name.clone();
            if !names.insert(name.clone()) {
                self.function_error(func, format!("duplicate function name '{}'", name));
            }
            self.check_function(func);
        }
        self.current_function = None;
    }

    fn check_function(&mut self, func: Function) {
        let module = self.module;
        self.current_function = Some(func);
        let data = module.function(func);
        let params = data.params().to_vec();
        let body = data.block();
        trace!("validating function '{}'", data.name);

        let mut scope = HashSet::new();
        for (index, &param) in params.iter().enumerate() {
            if !module.is_value_alive(param) {
                self.function_error(func, format!("parameter {} is a destroyed value", index));
                continue;
            }
            match module.value(param).kind {
                ValueKind::FunctionParam { func: Some(owner), index: i, .. } if owner == func && i as usize == index => {}
                _ => self.function_error(func, format!("parameter {} is not owned by this function at that index", index)),
            }
            if module.ty(param) == TypeId::VOID {
                self.function_error(func, format!("parameter {} has type void", index));
            }
            scope.insert(param);
        }
        self.check_entry_point(func);

        self.scopes.push(scope);
        self.control_stack.clear();
        self.check_block(body);
        self.scopes.pop();
    }

    fn check_entry_point(&mut self, func: Function) {
        let module = self.module;
        let data = module.function(func);
        let stage = data.stage;
        let workgroup_size = data.workgroup_size;
        let return_type = data.return_type;

        match (stage, workgroup_size) {
            (Some(PipelineStage::Compute), None) => {
                self.function_error(func, "compute entry point needs a workgroup size");
            }
            (Some(PipelineStage::Compute), Some(size)) => self.check_workgroup_size(func, size),
            (_, Some(_)) => {
                self.function_error(func, "workgroup size is only allowed on compute entry points");
            }
            (_, None) => {}
        }
        let Some(stage) = stage else {
            return;
        };
        if stage == PipelineStage::Compute && return_type != TypeId::VOID {
            self.function_error(func, "compute entry point must return void");
        }

        let mut inputs = Vec::new();
        for &param in module.function(func).params() {
            if !module.is_value_alive(param) {
                continue;
            }
            if let ValueKind::FunctionParam { attributes, .. } = &module.value(param).kind {
                inputs.extend(attributes.builtin);
            }
            self.collect_member_builtins(module.ty(param), &mut inputs);
        }
        let mut outputs = Vec::new();
        outputs.extend(module.function(func).return_attributes.builtin);
        if return_type != TypeId::VOID {
            self.collect_member_builtins(return_type, &mut outputs);
        }

        for (what, builtins) in [("inputs", &inputs), ("outputs", &outputs)] {
            let mut seen = HashSet::new();
            for builtin in builtins {
                if !seen.insert(*builtin) {
                    self.function_error(func, format!("builtin '{}' appears more than once in the entry point {}", builtin, what));
                }
            }
        }
        if stage == PipelineStage::Vertex && !outputs.contains(&BuiltinValue::Position) {
            self.function_error(func, "vertex entry point must return a position builtin");
        }
    }

    fn collect_member_builtins(&self, ty: TypeId, out: &mut Vec<BuiltinValue>) {
        let module = self.module;
        if let Some(members) = module.types.struct_members(ty) {
            out.extend(members.iter().filter_map(|m| m.attributes.builtin));
        }
    }

    fn check_workgroup_size(&mut self, func: Function, size: [Value; 3]) {
        let module = self.module;
        let mut element_type = None;
        for (dim, value) in size.into_iter().enumerate() {
            if !module.is_value_alive(value) {
                self.function_error(func, format!("workgroup size dimension {} is a destroyed value", dim));
                continue;
            }
            let ty = module.ty(value);
            if !module.types.is_integer_scalar(ty) {
                self.function_error(func, format!("workgroup size dimension {} must be i32 or u32, got {}", dim, self.type_name(ty)));
                continue;
            }
            match element_type {
                None => element_type = Some(ty),
                Some(first) if first != ty => {
                    self.function_error(func, "workgroup size values must all be i32 or all be u32");
                }
                Some(_) => {}
            }
            let data = module.value(value);
            if let Some(scalar) = module.scalar_of(value) {
                if scalar.as_i64().unwrap_or(0) <= 0 {
                    self.function_error(func, format!("workgroup size dimension {} must be greater than zero", dim));
                }
            } else {
                let is_override = data.instruction().is_some_and(|inst| {
                    matches!(module.inst(inst).kind, InstKind::Override { .. })
                        && module.inst(inst).block() == Some(module.root())
                });
                if !is_override {
                    self.function_error(func, format!("workgroup size dimension {} must be a constant or an override", dim));
                }
            }
        }
    }

    fn check_recursion(&mut self) {
        let module = self.module;
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }
        fn visit(v: &mut Validator<'_>, func: Function, marks: &mut HashMap<Function, Mark>) {
            match marks.get(&func) {
                Some(Mark::Done) => return,
                Some(Mark::Active) => {
                    v.function_error(func, "function is recursive");
                    return;
                }
                None => {}
            }
            marks.insert(func, Mark::Active);
            for callee in v.module.direct_callees(func) {
                if v.module.is_function_alive(callee) {
                    visit(v, callee, marks);
                }
            }
            marks.insert(func, Mark::Done);
        }

        let mut marks = HashMap::new();
        let funcs: Vec<Function> = module.functions().to_vec();
        for func in funcs {
            if module.is_function_alive(func) {
                visit(self, func, &mut marks);
            }
        }
    }

    // ===== Blocks =====

    /// Opens the scope of `block`, or reports why it cannot be checked
    fn enter_block(&mut self, block: Block) -> bool {
        let module = self.module;
        if !module.is_block_alive(block) {
            self.error(format!("reference to destroyed block {:?}", block));
            return false;
        }
        if !self.visited.insert(block) {
            self.block_error(block, "block is reachable from more than one place");
            return false;
        }
        let params = module.block(block).params().to_vec();
        if !params.is_empty() && !module.block(block).is_multi_in() {
            self.block_error(block, "only multi-in blocks can have parameters");
        }
        for &param in &params {
            match module.value(param).kind {
                ValueKind::BlockParam { block: Some(owner) } if owner == block => {}
                _ => self.block_error(block, "block parameter is not owned by this block"),
            }
        }
        self.scopes.push(params.into_iter().collect());
        true
    }

    fn exit_block(&mut self) {
        self.scopes.pop();
    }

    fn check_block(&mut self, block: Block) {
        if self.enter_block(block) {
            self.check_block_body(block);
            self.exit_block();
        }
    }

    fn check_block_body(&mut self, block: Block) {
        let module = self.module;
        let insts: Vec<Inst> = module.block_insts(block).collect();
        match insts.last() {
            None if self.is_loop_continuing(block) => {}
            None => self.block_error(block, "block is empty, it must end in a terminator"),
            Some(&last) if !module.inst(last).kind.is_terminator() => {
                self.block_error(block, "block does not end in a terminator");
            }
            Some(_) => {}
        }
        for (position, &inst) in insts.iter().enumerate() {
            if module.inst(inst).block() != Some(block) {
                self.inst_error(inst, "instruction is linked into the wrong block");
            }
            if module.inst(inst).kind.is_terminator() && position + 1 != insts.len() {
                self.inst_error(inst, "terminator is not the last instruction of its block");
            }
            self.check_inst(inst);
            self.check_nested(inst);
            self.define_results(inst);
        }
    }

    fn is_loop_continuing(&self, block: Block) -> bool {
        let module = self.module;
        module
            .block(block)
            .parent()
            .is_some_and(|p| matches!(module.inst(p).kind, InstKind::Loop { continuing, .. } if continuing == block))
    }

    fn define_results(&mut self, inst: Inst) {
        let module = self.module;
        let results = module.results(inst).to_vec();
        if let Some(scope) = self.scopes.last_mut() {
            scope.extend(results);
        }
    }

    fn check_nested(&mut self, inst: Inst) {
        let module = self.module;
        match module.inst(inst).kind.clone() {
            InstKind::If { true_block, false_block } => {
                for block in [true_block, false_block] {
                    self.control_stack.push((inst, block));
                    self.check_block(block);
                    self.control_stack.pop();
                }
            }
            InstKind::Switch { cases } => {
                for case in cases {
                    self.control_stack.push((inst, case.block));
                    self.check_block(case.block);
                    self.control_stack.pop();
                }
            }
            InstKind::Loop { initializer, body, continuing } => {
                let init_entered = match initializer {
                    Some(init) => {
                        let entered = self.enter_block(init);
                        if entered {
                            self.control_stack.push((inst, init));
                            self.check_block_body(init);
                            self.control_stack.pop();
                        }
                        entered
                    }
                    None => false,
                };
                if self.enter_block(body) {
                    self.control_stack.push((inst, body));
                    self.check_block_body(body);
                    self.control_stack.pop();

                    // Values of the body are visible in the continuing block.
                    self.control_stack.push((inst, continuing));
                    self.check_block(continuing);
                    self.control_stack.pop();
                    self.exit_block();
                }
                if init_entered {
                    self.exit_block();
                }
            }
            _ => {}
        }
    }

    // ===== Instructions =====

    fn in_scope(&self, value: Value) -> bool {
        self.scopes.iter().any(|scope| scope.contains(&value))
    }

    /// Operand and result bookkeeping shared by every kind. Returns false when
    /// a dangling reference makes type checking impossible.
    fn check_edges(&mut self, inst: Inst) -> bool {
        let module = self.module;
        let operands = module.operands(inst).to_vec();
        let mut ok = true;
        for (index, &operand) in operands.iter().enumerate() {
            if !module.is_value_alive(operand) {
                self.inst_error(inst, format!("operand {} is a destroyed value", index));
                ok = false;
                continue;
            }
            if !module.value(operand).usages_unsorted().contains(&Usage::new(inst, index)) {
                self.inst_error(inst, format!("operand {} is missing from its value's use list", index));
            }
            let is_constant = module.value(operand).constant().is_some();
            if !is_constant && !self.in_scope(operand) {
                self.inst_error(inst, format!("operand {} is not in scope", index));
            }
        }

        let results = module.results(inst).to_vec();
        for (index, &result) in results.iter().enumerate() {
            if !module.is_value_alive(result) {
                self.inst_error(inst, format!("result {} is a destroyed value", index));
                ok = false;
                continue;
            }
            if module.value(result).instruction() != Some(inst) {
                self.inst_error(inst, format!("result {} is not owned by this instruction", index));
            }
            if module.ty(result) == TypeId::VOID {
                self.inst_error(inst, format!("result {} has type void", index));
            }
            for usage in module.value(result).usages_unsorted() {
                let stale = !module.is_inst_alive(usage.inst)
                    || module.operands(usage.inst).get(usage.operand as usize) != Some(&result);
                if stale {
                    self.inst_error(inst, format!("result {} has a stale usage {:?}", index, usage));
                }
            }
        }
        ok
    }

    fn expect_counts(&mut self, inst: Inst, operands: std::ops::RangeInclusive<usize>, results: usize) -> bool {
        let module = self.module;
        let data = module.inst(inst);
        let (n_ops, n_res) = (data.operands().len(), data.results().len());
        let mut ok = true;
        if !operands.contains(&n_ops) {
            let expected = if operands.start() == operands.end() {
                operands.start().to_string()
            } else {
                format!("{} to {}", operands.start(), operands.end())
            };
            self.inst_error(inst, format!("expected {} operands, got {}", expected, n_ops));
            ok = false;
        }
        if n_res != results {
            self.inst_error(inst, format!("expected {} results, got {}", results, n_res));
            ok = false;
        }
        ok
    }

    fn check_inst(&mut self, inst: Inst) {
        let module = self.module;
        if !self.check_edges(inst) {
            return;
        }
        let kind = module.inst(inst).kind.clone();
        match kind {
            InstKind::Unary(op) => self.check_unary(inst, op),
            InstKind::Binary(op) => self.check_binary(inst, op),
            InstKind::Bitcast => self.check_bitcast(inst),
            InstKind::Convert => self.check_convert(inst),
            InstKind::Construct => self.check_construct(inst),
            InstKind::Access => self.check_access(inst),
            InstKind::Swizzle { indices } => self.check_swizzle(inst, &indices),
            InstKind::Load => self.check_load(inst),
            InstKind::LoadVectorElement => self.check_load_vector_element(inst),
            InstKind::Store => self.check_store(inst),
            InstKind::StoreVectorElement => self.check_store_vector_element(inst),
            InstKind::Var { binding, .. } => self.check_var(inst, binding),
            InstKind::Let => {
                if self.expect_counts(inst, 1..=1, 1) {
                    let (value, result) = (module.operand(inst, 0), module.result(inst));
                    self.expect_same(inst, module.ty(result), module.ty(value), "result");
                }
            }
            InstKind::Override { .. } => self.check_override(inst),
            InstKind::UserCall { target } => self.check_user_call(inst, target),
            InstKind::BuiltinCall(builtin) => {
                let args: Vec<TypeId> = module.operands(inst).iter().map(|v| module.ty(*v)).collect();
                let result = match module.results(inst) {
                    [] => None,
                    [r] => Some(module.ty(*r)),
                    _ => {
                        self.inst_error(inst, "builtin calls have at most one result");
                        return;
                    }
                };
                if let Err(mismatch) = signatures::check_builtin_call(&module.types, builtin, &args, result) {
                    let mut diag = self.inst_diagnostic(inst, mismatch.message);
                    diag.notes.extend(mismatch.notes);
                    self.diagnostics.add(diag);
                }
            }
            InstKind::Discard => {
                self.expect_counts(inst, 0..=0, 0);
                let stage = self.current_function.and_then(|f| module.function(f).stage);
                if matches!(stage, Some(s) if s != PipelineStage::Fragment) {
                    self.inst_error(inst, "discard is only allowed in fragment shaders");
                }
            }
            InstKind::TerminateInvocation | InstKind::Unreachable => {
                self.expect_counts(inst, 0..=0, 0);
            }
            InstKind::Return { func } => self.check_return(inst, func),
            InstKind::If { .. } => {
                if self.expect_counts(inst, 1..=1, module.results(inst).len()) {
                    let cond = module.ty(module.operand(inst, 0));
                    if cond != TypeId::BOOL {
                        self.inst_error(inst, format!("condition must be bool, got {}", self.type_name(cond)));
                    }
                }
            }
            InstKind::Loop { initializer, body, .. } => {
                self.expect_counts(inst, 0..=0, module.results(inst).len());
                let has_params = module.is_block_alive(body) && !module.block(body).params().is_empty();
                if has_params && initializer.is_none() {
                    self.inst_error(inst, "loop body has parameters but no initializer to provide them");
                }
            }
            InstKind::Switch { cases } => self.check_switch(inst, &cases),
            InstKind::ExitIf { target } => self.check_exit(inst, target, "an if"),
            InstKind::ExitLoop { target } => self.check_exit(inst, target, "a loop"),
            InstKind::ExitSwitch { target } => self.check_exit(inst, target, "a switch"),
            InstKind::Continue { target } => self.check_continue(inst, target),
            InstKind::NextIteration { target } => self.check_next_iteration(inst, target),
            InstKind::BreakIf { target, next_iter_count } => self.check_break_if(inst, target, next_iter_count),
        }
    }

    fn expect_same(&mut self, inst: Inst, got: TypeId, expected: TypeId, what: &str) -> bool {
        if got != expected {
            self.inst_error(
                inst,
                format!("{} type {} does not match {}", what, self.type_name(got), self.type_name(expected)),
            );
            return false;
        }
        true
    }

    fn operand_types(&self, inst: Inst) -> Vec<TypeId> {
        let module = self.module;
        module.operands(inst).iter().map(|v| module.ty(*v)).collect()
    }

    fn result_type(&self, inst: Inst) -> TypeId {
        let module = self.module;
        module.ty(module.result(inst))
    }

    fn check_unary(&mut self, inst: Inst, op: UnaryOp) {
        let module = self.module;
        if !self.expect_counts(inst, 1..=1, 1) {
            return;
        }
        let operand = self.operand_types(inst)[0];
        let result = self.result_type(inst);
        if !self.expect_same(inst, result, operand, "result") {
            return;
        }
        let scalar = module.types.scalar_of(operand);
        let ok = match op {
            UnaryOp::Negation => matches!(scalar, Some(TypeId::I32 | TypeId::F32 | TypeId::F16)),
            UnaryOp::Complement => matches!(scalar, Some(TypeId::I32 | TypeId::U32)),
            UnaryOp::Not => scalar == Some(TypeId::BOOL),
        };
        if !ok {
            self.inst_error(inst, format!("{} cannot be applied to {}", op, self.type_name(operand)));
        }
    }

    fn check_binary(&mut self, inst: Inst, op: BinaryOp) {
        let module = self.module;
        if !self.expect_counts(inst, 2..=2, 1) {
            return;
        }
        let types = &module.types;
        let ops = self.operand_types(inst);
        let (lhs, rhs) = (ops[0], ops[1]);
        let result = self.result_type(inst);
        let (lhs_scalar, rhs_scalar) = (types.scalar_of(lhs), types.scalar_of(rhs));

        if op.is_comparison() {
            let expected_width = types.width(lhs);
            let ok = lhs == rhs
                && lhs_scalar.is_some()
                && types.scalar_of(result) == Some(TypeId::BOOL)
                && types.width(result) == expected_width;
            if !ok {
                self.inst_error(
                    inst,
                    format!(
                        "{} of {} and {} cannot produce {}",
                        op,
                        self.type_name(lhs),
                        self.type_name(rhs),
                        self.type_name(result)
                    ),
                );
            }
            return;
        }

        let ok = if op.is_shift() {
            matches!(lhs_scalar, Some(TypeId::I32 | TypeId::U32))
                && rhs_scalar == Some(TypeId::U32)
                && types.width(lhs) == types.width(rhs)
                && result == lhs
        } else if op.is_bitwise() {
            matches!(lhs_scalar, Some(TypeId::I32 | TypeId::U32 | TypeId::BOOL)) && lhs == rhs && result == lhs
        } else if lhs == rhs {
            matches!(lhs_scalar, Some(s) if s != TypeId::BOOL) && result == lhs
                || op == BinaryOp::Multiply && matches!(types.ty(lhs), Type::Matrix { .. }) && result == lhs
        } else if op == BinaryOp::Multiply && (matches!(types.ty(lhs), Type::Matrix { .. }) || matches!(types.ty(rhs), Type::Matrix { .. })) {
            types.is_float_scalar(types.deepest_element(lhs))
                && types.deepest_element(lhs) == types.deepest_element(rhs)
                && types.deepest_element(result) == types.deepest_element(lhs)
        } else {
            // vector op scalar, either order
            let vector = if types.is_vector(lhs) { lhs } else { rhs };
            lhs_scalar == rhs_scalar && lhs_scalar != Some(TypeId::BOOL) && lhs_scalar.is_some() && result == vector
        };
        if !ok {
            self.inst_error(
                inst,
                format!(
                    "{} of {} and {} cannot produce {}",
                    op,
                    self.type_name(lhs),
                    self.type_name(rhs),
                    self.type_name(result)
                ),
            );
        }
    }

    fn check_bitcast(&mut self, inst: Inst) {
        let module = self.module;
        if !self.expect_counts(inst, 1..=1, 1) {
            return;
        }
        let from = self.operand_types(inst)[0];
        let to = self.result_type(inst);
        let types = &module.types;
        let numeric = |t: TypeId| types.scalar_of(t).is_some_and(|s| s != TypeId::BOOL);
        if !numeric(from) || !numeric(to) || types.size(from) != types.size(to) {
            self.inst_error(inst, format!("cannot bitcast {} to {}", self.type_name(from), self.type_name(to)));
        }
    }

    fn check_convert(&mut self, inst: Inst) {
        let module = self.module;
        if !self.expect_counts(inst, 1..=1, 1) {
            return;
        }
        let from = self.operand_types(inst)[0];
        let to = self.result_type(inst);
        let types = &module.types;
        let ok = types.scalar_of(from).is_some() && types.scalar_of(to).is_some() && types.width(from) == types.width(to);
        if !ok {
            self.inst_error(inst, format!("cannot convert {} to {}", self.type_name(from), self.type_name(to)));
        }
    }

    fn check_construct(&mut self, inst: Inst) {
        let module = self.module;
        if !self.expect_counts(inst, 0..=usize::MAX, 1) {
            return;
        }
        let result = self.result_type(inst);
        let args = self.operand_types(inst);
        let types = &module.types;
        if !types.is_constructible(result) {
            self.inst_error(inst, format!("{} is not constructible", self.type_name(result)));
            return;
        }
        if args.is_empty() {
            return;
        }
        let ok = if let Type::Vector { elem, width } = types.ty(result) {
            let mut total = 0;
            let mut same_scalar = true;
            for &arg in &args {
                same_scalar &= types.scalar_of(arg) == Some(*elem);
                total += types.width(arg).unwrap_or(1);
            }
            same_scalar && (total == *width || (args.len() == 1 && total == 1))
        } else if types.is_scalar(result) {
            args.len() == 1 && args[0] == result
        } else {
            types.element_count(result) == Some(args.len() as u32)
                && args
                    .iter()
                    .enumerate()
                    .all(|(i, arg)| types.element_at(result, i as u32) == Some(*arg))
        };
        if !ok {
            let names: Vec<String> = args.iter().map(|a| self.type_name(*a)).collect();
            self.inst_error(
                inst,
                format!("cannot construct {} from ({})", self.type_name(result), names.join(", ")),
            );
        }
    }

    fn check_access(&mut self, inst: Inst) {
        let module = self.module;
        if !self.expect_counts(inst, 2..=usize::MAX, 1) {
            return;
        }
        let operands = module.operands(inst).to_vec();
        let object_ty = module.ty(operands[0]);
        let result = self.result_type(inst);
        let pointer = module.types.pointer(object_ty);
        let mut current = pointer.map_or(object_ty, |(_, store, _)| store);

        for (i, &index) in operands[1..].iter().enumerate() {
            let index_ty = module.ty(index);
            if !module.types.is_integer_scalar(index_ty) {
                self.inst_error(inst, format!("index {} must be i32 or u32, got {}", i, self.type_name(index_ty)));
                return;
            }
            let constant = module.scalar_of(index).and_then(Scalar::as_i64);
            let next = match constant {
                Some(c) if c < 0 => None,
                Some(c) => module.types.element_at(current, c as u32),
                None if module.types.struct_members(current).is_some() => {
                    self.inst_error(inst, format!("index {} into struct {} must be a constant", i, self.type_name(current)));
                    return;
                }
                None => module.types.dynamic_element(current),
            };
            match next {
                Some(next) => current = next,
                None => {
                    self.inst_error(inst, format!("index {} is out of bounds for {}", i, self.type_name(current)));
                    return;
                }
            }
        }

        match pointer {
            Some((space, _, access)) => {
                let ok = module.types.pointer(result) == Some((space, current, access));
                if !ok {
                    self.inst_error(
                        inst,
                        format!(
                            "result type {} does not match ptr<{}, {}, {}>",
                            self.type_name(result),
                            space,
                            self.type_name(current),
                            access
                        ),
                    );
                }
            }
            None => {
                self.expect_same(inst, result, current, "result");
            }
        }
    }

    fn check_swizzle(&mut self, inst: Inst, indices: &[u32]) {
        let module = self.module;
        if !self.expect_counts(inst, 1..=1, 1) {
            return;
        }
        let vector = self.operand_types(inst)[0];
        let result = self.result_type(inst);
        let types = &module.types;
        let Some(width) = types.width(vector) else {
            self.inst_error(inst, format!("operand must be a vector, got {}", self.type_name(vector)));
            return;
        };
        if indices.is_empty() || indices.len() > 4 {
            self.inst_error(inst, format!("expected 1 to 4 indices, got {}", indices.len()));
            return;
        }
        if let Some(bad) = indices.iter().find(|i| **i >= width) {
            self.inst_error(inst, format!("index {} out of range for {}", bad, self.type_name(vector)));
            return;
        }
        let elem = types.scalar_of(vector);
        let ok = if indices.len() == 1 {
            Some(result) == elem
        } else {
            types.scalar_of(result) == elem && types.width(result) == Some(indices.len() as u32)
        };
        if !ok {
            self.inst_error(inst, format!("result type {} does not match the swizzle", self.type_name(result)));
        }
    }

    /// The pointer parts of operand `index`, reporting non-pointers
    fn pointer_operand(&mut self, inst: Inst, index: usize) -> Option<(AddressSpace, TypeId, crate::types::Access)> {
        let module = self.module;
        let ty = module.ty(module.operand(inst, index));
        let pointer = module.types.pointer(ty);
        if pointer.is_none() {
            self.inst_error(inst, format!("operand {} must be a pointer, got {}", index, self.type_name(ty)));
        }
        pointer
    }

    fn check_load(&mut self, inst: Inst) {
        if !self.expect_counts(inst, 1..=1, 1) {
            return;
        }
        let Some((_, store, access)) = self.pointer_operand(inst, 0) else {
            return;
        };
        if !access.can_read() {
            self.inst_error(inst, "cannot load through a write-only pointer");
        }
        self.expect_same(inst, self.result_type(inst), store, "result");
    }

    fn check_load_vector_element(&mut self, inst: Inst) {
        let module = self.module;
        if !self.expect_counts(inst, 2..=2, 1) {
            return;
        }
        let Some((_, store, access)) = self.pointer_operand(inst, 0) else {
            return;
        };
        if !access.can_read() {
            self.inst_error(inst, "cannot load through a write-only pointer");
        }
        self.check_vector_element_index(inst, store);
        if let Some(elem) = module.types.scalar_of(store) {
            self.expect_same(inst, self.result_type(inst), elem, "result");
        }
    }

    fn check_vector_element_index(&mut self, inst: Inst, store: TypeId) {
        let module = self.module;
        if !module.types.is_vector(store) {
            self.inst_error(inst, format!("pointer must point to a vector, got {}", self.type_name(store)));
        }
        let index = module.ty(module.operand(inst, 1));
        if !module.types.is_integer_scalar(index) {
            self.inst_error(inst, format!("index must be i32 or u32, got {}", self.type_name(index)));
        }
    }

    fn check_store(&mut self, inst: Inst) {
        let module = self.module;
        if !self.expect_counts(inst, 2..=2, 0) {
            return;
        }
        let Some((_, store, access)) = self.pointer_operand(inst, 0) else {
            return;
        };
        if !access.can_write() {
            self.inst_error(inst, "cannot store through a read-only pointer");
        }
        let value = module.ty(module.operand(inst, 1));
        self.expect_same(inst, value, store, "stored value");
    }

    fn check_store_vector_element(&mut self, inst: Inst) {
        let module = self.module;
        if !self.expect_counts(inst, 3..=3, 0) {
            return;
        }
        let Some((_, store, access)) = self.pointer_operand(inst, 0) else {
            return;
        };
        if !access.can_write() {
            self.inst_error(inst, "cannot store through a read-only pointer");
        }
        self.check_vector_element_index(inst, store);
        if let Some(elem) = module.types.scalar_of(store) {
            let value = module.ty(module.operand(inst, 2));
            self.expect_same(inst, value, elem, "stored value");
        }
    }

    fn check_var(&mut self, inst: Inst, binding: Option<BindingPoint>) {
        let module = self.module;
        if !self.expect_counts(inst, 0..=1, 1) {
            return;
        }
        let result = self.result_type(inst);
        let Some((space, store, _)) = module.types.pointer(result) else {
            self.inst_error(inst, format!("result must be a pointer, got {}", self.type_name(result)));
            return;
        };
        let in_function = self.current_function.is_some();
        if in_function && space != AddressSpace::Function {
            self.inst_error(inst, format!("function variables must be in the function address space, got {}", space));
        }
        if in_function && binding.is_some() {
            self.inst_error(inst, "function variables cannot have a binding point");
        }
        if let Some(&init) = module.operands(inst).first() {
            if matches!(space, AddressSpace::Handle | AddressSpace::Uniform | AddressSpace::Storage | AddressSpace::Workgroup) {
                self.inst_error(inst, format!("variables in the {} address space cannot have an initializer", space));
            }
            self.expect_same(inst, module.ty(init), store, "initializer");
        }
    }

    fn check_override(&mut self, inst: Inst) {
        let module = self.module;
        if self.current_function.is_some() {
            self.inst_error(inst, "overrides are only allowed in the root block");
        }
        if !self.expect_counts(inst, 0..=1, 1) {
            return;
        }
        let result = self.result_type(inst);
        if !module.types.is_scalar(result) {
            self.inst_error(inst, format!("override type must be a scalar, got {}", self.type_name(result)));
        }
        if let Some(&init) = module.operands(inst).first() {
            self.expect_same(inst, module.ty(init), result, "initializer");
        }
    }

    fn check_user_call(&mut self, inst: Inst, target: Function) {
        let module = self.module;
        if !module.is_function_alive(target) {
            self.inst_error(inst, "call target is a destroyed function");
            return;
        }
        let callee = module.function(target);
        let name = callee.name.clone();
        if !module.functions().contains(&target) {
            self.inst_error(inst, format!("call target '{}' is not in the module", name));
        }
        if callee.is_entry_point() {
            self.inst_error(inst, format!("cannot call entry point '{}'", name));
        }
        let params: Vec<TypeId> = callee.params().iter().map(|p| module.ty(*p)).collect();
        let return_type = callee.return_type;
        let args = self.operand_types(inst);
        if args.len() != params.len() {
            self.inst_error(
                inst,
                format!("'{}' takes {} arguments, got {}", name, params.len(), args.len()),
            );
        } else {
            for (i, (arg, param)) in args.iter().zip(&params).enumerate() {
                self.expect_same(inst, *arg, *param, &format!("argument {}", i));
            }
        }
        let results = module.results(inst).to_vec();
        match (return_type == TypeId::VOID, results.as_slice()) {
            (true, []) => {}
            (false, [r]) => {
                self.expect_same(inst, module.ty(*r), return_type, "result");
            }
            _ => self.inst_error(
                inst,
                format!("call to '{}' has {} results, its return type is {}", name, results.len(), self.type_name(return_type)),
            ),
        }
    }

    fn check_return(&mut self, inst: Inst, func: Function) {
        let module = self.module;
        if self.current_function != Some(func) {
            self.inst_error(inst, "return does not belong to the enclosing function");
            return;
        }
        let return_type = module.function(func).return_type;
        let expected = usize::from(return_type != TypeId::VOID);
        if !self.expect_counts(inst, expected..=expected, 0) {
            return;
        }
        if let Some(&value) = module.operands(inst).first() {
            self.expect_same(inst, module.ty(value), return_type, "return value");
        }
    }

    fn check_switch(&mut self, inst: Inst, cases: &[crate::instruction::Case]) {
        let module = self.module;
        if !self.expect_counts(inst, 1..=1, module.results(inst).len()) {
            return;
        }
        let cond = module.ty(module.operand(inst, 0));
        if !module.types.is_integer_scalar(cond) {
            self.inst_error(inst, format!("condition must be i32 or u32, got {}", self.type_name(cond)));
        }
        let defaults = cases.iter().filter(|c| c.is_default()).count();
        if defaults != 1 {
            self.inst_error(inst, format!("expected exactly one default selector, got {}", defaults));
        }
        let mut seen = HashSet::new();
        for selector in cases.iter().flat_map(|c| c.selectors.iter().flatten()) {
            let ty = module.constants.ty(*selector);
            if ty != cond {
                self.inst_error(inst, format!("selector type {} does not match condition type {}", self.type_name(ty), self.type_name(cond)));
            }
            if !seen.insert(*selector) {
                let text = module.constants.display(&module.types, *selector);
                self.inst_error(inst, format!("duplicate selector {}", text));
            }
        }
    }

    // ===== Exits =====

    fn target_kind_matches(&self, target: Inst, expected: &str) -> bool {
        let module = self.module;
        let kind = &module.inst(target).kind;
        match expected {
            "an if" => matches!(kind, InstKind::If { .. }),
            "a loop" => matches!(kind, InstKind::Loop { .. }),
            _ => matches!(kind, InstKind::Switch { .. }),
        }
    }

    /// Checks that `target` is alive and of the expected kind
    fn check_target(&mut self, inst: Inst, target: Inst, expected: &str) -> bool {
        let module = self.module;
        if !module.is_inst_alive(target) {
            self.inst_error(inst, "target is a destroyed instruction");
            return false;
        }
        if !self.target_kind_matches(target, expected) {
            let got = module.inst(target).kind.name();
            self.inst_error(inst, format!("target must be {} instruction, got {}", expected, got));
            return false;
        }
        true
    }

    fn check_arguments(&mut self, inst: Inst, args: &[Value], expected: &[Value], what: &str) {
        let module = self.module;
        if args.len() != expected.len() {
            self.inst_error(
                inst,
                format!("has {} arguments, but the {} takes {}", args.len(), what, expected.len()),
            );
            return;
        }
        for (i, (arg, want)) in args.iter().zip(expected).enumerate() {
            let (got, want) = (module.ty(*arg), module.ty(*want));
            if got != want {
                self.inst_error(
                    inst,
                    format!(
                        "argument {} type {} does not match the {} type {}",
                        i,
                        self.type_name(got),
                        what,
                        self.type_name(want)
                    ),
                );
            }
        }
    }

    fn check_exit(&mut self, inst: Inst, target: Inst, expected: &str) {
        let module = self.module;
        if !self.check_target(inst, target, expected) {
            return;
        }
        // exit_if leaves the innermost construct; exit_loop and exit_switch
        // may leave through enclosing ifs.
        let innermost = self
            .control_stack
            .iter()
            .rev()
            .find(|(control, _)| expected == "an if" || !matches!(module.inst(*control).kind, InstKind::If { .. }))
            .map(|(control, _)| *control);
        if innermost != Some(target) {
            let what = module.inst(inst).kind.name();
            self.inst_error(inst, format!("{} is not nested directly in its target", what));
            return;
        }
        let args = module.operands(inst).to_vec();
        let results = module.results(target).to_vec();
        self.check_arguments(inst, &args, &results, "target result");
    }

    /// The part of `target` enclosing the current block, seen through ifs (and
    /// switches when `through_switch` is set)
    fn enclosing_loop_part(&self, target: Inst, through_switch: bool) -> Option<LoopPart> {
        let module = self.module;
        for &(control, block) in self.control_stack.iter().rev() {
            match &module.inst(control).kind {
                InstKind::If { .. } => continue,
                InstKind::Switch { .. } if through_switch => continue,
                InstKind::Loop { initializer, body, continuing } if control == target => {
                    return if Some(block) == *initializer {
                        Some(LoopPart::Initializer)
                    } else if block == *body {
                        Some(LoopPart::Body)
                    } else if block == *continuing {
                        Some(LoopPart::Continuing)
                    } else {
                        None
                    };
                }
                _ => return None,
            }
        }
        None
    }

    /// The part of the loop `target` the current block is directly in
    fn direct_loop_part(&self, target: Inst) -> Option<LoopPart> {
        let &(control, _) = self.control_stack.last()?;
        if control != target {
            return None;
        }
        self.enclosing_loop_part(target, false)
    }

    fn body_params(&self, target: Inst) -> Vec<Value> {
        let module = self.module;
        let body = module.loop_body(target);
        if module.is_block_alive(body) {
            module.block(body).params().to_vec()
        } else {
            Vec::new()
        }
    }

    fn check_continue(&mut self, inst: Inst, target: Inst) {
        let module = self.module;
        if !self.check_target(inst, target, "a loop") {
            return;
        }
        if self.enclosing_loop_part(target, true) != Some(LoopPart::Body) {
            self.inst_error(inst, "continue must be inside the body of its loop");
            return;
        }
        let continuing = module.loop_continuing(target);
        let params = if module.is_block_alive(continuing) {
            module.block(continuing).params().to_vec()
        } else {
            Vec::new()
        };
        let args = module.operands(inst).to_vec();
        self.check_arguments(inst, &args, &params, "continuing block parameter");
    }

    fn check_next_iteration(&mut self, inst: Inst, target: Inst) {
        let module = self.module;
        if !self.check_target(inst, target, "a loop") {
            return;
        }
        if !matches!(self.direct_loop_part(target), Some(LoopPart::Initializer | LoopPart::Continuing)) {
            self.inst_error(inst, "next_iteration must end the initializer or continuing block of its loop");
            return;
        }
        let args = module.operands(inst).to_vec();
        let params = self.body_params(target);
        self.check_arguments(inst, &args, &params, "body parameter");
    }

    fn check_break_if(&mut self, inst: Inst, target: Inst, next_iter_count: u32) {
        let module = self.module;
        if !self.check_target(inst, target, "a loop") {
            return;
        }
        if self.direct_loop_part(target) != Some(LoopPart::Continuing) {
            self.inst_error(inst, "break_if must end the continuing block of its loop");
            return;
        }
        let operands = module.operands(inst).to_vec();
        let Some((&cond, rest)) = operands.split_first() else {
            self.inst_error(inst, "missing condition operand");
            return;
        };
        let cond_ty = module.ty(cond);
        if cond_ty != TypeId::BOOL {
            self.inst_error(inst, format!("condition must be bool, got {}", self.type_name(cond_ty)));
        }
        let split = (next_iter_count as usize).min(rest.len());
        let (next_iter, exit) = rest.split_at(split);
        let params = self.body_params(target);
        self.check_arguments(inst, next_iter, &params, "body parameter");
        let results = module.results(target).to_vec();
        self.check_arguments(inst, exit, &results, "loop result");
    }
}
