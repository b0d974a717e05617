//! Builder: the instruction construction API
//!
//! Every factory creates an instruction, connects its operands and results
//! into the module's use-lists and inserts it at the current cursor. Invalid
//! arguments (a pointer where a value is needed, an out-of-range swizzle, an
//! exit aimed at the wrong construct, ...) are bugs in the code driving the
//! builder and panic immediately.

use crate::attributes::{BindingPoint, IoAttributes, PipelineStage};
use crate::block::Block;
use crate::constant::{ConstId, Scalar};
use crate::function::Function;
use crate::instruction::{Inst, InstKind};
use crate::module::Module;
use crate::ops::{BinaryOp, BuiltinFn, UnaryOp};
use crate::types::{AddressSpace, Access, TypeId, TypeManager};
use crate::value::{Value, ValueKind};
use log::{debug, trace};

/// Where the next instruction goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Instructions are created detached
    None,
    Append(Block),
    Before(Inst),
    After(Inst),
}

/// Anything that can be used as an operand
pub trait IntoValue {
    fn into_value(self, module: &mut Module) -> Value;
}

impl IntoValue for Value {
    fn into_value(self, _module: &mut Module) -> Value {
        self
    }
}

impl IntoValue for Inst {
    fn into_value(self, module: &mut Module) -> Value {
        module.result(self)
    }
}

impl IntoValue for ConstId {
    fn into_value(self, module: &mut Module) -> Value {
        module.constant_value(self)
    }
}

impl IntoValue for Scalar {
    fn into_value(self, module: &mut Module) -> Value {
        module.constant(self)
    }
}

impl IntoValue for i32 {
    fn into_value(self, module: &mut Module) -> Value {
        module.constant(self)
    }
}

impl IntoValue for u32 {
    fn into_value(self, module: &mut Module) -> Value {
        module.constant(self)
    }
}

impl IntoValue for f32 {
    fn into_value(self, module: &mut Module) -> Value {
        module.constant(self)
    }
}

impl IntoValue for bool {
    fn into_value(self, module: &mut Module) -> Value {
        module.constant(self)
    }
}

pub struct Builder<'m> {
    module: &'m mut Module,
    cursor: Cursor,
}

impl<'m> Builder<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            cursor: Cursor::None,
        }
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    pub fn types(&mut self) -> &mut TypeManager {
        &mut self.module.types
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    // ===== Insertion points =====

    fn with_cursor<R>(&mut self, cursor: Cursor, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = std::mem::replace(&mut self.cursor, cursor);
        let result = f(self);
        self.cursor = saved;
        result
    }

    /// Runs `f` with new instructions appended to `block`
    pub fn append<R>(&mut self, block: Block, f: impl FnOnce(&mut Self) -> R) -> R {
        self.with_cursor(Cursor::Append(block), f)
    }

    /// Runs `f` with new instructions inserted, in order, before `anchor`
    pub fn insert_before<R>(&mut self, anchor: Inst, f: impl FnOnce(&mut Self) -> R) -> R {
        assert!(
            self.module.inst(anchor).block().is_some(),
            "anchor instruction {:?} is not inserted in a block",
            anchor
        );
        self.with_cursor(Cursor::Before(anchor), f)
    }

    /// Runs `f` with new instructions inserted, in order, after `anchor`
    pub fn insert_after<R>(&mut self, anchor: Inst, f: impl FnOnce(&mut Self) -> R) -> R {
        assert!(
            self.module.inst(anchor).block().is_some(),
            "anchor instruction {:?} is not inserted in a block",
            anchor
        );
        self.with_cursor(Cursor::After(anchor), f)
    }

    /// Runs `f` with new instructions placed right after the definition of `value`.
    /// For parameters that is the front of the function or block.
    pub fn insert_in_block_after<R>(&mut self, value: Value, f: impl FnOnce(&mut Self) -> R) -> R {
        let block = match self.module.value(value).kind {
            ValueKind::InstructionResult { inst: Some(inst) } => return self.insert_after(inst, f),
            ValueKind::FunctionParam { func: Some(func), .. } => self.module.function(func).block(),
            ValueKind::BlockParam { block: Some(block) } => block,
            _ => panic!("value {:?} is not defined in a block", value),
        };
        let cursor = match self.module.block(block).first() {
            Some(first) => Cursor::Before(first),
            None => Cursor::Append(block),
        };
        self.with_cursor(cursor, f)
    }

    fn insert(&mut self, inst: Inst) -> Inst {
        match self.cursor {
            Cursor::None => {}
            Cursor::Append(block) => self.module.append(block, inst),
            Cursor::Before(anchor) => self.module.insert_before(anchor, inst),
            Cursor::After(anchor) => {
                self.module.insert_after(anchor, inst);
                self.cursor = Cursor::After(inst);
            }
        }
        inst
    }

    fn emit(&mut self, kind: InstKind, operands: Vec<Value>, result_types: &[TypeId]) -> Inst {
        let results = result_types
            .iter()
            .map(|ty| {
                assert!(*ty != TypeId::VOID, "{} result type must not be void", kind.name());
                self.module.create_result(*ty)
            })
            .collect();
        let inst = self.module.create_inst(kind, operands, results);
        self.insert(inst)
    }

    // ===== Values =====

    pub fn value(&mut self, value: impl IntoValue) -> Value {
        value.into_value(self.module)
    }

    fn values<V: IntoValue>(&mut self, values: impl IntoIterator<Item = V>) -> Vec<Value> {
        values.into_iter().map(|v| v.into_value(self.module)).collect()
    }

    pub fn constant(&mut self, scalar: impl Into<Scalar>) -> Value {
        self.module.constant(scalar)
    }

    pub fn zero(&mut self, ty: TypeId) -> Value {
        match self.module.zero_value(ty) {
            Some(value) => value,
            None => panic!("type {} has no zero value", self.module.types.name(ty)),
        }
    }

    /// Names `value`, returning it
    pub fn name(&mut self, value: impl IntoValue, name: &str) -> Value {
        let value = value.into_value(self.module);
        self.module.set_name(value, name);
        value
    }

    fn value_type(&self, value: Value) -> TypeId {
        self.module.ty(value)
    }

    fn store_type(&self, pointer: Value, what: &str) -> (AddressSpace, TypeId, Access) {
        let ty = self.value_type(pointer);
        match self.module.types.pointer(ty) {
            Some(ptr) => ptr,
            None => panic!(
                "{} requires a pointer operand, got {}",
                what,
                self.module.types.name(ty)
            ),
        }
    }

    // ===== Arithmetic and conversion =====

    pub fn unary(&mut self, op: UnaryOp, ty: TypeId, value: impl IntoValue) -> Inst {
        let value = self.value(value);
        self.emit(InstKind::Unary(op), vec![value], &[ty])
    }

    pub fn negation(&mut self, ty: TypeId, value: impl IntoValue) -> Inst {
        self.unary(UnaryOp::Negation, ty, value)
    }

    pub fn not(&mut self, ty: TypeId, value: impl IntoValue) -> Inst {
        self.unary(UnaryOp::Not, ty, value)
    }

    pub fn complement(&mut self, ty: TypeId, value: impl IntoValue) -> Inst {
        self.unary(UnaryOp::Complement, ty, value)
    }

    pub fn binary(&mut self, op: BinaryOp, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        let lhs = self.value(lhs);
        let rhs = self.value(rhs);
        self.emit(InstKind::Binary(op), vec![lhs, rhs], &[ty])
    }

    pub fn add(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::Add, ty, lhs, rhs)
    }

    pub fn subtract(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::Subtract, ty, lhs, rhs)
    }

    pub fn multiply(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::Multiply, ty, lhs, rhs)
    }

    pub fn divide(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::Divide, ty, lhs, rhs)
    }

    pub fn modulo(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::Modulo, ty, lhs, rhs)
    }

    pub fn and(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::And, ty, lhs, rhs)
    }

    pub fn or(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::Or, ty, lhs, rhs)
    }

    pub fn xor(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::Xor, ty, lhs, rhs)
    }

    pub fn shift_left(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::ShiftLeft, ty, lhs, rhs)
    }

    pub fn shift_right(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::ShiftRight, ty, lhs, rhs)
    }

    pub fn equal(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::Equal, ty, lhs, rhs)
    }

    pub fn not_equal(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::NotEqual, ty, lhs, rhs)
    }

    pub fn less_than(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::LessThan, ty, lhs, rhs)
    }

    pub fn greater_than(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::GreaterThan, ty, lhs, rhs)
    }

    pub fn less_than_equal(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::LessThanEqual, ty, lhs, rhs)
    }

    pub fn greater_than_equal(&mut self, ty: TypeId, lhs: impl IntoValue, rhs: impl IntoValue) -> Inst {
        self.binary(BinaryOp::GreaterThanEqual, ty, lhs, rhs)
    }

    pub fn bitcast(&mut self, ty: TypeId, value: impl IntoValue) -> Inst {
        let value = self.value(value);
        self.emit(InstKind::Bitcast, vec![value], &[ty])
    }

    pub fn convert(&mut self, ty: TypeId, value: impl IntoValue) -> Inst {
        let value = self.value(value);
        self.emit(InstKind::Convert, vec![value], &[ty])
    }

    pub fn construct<V: IntoValue>(&mut self, ty: TypeId, args: impl IntoIterator<Item = V>) -> Inst {
        let args = self.values(args);
        self.emit(InstKind::Construct, args, &[ty])
    }

    // ===== Memory =====

    /// Indexes into a composite value or through a pointer
    pub fn access<V: IntoValue>(
        &mut self,
        ty: TypeId,
        object: impl IntoValue,
        indices: impl IntoIterator<Item = V>,
    ) -> Inst {
        let object = self.value(object);
        let mut operands = vec![object];
        operands.extend(self.values(indices));
        assert!(operands.len() > 1, "access requires at least one index");
        self.emit(InstKind::Access, operands, &[ty])
    }

    pub fn swizzle(&mut self, ty: TypeId, vector: impl IntoValue, indices: Vec<u32>) -> Inst {
        let vector = self.value(vector);
        let vector_ty = self.value_type(vector);
        let width = match self.module.types.width(vector_ty) {
            Some(width) => width,
            None => panic!(
                "swizzle requires a vector operand, got {}",
                self.module.types.name(vector_ty)
            ),
        };
        assert!(
            (1..=4).contains(&indices.len()),
            "swizzle takes 1 to 4 indices, got {}",
            indices.len()
        );
        for &index in &indices {
            assert!(
                index < width,
                "swizzle index {} out of range for a {}-element vector",
                index,
                width
            );
        }
        self.emit(InstKind::Swizzle { indices }, vec![vector], &[ty])
    }

    pub fn load(&mut self, from: impl IntoValue) -> Inst {
        let from = self.value(from);
        let (_, store, _) = self.store_type(from, "load");
        self.emit(InstKind::Load, vec![from], &[store])
    }

    pub fn load_vector_element(&mut self, from: impl IntoValue, index: impl IntoValue) -> Inst {
        let from = self.value(from);
        let index = self.value(index);
        let (_, store, _) = self.store_type(from, "load_vector_element");
        let elem = match self.module.types.scalar_of(store) {
            Some(elem) if self.module.types.is_vector(store) => elem,
            _ => panic!(
                "load_vector_element requires a pointer to a vector, got {}",
                self.module.types.name(store)
            ),
        };
        self.emit(InstKind::LoadVectorElement, vec![from, index], &[elem])
    }

    pub fn store(&mut self, to: impl IntoValue, from: impl IntoValue) -> Inst {
        let to = self.value(to);
        let from = self.value(from);
        self.store_type(to, "store");
        self.emit(InstKind::Store, vec![to, from], &[])
    }

    pub fn store_vector_element(
        &mut self,
        to: impl IntoValue,
        index: impl IntoValue,
        value: impl IntoValue,
    ) -> Inst {
        let to = self.value(to);
        let index = self.value(index);
        let value = self.value(value);
        self.store_type(to, "store_vector_element");
        self.emit(InstKind::StoreVectorElement, vec![to, index, value], &[])
    }

    // ===== Declarations =====

    /// Declares a variable of pointer type `ty`
    pub fn var(&mut self, ty: TypeId) -> Inst {
        assert!(
            self.module.types.pointer(ty).is_some(),
            "var type must be a pointer, got {}",
            self.module.types.name(ty)
        );
        let kind = InstKind::Var {
            binding: None,
            attributes: IoAttributes::default(),
        };
        self.emit(kind, Vec::new(), &[ty])
    }

    pub fn var_init(&mut self, ty: TypeId, init: impl IntoValue) -> Inst {
        let init = self.value(init);
        let var = self.var(ty);
        self.module.push_operand(var, init);
        var
    }

    /// Declares a named `ptr<function, store, read_write>` variable
    pub fn function_var(&mut self, name: &str, store: TypeId) -> Inst {
        let ty = self.module.types.ptr(AddressSpace::Function, store, Access::ReadWrite);
        let var = self.var(ty);
        self.name(var, name);
        var
    }

    /// Declares a resource variable at `group`, `binding`
    pub fn binding_var(&mut self, ty: TypeId, group: u32, binding: u32) -> Inst {
        let var = self.var(ty);
        self.module.set_binding_point(var, BindingPoint::new(group, binding));
        var
    }

    pub fn let_(&mut self, value: impl IntoValue) -> Inst {
        let value = self.value(value);
        let ty = self.value_type(value);
        self.emit(InstKind::Let, vec![value], &[ty])
    }

    pub fn override_(&mut self, ty: TypeId) -> Inst {
        assert!(
            self.module.types.is_scalar(ty),
            "override type must be a scalar, got {}",
            self.module.types.name(ty)
        );
        self.emit(InstKind::Override { id: None }, Vec::new(), &[ty])
    }

    pub fn override_init(&mut self, ty: TypeId, init: impl IntoValue) -> Inst {
        let init = self.value(init);
        let inst = self.override_(ty);
        self.module.push_operand(inst, init);
        inst
    }

    // ===== Calls =====

    /// Calls a user function. Calls to void functions have no result.
    pub fn call<V: IntoValue>(&mut self, func: Function, args: impl IntoIterator<Item = V>) -> Inst {
        let args = self.values(args);
        let ret = self.module.function(func).return_type;
        let results: &[TypeId] = if ret == TypeId::VOID { &[] } else { &[ret] };
        self.emit(InstKind::UserCall { target: func }, args, results)
    }

    /// Calls a builtin. A `ty` of void gives a call without a result.
    pub fn call_builtin<V: IntoValue>(
        &mut self,
        ty: TypeId,
        builtin: BuiltinFn,
        args: impl IntoIterator<Item = V>,
    ) -> Inst {
        let args = self.values(args);
        let results: &[TypeId] = if ty == TypeId::VOID { &[] } else { &[ty] };
        self.emit(InstKind::BuiltinCall(builtin), args, results)
    }

    // ===== Side effects and terminators =====

    pub fn discard(&mut self) -> Inst {
        self.emit(InstKind::Discard, Vec::new(), &[])
    }

    pub fn terminate_invocation(&mut self) -> Inst {
        self.emit(InstKind::TerminateInvocation, Vec::new(), &[])
    }

    pub fn return_(&mut self, func: Function) -> Inst {
        self.emit(InstKind::Return { func }, Vec::new(), &[])
    }

    pub fn return_value(&mut self, func: Function, value: impl IntoValue) -> Inst {
        let value = self.value(value);
        self.emit(InstKind::Return { func }, vec![value], &[])
    }

    pub fn unreachable(&mut self) -> Inst {
        self.emit(InstKind::Unreachable, Vec::new(), &[])
    }

    // ===== Control flow =====

    pub fn if_(&mut self, condition: impl IntoValue) -> Inst {
        let condition = self.value(condition);
        let true_block = self.module.create_block(false);
        let false_block = self.module.create_block(false);
        self.emit(InstKind::If { true_block, false_block }, vec![condition], &[])
    }

    /// A loop with multi-in body and continuing blocks and no initializer
    pub fn loop_(&mut self) -> Inst {
        let body = self.module.create_block(true);
        let continuing = self.module.create_block(true);
        let kind = InstKind::Loop {
            initializer: None,
            body,
            continuing,
        };
        self.emit(kind, Vec::new(), &[])
    }

    pub fn switch(&mut self, condition: impl IntoValue) -> Inst {
        let condition = self.value(condition);
        self.emit(InstKind::Switch { cases: Vec::new() }, vec![condition], &[])
    }

    /// Adds a case to `switch`. A `None` selector is the default selector.
    pub fn case(&mut self, switch: Inst, selectors: impl IntoIterator<Item = Option<Scalar>>) -> Block {
        let selectors = selectors
            .into_iter()
            .map(|s| s.map(|s| self.module.constants.scalar(s)))
            .collect();
        self.module.add_case(switch, selectors)
    }

    pub fn default_case(&mut self, switch: Inst) -> Block {
        self.module.add_case(switch, vec![None])
    }

    /// Adds a result of type `ty` to a control instruction
    pub fn add_result(&mut self, control: Inst, ty: TypeId) -> Value {
        assert!(
            self.module.inst(control).kind.is_control(),
            "only if, loop and switch take added results"
        );
        self.module.add_result(control, ty)
    }

    fn check_target(&self, target: Inst, what: &str, expected: &str) {
        let kind = &self.module.inst(target).kind;
        let matches = match expected {
            "an if" => matches!(kind, InstKind::If { .. }),
            "a loop" => matches!(kind, InstKind::Loop { .. }),
            _ => matches!(kind, InstKind::Switch { .. }),
        };
        assert!(
            matches,
            "{} target must be {} instruction, got {}",
            what,
            expected,
            kind.name()
        );
    }

    pub fn exit_if<V: IntoValue>(&mut self, target: Inst, args: impl IntoIterator<Item = V>) -> Inst {
        self.check_target(target, "exit_if", "an if");
        let args = self.values(args);
        self.emit(InstKind::ExitIf { target }, args, &[])
    }

    pub fn exit_loop<V: IntoValue>(&mut self, target: Inst, args: impl IntoIterator<Item = V>) -> Inst {
        self.check_target(target, "exit_loop", "a loop");
        let args = self.values(args);
        self.emit(InstKind::ExitLoop { target }, args, &[])
    }

    pub fn exit_switch<V: IntoValue>(&mut self, target: Inst, args: impl IntoIterator<Item = V>) -> Inst {
        self.check_target(target, "exit_switch", "a switch");
        let args = self.values(args);
        self.emit(InstKind::ExitSwitch { target }, args, &[])
    }

    /// Jumps from the loop body to the continuing block
    pub fn continue_<V: IntoValue>(&mut self, target: Inst, args: impl IntoIterator<Item = V>) -> Inst {
        self.check_target(target, "continue", "a loop");
        let args = self.values(args);
        self.emit(InstKind::Continue { target }, args, &[])
    }

    /// Jumps from the initializer or continuing block to the loop body
    pub fn next_iteration<V: IntoValue>(&mut self, target: Inst, args: impl IntoIterator<Item = V>) -> Inst {
        self.check_target(target, "next_iteration", "a loop");
        let args = self.values(args);
        self.emit(InstKind::NextIteration { target }, args, &[])
    }

    /// Exits the loop when `condition` holds, otherwise starts the next iteration
    pub fn break_if<V: IntoValue, W: IntoValue>(
        &mut self,
        target: Inst,
        condition: impl IntoValue,
        next_iter_args: impl IntoIterator<Item = V>,
        exit_args: impl IntoIterator<Item = W>,
    ) -> Inst {
        self.check_target(target, "break_if", "a loop");
        let condition = self.value(condition);
        let next_iter = self.values(next_iter_args);
        let exit = self.values(exit_args);
        let next_iter_count = next_iter.len() as u32;
        let mut operands = vec![condition];
        operands.extend(next_iter);
        operands.extend(exit);
        self.emit(InstKind::BreakIf { target, next_iter_count }, operands, &[])
    }

    // ===== Blocks and functions =====

    pub fn block(&mut self) -> Block {
        self.module.create_block(false)
    }

    pub fn multi_in_block(&mut self) -> Block {
        self.module.create_block(true)
    }

    pub fn block_param(&mut self, ty: TypeId) -> Value {
        self.module.create_block_param(ty)
    }

    pub fn function_param(&mut self, ty: TypeId) -> Value {
        self.module.create_function_param(ty)
    }

    /// Creates a function and appends it to the module
    pub fn function(&mut self, name: &str, return_type: TypeId, stage: Option<PipelineStage>) -> Function {
        let func = self.module.create_function(name, return_type);
        self.module.function_mut(func).stage = stage;
        self.module.add_function(func);
        debug!("builder: added function '{}'", name);
        func
    }

    /// Creates a compute entry point with a constant workgroup size
    pub fn compute_function(&mut self, name: &str, x: u32, y: u32, z: u32) -> Function {
        let func = self.function(name, TypeId::VOID, Some(PipelineStage::Compute));
        let size = [self.constant(x), self.constant(y), self.constant(z)];
        self.module.function_mut(func).workgroup_size = Some(size);
        trace!("builder: workgroup size of '{}' is {}x{}x{}", name, x, y, z);
        func
    }

    /// The top-level block of `func`
    pub fn function_block(&self, func: Function) -> Block {
        self.module.function(func).block()
    }

    pub fn set_params(&mut self, func: Function, params: Vec<Value>) {
        self.module.set_params(func, params);
    }
}
