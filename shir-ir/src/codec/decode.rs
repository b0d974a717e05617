//! Wire records to module graph
//!
//! Every index, count and shape in the records is checked before it reaches
//! a module constructor, so malformed input surfaces as a [`DecodeError`]
//! instead of tripping one of the module's assertions.

use super::wire::*;
use super::DecodeError;
use crate::block::Block;
use crate::constant::ConstId;
use crate::function::Function;
use crate::instruction::{Case, Inst, InstKind};
use crate::module::Module;
use crate::types::{Type, TypeId};
use crate::value::Value;
use log::trace;
use std::collections::HashMap;

fn invalid(reason: impl Into<String>) -> DecodeError {
    DecodeError::Invalid { reason: reason.into() }
}

pub(super) struct Decoder {
    module: Module,
    values: HashMap<u32, Value>,
    controls: Vec<Inst>,
    /// Control instructions whose blocks are being filled, outermost first
    open: Vec<Inst>,
    functions: Vec<Function>,
    current: Option<Function>,
}

impl Decoder {
    pub(super) fn decode(record: ModuleRecord) -> Result<Module, DecodeError> {
        let mut decoder = Decoder {
            module: Module::new(),
            values: HashMap::new(),
            controls: Vec::new(),
            open: Vec::new(),
            functions: Vec::new(),
            current: None,
        };
        decoder.types(record.types)?;
        decoder.constants(record.constants)?;

        if record.root.multi_in || !record.root.params.is_empty() {
            return Err(invalid("the root block cannot take parameters"));
        }
        decoder.declare_functions(&record.functions)?;
        let root = decoder.module.root();
        decoder.fill_block(root, record.root)?;
        decoder.functions(record.functions)?;
        trace!("decoded module with {} functions", decoder.functions.len());
        Ok(decoder.module)
    }

    // ===== Types and constants =====

    fn ty(&self, index: u32) -> Result<TypeId, DecodeError> {
        self.module
            .types
            .id_at(index as usize)
            .ok_or_else(|| invalid(format!("type index {} is out of range", index)))
    }

    fn types(&mut self, records: Vec<TypeRecord>) -> Result<(), DecodeError> {
        for (i, record) in records.into_iter().enumerate() {
            let expected = PRIMITIVE_TYPES + i;
            let id = self.intern_type(record)?;
            if id.index() != expected {
                return Err(invalid(format!("type record {} duplicates type {}", expected, id.index())));
            }
        }
        Ok(())
    }

    fn intern_type(&mut self, record: TypeRecord) -> Result<TypeId, DecodeError> {
        let types = &self.module.types;
        let id = match record {
            TypeRecord::Vector { elem, width } => {
                let elem = self.ty(elem)?;
                if !types.is_scalar(elem) || !(2..=4).contains(&width) {
                    return Err(invalid(format!("vec{}<{}> is not a valid vector type", width, types.name(elem))));
                }
                self.module.types.vec(elem, width)
            }
            TypeRecord::Matrix { column, columns } => {
                let column = self.ty(column)?;
                let float_column = types.is_vector(column) && types.scalar_of(column).is_some_and(|s| types.is_float_scalar(s));
                if !float_column || !(2..=4).contains(&columns) {
                    return Err(invalid(format!("matrix of {} x{} is not a valid matrix type", types.name(column), columns)));
                }
                self.module.types.get(Type::Matrix { column, columns })
            }
            TypeRecord::Array { elem, count } => {
                let elem = self.ty(elem)?;
                if elem == TypeId::VOID {
                    return Err(invalid("array element type cannot be void"));
                }
                let array = match count {
                    Some(0) => return Err(invalid("array element count must be greater than zero")),
                    Some(n) => self.module.types.try_array(elem, n),
                    None => self.module.types.try_runtime_array(elem),
                };
                array.ok_or_else(|| invalid("type layout overflows"))?
            }
            TypeRecord::Struct { name, members } => {
                if members.is_empty() {
                    return Err(invalid(format!("struct '{}' has no members", name)));
                }
                let mut laid_out = Vec::with_capacity(members.len());
                for member in members {
                    let ty = self.ty(member.ty)?;
                    if ty == TypeId::VOID {
                        return Err(invalid(format!("struct '{}' member '{}' has type void", name, member.name)));
                    }
                    laid_out.push((member.name, ty, member.attributes));
                }
                self.module
                    .types
                    .try_structure(&name, laid_out)
                    .ok_or_else(|| invalid("type layout overflows"))?
            }
            TypeRecord::Pointer { space, store, access } => {
                let store = self.ty(store)?;
                self.module.types.ptr(space, store, access)
            }
            TypeRecord::Atomic { elem } => {
                let elem = self.ty(elem)?;
                if !types.is_integer_scalar(elem) {
                    return Err(invalid(format!("atomic<{}> is not a valid atomic type", types.name(elem))));
                }
                self.module.types.atomic(elem)
            }
            TypeRecord::SampledTexture { dim, sampled } => {
                let sampled = self.numeric_scalar(sampled)?;
                self.module.types.sampled_texture(dim, sampled)
            }
            TypeRecord::MultisampledTexture { dim, sampled } => {
                let sampled = self.numeric_scalar(sampled)?;
                self.module.types.get(Type::MultisampledTexture { dim, sampled })
            }
            TypeRecord::DepthTexture { dim } => self.module.types.depth_texture(dim),
            TypeRecord::DepthMultisampledTexture { dim } => {
                self.module.types.get(Type::DepthMultisampledTexture { dim })
            }
            TypeRecord::StorageTexture { dim, format, access } => {
                self.module.types.storage_texture(dim, format, access)
            }
            TypeRecord::ExternalTexture => self.module.types.get(Type::ExternalTexture),
            TypeRecord::Sampler { comparison } => self.module.types.get(Type::Sampler { comparison }),
        };
        Ok(id)
    }

    fn numeric_scalar(&self, index: u32) -> Result<TypeId, DecodeError> {
        let ty = self.ty(index)?;
        if !self.module.types.is_numeric_scalar(ty) {
            return Err(invalid(format!("texture sample type {} is not numeric", self.module.types.name(ty))));
        }
        Ok(ty)
    }

    fn constant(&self, index: u32) -> Result<ConstId, DecodeError> {
        self.module
            .constants
            .id_at(index as usize)
            .ok_or_else(|| invalid(format!("constant index {} is out of range", index)))
    }

    fn constants(&mut self, records: Vec<ConstRecord>) -> Result<(), DecodeError> {
        for (i, record) in records.into_iter().enumerate() {
            let id = match record {
                ConstRecord::Scalar(scalar) => self.module.constants.scalar(scalar),
                ConstRecord::Composite { ty, elements } => {
                    let ty = self.ty(ty)?;
                    if elements.is_empty() {
                        return Err(invalid(format!("composite constant {} has no elements", i)));
                    }
                    let elements = elements
                        .into_iter()
                        .map(|e| self.constant(e))
                        .collect::<Result<Vec<_>, _>>()?;
                    self.module.constants.composite(ty, elements)
                }
                ConstRecord::Splat { ty, element } => {
                    let ty = self.ty(ty)?;
                    let element = self.constant(element)?;
                    self.module.constants.splat(ty, element)
                }
            };
            if id.index() != i {
                return Err(invalid(format!("constant record {} duplicates constant {}", i, id.index())));
            }
        }
        Ok(())
    }

    // ===== Values =====

    fn define(&mut self, def: ValueDef, create: fn(&mut Module, TypeId) -> Value) -> Result<Value, DecodeError> {
        if self.values.contains_key(&def.id) {
            return Err(invalid(format!("value {} is defined twice", def.id)));
        }
        let ty = self.ty(def.ty)?;
        if ty == TypeId::VOID {
            return Err(invalid(format!("value {} has type void", def.id)));
        }
        let value = create(&mut self.module, ty);
        if let Some(name) = def.name {
            self.module.set_name(value, name);
        }
        self.values.insert(def.id, value);
        Ok(value)
    }

    fn value(&mut self, value: ValueRef) -> Result<Value, DecodeError> {
        match value {
            ValueRef::Constant(index) => {
                let constant = self.constant(index)?;
                Ok(self.module.constant_value(constant))
            }
            ValueRef::Local(id) => self
                .values
                .get(&id)
                .copied()
                .ok_or_else(|| invalid(format!("value {} is used before it is defined", id))),
        }
    }

    // ===== Functions =====

    /// Creates every function up front so calls can refer forward.
    fn declare_functions(&mut self, records: &[FunctionRecord]) -> Result<(), DecodeError> {
        for record in records {
            let return_type = self.ty(record.return_type)?;
            let func = self.module.create_function(record.name.clone(), return_type);
            let data = self.module.function_mut(func);
            data.stage = record.stage;
            data.return_attributes = record.return_attributes.clone();
            self.module.add_function(func);
            self.functions.push(func);
        }
        Ok(())
    }

    fn functions(&mut self, records: Vec<FunctionRecord>) -> Result<(), DecodeError> {
        for (record, func) in records.into_iter().zip(self.functions.clone()) {
            self.current = Some(func);
            if let Some(size) = record.workgroup_size {
                let size = [self.value(size[0])?, self.value(size[1])?, self.value(size[2])?];
                self.module.function_mut(func).workgroup_size = Some(size);
            }

            let mut params = Vec::with_capacity(record.params.len());
            for param in record.params {
                let value = self.define(param.def, Module::create_function_param)?;
                self.module.set_param_attributes(value, param.attributes);
                if let Some(binding) = param.binding {
                    self.module.set_param_binding_point(value, binding);
                }
                params.push(value);
            }
            self.module.set_params(func, params);

            if record.body.multi_in || !record.body.params.is_empty() {
                return Err(invalid(format!("the body of '{}' cannot take parameters", record.name)));
            }
            let body = self.module.function(func).block();
            self.fill_block(body, record.body)?;
        }
        self.current = None;
        Ok(())
    }

    // ===== Blocks and instructions =====

    fn fill_block(&mut self, block: Block, record: BlockRecord) -> Result<(), DecodeError> {
        if !record.params.is_empty() && !record.multi_in {
            return Err(invalid("block parameters on a block that is not multi-in"));
        }
        let mut params = Vec::with_capacity(record.params.len());
        for def in record.params {
            params.push(self.define(def, Module::create_block_param)?);
        }
        self.module.set_block_params(block, params);

        for inst in record.insts {
            if let Some(term) = self.module.terminator(block) {
                let name = self.module.inst(term).kind.name();
                return Err(invalid(format!("instruction follows the terminator {} of its block", name)));
            }
            let inst = self.inst(inst)?;
            self.module.append(block, inst);
        }
        Ok(())
    }

    fn target(&self, index: u32, what: &str, matches: fn(&InstKind) -> bool) -> Result<Inst, DecodeError> {
        let target = self
            .controls
            .get(index as usize)
            .copied()
            .filter(|target| self.open.contains(target))
            .ok_or_else(|| invalid(format!("{} target {} does not enclose it", what, index)))?;
        if !matches(&self.module.inst(target).kind) {
            let got = self.module.inst(target).kind.name();
            return Err(invalid(format!("{} targets a {} instruction", what, got)));
        }
        Ok(target)
    }

    fn function_ref(&self, index: u32) -> Result<Function, DecodeError> {
        self.functions
            .get(index as usize)
            .copied()
            .ok_or_else(|| invalid(format!("call target {} is out of range", index)))
    }

    fn inst(&mut self, record: InstRecord) -> Result<Inst, DecodeError> {
        let operands = record
            .operands
            .into_iter()
            .map(|v| self.value(v))
            .collect::<Result<Vec<_>, _>>()?;
        let mut results = Vec::with_capacity(record.results.len());
        for def in record.results {
            results.push(self.define(def, Module::create_result)?);
        }

        let is_if = |k: &InstKind| matches!(k, InstKind::If { .. });
        let is_loop = |k: &InstKind| matches!(k, InstKind::Loop { .. });
        let is_switch = |k: &InstKind| matches!(k, InstKind::Switch { .. });

        // Nested blocks are filled once the owning instruction exists, so
        // exits inside them can resolve it as their target.
        let mut nested: Vec<(Block, BlockRecord)> = Vec::new();
        let mut new_block = |module: &mut Module, record: BlockRecord| {
            let block = module.create_block(record.multi_in);
            nested.push((block, record));
            block
        };

        let kind = match record.kind {
            KindRecord::Unary(op) => InstKind::Unary(op),
            KindRecord::Binary(op) => InstKind::Binary(op),
            KindRecord::Bitcast => InstKind::Bitcast,
            KindRecord::Convert => InstKind::Convert,
            KindRecord::Construct => InstKind::Construct,
            KindRecord::Access => InstKind::Access,
            KindRecord::Swizzle { indices } => InstKind::Swizzle { indices },
            KindRecord::Load => InstKind::Load,
            KindRecord::LoadVectorElement => InstKind::LoadVectorElement,
            KindRecord::Store => InstKind::Store,
            KindRecord::StoreVectorElement => InstKind::StoreVectorElement,
            KindRecord::Var { binding, attributes } => InstKind::Var { binding, attributes },
            KindRecord::Let => InstKind::Let,
            KindRecord::Override { id } => InstKind::Override { id },
            KindRecord::UserCall { target } => InstKind::UserCall {
                target: self.function_ref(target)?,
            },
            KindRecord::BuiltinCall(builtin) => InstKind::BuiltinCall(builtin),
            KindRecord::Discard => InstKind::Discard,
            KindRecord::TerminateInvocation => InstKind::TerminateInvocation,
            KindRecord::Return => InstKind::Return {
                func: self.current.ok_or_else(|| invalid("return outside of a function"))?,
            },
            KindRecord::Unreachable => InstKind::Unreachable,
            KindRecord::If { true_block, false_block } => InstKind::If {
                true_block: new_block(&mut self.module, true_block),
                false_block: new_block(&mut self.module, false_block),
            },
            KindRecord::Loop { initializer, body, continuing } => InstKind::Loop {
                initializer: initializer.map(|b| new_block(&mut self.module, b)),
                body: new_block(&mut self.module, body),
                continuing: new_block(&mut self.module, continuing),
            },
            KindRecord::Switch { cases } => {
                let mut decoded = Vec::with_capacity(cases.len());
                for case in cases {
                    if case.selectors.is_empty() {
                        return Err(invalid("switch case without selectors"));
                    }
                    let selectors = case
                        .selectors
                        .into_iter()
                        .map(|s| s.map(|c| self.constant(c)).transpose())
                        .collect::<Result<Vec<_>, _>>()?;
                    decoded.push(Case {
                        selectors,
                        block: new_block(&mut self.module, case.block),
                    });
                }
                InstKind::Switch { cases: decoded }
            }
            KindRecord::ExitIf { target } => InstKind::ExitIf {
                target: self.target(target, "exit_if", is_if)?,
            },
            KindRecord::ExitLoop { target } => InstKind::ExitLoop {
                target: self.target(target, "exit_loop", is_loop)?,
            },
            KindRecord::ExitSwitch { target } => InstKind::ExitSwitch {
                target: self.target(target, "exit_switch", is_switch)?,
            },
            KindRecord::Continue { target } => InstKind::Continue {
                target: self.target(target, "continue", is_loop)?,
            },
            KindRecord::NextIteration { target } => InstKind::NextIteration {
                target: self.target(target, "next_iteration", is_loop)?,
            },
            KindRecord::BreakIf { target, next_iter_count } => {
                if operands.is_empty() || next_iter_count as usize > operands.len() - 1 {
                    return Err(invalid(format!(
                        "break_if with {} operands cannot pass {} next-iteration arguments",
                        operands.len(),
                        next_iter_count
                    )));
                }
                InstKind::BreakIf {
                    target: self.target(target, "break_if", is_loop)?,
                    next_iter_count,
                }
            }
        };

        let is_control = kind.is_control();
        let inst = self.module.create_inst(kind, operands, results);
        if is_control {
            self.controls.push(inst);
        }
        if !nested.is_empty() {
            self.open.push(inst);
            for (block, record) in nested {
                self.fill_block(block, record)?;
            }
            self.open.pop();
        }
        Ok(inst)
    }
}

