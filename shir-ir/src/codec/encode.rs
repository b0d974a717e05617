//! Module graph to wire records

use super::wire::*;
use super::EncodeError;
use crate::block::Block;
use crate::constant::ConstValue;
use crate::function::Function;
use crate::instruction::{Inst, InstKind};
use crate::module::Module;
use crate::types::{ArrayCount, Type, TypeId};
use crate::value::Value;
use log::trace;
use std::collections::HashMap;

pub(super) struct Encoder<'a> {
    module: &'a Module,
    values: HashMap<Value, u32>,
    next_value: u32,
    controls: HashMap<Inst, u32>,
    functions: HashMap<Function, u32>,
    current: Option<Function>,
}

fn ty_index(ty: TypeId) -> u32 {
    ty.index() as u32
}

impl<'a> Encoder<'a> {
    pub(super) fn new(module: &'a Module) -> Self {
        Self {
            module,
            values: HashMap::new(),
            next_value: 0,
            controls: HashMap::new(),
            functions: HashMap::new(),
            current: None,
        }
    }

    pub(super) fn finish(mut self) -> Result<ModuleRecord, EncodeError> {
        let module = self.module;
        for (index, &func) in module.functions().iter().enumerate() {
            if !module.is_function_alive(func) {
                return Err(EncodeError::Destroyed { what: "function", handle: format!("{:?}", func) });
            }
            self.functions.insert(func, index as u32);
        }

        let types = module
            .types
            .iter()
            .skip(PRIMITIVE_TYPES)
            .map(|(_, ty)| type_record(ty))
            .collect();
        let constants = module.constants.iter().map(|(_, c)| const_record(c)).collect();
        let root = self.block(module.root())?;

        let mut functions = Vec::with_capacity(module.functions().len());
        for &func in module.functions() {
            functions.push(self.function(func)?);
        }
        trace!(
            "encoded {} types, {} constants, {} values",
            module.types.len(),
            module.constants.len(),
            self.next_value
        );
        Ok(ModuleRecord {
            types,
            constants,
            root,
            functions,
        })
    }

    fn define(&mut self, value: Value) -> ValueDef {
        let id = self.next_value;
        self.next_value += 1;
        self.values.insert(value, id);
        ValueDef {
            id,
            ty: ty_index(self.module.ty(value)),
            name: self.module.name_of(value).map(str::to_string),
        }
    }

    fn value_ref(&self, value: Value, user: &str) -> Result<ValueRef, EncodeError> {
        if !self.module.is_value_alive(value) {
            return Err(EncodeError::Destroyed { what: "value", handle: format!("{:?}", value) });
        }
        if let Some(constant) = self.module.value(value).constant() {
            return Ok(ValueRef::Constant(constant.index() as u32));
        }
        match self.values.get(&value) {
            Some(id) => Ok(ValueRef::Local(*id)),
            None => Err(EncodeError::Unresolved(format!(
                "value {:?} used by {} is not defined before its use",
                value, user
            ))),
        }
    }

    fn function(&mut self, func: Function) -> Result<FunctionRecord, EncodeError> {
        let module = self.module;
        let data = module.function(func);
        self.current = Some(func);

        let workgroup_size = match data.workgroup_size {
            Some(size) => {
                let user = format!("the workgroup size of '{}'", data.name);
                Some([
                    self.value_ref(size[0], &user)?,
                    self.value_ref(size[1], &user)?,
                    self.value_ref(size[2], &user)?,
                ])
            }
            None => None,
        };

        let mut params = Vec::with_capacity(data.params().len());
        for &param in data.params() {
            if !module.is_value_alive(param) {
                return Err(EncodeError::Destroyed { what: "value", handle: format!("{:?}", param) });
            }
            let (attributes, binding) = match &module.value(param).kind {
                crate::value::ValueKind::FunctionParam { attributes, binding, .. } => (attributes.clone(), *binding),
                _ => Default::default(),
            };
            params.push(ParamRecord {
                def: self.define(param),
                attributes,
                binding,
            });
        }

        let body = self.block(data.block())?;
        self.current = None;
        Ok(FunctionRecord {
            name: data.name.clone(),
            return_type: ty_index(data.return_type),
            stage: data.stage,
            workgroup_size,
            return_attributes: data.return_attributes.clone(),
            params,
            body,
        })
    }

    fn block(&mut self, block: Block) -> Result<BlockRecord, EncodeError> {
        let module = self.module;
        if !module.is_block_alive(block) {
            return Err(EncodeError::Destroyed { what: "block", handle: format!("{:?}", block) });
        }
        let data = module.block(block);
        let params = data.params().iter().map(|p| self.define(*p)).collect();
        let mut insts = Vec::with_capacity(data.len());
        for inst in module.block_insts(block) {
            insts.push(self.inst(inst)?);
        }
        Ok(BlockRecord {
            multi_in: data.is_multi_in(),
            params,
            insts,
        })
    }

    fn target(&self, target: Inst, user: &str) -> Result<u32, EncodeError> {
        self.controls.get(&target).copied().ok_or_else(|| {
            EncodeError::Unresolved(format!("{} targets {:?}, which does not enclose it", user, target))
        })
    }

    fn inst(&mut self, inst: Inst) -> Result<InstRecord, EncodeError> {
        let module = self.module;
        let data = module.inst(inst);
        let name = data.kind.name();

        let operands = data
            .operands()
            .iter()
            .map(|v| self.value_ref(*v, name))
            .collect::<Result<Vec<_>, _>>()?;
        let results = data.results().iter().map(|r| self.define(*r)).collect();
        if data.kind.is_control() {
            let id = self.controls.len() as u32;
            self.controls.insert(inst, id);
        }

        let kind = match &data.kind {
            InstKind::Unary(op) => KindRecord::Unary(*op),
            InstKind::Binary(op) => KindRecord::Binary(*op),
            InstKind::Bitcast => KindRecord::Bitcast,
            InstKind::Convert => KindRecord::Convert,
            InstKind::Construct => KindRecord::Construct,
            InstKind::Access => KindRecord::Access,
            InstKind::Swizzle { indices } => KindRecord::Swizzle { indices: indices.clone() },
            InstKind::Load => KindRecord::Load,
            InstKind::LoadVectorElement => KindRecord::LoadVectorElement,
            InstKind::Store => KindRecord::Store,
            InstKind::StoreVectorElement => KindRecord::StoreVectorElement,
            InstKind::Var { binding, attributes } => KindRecord::Var {
                binding: *binding,
                attributes: attributes.clone(),
            },
            InstKind::Let => KindRecord::Let,
            InstKind::Override { id } => KindRecord::Override { id: *id },
            InstKind::UserCall { target } => match self.functions.get(target) {
                Some(index) => KindRecord::UserCall { target: *index },
                None => {
                    return Err(EncodeError::Unresolved(format!(
                        "call to {:?}, which is not in the module's function list",
                        target
                    )))
                }
            },
            InstKind::BuiltinCall(builtin) => KindRecord::BuiltinCall(*builtin),
            InstKind::Discard => KindRecord::Discard,
            InstKind::TerminateInvocation => KindRecord::TerminateInvocation,
            InstKind::Return { func } => {
                if self.current != Some(*func) {
                    return Err(EncodeError::Unresolved(format!(
                        "return {:?} belongs to {:?}, not the function containing it",
                        inst, func
                    )));
                }
                KindRecord::Return
            }
            InstKind::Unreachable => KindRecord::Unreachable,
            InstKind::If { true_block, false_block } => KindRecord::If {
                true_block: self.block(*true_block)?,
                false_block: self.block(*false_block)?,
            },
            InstKind::Loop { initializer, body, continuing } => KindRecord::Loop {
                initializer: match initializer {
                    Some(block) => Some(self.block(*block)?),
                    None => None,
                },
                body: self.block(*body)?,
                continuing: self.block(*continuing)?,
            },
            InstKind::Switch { cases } => {
                let mut records = Vec::with_capacity(cases.len());
                for case in cases {
                    records.push(CaseRecord {
                        selectors: case.selectors.iter().map(|s| s.map(|c| c.index() as u32)).collect(),
                        block: self.block(case.block)?,
                    });
                }
                KindRecord::Switch { cases: records }
            }
            InstKind::ExitIf { target } => KindRecord::ExitIf { target: self.target(*target, name)? },
            InstKind::ExitLoop { target } => KindRecord::ExitLoop { target: self.target(*target, name)? },
            InstKind::ExitSwitch { target } => KindRecord::ExitSwitch { target: self.target(*target, name)? },
            InstKind::Continue { target } => KindRecord::Continue { target: self.target(*target, name)? },
            InstKind::NextIteration { target } => KindRecord::NextIteration {
                target: self.target(*target, name)?,
            },
            InstKind::BreakIf { target, next_iter_count } => KindRecord::BreakIf {
                target: self.target(*target, name)?,
                next_iter_count: *next_iter_count,
            },
        };
        Ok(InstRecord { kind, operands, results })
    }
}

fn type_record(ty: &Type) -> TypeRecord {
    match ty {
        Type::Vector { elem, width } => TypeRecord::Vector { elem: ty_index(*elem), width: *width },
        Type::Matrix { column, columns } => TypeRecord::Matrix { column: ty_index(*column), columns: *columns },
        Type::Array { elem, count, .. } => TypeRecord::Array {
            elem: ty_index(*elem),
            count: match count {
                ArrayCount::Fixed(n) => Some(*n),
                ArrayCount::Runtime => None,
            },
        },
        Type::Struct { name, members, .. } => TypeRecord::Struct {
            name: name.clone(),
            members: members
                .iter()
                .map(|m| MemberRecord {
                    name: m.name.clone(),
                    ty: ty_index(m.ty),
                    attributes: m.attributes.clone(),
                })
                .collect(),
        },
        Type::Pointer { space, store, access } => TypeRecord::Pointer {
            space: *space,
            store: ty_index(*store),
            access: *access,
        },
        Type::Atomic { elem } => TypeRecord::Atomic { elem: ty_index(*elem) },
        Type::SampledTexture { dim, sampled } => TypeRecord::SampledTexture { dim: *dim, sampled: ty_index(*sampled) },
        Type::MultisampledTexture { dim, sampled } => TypeRecord::MultisampledTexture {
            dim: *dim,
            sampled: ty_index(*sampled),
        },
        Type::DepthTexture { dim } => TypeRecord::DepthTexture { dim: *dim },
        Type::DepthMultisampledTexture { dim } => TypeRecord::DepthMultisampledTexture { dim: *dim },
        Type::StorageTexture { dim, format, access } => TypeRecord::StorageTexture {
            dim: *dim,
            format: *format,
            access: *access,
        },
        Type::ExternalTexture => TypeRecord::ExternalTexture,
        Type::Sampler { comparison } => TypeRecord::Sampler { comparison: *comparison },
        // Primitives are skipped by the caller.
        Type::Void | Type::Bool | Type::I32 | Type::U32 | Type::F32 | Type::F16 => {
            unreachable!("primitive types are implied by the wire format")
        }
    }
}

fn const_record(constant: &ConstValue) -> ConstRecord {
    match constant {
        ConstValue::Scalar(s) => ConstRecord::Scalar(*s),
        ConstValue::Composite { ty, elements } => ConstRecord::Composite {
            ty: ty_index(*ty),
            elements: elements.iter().map(|e| e.index() as u32).collect(),
        },
        ConstValue::Splat { ty, element } => ConstRecord::Splat {
            ty: ty_index(*ty),
            element: element.index() as u32,
        },
    }
}
