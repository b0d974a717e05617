//! Workgroup reflection for compute entry points

use super::referenced::ReferencedModuleDecls;
use crate::function::Function;
use crate::instruction::InstKind;
use crate::module::Module;
use crate::types::AddressSpace;
use crate::value::{Value, ValueKind};
use log::debug;
use serde::Serialize;
use shir_common::Failure;

/// Workgroup variables are each padded to this many bytes
const WORKGROUP_STORAGE_ALIGN: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkgroupInfo {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    /// Bytes of `workgroup` address space storage the function uses
    pub storage_size: u32,
}

/// The workgroup size and shared storage of `func`.
///
/// Dimensions given by overrides resolve through their initializers; an
/// override without a constant initializer cannot be resolved and fails.
pub fn workgroup_info(module: &Module, func: Function) -> Result<WorkgroupInfo, Failure> {
    let data = module.function(func);
    let Some(size) = data.workgroup_size else {
        return Err(Failure::new(format!("function '{}' has no workgroup size", data.name)));
    };

    let mut dims = [0u32; 3];
    for (dim, value) in dims.iter_mut().zip(size) {
        *dim = resolve_dimension(module, value).map_err(|reason| {
            Failure::new(format!("cannot resolve the workgroup size of '{}': {}", data.name, reason))
        })?;
    }

    let mut storage_size = 0u32;
    let mut decls = ReferencedModuleDecls::new(module);
    for &decl in decls.get(func) {
        if !matches!(module.inst(decl).kind, InstKind::Var { .. }) {
            continue;
        }
        let ty = module.ty(module.result(decl));
        if let Some((AddressSpace::Workgroup, store, _)) = module.types.pointer(ty) {
            let padded = module
                .types
                .size(store)
                .div_ceil(WORKGROUP_STORAGE_ALIGN)
                .checked_mul(WORKGROUP_STORAGE_ALIGN);
            storage_size = padded
                .and_then(|padded| storage_size.checked_add(padded))
                .ok_or_else(|| Failure::new(format!("workgroup storage of '{}' is larger than 4GiB", data.name)))?;
        }
    }

    let info = WorkgroupInfo {
        x: dims[0],
        y: dims[1],
        z: dims[2],
        storage_size,
    };
    debug!("workgroup info of '{}': {:?}", data.name, info);
    Ok(info)
}

fn resolve_dimension(module: &Module, value: Value) -> Result<u32, String> {
    if let Some(scalar) = module.scalar_of(value) {
        return match scalar.as_i64() {
            Some(n) if n > 0 && n <= u32::MAX as i64 => Ok(n as u32),
            Some(n) => Err(format!("{} is not a positive size", n)),
            None => Err(format!("{} is not an integer", scalar)),
        };
    }
    let inst = match module.value(value).kind {
        ValueKind::InstructionResult { inst: Some(inst) } => inst,
        _ => return Err("the size is neither a constant nor an override".to_string()),
    };
    if !matches!(module.inst(inst).kind, InstKind::Override { .. }) {
        return Err(format!("the size comes from {}, not an override", module.inst(inst).kind.name()));
    }
    match module.operands(inst).first() {
        Some(&init) => resolve_dimension(module, init),
        None => Err(match module.name_of(value) {
            Some(name) => format!("override '{}' has no initializer", name),
            None => "an override has no initializer".to_string(),
        }),
    }
}
