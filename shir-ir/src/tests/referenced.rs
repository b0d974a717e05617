use super::{add_function, caller, NO_ARGS};
use crate::analysis::{workgroup_info, ReferencedFunctions, ReferencedModuleDecls, WorkgroupInfo};
use crate::builder::Builder;
use crate::function::Function;
use crate::instruction::Inst;
use crate::module::Module;
use crate::types::{Access, AddressSpace, TypeId};
use pretty_assertions::assert_eq;

#[test]
fn test_transitive_callees() {
    let mut module = Module::new();
    let leaf = add_function(&mut module, "leaf");
    let other = add_function(&mut module, "other");
    let middle = caller(&mut module, "middle", &[leaf]);
    let top = caller(&mut module, "top", &[middle, other]);

    let mut referenced = ReferencedFunctions::new(&module);
    let callees = referenced.get(top).to_vec();
    assert_eq!(callees.len(), 3);
    for func in [leaf, other, middle] {
        assert!(callees.contains(&func));
    }
    assert!(!callees.contains(&top));
    assert_eq!(referenced.get(middle), &[leaf]);
    assert!(referenced.get(leaf).is_empty());
}

#[test]
fn test_recursive_function_references_itself() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("f", TypeId::VOID, None);
    let body = b.function_block(func);
    b.append(body, |b| {
        b.call(func, NO_ARGS);
        b.return_(func);
    });

    let mut referenced = ReferencedFunctions::new(&module);
    assert_eq!(referenced.get(func), &[func]);
}

/// Root: `a` (private), `n` (override), `b` (workgroup) and `init` feeding `n`
struct Decls {
    module: Module,
    a: Inst,
    init: Inst,
    n: Inst,
    b: Inst,
    uses_a: Function,
    uses_n: Function,
    uses_both: Function,
}

fn decls() -> Decls {
    let mut module = Module::new();
    let mut bld = Builder::new(&mut module);
    let private = bld.types().ptr(AddressSpace::Private, TypeId::I32, Access::ReadWrite);
    let shared = bld.types().ptr(AddressSpace::Workgroup, TypeId::F32, Access::ReadWrite);
    let root = bld.module().root();
    let (a, init, n, b) = bld.append(root, |bld| {
        let a = bld.var(private);
        let init = bld.override_init(TypeId::U32, 4u32);
        let n = bld.override_init(TypeId::U32, init);
        let b = bld.var(shared);
        (a, init, n, b)
    });

    let uses_a = bld.function("uses_a", TypeId::VOID, None);
    let body = bld.function_block(uses_a);
    bld.append(body, |bld| {
        bld.store(a, 1i32);
        bld.return_(uses_a);
    });

    let uses_n = bld.function("uses_n", TypeId::U32, None);
    let body = bld.function_block(uses_n);
    bld.append(body, |bld| bld.return_value(uses_n, n));

    let uses_both = bld.function("uses_both", TypeId::VOID, None);
    let body = bld.function_block(uses_both);
    bld.append(body, |bld| {
        bld.store(b, 2.0f32);
        bld.call(uses_a, NO_ARGS);
        bld.return_(uses_both);
    });

    Decls {
        module,
        a,
        init,
        n,
        b,
        uses_a,
        uses_n,
        uses_both,
    }
}

#[test]
fn test_module_decls_follow_initializers() {
    let d = decls();
    let mut referenced = ReferencedModuleDecls::new(&d.module);
    assert_eq!(referenced.get(d.uses_a), &[d.a]);
    assert_eq!(referenced.get(d.uses_n), &[d.init, d.n]);
}

#[test]
fn test_module_decls_include_callees_in_root_order() {
    let d = decls();
    let mut referenced = ReferencedModuleDecls::new(&d.module);
    assert_eq!(referenced.get(d.uses_both), &[d.a, d.b]);
}

#[test]
fn test_workgroup_info_of_constant_size() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let shared = b.types().ptr(AddressSpace::Workgroup, TypeId::F32, Access::ReadWrite);
    let root = b.module().root();
    let tile = b.append(root, |b| b.var(shared));
    let func = b.compute_function("main", 8, 4, 2);
    let body = b.function_block(func);
    b.append(body, |b| {
        b.store(tile, 0.5f32);
        b.return_(func);
    });

    let info = workgroup_info(&module, func).unwrap();
    assert_eq!(
        info,
        WorkgroupInfo {
            x: 8,
            y: 4,
            z: 2,
            storage_size: 16,
        }
    );
}

#[test]
fn test_workgroup_info_resolves_overrides() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let array = b.types().array(TypeId::F32, 64);
    let shared = b.types().ptr(AddressSpace::Workgroup, array, Access::ReadWrite);
    let unused = b.types().ptr(AddressSpace::Workgroup, TypeId::U32, Access::ReadWrite);
    let root = b.module().root();
    let (width, tile) = b.append(root, |b| {
        let base = b.override_init(TypeId::U32, 16u32);
        let width = b.override_init(TypeId::U32, base);
        let tile = b.var(shared);
        b.var(unused);
        (width, tile)
    });

    let func = b.compute_function("main", 1, 1, 1);
    let width = b.value(width);
    b.module_mut().function_mut(func).workgroup_size.as_mut().unwrap()[0] = width;
    let body = b.function_block(func);
    b.append(body, |b| {
        let elem = b.types().ptr(AddressSpace::Workgroup, TypeId::F32, Access::ReadWrite);
        let slot = b.access(elem, tile, [3u32]);
        b.store(slot, 1.0f32);
        b.return_(func);
    });

    let info = workgroup_info(&module, func).unwrap();
    assert_eq!((info.x, info.y, info.z), (16, 1, 1));
    assert_eq!(info.storage_size, 256);
}

#[test]
fn test_workgroup_info_without_size_fails() {
    let mut module = Module::new();
    let func = add_function(&mut module, "f");
    let failure = workgroup_info(&module, func).unwrap_err();
    assert_eq!(failure.first_message(), Some("function 'f' has no workgroup size"));
}

#[test]
fn test_workgroup_info_unresolved_override_fails() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let root = b.module().root();
    let width = b.append(root, |b| {
        let width = b.override_(TypeId::U32);
        b.name(width, "width");
        width
    });
    let func = b.compute_function("main", 1, 1, 1);
    let width = b.value(width);
    b.module_mut().function_mut(func).workgroup_size.as_mut().unwrap()[2] = width;

    let failure = workgroup_info(&module, func).unwrap_err();
    assert_eq!(
        failure.first_message(),
        Some("cannot resolve the workgroup size of 'main': override 'width' has no initializer")
    );
}

#[test]
fn test_workgroup_storage_beyond_u32_fails() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let vec4f = b.types().vec4(TypeId::F32);
    let huge = b.types().array(vec4f, u32::MAX / 16);
    let shared = b.types().ptr(AddressSpace::Workgroup, huge, Access::ReadWrite);
    let element = b.types().ptr(AddressSpace::Workgroup, vec4f, Access::ReadWrite);
    let root = b.module().root();
    let (lo, hi) = b.append(root, |b| (b.var(shared), b.var(shared)));
    let func = b.compute_function("main", 1, 1, 1);
    let body = b.function_block(func);
    b.append(body, |b| {
        for tile in [lo, hi] {
            let slot = b.access(element, tile, [0u32]);
            let zero = b.zero(vec4f);
            b.store(slot, zero);
        }
        b.return_(func);
    });

    let failure = workgroup_info(&module, func).unwrap_err();
    assert_eq!(failure.first_message(), Some("workgroup storage of 'main' is larger than 4GiB"));
}
