use crate::builder::Builder;
use crate::instruction::InstKind;
use crate::module::Module;
use crate::types::TypeId;
use crate::value::{Usage, ValueKind};
use pretty_assertions::assert_eq;

#[test]
fn test_operands_are_recorded_in_use_lists() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let (sum, twice) = b.append(block, |b| {
        let sum = b.add(TypeId::I32, 1i32, 2i32);
        let twice = b.add(TypeId::I32, sum, sum);
        (sum, twice)
    });

    let result = module.result(sum);
    assert_eq!(
        module.value(result).usages_sorted(),
        vec![Usage::new(twice, 0), Usage::new(twice, 1)]
    );
    let one = module.constant(1i32);
    assert_eq!(module.value(one).usages_unsorted(), &[Usage::new(sum, 0)]);
}

#[test]
fn test_set_operand_moves_the_usage() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let sum = b.append(block, |b| b.add(TypeId::I32, 1i32, 2i32));

    let one = module.constant(1i32);
    let two = module.constant(2i32);
    let three = module.constant(3i32);
    module.set_operand(sum, 0, three);
    assert!(!module.value(one).is_used());
    assert_eq!(module.value(three).usages_unsorted(), &[Usage::new(sum, 0)]);
    assert_eq!(module.operands(sum), &[three, two]);
}

#[test]
fn test_replace_all_uses_with() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let (a, b_inst, user) = b.append(block, |b| {
        let a = b.add(TypeId::U32, 1u32, 2u32);
        let b_inst = b.add(TypeId::U32, 3u32, 4u32);
        let user = b.multiply(TypeId::U32, a, a);
        (a, b_inst, user)
    });

    let (old, new) = (module.result(a), module.result(b_inst));
    module.replace_all_uses_with(old, new);
    assert!(!module.value(old).is_used());
    assert_eq!(module.operands(user), &[new, new]);
    assert_eq!(
        module.value(new).usages_sorted(),
        vec![Usage::new(user, 0), Usage::new(user, 1)]
    );
}

#[test]
fn test_replace_uses_selectively() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let (a, user) = b.append(block, |b| {
        let a = b.add(TypeId::U32, 1u32, 2u32);
        let user = b.subtract(TypeId::U32, a, a);
        (a, user)
    });

    let old = module.result(a);
    let zero = module.constant(0u32);
    module.replace_all_uses_with_fn(old, |usage| (usage.operand == 1).then_some(zero));
    assert_eq!(module.operands(user), &[old, zero]);
    assert_eq!(module.value(old).usages_sorted(), vec![Usage::new(user, 0)]);
}

#[test]
fn test_constants_share_one_value() {
    let mut module = Module::new();
    let a = module.constant(7u32);
    let b = module.constant(7u32);
    let c = module.constant(7i32);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(matches!(module.value(a).kind, ValueKind::Constant(_)));
}

#[test]
#[should_panic(expected = "it is still the result of instruction")]
fn test_destroying_an_attached_result_panics() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let sum = b.append(block, |b| b.add(TypeId::I32, 1i32, 2i32));
    let result = module.result(sum);
    module.destroy_value(result);
}

#[test]
#[should_panic(expected = "it is still used")]
fn test_destroying_a_used_value_panics() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let sum = b.append(block, |b| {
        let sum = b.add(TypeId::I32, 1i32, 2i32);
        b.negation(TypeId::I32, sum);
        sum
    });
    let result = module.result(sum);
    module.detach_result(result);
    module.destroy_value(result);
}

#[test]
fn test_detached_unused_result_can_be_destroyed() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let sum = b.append(block, |b| b.add(TypeId::I32, 1i32, 2i32));

    let result = module.result(sum);
    module.detach_result(result);
    assert!(module.results(sum).is_empty());
    module.destroy_value(result);
    assert!(!module.is_value_alive(result));
    assert!(module.is_inst_alive(sum));
}

#[test]
#[should_panic(expected = "is still in use")]
fn test_destroying_an_instruction_with_used_results_panics() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let sum = b.append(block, |b| {
        let sum = b.add(TypeId::I32, 1i32, 2i32);
        b.negation(TypeId::I32, sum);
        sum
    });
    module.destroy_inst(sum);
}

#[test]
fn test_destroying_an_instruction_releases_its_operands() {
    let mut module = Module::new();
    let block = module.create_block(false);
    let mut b = Builder::new(&mut module);
    let sum = b.append(block, |b| b.add(TypeId::I32, 5i32, 6i32));

    let result = module.result(sum);
    module.destroy_inst(sum);
    assert!(!module.is_inst_alive(sum));
    assert!(!module.is_value_alive(result));
    assert!(module.block(block).is_empty());
    let five = module.constant(5i32);
    assert!(!module.value(five).is_used());
}

#[test]
#[should_panic(expected = "use of destroyed instruction")]
fn test_use_of_destroyed_instruction_panics() {
    let mut module = Module::new();
    let inst = module.create_inst(InstKind::Discard, vec![], vec![]);
    module.destroy_inst(inst);
    module.inst(inst);
}
