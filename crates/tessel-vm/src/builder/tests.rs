use super::*;
use crate::error::{FaultKind, ScopeViolation};

fn word_builder() -> (ModuleBuilder, RegId, RegId, ProcId) {
    let mut b = ModuleBuilder::new(&Registry::new());
    let io = b.add_reg(VarTypeId::WORD, VarFlags::empty()).unwrap();
    let tmp = b.add_reg(VarTypeId::WORD, VarFlags::empty()).unwrap();
    let ptype = b
        .add_proc_type(ProcTypeFlags::EXTERNAL | ProcTypeFlags::FUNCTION, io)
        .unwrap();
    let proc = b.add_proc(ProcFlags::empty(), ptype).unwrap();
    (b, io, tmp, proc)
}

fn kind<T>(result: Result<T>) -> FaultKind {
    match result {
        Ok(_) => panic!("expected a fault"),
        Err(err) => err.kind(),
    }
}

#[test]
fn test_reserved_declarations() {
    let b = ModuleBuilder::new(&Registry::new());
    let module = b.description();
    assert_eq!(module.vtypes, vec![VarType::word()]);
    assert_eq!(module.regs.len(), 1);
    assert_eq!(module.regs[0].vtype, VarTypeId::WORD);
}

#[test]
fn test_var_type_overflow() {
    let mut b = ModuleBuilder::new(&Registry::new());
    assert_eq!(kind(b.add_var_type(u32::MAX, 2)), FaultKind::Range);
    assert_eq!(b.add_var_type(0, 8).unwrap(), VarTypeId(1));
    assert_eq!(b.add_var_type(u32::MAX, 1).unwrap(), VarTypeId(2));
}

#[test]
fn test_reference_slots() {
    let mut b = ModuleBuilder::new(&Registry::new());
    let node = b.add_var_type(1, 8).unwrap();
    assert_eq!(b.add_var_type_vref(node, node).unwrap(), 0);
    assert_eq!(b.add_var_type_vref(node, VarTypeId::WORD).unwrap(), 1);
    assert_eq!(kind(b.add_var_type_vref(node, VarTypeId(9))), FaultKind::NotFound);
    assert_eq!(kind(b.add_var_type_vref(VarTypeId::WORD, node)), FaultKind::Argument);
    assert_eq!(kind(b.add_var_type_pref(node, ProcTypeId(0))), FaultKind::NotFound);

    let big = b.add_var_type(1 << 31, 0).unwrap();
    b.add_var_type_vref(big, node).unwrap();
    assert_eq!(kind(b.add_var_type_vref(big, node)), FaultKind::Range);
}

#[test]
fn test_type_shape_frozen_after_code() {
    let (mut b, io, _, proc) = word_builder();
    let node = b.add_var_type(1, 8).unwrap();
    b.add_proc_instr(proc, Instruction::Inc(io)).unwrap();
    assert_eq!(kind(b.add_var_type_vref(node, node)), FaultKind::Operation);
}

#[test]
fn test_register_validation() {
    let mut b = ModuleBuilder::new(&Registry::new());
    let fixed = b.add_var_type(4, 8).unwrap();
    let dynamic = b.add_var_type(0, 8).unwrap();

    assert_eq!(kind(b.add_reg(VarTypeId(7), VarFlags::empty())), FaultKind::NotFound);
    assert_eq!(
        kind(b.add_reg(VarTypeId::WORD, VarFlags::PERSISTENT | VarFlags::THREAD_LOCAL)),
        FaultKind::Argument
    );
    assert_eq!(
        kind(b.add_reg(VarTypeId::WORD, VarFlags::from_bits_retain(0x80))),
        FaultKind::Argument
    );
    assert_eq!(kind(b.add_reg_with_count(fixed, 3, VarFlags::empty())), FaultKind::Argument);
    assert_eq!(
        kind(b.add_reg_with_count(dynamic, u32::MAX, VarFlags::empty())),
        FaultKind::Range
    );

    let r = b.add_reg_with_count(fixed, 0, VarFlags::empty()).unwrap();
    assert_eq!(r, RegId::FIRST_USER);
    assert_eq!(b.description().regs[r.index()].count, 4);
    let r = b.add_reg_with_count(dynamic, 16, VarFlags::empty()).unwrap();
    assert_eq!(b.description().regs[r.index()].count, 16);
}

#[test]
fn test_register_limit() {
    let mut b = ModuleBuilder::new(&Registry::new());
    for _ in 1..=RegId::MAX_INDEX {
        b.add_reg(VarTypeId::WORD, VarFlags::empty()).unwrap();
    }
    assert_eq!(kind(b.add_reg(VarTypeId::WORD, VarFlags::empty())), FaultKind::Range);
}

#[test]
fn test_const_register() {
    let mut b = ModuleBuilder::new(&Registry::new());
    let pair = b.add_var_type(2, 4).unwrap();
    let dynamic = b.add_var_type(0, 4).unwrap();

    let r = b.add_const_reg(pair, &[1, 0, 0, 0, 2, 0, 0, 0]).unwrap();
    let spec = &b.description().regs[r.index()];
    assert_eq!(spec.flags, VarFlags::PERSISTENT);
    assert_eq!(spec.init.as_deref(), Some(&[1, 0, 0, 0, 2, 0, 0, 0][..]));

    assert_eq!(kind(b.add_const_reg(pair, &[1, 2, 3])), FaultKind::Argument);
    assert_eq!(kind(b.add_const_reg(dynamic, &[])), FaultKind::Argument);
}

#[test]
fn test_proc_type_validation() {
    let mut b = ModuleBuilder::new(&Registry::new());
    let io = b.add_reg(VarTypeId::WORD, VarFlags::empty()).unwrap();
    let pinned = b.add_reg(VarTypeId::WORD, VarFlags::PERSISTENT).unwrap();

    assert_eq!(kind(b.add_proc_type(ProcTypeFlags::EXTERNAL, RegId::ERROR)), FaultKind::Argument);
    assert_eq!(kind(b.add_proc_type(ProcTypeFlags::empty(), io)), FaultKind::Argument);
    assert_eq!(
        kind(b.add_proc_type(ProcTypeFlags::EXTERNAL, RegId::new(40).unwrap())),
        FaultKind::NotFound
    );
    assert_eq!(kind(b.add_proc_type(ProcTypeFlags::EXTERNAL, pinned)), FaultKind::Argument);
    assert_eq!(b.add_proc_type(ProcTypeFlags::EXTERNAL, io).unwrap(), ProcTypeId(0));
    assert_eq!(kind(b.add_proc(ProcFlags::empty(), ProcTypeId(1))), FaultKind::NotFound);
}

#[test]
fn test_instruction_count_is_returned() {
    let (mut b, io, _, proc) = word_builder();
    assert_eq!(b.add_proc_instr(proc, Instruction::Inc(io)).unwrap(), 1);
    assert_eq!(b.add_proc_instr(proc, Instruction::Ret).unwrap(), 2);
    assert_eq!(kind(b.add_proc_instr(ProcId(5), Instruction::Ret)), FaultKind::NotFound);
}

#[test]
fn test_use_before_allocation() {
    let (mut b, _, tmp, proc) = word_builder();
    let err = b.add_proc_instr(proc, Instruction::Inc(tmp)).unwrap_err();
    assert_eq!(err.kind(), FaultKind::Operation);
    assert_eq!(err.scope_violation(), Some(&ScopeViolation::NotAllocated(tmp)));
    assert_eq!(b.description().procs[0].instr_count, 0);
}

#[test]
fn test_rejected_instruction_leaves_builder_usable() {
    let (mut b, io, tmp, proc) = word_builder();
    b.add_proc_instr(proc, Instruction::Als(tmp)).unwrap();
    assert!(b.add_proc_instr(proc, Instruction::Frs(io)).is_err());
    assert!(b.add_proc_instr(proc, Instruction::Jmp(-3)).is_err());
    b.add_proc_instr(proc, Instruction::Frs(tmp)).unwrap();
    b.add_proc_instr(proc, Instruction::Ret).unwrap();
    assert!(b.finish().is_ok());
}

#[test]
fn test_static_operand_type_fault() {
    let (mut b, io, _, proc) = word_builder();
    let small = b.add_var_type(1, 4).unwrap();
    let s = b.add_reg(small, VarFlags::empty()).unwrap();
    b.add_proc_instr(proc, Instruction::Als(s)).unwrap();
    assert_eq!(kind(b.add_proc_instr(proc, Instruction::Inc(s))), FaultKind::Type);
    let ldb = Instruction::Ldb {
        dst: io,
        src: s,
        offset: 0,
    };
    assert_eq!(kind(b.add_proc_instr(proc, ldb)), FaultKind::Type);
}

#[test]
fn test_finish_rejects_unbalanced_scopes() {
    let (mut b, _, tmp, proc) = word_builder();
    b.add_proc_instr(proc, Instruction::Als(tmp)).unwrap();
    b.add_proc_instr(proc, Instruction::Ret).unwrap();

    let err = b.create_module().unwrap_err();
    assert_eq!(err.kind(), FaultKind::Operation);
    assert_eq!(
        err.scope_violation(),
        Some(&ScopeViolation::Unbalanced { open: vec![tmp] })
    );
    // Nothing was registered and the builder still holds the module.
    assert!(b.registry.is_empty());
    assert_eq!(b.description().procs.len(), 1);
}

#[test]
fn test_finish_resets_and_assigns_id() {
    let (mut b, io, _, proc) = word_builder();
    b.add_proc_instr(proc, Instruction::Inc(io)).unwrap();
    b.add_proc_instr(proc, Instruction::Ret).unwrap();

    let first = b.finish().unwrap();
    assert!(!first.id.is_nil());
    assert!(b.description().procs.is_empty());
    assert_eq!(b.description().regs.len(), 1);
}

#[test]
fn test_create_module_registers() {
    let registry = Registry::new();
    let mut b = ModuleBuilder::new(&registry);
    let io = b.add_reg(VarTypeId::WORD, VarFlags::empty()).unwrap();
    let ptype = b.add_proc_type(ProcTypeFlags::EXTERNAL, io).unwrap();
    let proc = b.add_proc(ProcFlags::empty(), ptype).unwrap();
    b.add_proc_instr(proc, Instruction::Ret).unwrap();

    let id = b.create_module().unwrap();
    assert_eq!(registry.ids(), vec![id]);
    assert_eq!(registry.ref_count(id), Some(1));
}

#[test]
fn test_call_requires_callee_io() {
    let mut b = ModuleBuilder::new(&Registry::new());
    let a = b.add_reg(VarTypeId::WORD, VarFlags::empty()).unwrap();
    let x = b.add_reg(VarTypeId::WORD, VarFlags::empty()).unwrap();
    let outer_t = b.add_proc_type(ProcTypeFlags::EXTERNAL, a).unwrap();
    let inner_t = b.add_proc_type(ProcTypeFlags::FUNCTION, x).unwrap();
    let outer = b.add_proc(ProcFlags::empty(), outer_t).unwrap();
    let inner = b.add_proc(ProcFlags::empty(), inner_t).unwrap();

    let err = b.add_proc_instr(outer, Instruction::Call(inner)).unwrap_err();
    assert_eq!(err.scope_violation(), Some(&ScopeViolation::NotAllocated(x)));

    b.add_proc_instr(outer, Instruction::Als(x)).unwrap();
    b.add_proc_instr(outer, Instruction::Call(inner)).unwrap();
    b.add_proc_instr(outer, Instruction::Frs(x)).unwrap();
    b.add_proc_instr(outer, Instruction::Ret).unwrap();
    b.add_proc_instr(inner, Instruction::Inc(x)).unwrap();
    b.add_proc_instr(inner, Instruction::Ret).unwrap();

    // The outer type has no FUNCTION flag.
    assert_eq!(kind(b.add_proc_instr(inner, Instruction::Call(outer))), FaultKind::Type);
    assert!(b.finish().is_ok());
}

#[test]
fn test_from_description_round_trip() {
    let registry = Registry::new();
    let original = crate::samples::quicksort_description(&registry).unwrap();

    let mut b = ModuleBuilder::from_description(&registry, &original).unwrap();
    let replayed = b.finish().unwrap();
    assert_ne!(replayed.id, original.id);
    assert_eq!(replayed.vtypes, original.vtypes);
    assert_eq!(replayed.regs, original.regs);
    assert_eq!(replayed.ptypes, original.ptypes);
    assert_eq!(replayed.procs, original.procs);
}

#[test]
fn test_from_description_reverifies() {
    let registry = Registry::new();
    let mut desc = crate::samples::factorial_description(&registry).unwrap();
    // Drop the trailing RET.
    let proc = &mut desc.procs[0];
    proc.code.pop();
    proc.instr_count -= 1;

    let mut b = ModuleBuilder::from_description(&registry, &desc).unwrap();
    let err = b.finish().unwrap_err();
    assert_eq!(err.scope_violation(), Some(&ScopeViolation::FallsOffEnd));

    let mut bad = desc.clone();
    bad.regs[0].flags = VarFlags::PERSISTENT;
    assert_eq!(
        kind(ModuleBuilder::from_description(&registry, &bad)),
        FaultKind::Argument
    );
}
