//! Whole-procedure scope verification
//!
//! Forward dataflow over basic blocks. Every block's entry state is the
//! ordered list of open scopes; predecessors must agree on it exactly, so
//! each block is solved once and the worklist drains after at most one visit
//! per block.

use super::scope::{ScopeContext, ScopeState};
use crate::error::{Result, ScopeViolation, VmError};
use std::collections::VecDeque;
use tessel_bytecode::{Instruction, ModuleDescription, ProcId};

#[derive(Debug, Clone, Copy)]
struct BasicBlock {
    start: usize,
    end: usize,
}

fn scope_fault(proc: ProcId, at: usize, violation: ScopeViolation) -> VmError {
    VmError::Scope {
        proc,
        at,
        violation,
    }
}

/// Split `code` into basic blocks, checking jump targets on the way
fn basic_blocks(proc: ProcId, code: &[Instruction]) -> Result<Vec<BasicBlock>> {
    let mut leader = vec![false; code.len()];
    leader[0] = true;
    for (i, instr) in code.iter().enumerate() {
        if let Some(off) = instr.jump_offset() {
            let target = instr
                .jump_target(i)
                .filter(|t| *t < code.len())
                .ok_or_else(|| {
                    VmError::Range(format!(
                        "jump at {} in {} by {} leaves the procedure",
                        i, proc, off
                    ))
                })?;
            leader[target] = true;
        }
        if (instr.jump_offset().is_some() || instr.is_terminator()) && i + 1 < code.len() {
            leader[i + 1] = true;
        }
    }

    let starts: Vec<usize> = (0..code.len()).filter(|i| leader[*i]).collect();
    Ok(starts
        .iter()
        .enumerate()
        .map(|(n, start)| BasicBlock {
            start: *start,
            end: starts.get(n + 1).copied().unwrap_or(code.len()),
        })
        .collect())
}

/// Prove scope discipline for every path of procedure `proc`
pub(crate) fn verify_proc(module: &ModuleDescription, proc: ProcId) -> Result<()> {
    let ctx = ScopeContext::new(module, proc)
        .ok_or_else(|| VmError::NotFound(format!("procedure {}", proc)))?;
    let code = module
        .decode_proc(proc)
        .ok_or_else(|| VmError::NotFound(format!("procedure {}", proc)))??;
    if code.is_empty() {
        return Err(scope_fault(proc, 0, ScopeViolation::FallsOffEnd));
    }

    let blocks = basic_blocks(proc, &code)?;
    let mut block_at = vec![0usize; code.len()];
    for (n, block) in blocks.iter().enumerate() {
        block_at[block.start..block.end].fill(n);
    }

    let mut entry: Vec<Option<ScopeState>> = vec![None; blocks.len()];
    entry[0] = Some(ScopeState::default());
    let mut worklist = VecDeque::from([0usize]);

    while let Some(n) = worklist.pop_front() {
        let block = blocks[n];
        let mut state = match &entry[n] {
            Some(state) => state.clone(),
            None => continue,
        };

        for at in block.start..block.end {
            state
                .step(&ctx, &code[at])
                .map_err(|v| scope_fault(proc, at, v))?;
        }

        let last = block.end - 1;
        let instr = &code[last];
        if matches!(instr, Instruction::Ret) && !state.is_balanced() {
            let open = state.open_scopes().to_vec();
            return Err(scope_fault(proc, last, ScopeViolation::Unbalanced { open }));
        }

        let mut successors = Vec::with_capacity(2);
        if let Some(target) = instr.jump_target(last) {
            successors.push(target);
        }
        if !instr.is_terminator() {
            if block.end == code.len() {
                return Err(scope_fault(proc, last, ScopeViolation::FallsOffEnd));
            }
            successors.push(block.end);
        }

        for target in successors {
            let succ = block_at[target];
            match &entry[succ] {
                None => {
                    entry[succ] = Some(state.clone());
                    worklist.push_back(succ);
                }
                Some(known) if *known != state => {
                    return Err(scope_fault(
                        proc,
                        last,
                        ScopeViolation::MergeMismatch { target },
                    ));
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// Verify every procedure of a module
pub(crate) fn verify_module(module: &ModuleDescription) -> Result<()> {
    (0..module.procs.len()).try_for_each(|i| verify_proc(module, ProcId(i as u32)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_bytecode::{
        ProcDef, ProcFlags, ProcType, ProcTypeFlags, ProcTypeId, RegId, VarFlags, VarSpec,
        VarType, VarTypeId,
    };
    use uuid::Uuid;

    fn reg(n: u32) -> RegId {
        RegId::new(n).unwrap()
    }

    fn module_with(code: &[Instruction]) -> ModuleDescription {
        let mut def = ProcDef::new(ProcFlags::empty(), ProcTypeId(0));
        for instr in code {
            instr.encode(&mut def.code);
        }
        def.instr_count = code.len() as u32;
        let word = VarSpec {
            vtype: VarTypeId::WORD,
            count: 1,
            flags: VarFlags::empty(),
            init: None,
        };
        ModuleDescription {
            id: Uuid::nil(),
            vtypes: vec![VarType::word()],
            ptypes: vec![ProcType {
                flags: ProcTypeFlags::EXTERNAL,
                io: reg(1),
            }],
            regs: vec![word.clone(), word.clone(), word],
            procs: vec![def],
        }
    }

    fn verify(code: &[Instruction]) -> std::result::Result<(), ScopeViolation> {
        match verify_proc(&module_with(code), ProcId(0)) {
            Ok(()) => Ok(()),
            Err(VmError::Scope { violation, .. }) => Err(violation),
            Err(other) => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_balanced_loop() {
        use Instruction::*;
        let code = [
            Als(reg(2)),
            Cpi8(reg(2), 3),
            Dec(reg(2)),
            Jnz(reg(2), -1),
            Frs(reg(2)),
            Ret,
        ];
        assert_eq!(verify(&code), Ok(()));
    }

    #[test]
    fn test_unbalanced_return() {
        use Instruction::*;
        assert_eq!(
            verify(&[Als(reg(2)), Ret]),
            Err(ScopeViolation::Unbalanced { open: vec![reg(2)] })
        );
    }

    #[test]
    fn test_unbalanced_on_one_path_only() {
        use Instruction::*;
        // The early return skips the FRS.
        let code = [Als(reg(2)), Jz(reg(1), 2), Frs(reg(2)), Ret];
        assert_eq!(
            verify(&code),
            Err(ScopeViolation::Unbalanced { open: vec![reg(2)] })
        );
    }

    #[test]
    fn test_loop_that_leaks_a_scope() {
        use Instruction::*;
        let code = [Als(reg(2)), Jnz(reg(1), -1), Frs(reg(2)), Ret];
        assert_eq!(
            verify(&code),
            Err(ScopeViolation::MergeMismatch { target: 0 })
        );
    }

    #[test]
    fn test_falls_off_end() {
        use Instruction::*;
        assert_eq!(verify(&[Inc(reg(1))]), Err(ScopeViolation::FallsOffEnd));
        assert_eq!(verify(&[]), Err(ScopeViolation::FallsOffEnd));
    }

    #[test]
    fn test_throw_terminates_a_path() {
        use Instruction::*;
        let code = [Als(reg(2)), Jz(reg(1), 2), Throw, Frs(reg(2)), Ret];
        assert_eq!(verify(&code), Ok(()));
    }

    #[test]
    fn test_unreachable_code_is_ignored() {
        use Instruction::*;
        assert_eq!(verify(&[Ret, Inc(reg(2))]), Ok(()));
    }

    #[test]
    fn test_jump_out_of_range() {
        use Instruction::*;
        let err = verify_proc(&module_with(&[Jmp(5), Ret]), ProcId(0)).unwrap_err();
        assert!(matches!(err, VmError::Range(_)));
    }
}
