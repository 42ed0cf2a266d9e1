//! Control flow instruction execution

use crate::error::{ExecFault, Result, VmError};
use crate::vm::result::ExecutionResult;
use crate::vm::VM;
use tessel_bytecode::{Instruction, RegId};

impl VM<'_> {
    /// Execute jumps, calls, returns and `THROW`
    pub(crate) fn execute_control(
        &mut self,
        instr: &Instruction,
        pc: usize,
    ) -> Result<ExecutionResult> {
        let taken = match *instr {
            Instruction::Jz(reg, _) => self.read_word(reg)? == 0,
            Instruction::Jnz(reg, _) => self.read_word(reg)? != 0,
            Instruction::Jgz(reg, _) => self.read_word(reg)? > 0,
            Instruction::Jngz(reg, _) => self.read_word(reg)? <= 0,
            Instruction::Jg(a, b, _) => self.read_word(a)? > self.read_word(b)?,
            Instruction::Jng(a, b, _) => self.read_word(a)? <= self.read_word(b)?,
            Instruction::Je(a, b, _) => self.read_word(a)? == self.read_word(b)?,
            Instruction::Jmp(_) => true,

            Instruction::Call(proc) => return Ok(ExecutionResult::Call(proc)),

            Instruction::Throw => {
                let code = self.read_word(RegId::ERROR)?;
                return Err(ExecFault::Thrown { code }.into());
            }

            Instruction::Ret => return Ok(ExecutionResult::Return),

            _ => unreachable!("Non-control instruction in control handler"),
        };

        if !taken {
            return Ok(ExecutionResult::Continue);
        }
        instr
            .jump_target(pc)
            .map(ExecutionResult::Jump)
            .ok_or_else(|| VmError::Range(format!("jump at {} leaves the procedure", pc)))
    }
}
