//! Scope instruction execution
//!
//! Opening a scope pushes a frame on the register and records the register
//! in the current activation; closing pops both. Popping a frame drops its
//! variable handle, which destroys the variable once nothing else owns it.

use crate::error::{Result, VmError};
use crate::vm::result::ExecutionResult;
use crate::vm::VM;
use tessel_bytecode::{Instruction, RegId};

impl VM<'_> {
    /// Execute ALS/FRS and the push/pop forms
    pub(crate) fn execute_scope(&mut self, instr: &Instruction) -> Result<ExecutionResult> {
        match *instr {
            Instruction::Als(reg) | Instruction::Push(reg) => {
                let var = self.program.reg(reg)?.allocate();
                self.open_scope(reg, Some(var))?;
            }

            Instruction::Alsr(reg) | Instruction::Pushr(reg) => self.open_scope(reg, None)?,

            Instruction::Pushh(reg) => {
                let alias = self.registers.top(reg)?;
                self.open_scope(reg, alias)?;
            }

            Instruction::Frs(reg) | Instruction::Pop(reg) => {
                if !self.current_frame_mut()?.close_scope(reg) {
                    return Err(VmError::Operation(format!("{} has no open scope", reg)));
                }
                self.registers.pop(reg)?;
            }

            Instruction::Frsl(n) | Instruction::Popl(n) => {
                for _ in 0..n {
                    let reg = self
                        .current_frame_mut()?
                        .scopes
                        .pop()
                        .ok_or_else(|| VmError::Operation("no open scope left to free".into()))?;
                    self.registers.pop(reg)?;
                }
            }

            _ => unreachable!("Non-scope instruction in scope handler"),
        }
        Ok(ExecutionResult::Continue)
    }

    fn open_scope(&mut self, reg: RegId, frame: Option<crate::variable::VarRef>) -> Result<()> {
        self.registers.push(reg, frame)?;
        self.current_frame_mut()?.scopes.push(reg);
        Ok(())
    }
}
