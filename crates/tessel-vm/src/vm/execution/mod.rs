//! Instruction execution handlers

mod arithmetic;
mod control;
mod memory;
mod scope;

use crate::error::{ExecFault, Result};
use crate::vm::result::ExecutionResult;
use crate::vm::VM;
use tessel_bytecode::{Instruction, RegId};

impl VM<'_> {
    /// Execute one instruction located at `pc`
    pub(crate) fn execute_instruction(
        &mut self,
        instr: &Instruction,
        pc: usize,
    ) -> Result<ExecutionResult> {
        use Instruction::*;

        match instr {
            Inc(_) | Dec(_) | Add { .. } | Sub { .. } | Mul { .. } => self.execute_arithmetic(instr),

            Jz(..) | Jnz(..) | Jgz(..) | Jngz(..) | Jg(..) | Jng(..) | Je(..) | Jmp(_)
            | Call(_) | Throw | Ret => self.execute_control(instr, pc),

            Als(_) | Alsr(_) | Frs(_) | Frsl(_) | Push(_) | Pushr(_) | Pushh(_) | Pop(_)
            | Popl(_) => self.execute_scope(instr),

            Cpi1(..) | Cpi2(..) | Cpi4(..) | Cpi8(..) | Cpb { .. } | Lde { .. } | Ste { .. }
            | Ldb { .. } | Stb { .. } | Ldr { .. } | Str { .. } => self.execute_memory(instr),
        }
    }

    /// Word held by `reg`
    #[inline]
    pub(crate) fn read_word(&self, reg: RegId) -> Result<i64> {
        let var = self.registers.get(reg)?.read();
        var.word(0).ok_or_else(|| {
            ExecFault::IndexOutOfRange {
                reg,
                index: 0,
                len: var.len(),
            }
            .into()
        })
    }

    /// Store a word into `reg`
    #[inline]
    pub(crate) fn write_word(&self, reg: RegId, value: i64) -> Result<()> {
        let mut var = self.registers.get(reg)?.write();
        let len = var.len();
        var.set_word(0, value)
            .map_err(|_| ExecFault::IndexOutOfRange { reg, index: 0, len }.into())
    }
}
