//! Arithmetic instruction execution
//!
//! Words are signed 64-bit little-endian and wrap on overflow.

use crate::error::Result;
use crate::vm::result::ExecutionResult;
use crate::vm::VM;
use tessel_bytecode::Instruction;

impl VM<'_> {
    /// Execute arithmetic instructions
    pub(crate) fn execute_arithmetic(&mut self, instr: &Instruction) -> Result<ExecutionResult> {
        match *instr {
            Instruction::Inc(reg) => {
                let value = self.read_word(reg)?;
                self.write_word(reg, value.wrapping_add(1))?;
            }

            Instruction::Dec(reg) => {
                let value = self.read_word(reg)?;
                self.write_word(reg, value.wrapping_sub(1))?;
            }

            Instruction::Add { dst, a, b } => {
                let (left, right) = (self.read_word(a)?, self.read_word(b)?);
                self.write_word(dst, left.wrapping_add(right))?;
            }

            Instruction::Sub { dst, a, b } => {
                let (left, right) = (self.read_word(a)?, self.read_word(b)?);
                self.write_word(dst, left.wrapping_sub(right))?;
            }

            Instruction::Mul { dst, a, b } => {
                let (left, right) = (self.read_word(a)?, self.read_word(b)?);
                self.write_word(dst, left.wrapping_mul(right))?;
            }

            _ => unreachable!("Non-arithmetic instruction in arithmetic handler"),
        }
        Ok(ExecutionResult::Continue)
    }
}
