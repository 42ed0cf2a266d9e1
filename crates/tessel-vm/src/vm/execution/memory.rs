//! Data movement instruction execution
//!
//! Every handler copies out of the source before locking the destination,
//! since two registers may name the same variable.

use crate::error::{ExecFault, Result};
use crate::vm::result::ExecutionResult;
use crate::vm::VM;
use tessel_bytecode::{Instruction, RegId};

fn missing_element(reg: RegId, index: i64, len: usize) -> ExecFault {
    ExecFault::IndexOutOfRange { reg, index, len }
}

impl VM<'_> {
    /// Execute copies, loads and stores
    pub(crate) fn execute_memory(&mut self, instr: &Instruction) -> Result<ExecutionResult> {
        match *instr {
            Instruction::Cpi1(reg, v) => self.store_literal(reg, &v.to_le_bytes())?,
            Instruction::Cpi2(reg, v) => self.store_literal(reg, &v.to_le_bytes())?,
            Instruction::Cpi4(reg, v) => self.store_literal(reg, &v.to_le_bytes())?,
            Instruction::Cpi8(reg, v) => self.store_literal(reg, &v.to_le_bytes())?,

            Instruction::Cpb { dst, src } => {
                let bytes = self.registers.get(src)?.read().payload().to_vec();
                let mut var = self.registers.get(dst)?.write();
                let payload = var.payload_mut();
                let n = payload.len().min(bytes.len());
                payload[..n].copy_from_slice(&bytes[..n]);
            }

            Instruction::Lde { dst, src, index } => {
                let i = self.read_word(index)?;
                let value = {
                    let var = self.registers.get(src)?.read();
                    usize::try_from(i)
                        .ok()
                        .and_then(|i| var.element(i))
                        .ok_or_else(|| missing_element(src, i, var.len()))?
                };
                let old = {
                    let mut var = self.registers.get(dst)?.write();
                    let len = var.len();
                    var.store_element(0, value)
                        .ok_or_else(|| missing_element(dst, 0, len))?
                };
                drop(old);
            }

            Instruction::Ste { dst, index, src } => {
                let i = self.read_word(index)?;
                let value = {
                    let var = self.registers.get(src)?.read();
                    var.element(0)
                        .ok_or_else(|| missing_element(src, 0, var.len()))?
                };
                let old = {
                    let mut var = self.registers.get(dst)?.write();
                    let len = var.len();
                    usize::try_from(i)
                        .ok()
                        .and_then(|i| var.store_element(i, value))
                        .ok_or_else(|| missing_element(dst, i, len))?
                };
                drop(old);
            }

            Instruction::Ldb { dst, src, offset } => {
                let width = self.registers.get(dst)?.read().layout().element_bytes;
                let start = offset as usize;
                let end = start + width;
                let bytes = {
                    let var = self.registers.get(src)?.read();
                    let element = var
                        .bytes(0)
                        .ok_or_else(|| missing_element(src, 0, var.len()))?;
                    element
                        .get(start..end)
                        .map(<[u8]>::to_vec)
                        .ok_or(ExecFault::ByteRange {
                            reg: src,
                            start,
                            end,
                            len: element.len(),
                        })?
                };
                let mut var = self.registers.get(dst)?.write();
                let len = var.len();
                var.bytes_mut(0)
                    .ok_or_else(|| missing_element(dst, 0, len))?
                    .copy_from_slice(&bytes);
            }

            Instruction::Stb { dst, offset, src } => {
                let bytes = {
                    let var = self.registers.get(src)?.read();
                    var.bytes(0)
                        .map(<[u8]>::to_vec)
                        .ok_or_else(|| missing_element(src, 0, var.len()))?
                };
                let start = offset as usize;
                let end = start + bytes.len();
                let mut var = self.registers.get(dst)?.write();
                let count = var.len();
                let element = var
                    .bytes_mut(0)
                    .ok_or_else(|| missing_element(dst, 0, count))?;
                let len = element.len();
                element
                    .get_mut(start..end)
                    .ok_or(ExecFault::ByteRange {
                        reg: dst,
                        start,
                        end,
                        len,
                    })?
                    .copy_from_slice(&bytes);
            }

            Instruction::Ldr { dst, src, slot } => {
                let referent = {
                    let var = self.registers.get(src)?.read();
                    if var.is_empty() {
                        return Err(missing_element(src, 0, 0).into());
                    }
                    var.owned_ref(0, slot as usize).cloned()
                };
                let old = self.registers.rebind(dst, referent)?;
                drop(old);
            }

            Instruction::Str { dst, slot, src } => {
                let referent = self.registers.top(src)?;
                let old = {
                    let mut var = self.registers.get(dst)?.write();
                    let len = var.len();
                    var.replace_owned_ref(0, slot as usize, referent)
                        .ok_or_else(|| missing_element(dst, 0, len))?
                };
                // Dropped outside the owner's lock.
                drop(old);
            }

            _ => unreachable!("Non-memory instruction in memory handler"),
        }
        Ok(ExecutionResult::Continue)
    }

    /// Store `literal` into the first bytes of element 0 of `reg`
    fn store_literal(&self, reg: RegId, literal: &[u8]) -> Result<()> {
        let mut var = self.registers.get(reg)?.write();
        let len = var.len();
        let element = var
            .bytes_mut(0)
            .ok_or_else(|| missing_element(reg, 0, len))?;
        let available = element.len();
        element
            .get_mut(..literal.len())
            .ok_or(ExecFault::ByteRange {
                reg,
                start: 0,
                end: literal.len(),
                len: available,
            })?
            .copy_from_slice(literal);
        Ok(())
    }
}
