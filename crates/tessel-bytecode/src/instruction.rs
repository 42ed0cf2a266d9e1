//! Instruction sum type and its variable-length encoding
//!
//! Encoded form: `[opcode byte][param]*`, each parameter a varint. Register ids,
//! counts, slots and offsets use the unsigned encoding; jump offsets and
//! immediate literals use the signed one. Jump offsets count instructions, not
//! bytes, and are relative to the jump itself.

use crate::error::{BytecodeError, Result};
use crate::opcode::OpCode;
use crate::types::{ProcId, RegId};
use crate::varint;
use std::fmt;

/// Upper bound on the encoded size of one instruction
///
/// Only `CPI8` reaches it: opcode, a two-byte register id and a nine-byte
/// literal. Every other opcode fits in ten bytes, the widest being `JG`-style
/// compares and `LDB`/`STB` with a five-byte offset.
pub const MAX_INSTRUCTION_SIZE: usize = 12;

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Inc(RegId),
    Dec(RegId),
    Add { dst: RegId, a: RegId, b: RegId },
    Sub { dst: RegId, a: RegId, b: RegId },
    Mul { dst: RegId, a: RegId, b: RegId },
    Cpi1(RegId, i8),
    Cpi2(RegId, i16),
    Cpi4(RegId, i32),
    Cpi8(RegId, i64),
    Jz(RegId, i32),
    Jnz(RegId, i32),
    Jgz(RegId, i32),
    Jngz(RegId, i32),
    Jg(RegId, RegId, i32),
    Jng(RegId, RegId, i32),
    Je(RegId, RegId, i32),
    Jmp(i32),
    Als(RegId),
    Alsr(RegId),
    Frs(RegId),
    Frsl(u32),
    Push(RegId),
    Pushr(RegId),
    Pushh(RegId),
    Pop(RegId),
    Popl(u32),
    Cpb { dst: RegId, src: RegId },
    Lde { dst: RegId, src: RegId, index: RegId },
    Ste { dst: RegId, index: RegId, src: RegId },
    Ldb { dst: RegId, src: RegId, offset: u32 },
    Stb { dst: RegId, offset: u32, src: RegId },
    Ldr { dst: RegId, src: RegId, slot: u32 },
    Str { dst: RegId, slot: u32, src: RegId },
    Call(ProcId),
    Throw,
    Ret,
}

impl Instruction {
    /// Opcode of this instruction
    pub fn opcode(&self) -> OpCode {
        match self {
            Instruction::Inc(_) => OpCode::Inc,
            Instruction::Dec(_) => OpCode::Dec,
            Instruction::Add { .. } => OpCode::Add,
            Instruction::Sub { .. } => OpCode::Sub,
            Instruction::Mul { .. } => OpCode::Mul,
            Instruction::Cpi1(..) => OpCode::Cpi1,
            Instruction::Cpi2(..) => OpCode::Cpi2,
            Instruction::Cpi4(..) => OpCode::Cpi4,
            Instruction::Cpi8(..) => OpCode::Cpi8,
            Instruction::Jz(..) => OpCode::Jz,
            Instruction::Jnz(..) => OpCode::Jnz,
            Instruction::Jgz(..) => OpCode::Jgz,
            Instruction::Jngz(..) => OpCode::Jngz,
            Instruction::Jg(..) => OpCode::Jg,
            Instruction::Jng(..) => OpCode::Jng,
            Instruction::Je(..) => OpCode::Je,
            Instruction::Jmp(_) => OpCode::Jmp,
            Instruction::Als(_) => OpCode::Als,
            Instruction::Alsr(_) => OpCode::Alsr,
            Instruction::Frs(_) => OpCode::Frs,
            Instruction::Frsl(_) => OpCode::Frsl,
            Instruction::Push(_) => OpCode::Push,
            Instruction::Pushr(_) => OpCode::Pushr,
            Instruction::Pushh(_) => OpCode::Pushh,
            Instruction::Pop(_) => OpCode::Pop,
            Instruction::Popl(_) => OpCode::Popl,
            Instruction::Cpb { .. } => OpCode::Cpb,
            Instruction::Lde { .. } => OpCode::Lde,
            Instruction::Ste { .. } => OpCode::Ste,
            Instruction::Ldb { .. } => OpCode::Ldb,
            Instruction::Stb { .. } => OpCode::Stb,
            Instruction::Ldr { .. } => OpCode::Ldr,
            Instruction::Str { .. } => OpCode::Str,
            Instruction::Call(_) => OpCode::Call,
            Instruction::Throw => OpCode::Throw,
            Instruction::Ret => OpCode::Ret,
        }
    }

    /// Relative jump offset, for jump instructions
    pub fn jump_offset(&self) -> Option<i32> {
        match *self {
            Instruction::Jz(_, off)
            | Instruction::Jnz(_, off)
            | Instruction::Jgz(_, off)
            | Instruction::Jngz(_, off)
            | Instruction::Jg(_, _, off)
            | Instruction::Jng(_, _, off)
            | Instruction::Je(_, _, off)
            | Instruction::Jmp(off) => Some(off),
            _ => None,
        }
    }

    /// Absolute target of a jump located at instruction `index`
    ///
    /// `None` for non-jumps and for targets before the start of the code.
    pub fn jump_target(&self, index: usize) -> Option<usize> {
        let off = self.jump_offset()?;
        let target = index as i64 + off as i64;
        usize::try_from(target).ok()
    }

    /// True when control never continues with the next instruction
    #[inline]
    pub fn is_terminator(&self) -> bool {
        self.opcode().is_terminator()
    }

    /// Append the encoded instruction to `out`, returning the bytes written
    pub fn encode(&self, out: &mut Vec<u8>) -> usize {
        let start = out.len();
        out.push(self.opcode().as_u8());
        let mut w = ParamWriter { out };
        match *self {
            Instruction::Inc(r)
            | Instruction::Dec(r)
            | Instruction::Als(r)
            | Instruction::Alsr(r)
            | Instruction::Frs(r)
            | Instruction::Push(r)
            | Instruction::Pushr(r)
            | Instruction::Pushh(r)
            | Instruction::Pop(r) => w.reg(r),
            Instruction::Add { dst, a, b }
            | Instruction::Sub { dst, a, b }
            | Instruction::Mul { dst, a, b } => {
                w.reg(dst);
                w.reg(a);
                w.reg(b);
            }
            Instruction::Cpi1(r, v) => {
                w.reg(r);
                w.signed(v as i64);
            }
            Instruction::Cpi2(r, v) => {
                w.reg(r);
                w.signed(v as i64);
            }
            Instruction::Cpi4(r, v) => {
                w.reg(r);
                w.signed(v as i64);
            }
            Instruction::Cpi8(r, v) => {
                w.reg(r);
                w.signed(v);
            }
            Instruction::Jz(r, off)
            | Instruction::Jnz(r, off)
            | Instruction::Jgz(r, off)
            | Instruction::Jngz(r, off) => {
                w.reg(r);
                w.signed(off as i64);
            }
            Instruction::Jg(a, b, off) | Instruction::Jng(a, b, off) | Instruction::Je(a, b, off) => {
                w.reg(a);
                w.reg(b);
                w.signed(off as i64);
            }
            Instruction::Jmp(off) => w.signed(off as i64),
            Instruction::Frsl(n) | Instruction::Popl(n) => w.unsigned(n as u64),
            Instruction::Cpb { dst, src } => {
                w.reg(dst);
                w.reg(src);
            }
            Instruction::Lde { dst, src, index } => {
                w.reg(dst);
                w.reg(src);
                w.reg(index);
            }
            Instruction::Ste { dst, index, src } => {
                w.reg(dst);
                w.reg(index);
                w.reg(src);
            }
            Instruction::Ldb { dst, src, offset } => {
                w.reg(dst);
                w.reg(src);
                w.unsigned(offset as u64);
            }
            Instruction::Stb { dst, offset, src } => {
                w.reg(dst);
                w.unsigned(offset as u64);
                w.reg(src);
            }
            Instruction::Ldr { dst, src, slot } => {
                w.reg(dst);
                w.reg(src);
                w.unsigned(slot as u64);
            }
            Instruction::Str { dst, slot, src } => {
                w.reg(dst);
                w.unsigned(slot as u64);
                w.reg(src);
            }
            Instruction::Call(proc) => w.unsigned(proc.0 as u64),
            Instruction::Throw | Instruction::Ret => {}
        }
        let written = out.len() - start;
        debug_assert!(written <= MAX_INSTRUCTION_SIZE);
        written
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        let mut scratch = Vec::with_capacity(MAX_INSTRUCTION_SIZE);
        self.encode(&mut scratch)
    }

    /// Decode one instruction from the front of `bytes`
    ///
    /// Returns the instruction and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Instruction, usize)> {
        let opcode_byte = *bytes.first().ok_or(BytecodeError::EndOfData { offset: 0 })?;
        let opcode = OpCode::from_u8(opcode_byte).ok_or(BytecodeError::InvalidOpcode(opcode_byte))?;
        let mut r = ParamReader { bytes, pos: 1 };

        let instruction = match opcode {
            OpCode::Inc => Instruction::Inc(r.reg()?),
            OpCode::Dec => Instruction::Dec(r.reg()?),
            OpCode::Add => Instruction::Add {
                dst: r.reg()?,
                a: r.reg()?,
                b: r.reg()?,
            },
            OpCode::Sub => Instruction::Sub {
                dst: r.reg()?,
                a: r.reg()?,
                b: r.reg()?,
            },
            OpCode::Mul => Instruction::Mul {
                dst: r.reg()?,
                a: r.reg()?,
                b: r.reg()?,
            },
            OpCode::Cpi1 => Instruction::Cpi1(r.reg()?, r.narrow("cpi1 literal")?),
            OpCode::Cpi2 => Instruction::Cpi2(r.reg()?, r.narrow("cpi2 literal")?),
            OpCode::Cpi4 => Instruction::Cpi4(r.reg()?, r.narrow("cpi4 literal")?),
            OpCode::Cpi8 => Instruction::Cpi8(r.reg()?, r.signed()?),
            OpCode::Jz => Instruction::Jz(r.reg()?, r.narrow("jump offset")?),
            OpCode::Jnz => Instruction::Jnz(r.reg()?, r.narrow("jump offset")?),
            OpCode::Jgz => Instruction::Jgz(r.reg()?, r.narrow("jump offset")?),
            OpCode::Jngz => Instruction::Jngz(r.reg()?, r.narrow("jump offset")?),
            OpCode::Jg => Instruction::Jg(r.reg()?, r.reg()?, r.narrow("jump offset")?),
            OpCode::Jng => Instruction::Jng(r.reg()?, r.reg()?, r.narrow("jump offset")?),
            OpCode::Je => Instruction::Je(r.reg()?, r.reg()?, r.narrow("jump offset")?),
            OpCode::Jmp => Instruction::Jmp(r.narrow("jump offset")?),
            OpCode::Als => Instruction::Als(r.reg()?),
            OpCode::Alsr => Instruction::Alsr(r.reg()?),
            OpCode::Frs => Instruction::Frs(r.reg()?),
            OpCode::Frsl => Instruction::Frsl(r.u32("scope count")?),
            OpCode::Push => Instruction::Push(r.reg()?),
            OpCode::Pushr => Instruction::Pushr(r.reg()?),
            OpCode::Pushh => Instruction::Pushh(r.reg()?),
            OpCode::Pop => Instruction::Pop(r.reg()?),
            OpCode::Popl => Instruction::Popl(r.u32("scope count")?),
            OpCode::Cpb => Instruction::Cpb {
                dst: r.reg()?,
                src: r.reg()?,
            },
            OpCode::Lde => Instruction::Lde {
                dst: r.reg()?,
                src: r.reg()?,
                index: r.reg()?,
            },
            OpCode::Ste => Instruction::Ste {
                dst: r.reg()?,
                index: r.reg()?,
                src: r.reg()?,
            },
            OpCode::Ldb => Instruction::Ldb {
                dst: r.reg()?,
                src: r.reg()?,
                offset: r.u32("byte offset")?,
            },
            OpCode::Stb => Instruction::Stb {
                dst: r.reg()?,
                offset: r.u32("byte offset")?,
                src: r.reg()?,
            },
            OpCode::Ldr => Instruction::Ldr {
                dst: r.reg()?,
                src: r.reg()?,
                slot: r.u32("reference slot")?,
            },
            OpCode::Str => Instruction::Str {
                dst: r.reg()?,
                slot: r.u32("reference slot")?,
                src: r.reg()?,
            },
            OpCode::Call => Instruction::Call(ProcId(r.u32("procedure id")?)),
            OpCode::Throw => Instruction::Throw,
            OpCode::Ret => Instruction::Ret,
        };

        if r.pos > MAX_INSTRUCTION_SIZE {
            return Err(BytecodeError::InstructionTooLarge(r.pos));
        }
        Ok((instruction, r.pos))
    }
}

struct ParamWriter<'a> {
    out: &'a mut Vec<u8>,
}

impl ParamWriter<'_> {
    fn reg(&mut self, reg: RegId) {
        varint::encode_u64(u32::from(reg) as u64, self.out);
    }

    fn unsigned(&mut self, value: u64) {
        varint::encode_u64(value, self.out);
    }

    fn signed(&mut self, value: i64) {
        varint::encode_i64(value, self.out);
    }
}

struct ParamReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl ParamReader<'_> {
    fn rest(&self) -> &[u8] {
        self.bytes.get(self.pos..).unwrap_or(&[])
    }

    fn relocate(&self, err: BytecodeError) -> BytecodeError {
        match err {
            BytecodeError::EndOfData { offset } => BytecodeError::EndOfData {
                offset: self.pos + offset,
            },
            other => other,
        }
    }

    fn unsigned(&mut self) -> Result<u64> {
        let (value, used) = varint::decode_u64(self.rest()).map_err(|e| self.relocate(e))?;
        self.pos += used;
        Ok(value)
    }

    fn signed(&mut self) -> Result<i64> {
        let (value, used) = varint::decode_i64(self.rest()).map_err(|e| self.relocate(e))?;
        self.pos += used;
        Ok(value)
    }

    fn reg(&mut self) -> Result<RegId> {
        let raw = self.unsigned()?;
        let index = u32::try_from(raw).map_err(|_| BytecodeError::RegisterOutOfRange(u32::MAX))?;
        RegId::new(index)
    }

    fn u32(&mut self, field: &'static str) -> Result<u32> {
        let raw = self.unsigned()?;
        u32::try_from(raw).map_err(|_| BytecodeError::ParameterOutOfRange {
            field,
            value: raw as i128,
        })
    }

    fn narrow<T: TryFrom<i64>>(&mut self, field: &'static str) -> Result<T> {
        let raw = self.signed()?;
        T::try_from(raw).map_err(|_| BytecodeError::ParameterOutOfRange {
            field,
            value: raw as i128,
        })
    }
}

/// Decode a whole instruction stream, tracking instruction boundaries
pub fn decode_stream(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut pos = 0;
    let mut out = Vec::new();
    while pos < code.len() {
        let (instruction, used) = Instruction::decode(&code[pos..]).map_err(|err| match err {
            BytecodeError::EndOfData { offset } => BytecodeError::EndOfData {
                offset: pos + offset,
            },
            other => other,
        })?;
        out.push(instruction);
        pos += used;
    }
    Ok(out)
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode().name();
        match *self {
            Instruction::Inc(r)
            | Instruction::Dec(r)
            | Instruction::Als(r)
            | Instruction::Alsr(r)
            | Instruction::Frs(r)
            | Instruction::Push(r)
            | Instruction::Pushr(r)
            | Instruction::Pushh(r)
            | Instruction::Pop(r) => write!(f, "{:<6}{}", name, r),
            Instruction::Add { dst, a, b }
            | Instruction::Sub { dst, a, b }
            | Instruction::Mul { dst, a, b } => write!(f, "{:<6}{}, {}, {}", name, dst, a, b),
            Instruction::Cpi1(r, v) => write!(f, "{:<6}{}, {}", name, r, v),
            Instruction::Cpi2(r, v) => write!(f, "{:<6}{}, {}", name, r, v),
            Instruction::Cpi4(r, v) => write!(f, "{:<6}{}, {}", name, r, v),
            Instruction::Cpi8(r, v) => write!(f, "{:<6}{}, {}", name, r, v),
            Instruction::Jz(r, off)
            | Instruction::Jnz(r, off)
            | Instruction::Jgz(r, off)
            | Instruction::Jngz(r, off) => write!(f, "{:<6}{}, {:+}", name, r, off),
            Instruction::Jg(a, b, off) | Instruction::Jng(a, b, off) | Instruction::Je(a, b, off) => {
                write!(f, "{:<6}{}, {}, {:+}", name, a, b, off)
            }
            Instruction::Jmp(off) => write!(f, "{:<6}{:+}", name, off),
            Instruction::Frsl(n) | Instruction::Popl(n) => write!(f, "{:<6}{}", name, n),
            Instruction::Cpb { dst, src } => write!(f, "{:<6}{}, {}", name, dst, src),
            Instruction::Lde { dst, src, index } => {
                write!(f, "{:<6}{}, {}[{}]", name, dst, src, index)
            }
            Instruction::Ste { dst, index, src } => {
                write!(f, "{:<6}{}[{}], {}", name, dst, index, src)
            }
            Instruction::Ldb { dst, src, offset } => {
                write!(f, "{:<6}{}, {}+{}", name, dst, src, offset)
            }
            Instruction::Stb { dst, offset, src } => {
                write!(f, "{:<6}{}+{}, {}", name, dst, offset, src)
            }
            Instruction::Ldr { dst, src, slot } => {
                write!(f, "{:<6}{}, {}.ref{}", name, dst, src, slot)
            }
            Instruction::Str { dst, slot, src } => {
                write!(f, "{:<6}{}.ref{}, {}", name, dst, slot, src)
            }
            Instruction::Call(proc) => write!(f, "{:<6}{}", name, proc),
            Instruction::Throw | Instruction::Ret => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(index: u32) -> RegId {
        RegId::new(index).unwrap()
    }

    fn round_trip(instruction: Instruction) -> usize {
        let mut bytes = Vec::new();
        let len = instruction.encode(&mut bytes);
        assert_eq!(len, bytes.len());
        assert_eq!(Instruction::decode(&bytes), Ok((instruction, len)));
        len
    }

    #[test]
    fn test_compact_forms() {
        assert_eq!(round_trip(Instruction::Ret), 1);
        assert_eq!(round_trip(Instruction::Inc(reg(3))), 2);
        assert_eq!(round_trip(Instruction::Jnz(reg(1), -2)), 3);
        assert_eq!(
            round_trip(Instruction::Mul {
                dst: reg(1),
                a: reg(1),
                b: reg(2)
            }),
            4
        );
    }

    #[test]
    fn test_worst_case_sizes() {
        let high = reg(RegId::MAX_INDEX);
        assert_eq!(round_trip(Instruction::Cpi8(high, i64::MIN)), MAX_INSTRUCTION_SIZE);
        assert_eq!(round_trip(Instruction::Cpi4(high, i32::MIN)), 8);
        assert_eq!(round_trip(Instruction::Jg(high, high, i32::MIN)), 10);
        assert_eq!(
            round_trip(Instruction::Ldb {
                dst: high,
                src: high,
                offset: u32::MAX
            }),
            10
        );
        assert_eq!(
            round_trip(Instruction::Ste {
                dst: high,
                index: high,
                src: high
            }),
            7
        );
        assert_eq!(round_trip(Instruction::Call(ProcId(u32::MAX))), 6);
    }

    #[test]
    fn test_decode_rejects_wide_register() {
        // INC with register id 2^14 (three varint bytes).
        let mut bytes = vec![OpCode::Inc.as_u8()];
        varint::encode_u64(1 << 14, &mut bytes);
        assert_eq!(
            Instruction::decode(&bytes),
            Err(BytecodeError::RegisterOutOfRange(1 << 14))
        );
    }

    #[test]
    fn test_decode_rejects_wide_literal() {
        let mut bytes = vec![OpCode::Cpi1.as_u8(), 0x01];
        varint::encode_i64(300, &mut bytes);
        assert!(matches!(
            Instruction::decode(&bytes),
            Err(BytecodeError::ParameterOutOfRange { value: 300, .. })
        ));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Instruction::decode(&[]),
            Err(BytecodeError::EndOfData { offset: 0 })
        );
        assert_eq!(
            Instruction::decode(&[0xEE]),
            Err(BytecodeError::InvalidOpcode(0xEE))
        );
        // ADD missing its third operand.
        assert_eq!(
            Instruction::decode(&[OpCode::Add.as_u8(), 0x01, 0x02]),
            Err(BytecodeError::EndOfData { offset: 3 })
        );
    }

    #[test]
    fn test_decode_stream_tracks_boundaries() {
        let program = [
            Instruction::Cpi8(reg(1), 1_000_000),
            Instruction::Dec(reg(1)),
            Instruction::Jnz(reg(1), -1),
            Instruction::Ret,
        ];
        let mut code = Vec::new();
        for instruction in &program {
            instruction.encode(&mut code);
        }
        assert_eq!(decode_stream(&code), Ok(program.to_vec()));

        code.pop();
        code.push(OpCode::Jmp.as_u8());
        assert!(matches!(
            decode_stream(&code),
            Err(BytecodeError::EndOfData { .. })
        ));
    }

    #[test]
    fn test_jump_targets() {
        assert_eq!(Instruction::Jmp(3).jump_target(2), Some(5));
        assert_eq!(Instruction::Jz(reg(1), -2).jump_target(2), Some(0));
        assert_eq!(Instruction::Jz(reg(1), -3).jump_target(2), None);
        assert_eq!(Instruction::Ret.jump_target(0), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Instruction::Ldr {
                dst: reg(2),
                src: reg(1),
                slot: 0
            }
            .to_string(),
            "LDR   R2, R1.ref0"
        );
        assert_eq!(Instruction::Jmp(-4).to_string(), "JMP   -4");
        assert_eq!(Instruction::Ret.to_string(), "RET");
    }
}
