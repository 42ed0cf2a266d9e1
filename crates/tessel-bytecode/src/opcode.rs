//! OpCode definitions for the Tessel VM
//!
//! Every instruction starts with one opcode byte followed by zero or more
//! varint-encoded parameters. Opcode values are grouped by family, leaving
//! gaps for future additions within each family.
//!
//! Operand notation used below: `R` is a register, `off` an instruction-relative
//! jump offset, `imm` a literal, `n` a scope count.

use std::fmt;

/// Instruction opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ===== Unary arithmetic =====
    /// Increment: R[A] += 1
    Inc = 0x01,
    /// Decrement: R[A] -= 1
    Dec = 0x02,

    // ===== Binary arithmetic =====
    /// Addition: R[A] = R[B] + R[C]
    Add = 0x08,
    /// Subtraction: R[A] = R[B] - R[C]
    Sub = 0x09,
    /// Multiplication: R[A] = R[B] * R[C]
    Mul = 0x0A,

    // ===== Immediate copy =====
    /// Store 1-byte literal into R[A]
    Cpi1 = 0x10,
    /// Store 2-byte literal into R[A]
    Cpi2 = 0x11,
    /// Store 4-byte literal into R[A]
    Cpi4 = 0x12,
    /// Store 8-byte literal into R[A]
    Cpi8 = 0x13,

    // ===== Unary jumps =====
    /// if R[A] == 0 then IP += off
    Jz = 0x18,
    /// if R[A] != 0 then IP += off
    Jnz = 0x19,
    /// if R[A] > 0 then IP += off
    Jgz = 0x1A,
    /// if R[A] <= 0 then IP += off
    Jngz = 0x1B,

    // ===== Binary jumps =====
    /// if R[A] > R[B] then IP += off
    Jg = 0x20,
    /// if R[A] <= R[B] then IP += off
    Jng = 0x21,
    /// if R[A] == R[B] then IP += off
    Je = 0x22,

    // ===== Unconditional jump =====
    /// IP += off
    Jmp = 0x28,

    // ===== Scope control =====
    /// Open a scope on R[A] with fresh storage
    Als = 0x30,
    /// Open a null reference scope on R[A]
    Alsr = 0x31,
    /// Close the innermost scope of R[A]
    Frs = 0x32,
    /// Close the n most recently opened scopes
    Frsl = 0x33,

    // ===== Stack push/pop =====
    /// Push fresh storage onto R[A]
    Push = 0x38,
    /// Push a null reference onto R[A]
    Pushr = 0x39,
    /// Push a frame aliasing the current variable of R[A]
    Pushh = 0x3A,
    /// Pop R[A]
    Pop = 0x3B,
    /// Pop the n most recent frames
    Popl = 0x3C,

    // ===== Bytes move =====
    /// Copy the overlapping byte range of R[B] into R[A]
    Cpb = 0x40,

    // ===== Indexed load/store =====
    /// R[A] = R[B].elements[R[C]]
    Lde = 0x48,
    /// R[A].elements[R[B]] = R[C]
    Ste = 0x49,

    // ===== Offset load/store =====
    /// R[A] = R[B].bytes[imm..]
    Ldb = 0x50,
    /// R[A].bytes[imm..] = R[C]
    Stb = 0x51,

    // ===== Reference load/store =====
    /// Rebind R[A] to the variable in owned slot imm of R[B]
    Ldr = 0x58,
    /// Owned slot imm of R[A] = R[C]
    Str = 0x59,

    // ===== Procedures =====
    /// Call procedure F[imm]
    Call = 0x60,
    /// Raise the fault code held in the error register
    Throw = 0x68,
    /// Return from the current procedure
    Ret = 0x70,
}

impl OpCode {
    /// Get opcode from byte value
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(OpCode::Inc),
            0x02 => Some(OpCode::Dec),
            0x08 => Some(OpCode::Add),
            0x09 => Some(OpCode::Sub),
            0x0A => Some(OpCode::Mul),
            0x10 => Some(OpCode::Cpi1),
            0x11 => Some(OpCode::Cpi2),
            0x12 => Some(OpCode::Cpi4),
            0x13 => Some(OpCode::Cpi8),
            0x18 => Some(OpCode::Jz),
            0x19 => Some(OpCode::Jnz),
            0x1A => Some(OpCode::Jgz),
            0x1B => Some(OpCode::Jngz),
            0x20 => Some(OpCode::Jg),
            0x21 => Some(OpCode::Jng),
            0x22 => Some(OpCode::Je),
            0x28 => Some(OpCode::Jmp),
            0x30 => Some(OpCode::Als),
            0x31 => Some(OpCode::Alsr),
            0x32 => Some(OpCode::Frs),
            0x33 => Some(OpCode::Frsl),
            0x38 => Some(OpCode::Push),
            0x39 => Some(OpCode::Pushr),
            0x3A => Some(OpCode::Pushh),
            0x3B => Some(OpCode::Pop),
            0x3C => Some(OpCode::Popl),
            0x40 => Some(OpCode::Cpb),
            0x48 => Some(OpCode::Lde),
            0x49 => Some(OpCode::Ste),
            0x50 => Some(OpCode::Ldb),
            0x51 => Some(OpCode::Stb),
            0x58 => Some(OpCode::Ldr),
            0x59 => Some(OpCode::Str),
            0x60 => Some(OpCode::Call),
            0x68 => Some(OpCode::Throw),
            0x70 => Some(OpCode::Ret),
            _ => None,
        }
    }

    /// Convert opcode to byte value
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Inc => "INC",
            OpCode::Dec => "DEC",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Cpi1 => "CPI1",
            OpCode::Cpi2 => "CPI2",
            OpCode::Cpi4 => "CPI4",
            OpCode::Cpi8 => "CPI8",
            OpCode::Jz => "JZ",
            OpCode::Jnz => "JNZ",
            OpCode::Jgz => "JGZ",
            OpCode::Jngz => "JNGZ",
            OpCode::Jg => "JG",
            OpCode::Jng => "JNG",
            OpCode::Je => "JE",
            OpCode::Jmp => "JMP",
            OpCode::Als => "ALS",
            OpCode::Alsr => "ALSR",
            OpCode::Frs => "FRS",
            OpCode::Frsl => "FRSL",
            OpCode::Push => "PUSH",
            OpCode::Pushr => "PUSHR",
            OpCode::Pushh => "PUSHH",
            OpCode::Pop => "POP",
            OpCode::Popl => "POPL",
            OpCode::Cpb => "CPB",
            OpCode::Lde => "LDE",
            OpCode::Ste => "STE",
            OpCode::Ldb => "LDB",
            OpCode::Stb => "STB",
            OpCode::Ldr => "LDR",
            OpCode::Str => "STR",
            OpCode::Call => "CALL",
            OpCode::Throw => "THROW",
            OpCode::Ret => "RET",
        }
    }

    /// True for opcodes that never fall through to the next instruction
    pub fn is_terminator(self) -> bool {
        matches!(self, OpCode::Jmp | OpCode::Throw | OpCode::Ret)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_conversion() {
        assert_eq!(OpCode::Mul.as_u8(), 0x0A);
        assert_eq!(OpCode::from_u8(0x0A), Some(OpCode::Mul));
        assert_eq!(OpCode::from_u8(0x70), Some(OpCode::Ret));
        assert_eq!(OpCode::from_u8(0x00), None);
        assert_eq!(OpCode::from_u8(0xFF), None);
    }

    #[test]
    fn test_every_byte_maps_back() {
        for byte in 0..=u8::MAX {
            if let Some(op) = OpCode::from_u8(byte) {
                assert_eq!(op.as_u8(), byte, "{}", op);
            }
        }
    }

    #[test]
    fn test_terminators() {
        assert!(OpCode::Ret.is_terminator());
        assert!(OpCode::Jmp.is_terminator());
        assert!(!OpCode::Jnz.is_terminator());
        assert_eq!(OpCode::Throw.to_string(), "THROW");
    }
}
