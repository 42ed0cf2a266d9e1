//! Error types for the bytecode layer

use thiserror::Error;

/// Errors raised while building, encoding or decoding bytecode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// The byte stream ended before a terminating varint byte was read
    #[error("unexpected end of data at byte {offset}")]
    EndOfData { offset: usize },

    /// Register id outside the 14-bit register domain
    #[error("register id {0} out of range (max {max})", max = crate::types::RegId::MAX_INDEX)]
    RegisterOutOfRange(u32),

    /// Opcode byte that does not name an instruction
    #[error("invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    /// A decoded parameter does not fit the field it is stored in
    #[error("{field} value {value} out of range")]
    ParameterOutOfRange { field: &'static str, value: i128 },

    /// An encoded instruction exceeded the fixed maximum size
    #[error("instruction occupies {0} bytes (max {max})", max = crate::instruction::MAX_INSTRUCTION_SIZE)]
    InstructionTooLarge(usize),
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, BytecodeError>;
