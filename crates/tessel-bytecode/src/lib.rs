//! Tessel bytecode format
//!
//! Leaf crate of the Tessel VM. It defines everything that makes up the
//! structural part of a module and knows nothing about execution.
//!
//! # Modules
//!
//! - `varint`: compact unsigned/signed 64-bit integer codec
//! - `opcode`: instruction opcodes and their byte values
//! - `instruction`: the `Instruction` sum type and its encoding
//! - `types`: ids, flag sets and type/register/procedure descriptors
//! - `module`: the immutable `ModuleDescription`
//! - `error`: `BytecodeError`

pub mod error;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod types;
pub mod varint;

// Re-export main types
pub use error::BytecodeError;
pub use instruction::{decode_stream, Instruction, MAX_INSTRUCTION_SIZE};
pub use module::{ModuleDescription, ModuleId};
pub use opcode::OpCode;
pub use types::{
    ProcDef, ProcFlags, ProcId, ProcType, ProcTypeFlags, ProcTypeId, RegId, VarFlags, VarSpec,
    VarType, VarTypeId, WORD_BYTES,
};
