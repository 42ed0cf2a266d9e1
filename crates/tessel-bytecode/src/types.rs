//! Identifiers, flag sets and the structural descriptors of a module
//!
//! These are plain data. Validation against the rest of a module (id bounds,
//! overflow of persisted sizes) belongs to the module builder.

use crate::error::{BytecodeError, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Register id, restricted to a 14-bit domain so that multi-operand
/// instructions stay within the fixed maximum encoded size
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RegId(u16);

impl RegId {
    /// Largest valid register index
    pub const MAX_INDEX: u32 = (1 << 14) - 1;

    /// Error register: holds the fault code raised by `THROW`
    pub const ERROR: RegId = RegId(0);

    /// Number of low register ids reserved by the VM
    pub const RESERVED: u32 = 1;

    /// First id handed out to user registers
    pub const FIRST_USER: RegId = RegId(Self::RESERVED as u16);

    /// Create a register id, failing if it leaves the 14-bit domain
    pub fn new(index: u32) -> Result<Self> {
        if index > Self::MAX_INDEX {
            return Err(BytecodeError::RegisterOutOfRange(index));
        }
        Ok(RegId(index as u16))
    }

    /// Register index as usize
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// True for ids in the VM-reserved range
    #[inline]
    pub fn is_reserved(self) -> bool {
        (self.0 as u32) < Self::RESERVED
    }
}

impl TryFrom<u32> for RegId {
    type Error = BytecodeError;

    fn try_from(value: u32) -> Result<Self> {
        RegId::new(value)
    }
}

impl From<RegId> for u32 {
    fn from(reg: RegId) -> u32 {
        reg.0 as u32
    }
}

impl fmt::Display for RegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

macro_rules! index_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Id as a vector index
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

index_id!(
    /// Index of a [`VarType`] within its module
    VarTypeId,
    "T"
);
index_id!(
    /// Index of a [`ProcType`] within its module
    ProcTypeId,
    "P"
);
index_id!(
    /// Index of a procedure within its module
    ProcId,
    "F"
);

impl VarTypeId {
    /// Pre-registered type of one 8-byte element, used by the error register
    pub const WORD: VarTypeId = VarTypeId(0);
}

/// Size in bytes of a machine word
pub const WORD_BYTES: u32 = 8;

bitflags! {
    /// Register flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct VarFlags: u8 {
        /// Storage lives in the compiled unit and survives across calls
        const PERSISTENT = 1 << 0;
        /// Storage is allocated fresh for every execution
        const THREAD_LOCAL = 1 << 1;
        /// Frames may be null or rebound to other variables
        const NON_FIXED_REF = 1 << 2;
    }
}

impl VarFlags {
    /// Registers that are allocated for the whole execution and never
    /// opened or closed by scope instructions
    pub fn is_static(self) -> bool {
        self.intersects(VarFlags::PERSISTENT | VarFlags::THREAD_LOCAL)
    }
}

bitflags! {
    /// Procedure type flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ProcTypeFlags: u8 {
        /// Callable from the host through `call_proc`
        const EXTERNAL = 1 << 0;
        /// Callable from bytecode through `CALL`
        const FUNCTION = 1 << 1;
    }
}

bitflags! {
    /// Procedure flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ProcFlags: u8 {
        /// Emit a debug event on entry and exit
        const TRACE = 1 << 0;
    }
}

/// Shape of a register's variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarType {
    /// Elements per variable; 0 means dynamically sized
    pub element_count: u32,
    /// Payload bytes per element
    pub element_bytes: u32,
    /// Owned (reference-counted) reference slots per element
    pub owned_refs: Vec<VarTypeId>,
    /// Native (non-owning) reference slots per element
    pub native_refs: Vec<ProcTypeId>,
}

impl VarType {
    pub fn new(element_count: u32, element_bytes: u32) -> Self {
        Self {
            element_count,
            element_bytes,
            owned_refs: Vec::new(),
            native_refs: Vec::new(),
        }
    }

    /// Type of a single machine word
    pub fn word() -> Self {
        Self::new(1, WORD_BYTES)
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.element_count == 0
    }

    /// True when the element payload can hold a word
    #[inline]
    pub fn holds_word(&self) -> bool {
        self.element_bytes >= WORD_BYTES
    }
}

/// Procedure signature: flags plus the register carrying argument and result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcType {
    pub flags: ProcTypeFlags,
    pub io: RegId,
}

/// Register declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarSpec {
    pub vtype: VarTypeId,
    /// Elements allocated by `ALS`; for fixed types equals the type's count
    pub count: u32,
    pub flags: VarFlags,
    /// Initial payload of a constant-initialised persistent register
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Vec<u8>>,
}

/// Procedure: flags, signature and encoded instruction stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcDef {
    pub flags: ProcFlags,
    pub ptype: ProcTypeId,
    /// Concatenated varint-encoded instructions
    pub code: Vec<u8>,
    /// Number of instructions in `code`
    pub instr_count: u32,
}

impl ProcDef {
    pub fn new(flags: ProcFlags, ptype: ProcTypeId) -> Self {
        Self {
            flags,
            ptype,
            code: Vec::new(),
            instr_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg_id_domain() {
        assert_eq!(RegId::new(0), Ok(RegId::ERROR));
        assert_eq!(RegId::new(RegId::MAX_INDEX).map(u32::from), Ok(16383));
        assert_eq!(
            RegId::new(RegId::MAX_INDEX + 1),
            Err(BytecodeError::RegisterOutOfRange(16384))
        );
        assert!(RegId::ERROR.is_reserved());
        assert!(!RegId::FIRST_USER.is_reserved());
    }

    #[test]
    fn test_reg_id_serde_checks_range() {
        assert!(serde_json::from_str::<RegId>("12").is_ok());
        assert!(serde_json::from_str::<RegId>("20000").is_err());
    }

    #[test]
    fn test_static_flags() {
        assert!(VarFlags::PERSISTENT.is_static());
        assert!(VarFlags::THREAD_LOCAL.is_static());
        assert!(!VarFlags::NON_FIXED_REF.is_static());
        assert!(!VarFlags::empty().is_static());
    }

    #[test]
    fn test_word_type() {
        let word = VarType::word();
        assert!(word.holds_word());
        assert!(!word.is_dynamic());
        assert!(!VarType::new(0, 4).holds_word());
    }
}
