//! Error types for the builder, the module lifecycle and execution

use std::fmt;
use tessel_bytecode::{BytecodeError, ProcId, RegId};
use thiserror::Error;

/// Fault taxonomy shared by every layer of the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Value, index or size out of bounds
    Range,
    /// Unknown id, or access to a destroyed module
    NotFound,
    /// API misuse against the current state, including scope discipline
    Operation,
    /// Byte size or type mismatch between an instruction and its operands
    Type,
    /// Structurally invalid call arguments
    Argument,
    /// Malformed bytecode stream
    Encoding,
    /// Execution backend unavailable
    Environment,
    /// Fault raised while a procedure was running
    Execution,
}

/// Fault raised during execution, by `THROW` or by a runtime check
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecFault {
    /// `THROW` with the code held in the error register
    #[error("thrown fault code {code}")]
    Thrown { code: i64 },

    /// Element index outside the variable's actual element count
    #[error("index {index} out of range for {reg} ({len} elements)")]
    IndexOutOfRange { reg: RegId, index: i64, len: usize },

    /// Byte range outside the variable's actual payload
    #[error("bytes {start}..{end} out of range for {reg} ({len} bytes)")]
    ByteRange {
        reg: RegId,
        start: usize,
        end: usize,
        len: usize,
    },

    /// Use of a null reference frame
    #[error("null reference in {reg}")]
    NullReference { reg: RegId },

    /// Nested calls exceeded the configured depth
    #[error("call depth exceeded (max {0})")]
    CallDepthExceeded(usize),
}

impl ExecFault {
    /// Numeric fault code
    ///
    /// Codes raised by `THROW` are returned as-is; runtime checks use small
    /// negative codes.
    pub fn code(&self) -> i64 {
        match self {
            ExecFault::Thrown { code } => *code,
            ExecFault::IndexOutOfRange { .. } => -1,
            ExecFault::ByteRange { .. } => -2,
            ExecFault::NullReference { .. } => -3,
            ExecFault::CallDepthExceeded(_) => -4,
        }
    }
}

/// Scope-discipline violation found by the verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeViolation {
    /// Register used while it has no open scope
    NotAllocated(RegId),
    /// `FRS` on a register with no scope opened by this procedure
    NothingToFree(RegId),
    /// `FRSL n` with fewer than `n` open scopes
    TooManyFrees { requested: u32, open: usize },
    /// Scope instruction on a register allocated by the VM
    StaticRegister(RegId),
    /// Frame rebinding of a register this procedure did not open
    ForeignFrame(RegId),
    /// Predecessors of a merge point disagree on the open scopes
    MergeMismatch { target: usize },
    /// `RET` reached with scopes still open
    Unbalanced { open: Vec<RegId> },
    /// Control reaches the end of the code without `RET` or `THROW`
    FallsOffEnd,
}

impl fmt::Display for ScopeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeViolation::NotAllocated(reg) => write!(f, "{} used outside any scope", reg),
            ScopeViolation::NothingToFree(reg) => write!(f, "{} has no open scope to free", reg),
            ScopeViolation::TooManyFrees { requested, open } => {
                write!(f, "freeing {} scopes but only {} open", requested, open)
            }
            ScopeViolation::StaticRegister(reg) => {
                write!(f, "{} is allocated by the VM and cannot be scoped", reg)
            }
            ScopeViolation::ForeignFrame(reg) => {
                write!(f, "{} was not opened by this procedure", reg)
            }
            ScopeViolation::MergeMismatch { target } => {
                write!(f, "paths into instruction {} disagree on open scopes", target)
            }
            ScopeViolation::Unbalanced { open } => {
                let regs: Vec<String> = open.iter().map(|r| r.to_string()).collect();
                write!(f, "return with open scopes [{}]", regs.join(", "))
            }
            ScopeViolation::FallsOffEnd => write!(f, "control falls off the end of the code"),
        }
    }
}

/// VM errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("range fault: {0}")]
    Range(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid operation: {0}")]
    Operation(String),

    #[error("type fault: {0}")]
    Type(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("encoding fault: {0}")]
    Encoding(String),

    #[error("environment fault: {0}")]
    Environment(String),

    #[error("execution fault: {0}")]
    Execution(#[from] ExecFault),

    #[error("scope fault in {proc} at instruction {at}: {violation}")]
    Scope {
        proc: ProcId,
        at: usize,
        violation: ScopeViolation,
    },
}

impl VmError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> FaultKind {
        match self {
            VmError::Range(_) => FaultKind::Range,
            VmError::NotFound(_) => FaultKind::NotFound,
            VmError::Operation(_) | VmError::Scope { .. } => FaultKind::Operation,
            VmError::Type(_) => FaultKind::Type,
            VmError::Argument(_) => FaultKind::Argument,
            VmError::Encoding(_) => FaultKind::Encoding,
            VmError::Environment(_) => FaultKind::Environment,
            VmError::Execution(_) => FaultKind::Execution,
        }
    }

    /// Scope violation carried by this error, if any
    pub fn scope_violation(&self) -> Option<&ScopeViolation> {
        match self {
            VmError::Scope { violation, .. } => Some(violation),
            _ => None,
        }
    }
}

impl From<BytecodeError> for VmError {
    fn from(err: BytecodeError) -> Self {
        match err {
            BytecodeError::RegisterOutOfRange(_)
            | BytecodeError::ParameterOutOfRange { .. }
            | BytecodeError::InstructionTooLarge(_) => VmError::Range(err.to_string()),
            BytecodeError::EndOfData { .. } | BytecodeError::InvalidOpcode(_) => {
                VmError::Encoding(err.to_string())
            }
        }
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let scope = VmError::Scope {
            proc: ProcId(0),
            at: 3,
            violation: ScopeViolation::FallsOffEnd,
        };
        assert_eq!(scope.kind(), FaultKind::Operation);
        assert_eq!(scope.scope_violation(), Some(&ScopeViolation::FallsOffEnd));
        assert_eq!(
            VmError::from(ExecFault::Thrown { code: 9 }).kind(),
            FaultKind::Execution
        );
    }

    #[test]
    fn test_bytecode_errors_map_to_kinds() {
        assert_eq!(
            VmError::from(BytecodeError::RegisterOutOfRange(1 << 14)).kind(),
            FaultKind::Range
        );
        assert_eq!(
            VmError::from(BytecodeError::EndOfData { offset: 2 }).kind(),
            FaultKind::Encoding
        );
    }

    #[test]
    fn test_fault_codes() {
        assert_eq!(ExecFault::Thrown { code: 42 }.code(), 42);
        assert_eq!(ExecFault::CallDepthExceeded(10).code(), -4);
    }

    #[test]
    fn test_display() {
        let err = VmError::Scope {
            proc: ProcId(1),
            at: 0,
            violation: ScopeViolation::NotAllocated(RegId::FIRST_USER),
        };
        assert_eq!(
            err.to_string(),
            "scope fault in F1 at instruction 0: R1 used outside any scope"
        );
    }
}
