//! Execution result types

use tessel_bytecode::ProcId;

/// Result of instruction execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionResult {
    /// Continue to next instruction
    Continue,
    /// Continue at an absolute instruction index
    Jump(usize),
    /// Enter another procedure
    Call(ProcId),
    /// Return from the current procedure
    Return,
}
