//! Tessel Virtual Machine
//!
//! Runtime half of the Tessel VM: a builder that assembles and verifies
//! modules, a registry that owns registered modules behind counted handles,
//! and an interpreter that executes them.
//!
//! # Architecture
//!
//! - Modules are built incrementally with [`ModuleBuilder`]. Every call is
//!   validated on the spot, and `create_module` runs a dataflow verifier that
//!   proves register scope discipline on every path before the module is
//!   registered.
//! - A registered module is structural until `unpack` compiles it through the
//!   registry's [`Backend`]; `pack` discards the compiled form again and
//!   `drop_module` destroys the module for every handle.
//! - [`Module`] handles resolve lazily against a [`Registry`] and hold a
//!   counted reference; a destroyed module is erased once the last holder
//!   lets go.
//!
//! # Modules
//!
//! - `builder`: module builder and scope verifier
//! - `variable`: runtime variables and their layouts
//! - `backend`: backend contract and runtime settings
//! - `vm`: the interpreting backend
//! - `module`: module lifecycle states
//! - `registry`: module registry and counted references
//! - `handle`: client-facing module handle
//! - `disasm`: text listing of a module
//! - `samples`: factorial and quicksort sample modules
//! - `error`: fault taxonomy

#![allow(clippy::result_large_err)]

pub mod backend;
pub mod builder;
pub mod disasm;
pub mod error;
pub mod handle;
pub mod module;
pub mod registry;
pub mod samples;
pub mod sync;
pub mod variable;
pub mod vm;

// Re-export main types
pub use backend::{Backend, CompiledUnit, RuntimeConfig, MAX_CALL_DEPTH};
pub use builder::ModuleBuilder;
pub use disasm::disassemble;
pub use error::{ExecFault, FaultKind, ScopeViolation, VmError};
pub use handle::Module;
pub use module::ModuleUnit;
pub use registry::{ModuleRef, Registry};
pub use variable::{NativeRef, VarLayout, VarRef, Variable};
pub use vm::Interpreter;

#[cfg(test)]
mod tests;
