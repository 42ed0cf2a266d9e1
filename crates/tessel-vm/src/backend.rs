//! Code-generation backend contract
//!
//! A backend turns a verified [`ModuleDescription`] into a [`CompiledUnit`]
//! with one invocable entry point per external procedure. The bundled
//! implementation is the interpreter in [`crate::vm`]; any other backend must
//! reproduce the same instruction semantics and dynamic checks, and report
//! runtime faults as [`crate::error::VmError::Execution`].

use crate::error::Result;
use crate::sync::Arc;
use crate::variable::VarRef;
use serde::{Deserialize, Serialize};
use tessel_bytecode::{ModuleDescription, ProcId};

/// Default limit on nested `CALL`s
pub const MAX_CALL_DEPTH: usize = 10000;

/// Runtime settings shared by every unit a backend compiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum nesting of procedure calls within one `call_proc`
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}

/// Produces executable units from module descriptions
pub trait Backend: Send + Sync {
    /// Short name, for logs
    fn name(&self) -> &str;

    /// Compile a structural module
    ///
    /// Fails with an environment fault when the backend is unavailable.
    fn compile(&self, module: &ModuleDescription) -> Result<Arc<dyn CompiledUnit>>;
}

/// Executable form of one module
pub trait CompiledUnit: Send + Sync {
    /// True when `proc` is an entry point callable from the host
    fn has_entry(&self, proc: ProcId) -> bool;

    /// Run `proc` with `io` bound to its io register
    fn invoke(&self, proc: ProcId, io: &VarRef) -> Result<()>;
}
