//! Module lifecycle
//!
//! A registered module is either structural (descriptors and bytecode only),
//! compiled (an executable unit exists as well) or destroyed. `unpack` and
//! `pack` move between the first two any number of times; `destroy` is final.

use crate::backend::{Backend, CompiledUnit};
use crate::error::{Result, VmError};
use crate::sync::{Arc, RwLock};
use crate::variable::VarRef;
use std::sync::atomic::{AtomicBool, Ordering};
use tessel_bytecode::{ModuleDescription, ModuleId, ProcId};
use tracing::{debug, warn};

enum UnitState {
    Structural(Arc<ModuleDescription>),
    Compiled {
        desc: Arc<ModuleDescription>,
        unit: Arc<dyn CompiledUnit>,
    },
    Destroyed,
}

/// Registered module and its lifecycle state
pub struct ModuleUnit {
    id: ModuleId,
    backend: Arc<dyn Backend>,
    state: RwLock<UnitState>,
    destroyed: AtomicBool,
}

impl ModuleUnit {
    pub(crate) fn new(desc: ModuleDescription, backend: Arc<dyn Backend>) -> Self {
        Self {
            id: desc.id,
            backend,
            state: RwLock::new(UnitState::Structural(Arc::new(desc))),
            destroyed: AtomicBool::new(false),
        }
    }

    fn gone(&self) -> VmError {
        VmError::NotFound(format!("module {} has been destroyed", self.id))
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Structural description
    pub fn description(&self) -> Result<Arc<ModuleDescription>> {
        match &*self.state.read() {
            UnitState::Structural(desc) | UnitState::Compiled { desc, .. } => Ok(desc.clone()),
            UnitState::Destroyed => Err(self.gone()),
        }
    }

    pub fn is_compiled(&self) -> Result<bool> {
        match &*self.state.read() {
            UnitState::Structural(_) => Ok(false),
            UnitState::Compiled { .. } => Ok(true),
            UnitState::Destroyed => Err(self.gone()),
        }
    }

    pub fn is_packed(&self) -> Result<bool> {
        self.is_compiled().map(|compiled| !compiled)
    }

    /// Produce the executable form; no-op when already compiled
    pub fn unpack(&self) -> Result<()> {
        let mut state = self.state.write();
        let desc = match &*state {
            UnitState::Structural(desc) => desc.clone(),
            UnitState::Compiled { .. } => return Ok(()),
            UnitState::Destroyed => return Err(self.gone()),
        };
        let unit = self.backend.compile(&desc)?;
        *state = UnitState::Compiled { desc, unit };
        debug!(module = %self.id, backend = self.backend.name(), "unpacked");
        Ok(())
    }

    /// Discard the executable form; no-op when already structural
    pub fn pack(&self) -> Result<()> {
        let mut state = self.state.write();
        let desc = match &*state {
            UnitState::Compiled { desc, .. } => desc.clone(),
            UnitState::Structural(_) => return Ok(()),
            UnitState::Destroyed => return Err(self.gone()),
        };
        *state = UnitState::Structural(desc);
        debug!(module = %self.id, "packed");
        Ok(())
    }

    /// Pack, clear all structural data and mark the module destroyed
    pub fn destroy(&self) -> Result<()> {
        self.pack()?;
        let mut state = self.state.write();
        if matches!(*state, UnitState::Destroyed) {
            return Err(self.gone());
        }
        *state = UnitState::Destroyed;
        self.destroyed.store(true, Ordering::Release);
        debug!(module = %self.id, "destroyed");
        Ok(())
    }

    /// Run procedure `proc` with `io` bound to its io register
    ///
    /// The compiled unit is shared out of the lock, so executions run
    /// concurrently with each other and with `pack`.
    pub fn call_proc(&self, proc: ProcId, io: &VarRef) -> Result<()> {
        let unit = match &*self.state.read() {
            UnitState::Compiled { unit, .. } => unit.clone(),
            UnitState::Structural(_) => {
                return Err(VmError::Operation(format!(
                    "module {} is not compiled",
                    self.id
                )))
            }
            UnitState::Destroyed => return Err(self.gone()),
        };
        if !unit.has_entry(proc) {
            return Err(VmError::NotFound(format!(
                "entry point {} in module {}",
                proc, self.id
            )));
        }
        unit.invoke(proc, io).map_err(|err| {
            if let VmError::Execution(fault) = &err {
                warn!(module = %self.id, %proc, code = fault.code(), "{}", fault);
            }
            err
        })
    }
}

impl std::fmt::Debug for ModuleUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.read() {
            UnitState::Structural(_) => "structural",
            UnitState::Compiled { .. } => "compiled",
            UnitState::Destroyed => "destroyed",
        };
        f.debug_struct("ModuleUnit")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}
