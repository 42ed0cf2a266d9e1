//! Client-facing module handle
//!
//! A [`Module`] names a module by id and resolves it against its registry on
//! first use. The resolved reference is held until the handle is rebound,
//! released or dropped.

use crate::disasm::disassemble;
use crate::error::{Result, VmError};
use crate::registry::{ModuleRef, Registry};
use crate::sync::Arc;
use crate::variable::{VarLayout, VarRef, Variable};
use once_cell::sync::OnceCell;
use std::fmt;
use tessel_bytecode::{
    ModuleDescription, ModuleId, ProcDef, ProcId, ProcType, ProcTypeId, RegId, VarSpec, VarType,
    VarTypeId,
};

/// Lazily resolved handle to a registered module
pub struct Module {
    id: ModuleId,
    registry: Registry,
    resolved: OnceCell<ModuleRef>,
}

impl Module {
    pub fn new(registry: &Registry, id: ModuleId) -> Self {
        Self {
            id,
            registry: registry.clone(),
            resolved: OnceCell::new(),
        }
    }

    /// Handle against the process-wide registry
    pub fn global(id: ModuleId) -> Self {
        Self::new(Registry::global(), id)
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// True once the handle holds a reference
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Point the handle at another module, releasing the current reference
    pub fn bind(&mut self, id: ModuleId) {
        self.release();
        self.id = id;
    }

    /// Drop the held reference, if any
    pub fn release(&mut self) {
        self.resolved.take();
    }

    fn unit(&self) -> Result<&ModuleRef> {
        self.resolved.get_or_try_init(|| {
            self.registry
                .retain(self.id)
                .ok_or_else(|| VmError::NotFound(format!("module {}", self.id)))
        })
    }

    pub fn description(&self) -> Result<Arc<ModuleDescription>> {
        self.unit()?.description()
    }

    pub fn var_type_count(&self) -> Result<usize> {
        Ok(self.description()?.vtypes.len())
    }

    pub fn proc_type_count(&self) -> Result<usize> {
        Ok(self.description()?.ptypes.len())
    }

    pub fn reg_count(&self) -> Result<usize> {
        Ok(self.description()?.regs.len())
    }

    pub fn proc_count(&self) -> Result<usize> {
        Ok(self.description()?.procs.len())
    }

    pub fn var_type_by_id(&self, id: VarTypeId) -> Result<VarType> {
        self.description()?
            .vtype(id)
            .cloned()
            .ok_or_else(|| VmError::NotFound(format!("variable type {}", id)))
    }

    pub fn proc_type_by_id(&self, id: ProcTypeId) -> Result<ProcType> {
        self.description()?
            .ptype(id)
            .copied()
            .ok_or_else(|| VmError::NotFound(format!("procedure type {}", id)))
    }

    pub fn reg_by_id(&self, id: RegId) -> Result<VarSpec> {
        self.description()?
            .reg(id)
            .cloned()
            .ok_or_else(|| VmError::NotFound(format!("register {}", id)))
    }

    pub fn proc_by_id(&self, id: ProcId) -> Result<ProcDef> {
        self.description()?
            .proc(id)
            .cloned()
            .ok_or_else(|| VmError::NotFound(format!("procedure {}", id)))
    }

    pub fn is_compiled(&self) -> Result<bool> {
        self.unit()?.is_compiled()
    }

    pub fn is_packed(&self) -> Result<bool> {
        self.unit()?.is_packed()
    }

    pub fn unpack(&self) -> Result<()> {
        self.unit()?.unpack()
    }

    pub fn pack(&self) -> Result<()> {
        self.unit()?.pack()
    }

    /// Destroy the module for every handle, then release this one
    pub fn drop_module(&mut self) -> Result<()> {
        let result = self.unit()?.destroy();
        self.release();
        result
    }

    /// Run procedure `proc` with `io` as its argument and result
    pub fn call_proc(&self, proc: ProcId, io: &VarRef) -> Result<()> {
        self.unit()?.call_proc(proc, io)
    }

    /// Zeroed variable of `vtype` with `count` elements (0 for a fixed
    /// type's own count)
    pub fn new_variable(&self, vtype: VarTypeId, count: usize) -> Result<VarRef> {
        let desc = self.description()?;
        let vt = desc
            .vtype(vtype)
            .ok_or_else(|| VmError::NotFound(format!("variable type {}", vtype)))?;
        let layout = Arc::new(VarLayout::new(vtype, vt));
        let count = layout.resolve_count(count)?;
        let bytes = count.checked_mul(layout.element_bytes);
        if bytes.map_or(true, |b| b > u32::MAX as usize) {
            return Err(VmError::Range(format!(
                "{} elements of {} are too large",
                count, vtype
            )));
        }
        Ok(Variable::new(layout, count).into_shared())
    }

    /// Text listing of the module
    pub fn disassemble(&self) -> Result<String> {
        let desc = self.description()?;
        Ok(disassemble(&desc))
    }
}

impl Clone for Module {
    /// The copy names the same module and resolves on its own
    fn clone(&self) -> Self {
        Self::new(&self.registry, self.id)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
