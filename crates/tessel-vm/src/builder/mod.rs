//! Module builder
//!
//! Assembles a module one declaration at a time. Each call validates its
//! arguments against what has been declared so far and fails without
//! changing the builder, so a rejected call leaves a usable builder behind.
//!
//! Instructions are checked twice. `add_proc_instr` runs the operand checks
//! and an incremental scope check along the paths known so far;
//! `finish`/`create_module` then run the full dataflow verifier over every
//! procedure before the module is handed to the registry.

mod operands;
mod scope;
mod verifier;

use crate::error::{Result, VmError};
use crate::registry::Registry;
use scope::{ScopeContext, ScopeTracker};
use tessel_bytecode::{
    Instruction, ModuleDescription, ModuleId, ProcDef, ProcFlags, ProcId, ProcType,
    ProcTypeFlags, ProcTypeId, RegId, VarFlags, VarSpec, VarType, VarTypeId,
};
use tracing::debug;
use uuid::Uuid;

/// Largest number of reference slots per element
pub const MAX_REF_SLOTS: usize = u16::MAX as usize;

/// Incremental builder of one module
pub struct ModuleBuilder {
    registry: Registry,
    module: ModuleDescription,
    trackers: Vec<ScopeTracker>,
}

impl ModuleBuilder {
    /// Create a builder registering into `registry`
    ///
    /// The word type and the error register are declared up front.
    pub fn new(registry: &Registry) -> Self {
        Self {
            registry: registry.clone(),
            module: Self::empty_module(),
            trackers: Vec::new(),
        }
    }

    fn empty_module() -> ModuleDescription {
        ModuleDescription {
            id: Uuid::nil(),
            vtypes: vec![VarType::word()],
            ptypes: Vec::new(),
            regs: vec![Self::error_register()],
            procs: Vec::new(),
        }
    }

    fn error_register() -> VarSpec {
        VarSpec {
            vtype: VarTypeId::WORD,
            count: 1,
            flags: VarFlags::empty(),
            init: None,
        }
    }

    /// Module as declared so far
    pub fn description(&self) -> &ModuleDescription {
        &self.module
    }

    fn vtype(&self, id: VarTypeId) -> Result<&VarType> {
        self.module
            .vtype(id)
            .ok_or_else(|| VmError::NotFound(format!("variable type {}", id)))
    }

    fn ptype(&self, id: ProcTypeId) -> Result<&ProcType> {
        self.module
            .ptype(id)
            .ok_or_else(|| VmError::NotFound(format!("procedure type {}", id)))
    }

    /// Declare a variable type of `element_count` elements (0 for dynamic)
    /// of `element_bytes` bytes each
    pub fn add_var_type(&mut self, element_count: u32, element_bytes: u32) -> Result<VarTypeId> {
        if element_count.checked_mul(element_bytes).is_none() {
            return Err(VmError::Range(format!(
                "{} elements of {} bytes overflow the type size",
                element_count, element_bytes
            )));
        }
        let id = VarTypeId(self.module.vtypes.len() as u32);
        self.module
            .vtypes
            .push(VarType::new(element_count, element_bytes));
        Ok(id)
    }

    fn ref_slot_check(&self, id: VarTypeId, extra: usize) -> Result<()> {
        if id == VarTypeId::WORD {
            return Err(VmError::Argument("the word type cannot hold references".into()));
        }
        let vtype = self.vtype(id)?;
        if self.module.procs.iter().any(|p| p.instr_count > 0) {
            return Err(VmError::Operation(format!(
                "{} cannot change shape once instructions have been added",
                id
            )));
        }
        let slots = vtype.owned_refs.len() + vtype.native_refs.len() + extra;
        let total = (vtype.element_count.max(1) as u64) * slots as u64;
        if slots > MAX_REF_SLOTS || total > u32::MAX as u64 {
            return Err(VmError::Range(format!(
                "{} reference slots overflow {}",
                slots, id
            )));
        }
        Ok(())
    }

    /// Add an owned reference slot to every element of `vtype`, returning
    /// the slot index
    pub fn add_var_type_vref(&mut self, vtype: VarTypeId, target: VarTypeId) -> Result<u32> {
        self.vtype(target)?;
        self.ref_slot_check(vtype, 1)?;
        let refs = &mut self.module.vtypes[vtype.index()].owned_refs;
        refs.push(target);
        Ok(refs.len() as u32 - 1)
    }

    /// Add a native reference slot to every element of `vtype`, returning
    /// the slot index
    pub fn add_var_type_pref(&mut self, vtype: VarTypeId, ptype: ProcTypeId) -> Result<u32> {
        self.ptype(ptype)?;
        self.ref_slot_check(vtype, 1)?;
        let refs = &mut self.module.vtypes[vtype.index()].native_refs;
        refs.push(ptype);
        Ok(refs.len() as u32 - 1)
    }

    /// Declare a register holding one variable of `vtype`
    pub fn add_reg(&mut self, vtype: VarTypeId, flags: VarFlags) -> Result<RegId> {
        self.add_reg_with_count(vtype, 0, flags)
    }

    /// Declare a register whose scopes allocate `count` elements
    ///
    /// For fixed-size types `count` must be 0 or the type's own count.
    pub fn add_reg_with_count(
        &mut self,
        vtype: VarTypeId,
        count: u32,
        flags: VarFlags,
    ) -> Result<RegId> {
        let spec = self.reg_spec(vtype, count, flags)?;
        self.push_reg(spec)
    }

    /// Declare a persistent register initialised with `init` at unpack time
    pub fn add_const_reg(&mut self, vtype: VarTypeId, init: &[u8]) -> Result<RegId> {
        let mut spec = self.reg_spec(vtype, 0, VarFlags::PERSISTENT)?;
        let vt = self.vtype(vtype)?;
        if vt.is_dynamic() {
            return Err(VmError::Argument(format!(
                "constant register needs a fixed-size type, {} is dynamic",
                vtype
            )));
        }
        let size = vt.element_count as usize * vt.element_bytes as usize;
        if init.len() != size {
            return Err(VmError::Argument(format!(
                "constant of {} bytes for {} of {} bytes",
                init.len(),
                vtype,
                size
            )));
        }
        spec.init = Some(init.to_vec());
        self.push_reg(spec)
    }

    fn reg_spec(&self, vtype: VarTypeId, count: u32, flags: VarFlags) -> Result<VarSpec> {
        if VarFlags::from_bits(flags.bits()).is_none() {
            return Err(VmError::Argument(format!(
                "unknown register flags {:#x}",
                flags.bits()
            )));
        }
        if flags.contains(VarFlags::PERSISTENT | VarFlags::THREAD_LOCAL) {
            return Err(VmError::Argument(
                "a register cannot be both persistent and thread-local".into(),
            ));
        }
        let vt = self.vtype(vtype)?;
        let count = match vt.element_count {
            0 => count,
            fixed if count == 0 || count == fixed => fixed,
            fixed => {
                return Err(VmError::Argument(format!(
                    "{} has {} elements, register asks for {}",
                    vtype, fixed, count
                )))
            }
        };
        if count.checked_mul(vt.element_bytes).is_none() {
            return Err(VmError::Range(format!(
                "{} elements of {} overflow the register size",
                count, vtype
            )));
        }
        Ok(VarSpec {
            vtype,
            count,
            flags,
            init: None,
        })
    }

    fn push_reg(&mut self, spec: VarSpec) -> Result<RegId> {
        let id = RegId::new(self.module.regs.len() as u32)?;
        self.module.regs.push(spec);
        Ok(id)
    }

    /// Declare a procedure type whose argument and result travel in `io`
    pub fn add_proc_type(&mut self, flags: ProcTypeFlags, io: RegId) -> Result<ProcTypeId> {
        if ProcTypeFlags::from_bits(flags.bits()).is_none() || flags.is_empty() {
            return Err(VmError::Argument(format!(
                "procedure type flags {:#x} must be a non-empty known set",
                flags.bits()
            )));
        }
        if io.is_reserved() {
            return Err(VmError::Argument(format!(
                "{} is reserved and cannot carry arguments",
                io
            )));
        }
        let spec = self
            .module
            .reg(io)
            .ok_or_else(|| VmError::NotFound(format!("register {}", io)))?;
        if spec.flags.is_static() {
            return Err(VmError::Argument(format!(
                "{} is persistent or thread-local and cannot carry arguments",
                io
            )));
        }
        let id = ProcTypeId(self.module.ptypes.len() as u32);
        self.module.ptypes.push(ProcType { flags, io });
        Ok(id)
    }

    /// Declare an empty procedure of type `ptype`
    pub fn add_proc(&mut self, flags: ProcFlags, ptype: ProcTypeId) -> Result<ProcId> {
        if ProcFlags::from_bits(flags.bits()).is_none() {
            return Err(VmError::Argument(format!(
                "unknown procedure flags {:#x}",
                flags.bits()
            )));
        }
        self.ptype(ptype)?;
        let id = ProcId(self.module.procs.len() as u32);
        self.module.procs.push(ProcDef::new(flags, ptype));
        self.trackers.push(ScopeTracker::default());
        Ok(id)
    }

    /// Append an instruction to `proc`, returning its instruction count
    pub fn add_proc_instr(&mut self, proc: ProcId, instr: Instruction) -> Result<usize> {
        let ctx = ScopeContext::new(&self.module, proc)
            .ok_or_else(|| VmError::NotFound(format!("procedure {}", proc)))?;
        let tracker = &self.trackers[proc.index()];
        let at = tracker.len();

        if instr.jump_offset().is_some() && instr.jump_target(at).is_none() {
            return Err(VmError::Range(format!(
                "jump at {} in {} lands before the first instruction",
                at, proc
            )));
        }
        if u32::try_from(at + 1).is_err() {
            return Err(VmError::Range(format!("{} has too many instructions", proc)));
        }
        operands::check(&self.module, &instr)?;
        let update = tracker.check(&ctx, &instr).map_err(|(at, violation)| VmError::Scope {
            proc,
            at,
            violation,
        })?;

        self.trackers[proc.index()].apply(update);
        let def = &mut self.module.procs[proc.index()];
        instr.encode(&mut def.code);
        def.instr_count += 1;
        Ok(def.instr_count as usize)
    }

    /// Verify every procedure and return the finished description
    ///
    /// The description gets a fresh id. On success the builder is reset to
    /// an empty module; on failure it is left unchanged.
    pub fn finish(&mut self) -> Result<ModuleDescription> {
        verifier::verify_module(&self.module)?;
        let mut module = std::mem::replace(&mut self.module, Self::empty_module());
        self.trackers.clear();
        module.id = Uuid::new_v4();
        debug!(
            id = %module.id,
            vtypes = module.vtypes.len(),
            regs = module.regs.len(),
            procs = module.procs.len(),
            "module verified"
        );
        Ok(module)
    }

    /// Verify the module and register it, returning its id
    pub fn create_module(&mut self) -> Result<ModuleId> {
        let module = self.finish()?;
        Ok(self.registry.insert_module_data(module))
    }

    /// Replay an exported description through a fresh builder
    ///
    /// Every declaration and instruction is re-validated; the original id is
    /// discarded.
    pub fn from_description(registry: &Registry, desc: &ModuleDescription) -> Result<Self> {
        let mut builder = Self::new(registry);

        match desc.vtypes.first() {
            Some(word) if *word == VarType::word() => {}
            _ => return Err(VmError::Argument("type 0 must be the word type".into())),
        }
        match desc.regs.first() {
            Some(error) if *error == Self::error_register() => {}
            _ => return Err(VmError::Argument("register 0 must be the error register".into())),
        }

        for vt in &desc.vtypes[1..] {
            builder.add_var_type(vt.element_count, vt.element_bytes)?;
        }
        for spec in &desc.regs[1..] {
            builder.replay_reg(spec)?;
        }
        for ptype in &desc.ptypes {
            builder.add_proc_type(ptype.flags, ptype.io)?;
        }
        for (i, vt) in desc.vtypes.iter().enumerate().skip(1) {
            let id = VarTypeId(i as u32);
            for target in &vt.owned_refs {
                builder.add_var_type_vref(id, *target)?;
            }
            for ptype in &vt.native_refs {
                builder.add_var_type_pref(id, *ptype)?;
            }
        }
        for proc in &desc.procs {
            builder.add_proc(proc.flags, proc.ptype)?;
        }
        for (i, _) in desc.procs.iter().enumerate() {
            let id = ProcId(i as u32);
            let code = desc
                .decode_proc(id)
                .ok_or_else(|| VmError::NotFound(format!("procedure {}", id)))??;
            for instr in code {
                builder.add_proc_instr(id, instr)?;
            }
        }
        Ok(builder)
    }

    fn replay_reg(&mut self, spec: &VarSpec) -> Result<RegId> {
        match &spec.init {
            Some(init) if spec.flags == VarFlags::PERSISTENT => {
                self.add_const_reg(spec.vtype, init)
            }
            Some(_) => Err(VmError::Argument(
                "only persistent registers carry an initial value".into(),
            )),
            None => self.add_reg_with_count(spec.vtype, spec.count, spec.flags),
        }
    }
}

#[cfg(test)]
mod tests;
