//! Interpreting backend
//!
//! Compiles a module by decoding every procedure once and preparing the
//! persistent registers; each `invoke` then runs a fresh [`VM`] over the
//! compiled program.

use crate::backend::{Backend, CompiledUnit, RuntimeConfig};
use crate::error::{ExecFault, Result, VmError};
use crate::sync::Arc;
use crate::variable::{VarLayout, VarRef, Variable};
use tessel_bytecode::{
    Instruction, ModuleDescription, ModuleId, ProcFlags, ProcId, ProcTypeFlags, RegId, VarFlags,
};
use tracing::{debug, trace};

// Module structure
mod execution;
mod frame;
mod result;

pub use frame::{CallFrame, RegisterFile};

use result::ExecutionResult;

/// Backend that executes bytecode directly
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: RuntimeConfig,
}

impl Interpreter {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &str {
        "interpreter"
    }

    fn compile(&self, module: &ModuleDescription) -> Result<Arc<dyn CompiledUnit>> {
        Ok(Arc::new(Program::compile(module, self.config)?))
    }
}

/// Register as seen by the interpreter
#[derive(Debug)]
pub(crate) struct RegSlot {
    pub layout: Arc<VarLayout>,
    pub count: usize,
    pub flags: VarFlags,
    /// Storage of a persistent register, shared by every execution
    pub persistent: Option<VarRef>,
}

impl RegSlot {
    pub fn allocate(&self) -> VarRef {
        Variable::new(self.layout.clone(), self.count).into_shared()
    }
}

/// Decoded procedure
#[derive(Debug)]
pub(crate) struct ProcCode {
    pub flags: ProcFlags,
    pub external: bool,
    pub io: RegId,
    pub code: Vec<Instruction>,
}

/// Compiled form of one module
#[derive(Debug)]
pub struct Program {
    module: ModuleId,
    config: RuntimeConfig,
    pub(crate) regs: Vec<RegSlot>,
    pub(crate) procs: Vec<ProcCode>,
}

impl Program {
    pub fn compile(module: &ModuleDescription, config: RuntimeConfig) -> Result<Self> {
        let layouts = VarLayout::table(module);

        let regs = module
            .regs
            .iter()
            .map(|spec| {
                let layout = layouts
                    .get(spec.vtype.index())
                    .cloned()
                    .ok_or_else(|| VmError::NotFound(format!("variable type {}", spec.vtype)))?;
                let mut slot = RegSlot {
                    layout,
                    count: spec.count as usize,
                    flags: spec.flags,
                    persistent: None,
                };
                if spec.flags.contains(VarFlags::PERSISTENT) {
                    let mut var = Variable::new(slot.layout.clone(), slot.count);
                    if let Some(init) = &spec.init {
                        let payload = var.payload_mut();
                        let len = init.len().min(payload.len());
                        payload[..len].copy_from_slice(&init[..len]);
                    }
                    slot.persistent = Some(var.into_shared());
                }
                Ok(slot)
            })
            .collect::<Result<Vec<_>>>()?;

        let procs = module
            .procs
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let ptype = module
                    .ptype(def.ptype)
                    .ok_or_else(|| VmError::NotFound(format!("procedure type {}", def.ptype)))?;
                let code = module
                    .decode_proc(ProcId(i as u32))
                    .ok_or_else(|| VmError::NotFound(format!("procedure F{}", i)))??;
                Ok(ProcCode {
                    flags: def.flags,
                    external: ptype.flags.contains(ProcTypeFlags::EXTERNAL),
                    io: ptype.io,
                    code,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(module = %module.id, procs = procs.len(), "compiled");
        Ok(Self {
            module: module.id,
            config,
            regs,
            procs,
        })
    }

    pub(crate) fn proc(&self, id: ProcId) -> Result<&ProcCode> {
        self.procs
            .get(id.index())
            .ok_or_else(|| VmError::NotFound(format!("procedure {}", id)))
    }

    pub(crate) fn reg(&self, id: RegId) -> Result<&RegSlot> {
        self.regs
            .get(id.index())
            .ok_or_else(|| VmError::NotFound(format!("register {}", id)))
    }

    /// Check that `io` can be bound to the io register of `proc`
    fn check_io(&self, proc: &ProcCode, io: &VarRef) -> Result<()> {
        let slot = self.reg(proc.io)?;
        let var = io.read();
        let fits = var.layout().same_shape(&slot.layout)
            && slot
                .layout
                .fixed_count
                .map_or(true, |count| count == var.len());
        if !fits {
            return Err(VmError::Argument(format!(
                "io variable of {} does not match {} ({})",
                var.vtype(),
                proc.io,
                slot.layout.vtype
            )));
        }
        Ok(())
    }
}

impl CompiledUnit for Program {
    fn has_entry(&self, proc: ProcId) -> bool {
        self.procs
            .get(proc.index())
            .map(|p| p.external)
            .unwrap_or(false)
    }

    fn invoke(&self, proc: ProcId, io: &VarRef) -> Result<()> {
        let entry = self
            .procs
            .get(proc.index())
            .filter(|p| p.external)
            .ok_or_else(|| VmError::NotFound(format!("entry point {}", proc)))?;
        self.check_io(entry, io)?;

        let mut vm = VM::new(self)?;
        vm.registers.push(entry.io, Some(io.clone()))?;
        vm.run(proc)
    }
}

/// Virtual machine running one `invoke`
pub struct VM<'p> {
    program: &'p Program,

    /// Call stack
    pub(crate) frames: Vec<CallFrame>,

    /// Register frames shared by every activation
    pub(crate) registers: RegisterFile,
}

impl<'p> VM<'p> {
    /// Prepare a VM with the static registers allocated
    pub fn new(program: &'p Program) -> Result<Self> {
        let mut registers = RegisterFile::new(program.regs.len());
        for (i, slot) in program.regs.iter().enumerate() {
            let reg = RegId::new(i as u32)?;
            if reg == RegId::ERROR || slot.flags.contains(VarFlags::THREAD_LOCAL) {
                registers.push(reg, Some(slot.allocate()))?;
            } else if let Some(var) = &slot.persistent {
                registers.push(reg, Some(var.clone()))?;
            }
        }
        Ok(Self {
            program,
            frames: Vec::with_capacity(16),
            registers,
        })
    }

    /// Run `entry` until it returns or faults
    pub fn run(&mut self, entry: ProcId) -> Result<()> {
        self.enter(entry)?;
        loop {
            let frame = self
                .frames
                .last()
                .ok_or_else(|| VmError::Operation("call stack underflow".into()))?;
            let pc = frame.pc;
            let instr = self
                .program
                .proc(frame.proc)?
                .code
                .get(pc)
                .copied()
                .ok_or_else(|| {
                    VmError::Range(format!("{} has no instruction {}", frame.proc, pc))
                })?;

            match self.execute_instruction(&instr, pc)? {
                ExecutionResult::Continue => self.current_frame_mut()?.pc += 1,
                ExecutionResult::Jump(target) => self.current_frame_mut()?.pc = target,
                ExecutionResult::Call(callee) => {
                    self.current_frame_mut()?.pc += 1;
                    self.enter(callee)?;
                }
                ExecutionResult::Return => {
                    self.leave()?;
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn enter(&mut self, proc: ProcId) -> Result<()> {
        let max = self.program.config.max_call_depth;
        if self.frames.len() >= max {
            return Err(ExecFault::CallDepthExceeded(max).into());
        }
        if self.program.proc(proc)?.flags.contains(ProcFlags::TRACE) {
            debug!(module = %self.program.module, %proc, depth = self.frames.len(), "enter");
        } else {
            trace!(%proc, depth = self.frames.len(), "enter");
        }
        self.frames.push(CallFrame::new(proc));
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::Operation("call stack underflow".into()))?;
        // Empty for verified code.
        for reg in frame.scopes.iter().rev() {
            self.registers.pop(*reg)?;
        }
        if self.program.proc(frame.proc)?.flags.contains(ProcFlags::TRACE) {
            debug!(module = %self.program.module, proc = %frame.proc, depth = self.frames.len(), "exit");
        }
        Ok(())
    }

    pub(crate) fn current_frame_mut(&mut self) -> Result<&mut CallFrame> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::Operation("call stack underflow".into()))
    }
}
