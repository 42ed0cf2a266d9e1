//! Helper functions and common imports for integration tests.

use crate::builder::ModuleBuilder;
use crate::error::Result;
use crate::handle::Module;
use crate::registry::Registry;
use tessel_bytecode::{Instruction, ProcFlags, ProcId, ProcTypeFlags, RegId, VarFlags, VarTypeId};

/// The only procedure of a module built by [`single_proc`]
pub const MAIN: ProcId = ProcId(0);

/// Build, register and unpack a module with one external procedure
///
/// The procedure's io register is a single word. `body` may declare more
/// types and registers and returns the procedure's code.
pub fn single_proc<F>(registry: &Registry, flags: ProcFlags, body: F) -> Result<Module>
where
    F: FnOnce(&mut ModuleBuilder, RegId) -> Result<Vec<Instruction>>,
{
    let mut builder = ModuleBuilder::new(registry);
    let io = builder.add_reg(VarTypeId::WORD, VarFlags::empty())?;
    let code = body(&mut builder, io)?;
    let ptype = builder.add_proc_type(ProcTypeFlags::EXTERNAL | ProcTypeFlags::FUNCTION, io)?;
    let proc = builder.add_proc(flags, ptype)?;
    for instr in code {
        builder.add_proc_instr(proc, instr)?;
    }

    let module = Module::new(registry, builder.create_module()?);
    module.unpack()?;
    Ok(module)
}

/// Call [`MAIN`] with `input` in its io word and return the word left there
pub fn call_word(module: &Module, input: i64) -> Result<i64> {
    let io = module.new_variable(VarTypeId::WORD, 1)?;
    io.write().set_word(0, input)?;
    module.call_proc(MAIN, &io)?;
    let output = io.read().word(0).unwrap_or_default();
    Ok(output)
}
