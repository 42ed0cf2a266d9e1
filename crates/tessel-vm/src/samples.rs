//! Sample modules
//!
//! `factorial` computes `n!` in place over one word register. `quicksort`
//! sorts an array of words in place with a recursive Lomuto partition: its
//! io variable holds the bounds `lo` and `hi` in its payload and the array in
//! owned reference slot 0.

use crate::builder::ModuleBuilder;
use crate::error::Result;
use crate::handle::Module;
use crate::registry::Registry;
use tessel_bytecode::{
    Instruction, ModuleDescription, ModuleId, ProcFlags, ProcId, ProcTypeFlags, VarFlags,
    VarTypeId,
};

/// Entry point of the factorial module
pub const FACTORIAL: ProcId = ProcId(0);

/// Entry point of the quicksort module
pub const SORT: ProcId = ProcId(0);

/// Dynamically sized array of words
pub const SORT_ARRAY: VarTypeId = VarTypeId(1);

/// Sort arguments: `lo` at bytes 0..8, `hi` at 8..16, array in slot 0
pub const SORT_ARGS: VarTypeId = VarTypeId(2);

const ENTRY: ProcTypeFlags = ProcTypeFlags::EXTERNAL.union(ProcTypeFlags::FUNCTION);

fn build_factorial(b: &mut ModuleBuilder) -> Result<()> {
    use Instruction::*;

    let n = b.add_reg(VarTypeId::WORD, VarFlags::empty())?;
    let t = b.add_reg(VarTypeId::WORD, VarFlags::empty())?;
    let ptype = b.add_proc_type(ENTRY, n)?;
    let f = b.add_proc(ProcFlags::empty(), ptype)?;

    let code = [
        Als(t),
        Cpi8(t, 1),
        Jz(n, 4),
        Mul { dst: t, a: t, b: n },
        Dec(n),
        Jnz(n, -2),
        Cpb { dst: n, src: t },
        Frs(t),
        Ret,
    ];
    for instr in code {
        b.add_proc_instr(f, instr)?;
    }
    Ok(())
}

fn build_quicksort(b: &mut ModuleBuilder) -> Result<()> {
    use Instruction::*;

    let array = b.add_var_type(0, 8)?;
    let args_type = b.add_var_type(1, 16)?;
    b.add_var_type_vref(args_type, array)?;

    let args = b.add_reg(args_type, VarFlags::empty())?;
    let arr = b.add_reg(array, VarFlags::NON_FIXED_REF)?;
    let mut word = || b.add_reg(VarTypeId::WORD, VarFlags::empty());
    let (lo, hi, i, j) = (word()?, word()?, word()?, word()?);
    let (piv, x, y) = (word()?, word()?, word()?);

    let ptype = b.add_proc_type(ENTRY, args)?;
    let sort = b.add_proc(ProcFlags::empty(), ptype)?;

    let code = [
        // 0: scopes for the locals and the array view
        Als(lo),
        Als(hi),
        Als(i),
        Als(j),
        Als(piv),
        Als(x),
        Als(y),
        Alsr(arr),
        Ldr { dst: arr, src: args, slot: 0 },
        Ldb { dst: lo, src: args, offset: 0 },
        Ldb { dst: hi, src: args, offset: 8 },
        Jng(hi, lo, 29),
        // 12: partition around arr[hi]
        Lde { dst: piv, src: arr, index: hi },
        Cpb { dst: i, src: lo },
        Cpb { dst: j, src: lo },
        Jng(hi, j, 9),
        Lde { dst: x, src: arr, index: j },
        Jng(piv, x, 5),
        Lde { dst: y, src: arr, index: i },
        Ste { dst: arr, index: i, src: x },
        Ste { dst: arr, index: j, src: y },
        Inc(i),
        Inc(j),
        Jmp(-8),
        // 24: move the pivot into place
        Lde { dst: x, src: arr, index: i },
        Ste { dst: arr, index: i, src: piv },
        Ste { dst: arr, index: hi, src: x },
        // 27: recurse on both halves with a fresh argument variable
        Als(args),
        Str { dst: args, slot: 0, src: arr },
        Stb { dst: args, offset: 0, src: lo },
        Cpb { dst: x, src: i },
        Dec(x),
        Stb { dst: args, offset: 8, src: x },
        Call(sort),
        Cpb { dst: x, src: i },
        Inc(x),
        Stb { dst: args, offset: 0, src: x },
        Stb { dst: args, offset: 8, src: hi },
        Call(sort),
        Frs(args),
        // 40
        Frsl(8),
        Ret,
    ];
    for instr in code {
        b.add_proc_instr(sort, instr)?;
    }
    Ok(())
}

/// Verified factorial module, not registered
pub fn factorial_description(registry: &Registry) -> Result<ModuleDescription> {
    let mut builder = ModuleBuilder::new(registry);
    build_factorial(&mut builder)?;
    builder.finish()
}

/// Build and register the factorial module
pub fn factorial(registry: &Registry) -> Result<ModuleId> {
    let mut builder = ModuleBuilder::new(registry);
    build_factorial(&mut builder)?;
    builder.create_module()
}

/// Verified quicksort module, not registered
pub fn quicksort_description(registry: &Registry) -> Result<ModuleDescription> {
    let mut builder = ModuleBuilder::new(registry);
    build_quicksort(&mut builder)?;
    builder.finish()
}

/// Build and register the quicksort module
pub fn quicksort(registry: &Registry) -> Result<ModuleId> {
    let mut builder = ModuleBuilder::new(registry);
    build_quicksort(&mut builder)?;
    builder.create_module()
}

/// Run the factorial module on `n`
pub fn run_factorial(module: &Module, n: i64) -> Result<i64> {
    module.unpack()?;
    let io = module.new_variable(VarTypeId::WORD, 1)?;
    io.write().set_word(0, n)?;
    module.call_proc(FACTORIAL, &io)?;
    let result = io.read().word(0).unwrap_or_default();
    Ok(result)
}

/// Run the quicksort module over a copy of `values`
pub fn run_sort(module: &Module, values: &[i64]) -> Result<Vec<i64>> {
    module.unpack()?;
    let array = module.new_variable(SORT_ARRAY, values.len())?;
    {
        let mut var = array.write();
        for (i, v) in values.iter().enumerate() {
            var.set_word(i, *v)?;
        }
    }

    let args = module.new_variable(SORT_ARGS, 0)?;
    {
        let mut var = args.write();
        let hi = values.len() as i64 - 1;
        if let Some(bytes) = var.bytes_mut(0) {
            bytes[..8].copy_from_slice(&0i64.to_le_bytes());
            bytes[8..16].copy_from_slice(&hi.to_le_bytes());
        }
        var.set_owned_ref(0, 0, Some(array.clone()))?;
    }

    module.call_proc(SORT, &args)?;
    let sorted = array.read().words();
    Ok(sorted)
}
