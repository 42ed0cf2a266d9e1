/// Module summary for the inspect command
/// Collects counts and per-procedure details from a module description
use serde::{Deserialize, Serialize};
use tessel_bytecode::ModuleDescription;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProcSummary {
    pub id: u32,
    pub ptype: u32,
    pub io: String,
    pub external: bool,
    pub instructions: u32,
    pub bytes: usize,
    pub traced: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModuleReport {
    pub id: String,
    pub var_types: usize,
    pub dynamic_types: usize,
    pub registers: usize,
    pub persistent_registers: usize,
    pub thread_local_registers: usize,
    pub proc_types: usize,
    pub procs: Vec<ProcSummary>,
}

/// Summarize a module description
pub fn summarize(module: &ModuleDescription) -> ModuleReport {
    use tessel_bytecode::{ProcFlags, ProcTypeFlags, VarFlags};

    let count_regs = |flag: VarFlags| {
        module
            .regs
            .iter()
            .filter(|spec| spec.flags.contains(flag))
            .count()
    };

    let procs = module
        .procs
        .iter()
        .enumerate()
        .map(|(i, def)| {
            let ptype = module.ptype(def.ptype);
            ProcSummary {
                id: i as u32,
                ptype: def.ptype.0,
                io: ptype.map(|p| p.io.to_string()).unwrap_or_default(),
                external: ptype.map_or(false, |p| p.flags.contains(ProcTypeFlags::EXTERNAL)),
                instructions: def.instr_count,
                bytes: def.code.len(),
                traced: def.flags.contains(ProcFlags::TRACE),
            }
        })
        .collect();

    ModuleReport {
        id: module.id.to_string(),
        var_types: module.vtypes.len(),
        dynamic_types: module.vtypes.iter().filter(|vt| vt.is_dynamic()).count(),
        registers: module.regs.len(),
        persistent_registers: count_regs(VarFlags::PERSISTENT),
        thread_local_registers: count_regs(VarFlags::THREAD_LOCAL),
        proc_types: module.ptypes.len(),
        procs,
    }
}

/// Print a report as plain text
pub fn print(report: &ModuleReport) {
    println!("Module: {}", report.id);
    println!();
    println!(
        "  Variable types: {} ({} dynamic)",
        report.var_types, report.dynamic_types
    );
    println!(
        "  Registers: {} ({} persistent, {} thread-local)",
        report.registers, report.persistent_registers, report.thread_local_registers
    );
    println!("  Procedure types: {}", report.proc_types);
    println!("  Procedures: {}", report.procs.len());
    for proc in &report.procs {
        println!(
            "    F{} : P{} io={}{}{} ({} instructions, {} bytes)",
            proc.id,
            proc.ptype,
            proc.io,
            if proc.external { " external" } else { "" },
            if proc.traced { " traced" } else { "" },
            proc.instructions,
            proc.bytes
        );
    }
}
