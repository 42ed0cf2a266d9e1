//! Module disassembly

use tessel_bytecode::{decode_stream, ModuleDescription, ProcFlags, VarFlags};

fn flag_names<F: bitflags::Flags>(flags: &F) -> String {
    let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join("|")
    }
}

/// Render types, registers and procedures as text
///
/// Jumps show their resolved target after a `;`.
pub fn disassemble(module: &ModuleDescription) -> String {
    let mut out = format!("========== Module: {} ==========\n", module.id);

    out.push_str("\nTypes:\n");
    for (i, vt) in module.vtypes.iter().enumerate() {
        let count = if vt.is_dynamic() {
            "*".to_string()
        } else {
            vt.element_count.to_string()
        };
        out.push_str(&format!("  T{:<4} {} x {} bytes", i, count, vt.element_bytes));
        if !vt.owned_refs.is_empty() {
            let refs: Vec<String> = vt.owned_refs.iter().map(|r| r.to_string()).collect();
            out.push_str(&format!("  vref [{}]", refs.join(", ")));
        }
        if !vt.native_refs.is_empty() {
            let refs: Vec<String> = vt.native_refs.iter().map(|r| r.to_string()).collect();
            out.push_str(&format!("  pref [{}]", refs.join(", ")));
        }
        out.push('\n');
    }

    out.push_str("\nRegisters:\n");
    for (i, spec) in module.regs.iter().enumerate() {
        out.push_str(&format!(
            "  R{:<4} {} count={} {}",
            i,
            spec.vtype,
            spec.count,
            flag_names::<VarFlags>(&spec.flags)
        ));
        if let Some(init) = &spec.init {
            out.push_str(&format!("  init={:02x?}", init));
        }
        if i == 0 {
            out.push_str("  ; error");
        }
        out.push('\n');
    }

    out.push_str("\nProcedure types:\n");
    for (i, pt) in module.ptypes.iter().enumerate() {
        out.push_str(&format!("  P{:<4} io={} {}\n", i, pt.io, flag_names(&pt.flags)));
    }

    for (i, proc) in module.procs.iter().enumerate() {
        out.push_str(&format!(
            "\n--- F{} : {} {} ({} instructions, {} bytes) ---\n",
            i,
            proc.ptype,
            flag_names::<ProcFlags>(&proc.flags),
            proc.instr_count,
            proc.code.len()
        ));
        match decode_stream(&proc.code) {
            Ok(code) => {
                for (at, instr) in code.iter().enumerate() {
                    out.push_str(&format!("{:04}  {}", at, instr));
                    if let Some(target) = instr.jump_target(at) {
                        out.push_str(&format!("  ; -> {:04}", target));
                    }
                    out.push('\n');
                }
            }
            Err(err) => out.push_str(&format!("  <undecodable: {}>\n", err)),
        }
    }
    out.push_str("========================================\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::samples;

    #[test]
    fn test_factorial_listing() {
        let registry = Registry::new();
        let module = samples::factorial_description(&registry).unwrap();
        let text = disassemble(&module);

        assert!(text.contains("R0    T0 count=1 -  ; error"));
        assert!(text.contains("EXTERNAL|FUNCTION"));
        assert!(text.contains("0002  JZ    R1, +4  ; -> 0006"));
        assert!(text.contains("0008  RET"));
        assert!(text.ends_with("========================================\n"));
    }

    #[test]
    fn test_undecodable_code_is_listed() {
        let registry = Registry::new();
        let mut module = samples::factorial_description(&registry).unwrap();
        module.procs[0].code = vec![0xFF];
        let text = disassemble(&module);

        assert!(text.contains("<undecodable: "));
        assert!(text.contains("Procedure types:"));
    }
}
