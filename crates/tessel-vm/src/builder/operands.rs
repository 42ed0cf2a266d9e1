//! Static operand checks run before an instruction is appended
//!
//! Every register an instruction names must exist, and its type must fit the
//! way the instruction reads or writes it.

use crate::error::{Result, VmError};
use tessel_bytecode::{
    Instruction, ModuleDescription, ProcTypeFlags, RegId, VarFlags, VarSpec, VarType,
};

struct Operand<'a> {
    reg: RegId,
    spec: &'a VarSpec,
    vtype: &'a VarType,
}

impl Operand<'_> {
    fn bytes(&self) -> u64 {
        self.vtype.element_bytes as u64
    }

    fn word(self) -> Result<Self> {
        if !self.vtype.holds_word() {
            return Err(VmError::Type(format!(
                "{} holds {} bytes per element, not a word",
                self.reg, self.vtype.element_bytes
            )));
        }
        Ok(self)
    }

    fn at_least(self, bytes: u64) -> Result<Self> {
        if self.bytes() < bytes {
            return Err(VmError::Type(format!(
                "{} holds {} bytes per element, need {}",
                self.reg, self.vtype.element_bytes, bytes
            )));
        }
        Ok(self)
    }

    fn rebindable(self) -> Result<Self> {
        if !self.spec.flags.contains(VarFlags::NON_FIXED_REF) {
            return Err(VmError::Type(format!(
                "{} is not a non-fixed reference register",
                self.reg
            )));
        }
        Ok(self)
    }
}

fn operand(module: &ModuleDescription, reg: RegId) -> Result<Operand<'_>> {
    let spec = module
        .reg(reg)
        .ok_or_else(|| VmError::NotFound(format!("register {}", reg)))?;
    let vtype = module
        .vtype(spec.vtype)
        .ok_or_else(|| VmError::NotFound(format!("type {} of {}", spec.vtype, reg)))?;
    Ok(Operand { reg, spec, vtype })
}

fn same_element_shape(a: &Operand<'_>, b: &Operand<'_>) -> Result<()> {
    if a.vtype.element_bytes != b.vtype.element_bytes
        || a.vtype.owned_refs != b.vtype.owned_refs
        || a.vtype.native_refs != b.vtype.native_refs
    {
        return Err(VmError::Type(format!(
            "{} and {} have different element layouts",
            a.reg, b.reg
        )));
    }
    Ok(())
}

fn byte_window(reg: RegId, offset: u32, width: u64, available: u64) -> Result<()> {
    if offset as u64 + width > available {
        return Err(VmError::Type(format!(
            "bytes {}..{} exceed the {} bytes of {}",
            offset,
            offset as u64 + width,
            available,
            reg
        )));
    }
    Ok(())
}

fn ref_slot(owner: &Operand<'_>, slot: u32, referent: &Operand<'_>) -> Result<()> {
    match owner.vtype.owned_refs.get(slot as usize) {
        Some(vtype) if *vtype == referent.spec.vtype => Ok(()),
        Some(vtype) => Err(VmError::Type(format!(
            "slot {} of {} holds {}, but {} is {}",
            slot, owner.reg, vtype, referent.reg, referent.spec.vtype
        ))),
        None => Err(VmError::Type(format!(
            "{} has no owned reference slot {}",
            owner.reg, slot
        ))),
    }
}

fn nonzero(count: u32) -> Result<()> {
    if count == 0 {
        return Err(VmError::Argument("scope count must be positive".into()));
    }
    Ok(())
}

/// Check the operands of `instr` against the module's registers and types
pub(crate) fn check(module: &ModuleDescription, instr: &Instruction) -> Result<()> {
    use Instruction::*;

    let op = |reg| operand(module, reg);

    match *instr {
        Inc(r) | Dec(r) => {
            op(r)?.word()?;
        }
        Add { dst, a, b } | Sub { dst, a, b } | Mul { dst, a, b } => {
            op(dst)?.word()?;
            op(a)?.word()?;
            op(b)?.word()?;
        }
        Cpi1(r, _) => {
            op(r)?.at_least(1)?;
        }
        Cpi2(r, _) => {
            op(r)?.at_least(2)?;
        }
        Cpi4(r, _) => {
            op(r)?.at_least(4)?;
        }
        Cpi8(r, _) => {
            op(r)?.at_least(8)?;
        }
        Jz(r, _) | Jnz(r, _) | Jgz(r, _) | Jngz(r, _) => {
            op(r)?.word()?;
        }
        Jg(a, b, _) | Jng(a, b, _) | Je(a, b, _) => {
            op(a)?.word()?;
            op(b)?.word()?;
        }
        Jmp(_) | Throw | Ret => {}

        Als(r) | Push(r) | Frs(r) | Pop(r) | Pushh(r) => {
            op(r)?;
        }
        Alsr(r) | Pushr(r) => {
            op(r)?.rebindable()?;
        }
        Frsl(n) | Popl(n) => nonzero(n)?,

        Cpb { dst, src } => {
            op(dst)?.at_least(1)?;
            op(src)?.at_least(1)?;
        }
        Lde { dst, src, index } | Ste { dst, index, src } => {
            same_element_shape(&op(dst)?, &op(src)?)?;
            op(index)?.word()?;
        }
        Ldb { dst, src, offset } => {
            let (dst, src) = (op(dst)?, op(src)?);
            byte_window(src.reg, offset, dst.bytes(), src.bytes())?;
        }
        Stb { dst, offset, src } => {
            let (dst, src) = (op(dst)?, op(src)?);
            byte_window(dst.reg, offset, src.bytes(), dst.bytes())?;
        }
        Ldr { dst, src, slot } => {
            let dst = op(dst)?.rebindable()?;
            ref_slot(&op(src)?, slot, &dst)?;
        }
        Str { dst, slot, src } => {
            ref_slot(&op(dst)?, slot, &op(src)?)?;
        }

        Call(proc) => {
            let def = module
                .proc(proc)
                .ok_or_else(|| VmError::NotFound(format!("procedure {}", proc)))?;
            let ptype = module
                .ptype(def.ptype)
                .ok_or_else(|| VmError::NotFound(format!("procedure type {}", def.ptype)))?;
            if !ptype.flags.contains(ProcTypeFlags::FUNCTION) {
                return Err(VmError::Type(format!("{} is not callable with CALL", proc)));
            }
        }
    }
    Ok(())
}
