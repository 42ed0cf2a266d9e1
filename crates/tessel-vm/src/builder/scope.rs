//! Abstract scope state and its transfer function
//!
//! The verifier models the allocation state of a procedure as the ordered
//! list of scopes it has opened. A register is allocated when it is static
//! (error register, persistent, thread-local), is the procedure's io register,
//! or has an open scope in the list. `FRSL n` closes the last `n` entries,
//! whatever registers they belong to.

use crate::error::ScopeViolation;
use std::collections::BTreeMap;
use tessel_bytecode::{Instruction, ModuleDescription, ProcId, RegId};

/// Procedure context the transfer function needs
#[derive(Clone, Copy)]
pub(crate) struct ScopeContext<'a> {
    pub module: &'a ModuleDescription,
    pub io: RegId,
}

impl<'a> ScopeContext<'a> {
    pub fn new(module: &'a ModuleDescription, proc: ProcId) -> Option<Self> {
        let def = module.proc(proc)?;
        let io = module.ptype(def.ptype)?.io;
        Some(Self { module, io })
    }

    /// Allocated for the whole execution; never opened or closed
    pub fn is_static(&self, reg: RegId) -> bool {
        reg.is_reserved()
            || self
                .module
                .reg(reg)
                .map(|spec| spec.flags.is_static())
                .unwrap_or(false)
    }
}

/// Ordered list of scopes opened by the procedure so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ScopeState {
    open: Vec<RegId>,
}

impl ScopeState {
    pub fn open_scopes(&self) -> &[RegId] {
        &self.open
    }

    pub fn is_balanced(&self) -> bool {
        self.open.is_empty()
    }

    fn is_allocated(&self, ctx: &ScopeContext<'_>, reg: RegId) -> bool {
        ctx.is_static(reg) || reg == ctx.io || self.open.contains(&reg)
    }

    fn require(&self, ctx: &ScopeContext<'_>, regs: &[RegId]) -> Result<(), ScopeViolation> {
        match regs.iter().find(|r| !self.is_allocated(ctx, **r)) {
            Some(reg) => Err(ScopeViolation::NotAllocated(*reg)),
            None => Ok(()),
        }
    }

    fn open(&mut self, ctx: &ScopeContext<'_>, reg: RegId) -> Result<(), ScopeViolation> {
        if ctx.is_static(reg) {
            return Err(ScopeViolation::StaticRegister(reg));
        }
        self.open.push(reg);
        Ok(())
    }

    fn close(&mut self, ctx: &ScopeContext<'_>, reg: RegId) -> Result<(), ScopeViolation> {
        if ctx.is_static(reg) {
            return Err(ScopeViolation::StaticRegister(reg));
        }
        match self.open.iter().rposition(|r| *r == reg) {
            Some(pos) => {
                self.open.remove(pos);
                Ok(())
            }
            None => Err(ScopeViolation::NothingToFree(reg)),
        }
    }

    fn close_last(&mut self, n: u32) -> Result<(), ScopeViolation> {
        let open = self.open.len();
        if n as usize > open {
            return Err(ScopeViolation::TooManyFrees { requested: n, open });
        }
        self.open.truncate(open - n as usize);
        Ok(())
    }

    /// Apply one instruction
    pub fn step(&mut self, ctx: &ScopeContext<'_>, instr: &Instruction) -> Result<(), ScopeViolation> {
        use Instruction::*;

        match *instr {
            Inc(r) | Dec(r) | Cpi1(r, _) | Cpi2(r, _) | Cpi4(r, _) | Cpi8(r, _) => {
                self.require(ctx, &[r])
            }
            Add { dst, a, b } | Sub { dst, a, b } | Mul { dst, a, b } => {
                self.require(ctx, &[dst, a, b])
            }
            Jz(r, _) | Jnz(r, _) | Jgz(r, _) | Jngz(r, _) => self.require(ctx, &[r]),
            Jg(a, b, _) | Jng(a, b, _) | Je(a, b, _) => self.require(ctx, &[a, b]),
            Jmp(_) | Throw | Ret => Ok(()),

            Als(r) | Alsr(r) | Push(r) | Pushr(r) => self.open(ctx, r),
            Pushh(r) => {
                if !ctx.is_static(r) {
                    self.require(ctx, &[r])?;
                }
                self.open(ctx, r)
            }
            Frs(r) | Pop(r) => self.close(ctx, r),
            Frsl(n) | Popl(n) => self.close_last(n),

            Cpb { dst, src } => self.require(ctx, &[dst, src]),
            Lde { dst, src, index } => self.require(ctx, &[dst, src, index]),
            Ste { dst, index, src } => self.require(ctx, &[dst, index, src]),
            Ldb { dst, src, .. } | Stb { dst, src, .. } => self.require(ctx, &[dst, src]),
            Ldr { dst, src, .. } => {
                self.require(ctx, &[src])?;
                if self.open.contains(&dst) {
                    Ok(())
                } else if self.is_allocated(ctx, dst) {
                    Err(ScopeViolation::ForeignFrame(dst))
                } else {
                    Err(ScopeViolation::NotAllocated(dst))
                }
            }
            Str { dst, src, .. } => self.require(ctx, &[dst, src]),

            Call(proc) => {
                let io = ctx
                    .module
                    .proc(proc)
                    .and_then(|def| ctx.module.ptype(def.ptype))
                    .map(|ptype| ptype.io);
                match io {
                    Some(io) => self.require(ctx, &[io]),
                    // Unknown callees are rejected by the operand checks.
                    None => Ok(()),
                }
            }
        }
    }
}

/// Scope states of a procedure that is still being appended to
///
/// Tracks the entry state of each instruction seen so far, the states
/// flowing into forward jump targets, and the fallthrough state at the end.
/// Merges are checked as soon as both sides are known; instructions with no
/// known entry state are skipped until the final pass.
#[derive(Debug, Clone)]
pub(crate) struct ScopeTracker {
    states: Vec<Option<ScopeState>>,
    pending: BTreeMap<usize, ScopeState>,
    fallthrough: Option<ScopeState>,
}

impl Default for ScopeTracker {
    fn default() -> Self {
        Self {
            states: Vec::new(),
            pending: BTreeMap::new(),
            fallthrough: Some(ScopeState::default()),
        }
    }
}

/// Tracker update computed for one instruction, applied only on success
pub(crate) struct TrackerUpdate {
    entry: Option<ScopeState>,
    forward: Option<(usize, ScopeState)>,
    fallthrough: Option<ScopeState>,
}

impl ScopeTracker {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check `instr` as the next instruction without changing the tracker
    pub fn check(
        &self,
        ctx: &ScopeContext<'_>,
        instr: &Instruction,
    ) -> Result<TrackerUpdate, (usize, ScopeViolation)> {
        let at = self.states.len();
        let entry = match (self.fallthrough.as_ref(), self.pending.get(&at)) {
            (Some(a), Some(b)) if a != b => {
                return Err((at, ScopeViolation::MergeMismatch { target: at }))
            }
            (Some(a), _) => Some(a.clone()),
            (None, b) => b.cloned(),
        };

        let Some(entry) = entry else {
            return Ok(TrackerUpdate {
                entry: None,
                forward: None,
                fallthrough: None,
            });
        };

        let mut out = entry.clone();
        out.step(ctx, instr).map_err(|v| (at, v))?;

        let mut forward = None;
        if let Some(target) = instr.jump_target(at) {
            let known = if target <= at {
                if target == at {
                    Some(&entry)
                } else {
                    self.states[target].as_ref()
                }
            } else {
                self.pending.get(&target)
            };
            match known {
                Some(state) if *state != out => {
                    return Err((at, ScopeViolation::MergeMismatch { target }))
                }
                None if target > at => forward = Some((target, out.clone())),
                _ => {}
            }
        }

        let fallthrough = (!instr.is_terminator()).then_some(out);
        Ok(TrackerUpdate {
            entry: Some(entry),
            forward,
            fallthrough,
        })
    }

    pub fn apply(&mut self, update: TrackerUpdate) {
        let at = self.states.len();
        self.pending.remove(&at);
        self.states.push(update.entry);
        if let Some((target, state)) = update.forward {
            self.pending.insert(target, state);
        }
        self.fallthrough = update.fallthrough;
    }
}
