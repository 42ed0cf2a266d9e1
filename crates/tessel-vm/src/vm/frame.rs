//! Call frames and the register file

use crate::error::{ExecFault, Result, VmError};
use crate::variable::VarRef;
use tessel_bytecode::{ProcId, RegId};

/// Register file of one execution
///
/// Every register owns a stack of frames; the top frame is the variable the
/// register currently names. A frame is `None` after `ALSR`/`PUSHR` until an
/// `LDR` binds it.
#[derive(Debug, Default)]
pub struct RegisterFile {
    stacks: Vec<Vec<Option<VarRef>>>,
}

impl RegisterFile {
    /// Create a register file with `size` empty registers
    pub fn new(size: usize) -> Self {
        Self {
            stacks: (0..size).map(|_| Vec::new()).collect(),
        }
    }

    fn stack(&self, reg: RegId) -> Result<&Vec<Option<VarRef>>> {
        self.stacks
            .get(reg.index())
            .ok_or_else(|| VmError::NotFound(format!("register {}", reg)))
    }

    fn stack_mut(&mut self, reg: RegId) -> Result<&mut Vec<Option<VarRef>>> {
        self.stacks
            .get_mut(reg.index())
            .ok_or_else(|| VmError::NotFound(format!("register {}", reg)))
    }

    /// Variable currently named by `reg`
    #[inline]
    pub fn get(&self, reg: RegId) -> Result<&VarRef> {
        match self.stack(reg)?.last() {
            Some(Some(var)) => Ok(var),
            _ => Err(ExecFault::NullReference { reg }.into()),
        }
    }

    /// Top frame of `reg`, which may be null
    pub fn top(&self, reg: RegId) -> Result<Option<VarRef>> {
        Ok(self.stack(reg)?.last().cloned().flatten())
    }

    /// Open a new frame
    pub fn push(&mut self, reg: RegId, frame: Option<VarRef>) -> Result<()> {
        self.stack_mut(reg)?.push(frame);
        Ok(())
    }

    /// Close the top frame, returning its variable
    pub fn pop(&mut self, reg: RegId) -> Result<Option<VarRef>> {
        self.stack_mut(reg)?
            .pop()
            .ok_or_else(|| VmError::Operation(format!("{} has no frame to close", reg)))
    }

    /// Rebind the top frame, returning the variable it named before
    pub fn rebind(&mut self, reg: RegId, frame: Option<VarRef>) -> Result<Option<VarRef>> {
        let top = self
            .stack_mut(reg)?
            .last_mut()
            .ok_or_else(|| VmError::Operation(format!("{} has no frame to rebind", reg)))?;
        Ok(std::mem::replace(top, frame))
    }

    /// Number of open frames of `reg`
    pub fn depth(&self, reg: RegId) -> usize {
        self.stacks.get(reg.index()).map(Vec::len).unwrap_or(0)
    }
}

/// Activation record of one procedure
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Procedure being executed
    pub proc: ProcId,

    /// Index of the current instruction
    pub pc: usize,

    /// Scopes opened by this activation, oldest first
    pub scopes: Vec<RegId>,
}

impl CallFrame {
    pub fn new(proc: ProcId) -> Self {
        Self {
            proc,
            pc: 0,
            scopes: Vec::new(),
        }
    }

    /// Forget the most recent scope of `reg`
    pub fn close_scope(&mut self, reg: RegId) -> bool {
        match self.scopes.iter().rposition(|r| *r == reg) {
            Some(pos) => {
                self.scopes.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{VarLayout, Variable};
    use crate::sync::Arc;
    use tessel_bytecode::{VarType, VarTypeId};

    fn word() -> VarRef {
        let layout = Arc::new(VarLayout::new(VarTypeId::WORD, &VarType::word()));
        Variable::new(layout, 1).into_shared()
    }

    #[test]
    fn test_register_file() {
        let reg = RegId::new(2).unwrap();
        let mut regs = RegisterFile::new(4);

        assert!(matches!(
            regs.get(reg),
            Err(VmError::Execution(ExecFault::NullReference { .. }))
        ));
        regs.push(reg, Some(word())).unwrap();
        regs.push(reg, None).unwrap();
        assert_eq!(regs.depth(reg), 2);
        assert!(regs.get(reg).is_err());

        let bound = word();
        assert!(regs.rebind(reg, Some(bound.clone())).unwrap().is_none());
        assert!(Arc::ptr_eq(regs.get(reg).unwrap(), &bound));
        regs.pop(reg).unwrap();
        regs.pop(reg).unwrap();
        assert!(regs.pop(reg).is_err());
        assert!(regs.get(RegId::new(9).unwrap()).is_err());
    }

    #[test]
    fn test_call_frame() {
        let r1 = RegId::new(1).unwrap();
        let r2 = RegId::new(2).unwrap();
        let mut frame = CallFrame::new(ProcId(3));
        frame.scopes = vec![r1, r2, r1];

        assert!(frame.close_scope(r1));
        assert_eq!(frame.scopes, vec![r1, r2]);
        assert!(!frame.close_scope(RegId::new(5).unwrap()));
        assert_eq!(frame.pc, 0);
    }
}
