//! Immutable structural description of a module

use crate::error::Result;
use crate::instruction::{decode_stream, Instruction};
use crate::types::{ProcDef, ProcId, ProcType, ProcTypeId, RegId, VarSpec, VarType, VarTypeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Module identity: a 128-bit generated id, ordered so it can key a map
pub type ModuleId = Uuid;

/// Types, registers and procedures of a verified module
///
/// Produced by the module builder and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescription {
    pub id: ModuleId,
    pub vtypes: Vec<VarType>,
    pub ptypes: Vec<ProcType>,
    pub regs: Vec<VarSpec>,
    pub procs: Vec<ProcDef>,
}

impl ModuleDescription {
    pub fn vtype(&self, id: VarTypeId) -> Option<&VarType> {
        self.vtypes.get(id.index())
    }

    pub fn ptype(&self, id: ProcTypeId) -> Option<&ProcType> {
        self.ptypes.get(id.index())
    }

    pub fn reg(&self, id: RegId) -> Option<&VarSpec> {
        self.regs.get(id.index())
    }

    pub fn proc(&self, id: ProcId) -> Option<&ProcDef> {
        self.procs.get(id.index())
    }

    /// Type of register `id`
    pub fn reg_type(&self, id: RegId) -> Option<&VarType> {
        self.reg(id).and_then(|spec| self.vtype(spec.vtype))
    }

    /// Decoded instructions of procedure `id`
    pub fn decode_proc(&self, id: ProcId) -> Option<Result<Vec<Instruction>>> {
        self.proc(id).map(|proc| decode_stream(&proc.code))
    }
}
