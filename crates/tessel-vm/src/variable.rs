//! Runtime variables
//!
//! A variable is an array of elements. Each element has a byte payload, a row
//! of owned reference slots and a row of native reference slots, all sized by
//! the variable's [`VarLayout`].
//!
//! Owned references are `Arc` clones: storing one increments the referent's
//! count, overwriting or dropping the slot decrements it, and a referent whose
//! count reaches zero is destroyed together with everything it owns. Native
//! references are plain function pointers and are never counted.

use crate::error::{Result, VmError};
use crate::sync::{shared, Arc, Shared};
use std::fmt;
use tessel_bytecode::{ModuleDescription, ProcTypeId, VarType, VarTypeId, WORD_BYTES};

/// Shared handle to a variable
pub type VarRef = Shared<Variable>;

/// Host callable stored in a native reference slot
pub type NativeFn = fn(&mut Variable) -> Result<()>;

/// Non-owning reference to a host callable
#[derive(Clone, Copy)]
pub struct NativeRef {
    pub name: &'static str,
    pub func: NativeFn,
}

impl NativeRef {
    pub fn new(name: &'static str, func: NativeFn) -> Self {
        Self { name, func }
    }

    pub fn invoke(&self, var: &mut Variable) -> Result<()> {
        (self.func)(var)
    }
}

impl fmt::Debug for NativeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeRef({})", self.name)
    }
}

/// Storage shape shared by every variable of one type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarLayout {
    pub vtype: VarTypeId,
    /// Fixed element count, `None` for dynamically sized types
    pub fixed_count: Option<usize>,
    pub element_bytes: usize,
    pub owned_refs: Vec<VarTypeId>,
    pub native_refs: Vec<ProcTypeId>,
}

impl VarLayout {
    pub fn new(vtype: VarTypeId, desc: &VarType) -> Self {
        Self {
            vtype,
            fixed_count: (!desc.is_dynamic()).then_some(desc.element_count as usize),
            element_bytes: desc.element_bytes as usize,
            owned_refs: desc.owned_refs.clone(),
            native_refs: desc.native_refs.clone(),
        }
    }

    /// Layouts for every type of a module, indexed by type id
    pub fn table(module: &ModuleDescription) -> Vec<Arc<VarLayout>> {
        module
            .vtypes
            .iter()
            .enumerate()
            .map(|(i, vt)| Arc::new(VarLayout::new(VarTypeId(i as u32), vt)))
            .collect()
    }

    /// True when the two layouts store the same element shape
    pub fn same_shape(&self, other: &VarLayout) -> bool {
        self.element_bytes == other.element_bytes
            && self.owned_refs == other.owned_refs
            && self.native_refs == other.native_refs
    }

    /// Check `count` against the layout, resolving 0 to the fixed count
    pub fn resolve_count(&self, count: usize) -> Result<usize> {
        match self.fixed_count {
            Some(fixed) if count == 0 || count == fixed => Ok(fixed),
            Some(fixed) => Err(VmError::Argument(format!(
                "{} has {} elements, not {}",
                self.vtype, fixed, count
            ))),
            None => Ok(count),
        }
    }
}

/// Runtime instance of a variable type
pub struct Variable {
    layout: Arc<VarLayout>,
    count: usize,
    data: Vec<u8>,
    refs: Vec<Option<VarRef>>,
    natives: Vec<Option<NativeRef>>,
}

impl Variable {
    /// Zero-initialised variable with `count` elements
    pub fn new(layout: Arc<VarLayout>, count: usize) -> Self {
        let data = vec![0; count * layout.element_bytes];
        let refs = vec![None; count * layout.owned_refs.len()];
        let natives = vec![None; count * layout.native_refs.len()];
        Self {
            layout,
            count,
            data,
            refs,
            natives,
        }
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> VarRef {
        shared(self)
    }

    pub fn layout(&self) -> &Arc<VarLayout> {
        &self.layout
    }

    pub fn vtype(&self) -> VarTypeId {
        self.layout.vtype
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Payload of every element, back to back
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Payload of element `elem`
    pub fn bytes(&self, elem: usize) -> Option<&[u8]> {
        let size = self.layout.element_bytes;
        if elem >= self.count {
            return None;
        }
        self.data.get(elem * size..(elem + 1) * size)
    }

    /// Mutable payload of element `elem`
    pub fn bytes_mut(&mut self, elem: usize) -> Option<&mut [u8]> {
        let size = self.layout.element_bytes;
        if elem >= self.count {
            return None;
        }
        self.data.get_mut(elem * size..(elem + 1) * size)
    }

    /// First word of element `elem`, little-endian
    pub fn word(&self, elem: usize) -> Option<i64> {
        let bytes = self.bytes(elem)?.get(..WORD_BYTES as usize)?;
        let mut raw = [0u8; WORD_BYTES as usize];
        raw.copy_from_slice(bytes);
        Some(i64::from_le_bytes(raw))
    }

    /// Store `value` as the first word of element `elem`
    pub fn set_word(&mut self, elem: usize, value: i64) -> Result<()> {
        let len = self.count;
        let bytes = self
            .bytes_mut(elem)
            .and_then(|b| b.get_mut(..WORD_BYTES as usize))
            .ok_or_else(|| {
                VmError::Range(format!("no word at element {} of {} elements", elem, len))
            })?;
        bytes.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Words of every element, for word-sized arrays
    pub fn words(&self) -> Vec<i64> {
        (0..self.count).filter_map(|i| self.word(i)).collect()
    }

    /// Owned reference slot `slot` of element `elem`
    pub fn owned_ref(&self, elem: usize, slot: usize) -> Option<&VarRef> {
        let index = self.ref_index(elem, slot)?;
        self.refs[index].as_ref()
    }

    /// Store an owned reference, returning the previous referent
    ///
    /// The new referent must have the slot's declared type.
    pub fn set_owned_ref(
        &mut self,
        elem: usize,
        slot: usize,
        referent: Option<VarRef>,
    ) -> Result<Option<VarRef>> {
        let index = self.ref_index(elem, slot).ok_or_else(|| {
            VmError::Range(format!(
                "no owned reference slot {} at element {}",
                slot, elem
            ))
        })?;
        if let Some(var) = &referent {
            let expected = self.layout.owned_refs[slot];
            // A variable may own itself; its lock is already held by the caller.
            let is_self = std::ptr::eq(var.data_ptr() as *const Variable, self as *const Variable);
            let actual = if is_self {
                self.layout.vtype
            } else {
                var.read().vtype()
            };
            if actual != expected {
                return Err(VmError::Type(format!(
                    "owned slot {} holds {}, not {}",
                    slot, expected, actual
                )));
            }
        }
        Ok(std::mem::replace(&mut self.refs[index], referent))
    }

    /// Store an owned reference without the type check; the verifier has
    /// already proved the slot type
    pub(crate) fn replace_owned_ref(
        &mut self,
        elem: usize,
        slot: usize,
        referent: Option<VarRef>,
    ) -> Option<Option<VarRef>> {
        let index = self.ref_index(elem, slot)?;
        Some(std::mem::replace(&mut self.refs[index], referent))
    }

    /// Native reference slot `slot` of element `elem`
    pub fn native_ref(&self, elem: usize, slot: usize) -> Option<NativeRef> {
        let width = self.layout.native_refs.len();
        if elem >= self.count || slot >= width {
            return None;
        }
        self.natives[elem * width + slot]
    }

    pub fn set_native_ref(&mut self, elem: usize, slot: usize, native: Option<NativeRef>) -> Result<()> {
        let width = self.layout.native_refs.len();
        if elem >= self.count || slot >= width {
            return Err(VmError::Range(format!(
                "no native reference slot {} at element {}",
                slot, elem
            )));
        }
        self.natives[elem * width + slot] = native;
        Ok(())
    }

    /// Copy element `elem` (payload and owned references) out of the variable
    pub(crate) fn element(&self, elem: usize) -> Option<ElementCopy> {
        let bytes = self.bytes(elem)?.to_vec();
        let width = self.layout.owned_refs.len();
        let refs = self.refs[elem * width..(elem + 1) * width].to_vec();
        let natives_width = self.layout.native_refs.len();
        let natives = self.natives[elem * natives_width..(elem + 1) * natives_width].to_vec();
        Some(ElementCopy {
            bytes,
            refs,
            natives,
        })
    }

    /// Overwrite element `elem`, returning the owned references it held
    pub(crate) fn store_element(&mut self, elem: usize, value: ElementCopy) -> Option<Vec<Option<VarRef>>> {
        let width = self.layout.owned_refs.len();
        if value.refs.len() != width || value.natives.len() != self.layout.native_refs.len() {
            return None;
        }
        let bytes = self.bytes_mut(elem)?;
        if bytes.len() != value.bytes.len() {
            return None;
        }
        bytes.copy_from_slice(&value.bytes);
        let old = self.refs.splice(elem * width..(elem + 1) * width, value.refs).collect();
        let natives_width = self.layout.native_refs.len();
        self.natives[elem * natives_width..(elem + 1) * natives_width].copy_from_slice(&value.natives);
        Some(old)
    }

    fn ref_index(&self, elem: usize, slot: usize) -> Option<usize> {
        let width = self.layout.owned_refs.len();
        (elem < self.count && slot < width).then_some(elem * width + slot)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("vtype", &self.layout.vtype)
            .field("count", &self.count)
            .field("data", &self.data)
            .field("refs", &self.refs.iter().filter(|r| r.is_some()).count())
            .finish()
    }
}

/// Detached copy of one element
pub(crate) struct ElementCopy {
    pub bytes: Vec<u8>,
    pub refs: Vec<Option<VarRef>>,
    pub natives: Vec<Option<NativeRef>>,
}
