//! Runtime registry
//!
//! Maps module ids to registered units with a reference count per entry.
//! The registry's own slot counts as one reference. A destroyed module is
//! invisible to new retainers at once, but its entry is only erased when the
//! last outside reference is released.
//!
//! One mutex guards the map and every count; executions never take it.

use crate::backend::{Backend, RuntimeConfig};
use crate::module::ModuleUnit;
use crate::sync::{Arc, Mutex};
use crate::vm::Interpreter;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use tessel_bytecode::{ModuleDescription, ModuleId};
use tracing::debug;

struct Entry {
    unit: Arc<ModuleUnit>,
    refs: usize,
}

struct Inner {
    backend: Arc<dyn Backend>,
    entries: Mutex<BTreeMap<ModuleId, Entry>>,
}

/// Shared map from module id to registered module
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

impl Registry {
    /// Registry compiling with the interpreter and default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Registry compiling with the interpreter and `config`
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_backend(Arc::new(Interpreter::new(config)))
    }

    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                entries: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Process-wide default registry
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    /// Install a freshly built module with the registry's own reference
    pub(crate) fn insert_module_data(&self, desc: ModuleDescription) -> ModuleId {
        let id = desc.id;
        let unit = Arc::new(ModuleUnit::new(desc, self.inner.backend.clone()));
        self.inner
            .entries
            .lock()
            .insert(id, Entry { unit, refs: 1 });
        debug!(module = %id, "registered");
        id
    }

    /// Take a reference to a live module
    ///
    /// `None` when the id is unknown or the module has been destroyed.
    pub fn retain(&self, id: ModuleId) -> Option<ModuleRef> {
        let mut entries = self.inner.entries.lock();
        let entry = entries.get_mut(&id)?;
        if entry.unit.is_destroyed() {
            return None;
        }
        entry.refs += 1;
        Some(ModuleRef {
            registry: self.clone(),
            unit: entry.unit.clone(),
        })
    }

    fn release(&self, id: ModuleId) {
        let mut entries = self.inner.entries.lock();
        let erase = match entries.get_mut(&id) {
            Some(entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs <= 1 && entry.unit.is_destroyed()
            }
            None => false,
        };
        if erase {
            entries.remove(&id);
            debug!(module = %id, "erased");
        }
    }

    /// Current reference count of `id`, including the registry's own
    pub fn ref_count(&self, id: ModuleId) -> Option<usize> {
        self.inner.entries.lock().get(&id).map(|e| e.refs)
    }

    /// True while the entry physically occupies the map, destroyed or not
    pub fn is_resident(&self, id: ModuleId) -> bool {
        self.inner.entries.lock().contains_key(&id)
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of live (not destroyed) modules
    pub fn ids(&self) -> Vec<ModuleId> {
        self.inner
            .entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.unit.is_destroyed())
            .map(|(id, _)| *id)
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("backend", &self.inner.backend.name())
            .field("entries", &self.len())
            .finish()
    }
}

/// Counted reference to a registered module, released on drop
pub struct ModuleRef {
    registry: Registry,
    unit: Arc<ModuleUnit>,
}

impl Deref for ModuleRef {
    type Target = ModuleUnit;

    fn deref(&self) -> &ModuleUnit {
        &self.unit
    }
}

impl Drop for ModuleRef {
    fn drop(&mut self) {
        self.registry.release(self.unit.id());
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleRef").field(&self.unit).finish()
    }
}
