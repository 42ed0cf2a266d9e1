//! Synchronization types shared by the registry, the module units and the
//! runtime variables.
//!
//! We use parking_lot because:
//! - It has no poisoning, so a fault inside one execution never locks out others.
//! - Better performance in cases without contention.

pub use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use std::sync::Arc;

/// Alias for the common pattern Arc<RwLock<T>>
pub type Shared<T> = Arc<RwLock<T>>;

/// Helper to create Shared<T> easily
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}
