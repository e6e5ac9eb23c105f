/// Advisory per-operator publish locks
///
/// Tracks which operator IDs currently have a publish in flight. A pure
/// guard with no I/O and no timeouts: callers own the responsibility of
/// always unlocking, which the coordinator guarantees on every exit path.
/// Process-local, so a restart clears all locks.
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::warn;

/// Registry of operator IDs locked for publishing
#[derive(Debug, Default)]
pub struct LockRegistry {
    locked: RwLock<HashSet<String>>,
}

impl LockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the operator ID is currently locked
    pub fn is_locked(&self, operator_id: &str) -> bool {
        match self.locked.read() {
            Ok(set) => set.contains(operator_id),
            Err(poisoned) => poisoned.into_inner().contains(operator_id),
        }
    }

    /// Lock an operator ID. Locking an already-locked ID is a no-op.
    pub fn lock(&self, operator_id: &str) {
        match self.locked.write() {
            Ok(mut set) => {
                set.insert(operator_id.to_string());
            }
            Err(poisoned) => {
                warn!("Lock registry poisoned, recovering");
                poisoned.into_inner().insert(operator_id.to_string());
            }
        }
    }

    /// Unlock an operator ID. Unlocking an unlocked ID is a no-op.
    pub fn unlock(&self, operator_id: &str) {
        match self.locked.write() {
            Ok(mut set) => {
                set.remove(operator_id);
            }
            Err(poisoned) => {
                warn!("Lock registry poisoned, recovering");
                poisoned.into_inner().remove(operator_id);
            }
        }
    }

    /// Clear all locks
    pub fn clear_all(&self) {
        match self.locked.write() {
            Ok(mut set) => set.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_unlock() {
        let registry = LockRegistry::new();
        assert!(!registry.is_locked("op-1"));

        registry.lock("op-1");
        assert!(registry.is_locked("op-1"));
        assert!(!registry.is_locked("op-2"));

        registry.unlock("op-1");
        assert!(!registry.is_locked("op-1"));
    }

    #[test]
    fn test_lock_is_idempotent() {
        let registry = LockRegistry::new();
        registry.lock("op-1");
        registry.lock("op-1");
        assert!(registry.is_locked("op-1"));

        // One unlock suffices regardless of how many times lock was called
        registry.unlock("op-1");
        assert!(!registry.is_locked("op-1"));
    }

    #[test]
    fn test_unlock_without_lock_is_noop() {
        let registry = LockRegistry::new();
        registry.unlock("op-1");
        assert!(!registry.is_locked("op-1"));
    }

    #[test]
    fn test_clear_all() {
        let registry = LockRegistry::new();
        registry.lock("op-1");
        registry.lock("op-2");
        registry.clear_all();
        assert!(!registry.is_locked("op-1"));
        assert!(!registry.is_locked("op-2"));
    }
}
