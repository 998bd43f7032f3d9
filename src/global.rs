//! Process-wide slots with an explicit lifecycle.
//!
//! Each slot starts empty, is filled by `set`, and can be cleared again with
//! `reset`. Readers get an `Arc` snapshot, so a value that is replaced while
//! someone is still using it stays intact for that user.

use std::sync::{Arc, PoisonError, RwLock};

/// A replaceable, process-wide `Arc<T>` slot.
#[derive(Debug)]
pub struct GlobalSlot<T> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T> GlobalSlot<T> {
    /// Create an empty slot. Usable in `static` position.
    pub const fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Store `value`, replacing any previous one. Returns the stored `Arc`.
    pub fn set(&self, value: Arc<T>) -> Arc<T> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Arc::clone(&value));
        value
    }

    /// Current value, if any.
    pub fn get(&self) -> Option<Arc<T>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear the slot, returning the previous value.
    pub fn reset(&self) -> Option<Arc<T>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether the slot currently holds a value.
    pub fn is_initialized(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T> Default for GlobalSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lifecycle() {
        let slot: GlobalSlot<u32> = GlobalSlot::new();
        assert!(!slot.is_initialized());
        assert!(slot.get().is_none());

        slot.set(Arc::new(1));
        assert!(slot.is_initialized());
        assert_eq!(slot.get().as_deref(), Some(&1));

        // Replacing does not disturb a snapshot already handed out
        let snapshot = slot.get().expect("slot set");
        slot.set(Arc::new(2));
        assert_eq!(*snapshot, 1);
        assert_eq!(slot.get().as_deref(), Some(&2));

        assert_eq!(slot.reset().as_deref(), Some(&2));
        assert!(!slot.is_initialized());
    }
}
