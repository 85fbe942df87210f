//! Hook slots: shared mutable cells holding at most one callable.
//!
//! Every lifecycle and cross-cutting hook on an [`App`](crate::App) or
//! [`Command`](crate::Command) lives in a [`Slot`]. A slot is a cheap-clone
//! handle; cloning it produces an *aliasing* handle to the same underlying
//! cell, identified by the same [`SlotId`]. Instrumentation layers key their
//! undo bookkeeping on that id, so a slot reachable through two handles is
//! still recognized as one slot.
//!
//! Process-wide hooks (help printing, flag formatting) use [`GlobalSlot`]
//! instead: the same sharing semantics, but the cell is always populated so
//! a captured "previous value" is never absent.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity token for a [`Slot`].
///
/// Assigned once at slot construction from a monotonic counter. Two handles
/// compare equal exactly when they alias the same slot. Ids order by
/// creation time, which gives instrumentation bookkeeping a deterministic
/// iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u64);

impl SlotId {
    fn next() -> Self {
        SlotId(NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct SlotInner<T> {
    id: SlotId,
    value: RefCell<Option<T>>,
}

/// A shared, optional, identity-bearing hook cell.
///
/// Single-threaded by design (`Rc` + `RefCell`), matching the cooperative
/// execution model of the framework: one instrumentation pass or command
/// run touches a slot at a time.
pub struct Slot<T> {
    inner: Rc<SlotInner<T>>,
}

impl<T> Slot<T> {
    /// Creates an empty slot with a fresh identity.
    pub fn empty() -> Self {
        Self {
            inner: Rc::new(SlotInner {
                id: SlotId::next(),
                value: RefCell::new(None),
            }),
        }
    }

    /// Creates a populated slot with a fresh identity.
    pub fn new(value: T) -> Self {
        let slot = Self::empty();
        *slot.inner.value.borrow_mut() = Some(value);
        slot
    }

    /// The slot's identity token. Stable for the slot's lifetime and shared
    /// by all aliasing handles.
    pub fn id(&self) -> SlotId {
        self.inner.id
    }

    /// True when no callable is installed.
    pub fn is_empty(&self) -> bool {
        self.inner.value.borrow().is_none()
    }

    /// Replaces the slot's contents, returning the previous value.
    pub fn replace(&self, value: Option<T>) -> Option<T> {
        self.inner.value.replace(value)
    }

    /// Sets the slot's contents.
    pub fn set(&self, value: Option<T>) {
        *self.inner.value.borrow_mut() = value;
    }
}

impl<T: Clone> Slot<T> {
    /// Clones the current value out of the slot.
    pub fn get(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }
}

impl<T> Clone for Slot<T> {
    /// Produces an aliasing handle to the same slot (same [`SlotId`]).
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.inner.id)
            .field("populated", &!self.is_empty())
            .finish()
    }
}

/// A shared hook cell that always holds a value.
///
/// Used for the process-wide help and flag-formatting hooks, which the
/// framework initializes with working defaults. `get` therefore never has
/// an absent case to handle.
pub struct GlobalSlot<T> {
    inner: Rc<RefCell<T>>,
}

impl<T> GlobalSlot<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(value)),
        }
    }

    /// Installs a new value.
    pub fn set(&self, value: T) {
        *self.inner.borrow_mut() = value;
    }

    /// Installs a new value, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.inner.replace(value)
    }
}

impl<T: Clone> GlobalSlot<T> {
    /// Clones the current value out of the cell.
    pub fn get(&self) -> T {
        self.inner.borrow().clone()
    }
}

impl<T> Clone for GlobalSlot<T> {
    /// Produces an aliasing handle to the same cell.
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_ids_are_unique() {
        let a: Slot<u32> = Slot::empty();
        let b: Slot<u32> = Slot::empty();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_cloned_handle_aliases_same_slot() {
        let a = Slot::new(1u32);
        let b = a.clone();
        assert_eq!(a.id(), b.id());

        b.set(Some(2));
        assert_eq!(a.get(), Some(2));
    }

    #[test]
    fn test_replace_returns_previous() {
        let slot = Slot::new("old");
        let prev = slot.replace(Some("new"));
        assert_eq!(prev, Some("old"));
        assert_eq!(slot.get(), Some("new"));
    }

    #[test]
    fn test_empty_slot() {
        let slot: Slot<&str> = Slot::empty();
        assert!(slot.is_empty());
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn test_slot_ids_order_by_creation() {
        let a: Slot<u8> = Slot::empty();
        let b: Slot<u8> = Slot::empty();
        assert!(a.id() < b.id());
    }

    #[test]
    fn test_global_slot_shares_value() {
        let a = GlobalSlot::new(10u32);
        let b = a.clone();
        b.set(20);
        assert_eq!(a.get(), 20);
        assert_eq!(a.replace(30), 20);
    }
}
