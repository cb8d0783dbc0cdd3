use core::ptr::null_mut;
use core::sync::atomic::{AtomicPtr, Ordering};

/// An atomic, possibly null pointer to a node.
///
/// Used both for the top of a stack and for the link from every node to the
/// node below it.
#[repr(transparent)]
pub(crate) struct AtomicLink<T> {
    ptr: AtomicPtr<T>,
}

impl<T> AtomicLink<T> {
    pub(crate) const fn null() -> Self {
        AtomicLink {
            ptr: AtomicPtr::new(null_mut()),
        }
    }

    /// Loads the pointer with `Acquire` ordering.
    pub(crate) fn load_ptr(&self) -> *mut T {
        self.ptr.load(Ordering::Acquire)
    }

    pub(crate) fn load_relaxed(&self) -> *mut T {
        self.ptr.load(Ordering::Relaxed)
    }

    /// Stores a pointer into a link that is not yet reachable by other
    /// threads, or that is only reachable through `&mut`.
    pub(crate) fn store_relaxed(&self, ptr: *mut T) {
        self.ptr.store(ptr, Ordering::Relaxed)
    }

    pub(crate) fn compare_exchange(
        &self,
        current: *mut T,
        new: *mut T,
        success: Ordering,
        failure: Ordering,
    ) -> Result<*mut T, *mut T> {
        self.ptr.compare_exchange(current, new, success, failure)
    }

    /// Takes the pointer out of an exclusively owned link, leaving null.
    pub(crate) fn take(&mut self) -> *mut T {
        core::mem::replace(self.ptr.get_mut(), null_mut())
    }

    pub(crate) fn is_null(&self) -> bool {
        self.load_ptr().is_null()
    }
}
