//! Hazard pointer reclamation for detached stack nodes.
//!
//! A thread that wants to dereference a node first publishes its address in
//! a [`Hazard`] and then checks that the node is still reachable. A thread
//! that unlinks a node hands it to [`retire`] instead of freeing it. Retired
//! nodes are freed by a later scan of the domain, and only when no hazard
//! slot holds their address.
//!
//! All stacks share one domain that is private to this crate, so scans never
//! walk hazards or retired objects belonging to other users of `haphazard`.

use crate::base::Node;
use crate::link::AtomicLink;
use core::ptr::NonNull;
use core::sync::atomic::{fence, Ordering};
use haphazard::{Domain, HazardPointer, Singleton};

pub(crate) struct StackFamily;

unsafe impl Singleton for StackFamily {}

static STACK_DOMAIN: Domain<StackFamily> = Domain::new(&StackFamily);

/// A published hazard slot.
///
/// The slot is released back to the domain when the `Hazard` is dropped.
pub(crate) struct Hazard {
    pointer: HazardPointer<'static, StackFamily>,
}

impl Hazard {
    pub(crate) fn new() -> Self {
        Hazard {
            pointer: HazardPointer::new_in_domain(&STACK_DOMAIN),
        }
    }

    /// Protects the node currently stored in `link`.
    ///
    /// On return the slot holds the returned address and `link` held that
    /// same address after the slot was published, so the node cannot be
    /// reclaimed until the slot is reset or dropped. Returns null if the
    /// link is empty.
    pub(crate) fn protect<T>(&mut self, link: &AtomicLink<T>) -> *mut T
    where
        T: Sync + 'static,
    {
        let mut ptr = link.load_ptr();

        loop {
            self.pointer.protect_raw(ptr);

            // Orders the publication before the re-read; pairs with the fence
            // a reclaiming scan issues before it reads the hazard slots.
            fence(Ordering::SeqCst);

            let now = link.load_ptr();

            if core::ptr::eq(ptr, now) {
                return ptr;
            }

            ptr = now;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.pointer.reset_protection();
    }
}

/// Retires a node that has been unlinked from its stack.
///
/// Returns the number of nodes the domain reclaimed while handling the call.
///
/// # Safety
///
/// `node` must be unreachable from every stack, must not be retired twice
/// and must no longer own a value: its value has been moved out.
pub(crate) unsafe fn retire<T>(node: *mut Node<T>) -> usize
where
    T: Send + 'static,
{
    debug_assert!(!node.is_null());
    STACK_DOMAIN.retire_ptr::<Node<T>, Retired<T>>(node)
}

/// Frees every retired node that no hazard currently protects.
pub(crate) fn reclaim() -> usize {
    STACK_DOMAIN.eager_reclaim()
}

/// Deleter for retired nodes.
///
/// Only releases the node's memory. The value was moved out by the thread
/// that unlinked the node, so it is never dropped here.
#[repr(transparent)]
struct Retired<T>(NonNull<Node<T>>);

impl<T> Drop for Retired<T> {
    fn drop(&mut self) {
        unsafe {
            Node::dealloc(self.0.as_ptr());
        }
    }
}

impl<T> core::ops::Deref for Retired<T> {
    type Target = Node<T>;
    fn deref(&self) -> &Self::Target {
        unsafe { self.0.as_ref() }
    }
}

unsafe impl<T> haphazard::raw::Pointer<Node<T>> for Retired<T> {
    fn into_raw(self) -> *mut Node<T> {
        let ptr = self.0.as_ptr();
        core::mem::forget(self);
        ptr
    }

    unsafe fn from_raw(ptr: *mut Node<T>) -> Self {
        Self(NonNull::new_unchecked(ptr))
    }
}
