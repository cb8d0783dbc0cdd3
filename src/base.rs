use crate::link::AtomicLink;
use crate::reclaim::{self, Hazard};
use crate::{Config, PushError};
use alloc::alloc::{alloc, dealloc, handle_alloc_error};
use core::alloc::Layout;
use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct Node<T> {
    pub(crate) val: ManuallyDrop<T>,
    pub(crate) next: AtomicLink<Self>,
}

impl<T> Node<T> {
    pub(crate) fn new(val: T) -> Result<NonNull<Self>, PushError<T>> {
        let layout = Layout::new::<Self>();

        // Safety: `Node<T>` always holds a pointer, so the layout is non-zero.
        let Some(node) = NonNull::new(unsafe { alloc(layout) }.cast::<Self>()) else {
            return Err(PushError::Alloc { value: val, layout });
        };

        // Safety: freshly allocated with the layout of `Self`.
        unsafe {
            node.as_ptr().write(Node {
                val: ManuallyDrop::new(val),
                next: AtomicLink::null(),
            });
        }

        Ok(node)
    }

    /// Releases the node's memory without touching its value.
    pub(crate) unsafe fn dealloc(raw: *mut Self) {
        dealloc(raw.cast(), Layout::new::<Self>());
    }

    /// Drops the node's value, then releases the node.
    unsafe fn drop(raw: *mut Self) {
        ManuallyDrop::drop(&mut (*raw).val);
        Self::dealloc(raw);
    }
}

/// A lock-free LIFO stack.
///
/// Any number of threads may push and pop concurrently. Popped nodes are
/// retired to a hazard pointer domain and freed only once no thread can
/// still be reading them.
///
/// ```
/// use hazstack::Stack;
///
/// let stack = Stack::new();
/// stack.push(1);
/// stack.push(2);
///
/// assert_eq!(stack.pop(), Some(2));
/// assert_eq!(stack.pop(), Some(1));
/// assert_eq!(stack.pop(), None);
/// assert!(stack.is_empty());
/// ```
pub struct Stack<T> {
    head: AtomicLink<Node<T>>,
    len: AtomicUsize,
    retired: AtomicUsize,
    config: Config,
}

unsafe impl<T: Send> Send for Stack<T> {}
unsafe impl<T: Send> Sync for Stack<T> {}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Stack {
            head: AtomicLink::null(),
            len: AtomicUsize::new(0),
            retired: AtomicUsize::new(0),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of values on the stack.
    ///
    /// Only exact while no other thread is pushing or popping.
    pub fn len(&self) -> usize {
        let len = self.len.load(Ordering::Relaxed);
        // A pop can decrement before the matching push has incremented.
        if len > isize::MAX as usize {
            0
        } else {
            len
        }
    }

    /// Whether the stack was empty at the moment of the call.
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Pushes a value on top of the stack.
    ///
    /// Aborts through [`handle_alloc_error`] if the node cannot be
    /// allocated. Use [`try_push`](Self::try_push) to get the value back
    /// instead.
    pub fn push(&self, val: T) {
        if let Err(err) = self.try_push(val) {
            handle_alloc_error(err.layout());
        }
    }

    pub fn try_push(&self, val: T) -> Result<(), PushError<T>> {
        let node = Node::new(val)?.as_ptr();

        // Safety: the node was just allocated and is not yet reachable by
        // any other thread.
        unsafe {
            self.link(node, node);
        }

        self.len.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Moves every value of `other` on top of this stack in one step.
    ///
    /// The values keep their order: the top of `other` becomes the new top.
    pub fn extend(&self, mut other: Self) {
        let top = other.head.take();

        let Some(mut tail) = NonNull::new(top) else {
            return;
        };

        let mut spliced = 1;

        // Safety: `other` is owned by this call, so its chain is reachable
        // from nowhere else.
        unsafe {
            while let Some(next) = NonNull::new(tail.as_ref().next.load_relaxed()) {
                tail = next;
                spliced += 1;
            }

            self.link(top, tail.as_ptr());
        }

        other.len.store(0, Ordering::Relaxed);
        self.len.fetch_add(spliced, Ordering::Relaxed);

        tracing::debug!(spliced, "extended stack");
    }

    /// Frees every retired node that no thread is reading anymore.
    ///
    /// Returns the number of nodes freed. The domain is shared by all
    /// stacks, so this may free nodes popped from other stacks too.
    pub fn reclaim(&self) -> usize {
        let freed = reclaim::reclaim();
        tracing::debug!(freed, "reclaimed retired nodes");
        freed
    }

    /// Publishes the chain `top..=bottom` as the new top of the stack.
    ///
    /// # Safety
    ///
    /// The chain must be exclusively owned by the caller and `bottom` must
    /// be reachable from `top`.
    unsafe fn link(&self, top: *mut Node<T>, bottom: *mut Node<T>) {
        let mut head = self.head.load_relaxed();

        loop {
            (*bottom).next.store_relaxed(head);

            match self
                .head
                .compare_exchange(head, top, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(now) => head = now,
            }
        }
    }
}

impl<T> Stack<T>
where
    T: Send + Sync + 'static,
{
    /// Removes the value on top of the stack.
    ///
    /// Returns `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        let mut hazard = Hazard::new();

        loop {
            let head = NonNull::new(hazard.protect(&self.head))?;

            // Safety: `head` is protected and was still the top after the
            // hazard was published, so it has not been reclaimed.
            let next = unsafe { head.as_ref() }.next.load_relaxed();

            if self
                .head
                .compare_exchange(head.as_ptr(), next, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            // Safety: only the thread whose exchange unlinked the node
            // reaches this point, so the value is moved out exactly once.
            let val = unsafe { ManuallyDrop::into_inner(core::ptr::read(&head.as_ref().val)) };

            hazard.reset();
            self.len.fetch_sub(1, Ordering::Relaxed);

            // Safety: the node is unlinked, its value has been moved out and
            // no other pop can unlink it again.
            unsafe {
                self.retire(head.as_ptr());
            }

            return Some(val);
        }
    }

    /// Copies the value on top of the stack without removing it.
    pub fn peek(&self) -> Option<T>
    where
        T: Copy,
    {
        let mut hazard = Hazard::new();
        let head = NonNull::new(hazard.protect(&self.head))?;

        // Safety: `head` is protected. A concurrent pop may have moved the
        // value out already; a bitwise copy of a `Copy` value is still valid.
        Some(unsafe { *head.as_ref().val })
    }

    unsafe fn retire(&self, node: *mut Node<T>) {
        let mut freed = reclaim::retire(node);

        let retired = self.retired.fetch_add(1, Ordering::Relaxed) + 1;

        if retired % self.config.reclaim_threshold() == 0 {
            freed += reclaim::reclaim();
            tracing::debug!(retired, freed, "forced reclamation pass");
        }
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("len", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T> FromIterator<T> for Stack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let stack = Stack::new();
        iter.into_iter().for_each(|val| stack.push(val));
        stack
    }
}

impl<T> IntoIterator for Stack<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { stack: self }
    }
}

/// Owning iterator over a stack, yielding values from the top down.
pub struct IntoIter<T> {
    stack: Stack<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let head = NonNull::new(self.stack.head.load_relaxed())?;

        // Safety: the stack is owned by this iterator, so no other thread can
        // reach the node and it can be freed right away.
        unsafe {
            self.stack
                .head
                .store_relaxed(head.as_ref().next.load_relaxed());
            let val = ManuallyDrop::into_inner(core::ptr::read(&head.as_ref().val));
            Node::dealloc(head.as_ptr());
            self.stack.len.fetch_sub(1, Ordering::Relaxed);
            Some(val)
        }
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        let mut curr = self.head.take();

        // Safety: `&mut self` rules out concurrent access, and nodes still on
        // the chain were never retired.
        unsafe {
            while !curr.is_null() {
                let next = (*curr).next.load_relaxed();
                Node::drop(curr);
                curr = next;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_new_node() {
        let node = Node::new(1).unwrap();

        unsafe {
            Node::drop(node.as_ptr());
        }
    }

    #[test]
    fn test_empty_on_creation() {
        let stack = Stack::<i32>::new();

        assert!(stack.is_empty());
        assert_eq!(stack.len(), 0);
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_push_front() {
        let stack = Stack::new();

        stack.push(1);

        assert!(!stack.is_empty());
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.peek(), Some(1));
    }

    #[test]
    fn test_lifo_order() {
        let stack = Stack::new();

        (1..=5).for_each(|i| stack.push(i));

        let popped: Vec<i32> = core::iter::from_fn(|| stack.pop()).collect();

        assert_eq!(popped, vec![5, 4, 3, 2, 1]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_try_push() {
        let stack = Stack::new();

        assert!(stack.try_push(String::from("a")).is_ok());
        assert_eq!(stack.pop().as_deref(), Some("a"));
    }

    #[test]
    fn test_peek_does_not_remove() {
        let stack = Stack::new();

        assert_eq!(stack.peek(), None::<u8>);

        stack.push(3u8);
        stack.push(4u8);

        assert_eq!(stack.peek(), Some(4));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), Some(4));
        assert_eq!(stack.peek(), Some(3));
    }

    #[test]
    fn test_pop_after_drain_stays_empty() {
        let stack = Stack::new();

        stack.push(1);
        stack.pop();

        for _ in 0..10 {
            assert_eq!(stack.pop(), None);
            assert!(stack.is_empty());
        }
    }

    #[test]
    fn test_extend() {
        let expected = vec![2, 3, 7, 2, 0, 0, 3, 4, 2, 5];

        let stack = Stack::new();

        expected[expected.len() / 2..]
            .iter()
            .rev()
            .for_each(|&e| stack.push(e));

        let other = Stack::new();

        expected[..expected.len() / 2]
            .iter()
            .rev()
            .for_each(|&e| other.push(e));

        stack.extend(other);

        assert_eq!(stack.len(), expected.len());

        let actual: Vec<i32> = stack.into_iter().collect();

        assert_eq!(expected, actual);
    }

    #[test]
    fn test_extend_with_empty() {
        let stack: Stack<i32> = [1, 2].into_iter().collect();

        stack.extend(Stack::new());

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), Some(2));
    }

    #[test]
    fn test_drop_releases_values() {
        let drops = Arc::new(AtomicUsize::new(0));

        let stack = Stack::new();
        for _ in 0..5 {
            stack.push(DropCounter(drops.clone()));
        }

        drop(stack.pop());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(stack);
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_reclaim_never_drops_popped_values() {
        let drops = Arc::new(AtomicUsize::new(0));

        let stack = Stack::with_config(Config::new().with_reclaim_threshold(1));
        for _ in 0..8 {
            stack.push(DropCounter(drops.clone()));
        }

        let popped: Vec<_> = core::iter::from_fn(|| stack.pop()).collect();
        stack.reclaim();

        assert_eq!(popped.len(), 8);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(popped);
        assert_eq!(drops.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_reclaim_on_borrowed_values() {
        let values = [1, 2, 3];

        let stack: Stack<&i32> = values.iter().collect();
        stack.reclaim();

        assert_eq!(stack.len(), 3);
        assert_eq!(stack.into_iter().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn test_into_iter_partial() {
        let drops = Arc::new(AtomicUsize::new(0));

        let stack = Stack::new();
        for _ in 0..4 {
            stack.push(DropCounter(drops.clone()));
        }

        let mut iter = stack.into_iter();
        drop(iter.next());
        drop(iter);

        assert_eq!(drops.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_push_pop_sync() {
        let stack = Arc::new(Stack::new());

        let mut threads = vec![];

        for i in 0..10 {
            let stack = stack.clone();

            threads.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    if rand::random::<u8>() % 3 != 0 {
                        stack.push(i);
                    } else {
                        stack.pop();
                    }
                }
            }))
        }

        for thread in threads {
            thread.join().unwrap();
        }

        let remaining = stack.len();
        let drained = core::iter::from_fn(|| stack.pop()).count();

        assert_eq!(remaining, drained);
    }
}
