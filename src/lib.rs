//! A lock-free LIFO stack with hazard pointer based memory reclamation.
//!
//! Popped nodes are never freed by the thread that unlinks them. They are
//! retired to a hazard pointer domain and freed once no thread has the node
//! protected, which rules out use-after-free and double-free between
//! concurrent pops.
//!
//! The crate reports reclamation activity through [`tracing`] at the `debug`
//! level and never installs a subscriber itself.

mod base;
mod config;
mod error;
mod link;
mod reclaim;

pub use base::{IntoIter, Stack};
pub use config::Config;
pub use error::PushError;

extern crate alloc;

/// A single stack operation, used to drive the stack from fuzz inputs.
#[cfg(feature = "arbitrary")]
#[derive(Clone, Debug)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum Operation<T> {
    Push { item: T },
    Pop,
    PopPush,
    Peek,
    Ext { items: Vec<T> },
    Reclaim,
}

#[cfg(feature = "arbitrary")]
impl<T> Operation<T>
where
    T: Copy + Send + Sync + 'static,
{
    /// Applies the operation, returning the value it popped or peeked.
    pub fn apply(self, stack: &Stack<T>) -> Option<T> {
        match self {
            Operation::Push { item } => {
                stack.push(item);
                None
            }
            Operation::Pop => stack.pop(),
            Operation::PopPush => {
                let val = stack.pop()?;
                stack.push(val);
                Some(val)
            }
            Operation::Peek => stack.peek(),
            Operation::Ext { items } => {
                stack.extend(items.into_iter().collect());
                None
            }
            Operation::Reclaim => {
                stack.reclaim();
                None
            }
        }
    }
}
