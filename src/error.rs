use core::alloc::Layout;
use core::fmt;

/// Error returned by [`Stack::try_push`](crate::Stack::try_push).
///
/// The rejected value is handed back untouched.
#[derive(thiserror::Error)]
pub enum PushError<T> {
    #[error("failed to allocate {size} bytes for a stack node", size = .layout.size())]
    Alloc { value: T, layout: Layout },
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Alloc { value, .. } => value,
        }
    }

    pub fn layout(&self) -> Layout {
        match self {
            PushError::Alloc { layout, .. } => *layout,
        }
    }
}

// Written by hand so that `T` does not need to be `Debug`.
impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Alloc { layout, .. } => f
                .debug_struct("Alloc")
                .field("layout", layout)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_alloc_error_display() {
        let err = PushError::Alloc {
            value: String::from("kept"),
            layout: Layout::new::<[u64; 2]>(),
        };

        assert_eq!(
            err.to_string(),
            "failed to allocate 16 bytes for a stack node"
        );
        assert_eq!(err.layout().size(), 16);
        assert_eq!(err.into_inner(), "kept");
    }
}
