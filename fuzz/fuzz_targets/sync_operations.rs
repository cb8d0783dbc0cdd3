#![no_main]

use hazstack::{Operation, Stack};
use libfuzzer_sys::fuzz_target;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fuzz_target!(|ops: Vec<Operation<i32>>| {
    let stack = Arc::new(Stack::new());
    let pushed = Arc::new(AtomicUsize::new(0));
    let popped = Arc::new(AtomicUsize::new(0));

    let mut threads = vec![];

    let len = ops.len();

    for sub_ops in ops.chunks(std::cmp::max(len / 20, 1)) {
        let sub_ops = sub_ops.to_vec();
        let stack = stack.clone();
        let pushed = pushed.clone();
        let popped = popped.clone();

        threads.push(std::thread::spawn(move || {
            sub_ops.into_iter().for_each(|op| match op {
                Operation::Push { .. } => {
                    op.apply(&stack);
                    pushed.fetch_add(1, Ordering::Relaxed);
                }
                Operation::Ext { ref items } => {
                    pushed.fetch_add(items.len(), Ordering::Relaxed);
                    op.apply(&stack);
                }
                Operation::Pop => {
                    if op.apply(&stack).is_some() {
                        popped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                op => {
                    op.apply(&stack);
                }
            })
        }))
    }

    for thread in threads {
        thread.join().unwrap()
    }

    let drained = std::iter::from_fn(|| stack.pop()).count();

    assert_eq!(
        pushed.load(Ordering::Relaxed),
        popped.load(Ordering::Relaxed) + drained
    );
    assert!(stack.is_empty());
});
