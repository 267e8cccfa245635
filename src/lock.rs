/// Queue-based async lock serializing all grouping mutations
///
/// Host events can fire faster than a grouping decision completes; two
/// interleaved read-decide-write sequences against the tab store corrupt
/// group membership. Every mutating path runs through one of these.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;

use futures::channel::oneshot;

#[derive(Default)]
pub struct MutationLock {
    state: RefCell<LockState>,
}

#[derive(Default)]
struct LockState {
    locked: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Held while an operation runs; releasing hands the lock to the next
/// waiter in arrival order
struct LockGuard<'a> {
    lock: &'a MutationLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl MutationLock {
    pub fn new() -> Self {
        MutationLock::default()
    }

    /// Run `op` with the lock held. Concurrent callers queue and run
    /// strictly in arrival order. A failing operation reports only to its
    /// own caller; the queue keeps draining.
    pub async fn with_lock<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire().await;
        op().await
    }

    async fn acquire(&self) -> LockGuard<'_> {
        let waiter = {
            let mut state = self.state.borrow_mut();
            if !state.locked {
                state.locked = true;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = waiter {
            // The sender is dropped only if the lock itself is dropped
            // while we wait; proceeding then is still safe.
            let _ = rx.await;
        }
        LockGuard { lock: self }
    }

    fn release(&self) {
        let mut state = self.state.borrow_mut();
        // Hand the lock to the first waiter still listening
        while let Some(tx) = state.waiters.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }
        state.locked = false;
    }
}
