//! Completion signal

use super::state::{OperationState, StateTracker};
use std::sync::{Condvar, Mutex, PoisonError};

/// Wait/notify channel between the initiating thread and the interrupt path
///
/// The state itself lives in a [`StateTracker`]; the signal lock only orders
/// the waiter's state check against the notifier's state change, so a
/// completion that lands before the waiter parks is never lost.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    lock: Mutex<()>,
    cond: Condvar,
}

impl CompletionSignal {
    /// Create a signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Block while `tracker` is in `state` and return the state that ended
    /// the wait
    ///
    /// The state is checked before parking and again after every wakeup.
    /// There is no timeout.
    pub fn wait_while(&self, tracker: &StateTracker, state: OperationState) -> OperationState {
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let current = tracker.load();
            if current != state {
                return current;
            }
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Run `mutate` under the signal lock, then wake every waiter
    ///
    /// `mutate` is expected to be a single state transition.
    pub fn notify<R>(&self, mutate: impl FnOnce() -> R) -> R {
        let result = {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            mutate()
        };
        self.cond.notify_all();
        result
    }
}
