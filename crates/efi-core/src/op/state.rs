//! Operation state tracker

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use thiserror::Error;

/// State of one operation class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationState {
    /// No operation in flight
    Idle = 0,
    /// Trigger issued, waiting for the chip
    Pending = 1,
    /// Chip reported completion
    Done = 2,
    /// Chip reported an error
    Failed = 3,
}

impl OperationState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Pending,
            2 => Self::Done,
            // Only this module stores into the atomic
            _ => Self::Failed,
        }
    }
}

impl core::fmt::Display for OperationState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A rejected state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("transition {expected} -> {next} rejected, state is {actual}")]
pub struct StateError {
    /// State the caller expected
    pub expected: OperationState,
    /// State the caller wanted to move to
    pub next: OperationState,
    /// State actually observed
    pub actual: OperationState,
}

/// Callback invoked after every successful transition
///
/// Runs on whichever thread performed the transition, including the
/// interrupt path, so it must be quick and must not block.
pub type TransitionObserver = Box<dyn Fn(OperationState, OperationState) + Send + Sync>;

/// Atomically updated state of one operation class
pub struct StateTracker {
    name: &'static str,
    state: AtomicU8,
    spurious: AtomicUsize,
    observer: Option<TransitionObserver>,
}

impl StateTracker {
    /// Create a tracker in [`OperationState::Idle`]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: AtomicU8::new(OperationState::Idle as u8),
            spurious: AtomicUsize::new(0),
            observer: None,
        }
    }

    /// Create a tracker reporting every transition to `observer`
    pub fn with_observer(name: &'static str, observer: TransitionObserver) -> Self {
        Self {
            observer: Some(observer),
            ..Self::new(name)
        }
    }

    /// Current state
    pub fn load(&self) -> OperationState {
        OperationState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Move from `expected` to `next` if the current state is `expected`
    ///
    /// On failure nothing is changed and the observed state is returned in
    /// the error.
    pub fn try_transition(
        &self,
        expected: OperationState,
        next: OperationState,
    ) -> Result<(), StateError> {
        match self.state.compare_exchange(
            expected as u8,
            next as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                log::trace!("{}: {} -> {}", self.name, expected, next);
                if let Some(observer) = &self.observer {
                    observer(expected, next);
                }
                Ok(())
            }
            Err(actual) => Err(StateError {
                expected,
                next,
                actual: OperationState::from_raw(actual),
            }),
        }
    }

    /// Overwrite the state without the transition check
    #[cfg(test)]
    pub(crate) fn force(&self, state: OperationState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Count a trigger that arrived with no operation pending
    pub(crate) fn record_spurious(&self) -> usize {
        self.spurious.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of completion triggers that found no pending operation
    pub fn spurious_triggers(&self) -> usize {
        self.spurious.load(Ordering::Relaxed)
    }
}

impl core::fmt::Debug for StateTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StateTracker")
            .field("name", &self.name)
            .field("state", &self.load())
            .field("spurious", &self.spurious_triggers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use OperationState::*;

    #[test]
    fn test_full_cycle() {
        let t = StateTracker::new("test");
        assert_eq!(t.load(), Idle);
        t.try_transition(Idle, Pending).unwrap();
        t.try_transition(Pending, Done).unwrap();
        t.try_transition(Done, Idle).unwrap();
        t.try_transition(Idle, Pending).unwrap();
        t.try_transition(Pending, Failed).unwrap();
        t.try_transition(Failed, Idle).unwrap();
        assert_eq!(t.load(), Idle);
    }

    #[test]
    fn test_rejected_transition_reports_actual() {
        let t = StateTracker::new("test");
        let err = t.try_transition(Pending, Done).unwrap_err();
        assert_eq!(
            err,
            StateError {
                expected: Pending,
                next: Done,
                actual: Idle
            }
        );
        // Not mutated
        assert_eq!(t.load(), Idle);
    }

    #[test]
    fn test_observer_sees_transitions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let t = StateTracker::with_observer(
            "test",
            Box::new(move |from, to| sink.lock().unwrap().push((from, to))),
        );

        t.try_transition(Idle, Pending).unwrap();
        let _ = t.try_transition(Idle, Pending);
        t.try_transition(Pending, Done).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(Idle, Pending), (Pending, Done)]);
    }

    #[test]
    fn test_spurious_counter() {
        let t = StateTracker::new("test");
        assert_eq!(t.spurious_triggers(), 0);
        assert_eq!(t.record_spurious(), 1);
        assert_eq!(t.record_spurious(), 2);
        assert_eq!(t.spurious_triggers(), 2);
    }

    #[test]
    fn test_error_display() {
        let err = StateError {
            expected: Idle,
            next: Pending,
            actual: Done,
        };
        assert_eq!(
            err.to_string(),
            "transition idle -> pending rejected, state is done"
        );
    }
}
