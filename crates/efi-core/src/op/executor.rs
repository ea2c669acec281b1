//! Generic executor for one operation class

use super::gate::{ExclusiveGate, GateGuard};
use super::signal::CompletionSignal;
use super::state::{OperationState, StateError, StateTracker, TransitionObserver};
use crate::error::{FailureKind, IoError, OpError, Result};

/// How the chip resolved an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Completion interrupt
    Done,
    /// Error interrupt
    Failed,
}

/// One class of long-running operations
///
/// Owns the state tracker, gate and completion signal of the class. The
/// interrupt path calls [`on_complete`](Self::on_complete) and
/// [`on_error`](Self::on_error); callers run operations through
/// [`execute`](Self::execute) or, when several steps must happen under one
/// gate hold, through a [`Session`].
#[derive(Debug)]
pub struct OperationClass {
    name: &'static str,
    tracker: StateTracker,
    gate: ExclusiveGate,
    signal: CompletionSignal,
}

impl OperationClass {
    /// Create an idle class
    pub fn new(name: &'static str) -> Self {
        Self::from_tracker(name, StateTracker::new(name))
    }

    /// Create an idle class whose state transitions are reported to
    /// `observer`
    pub fn with_observer(name: &'static str, observer: TransitionObserver) -> Self {
        Self::from_tracker(name, StateTracker::with_observer(name, observer))
    }

    fn from_tracker(name: &'static str, tracker: StateTracker) -> Self {
        Self {
            name,
            tracker,
            gate: ExclusiveGate::new(),
            signal: CompletionSignal::new(),
        }
    }

    /// Class name used in log messages
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state
    pub fn state(&self) -> OperationState {
        self.tracker.load()
    }

    /// Number of completion triggers that found no pending operation
    pub fn spurious_triggers(&self) -> usize {
        self.tracker.spurious_triggers()
    }

    /// Take the class gate
    ///
    /// Blocks while another operation of this class is in flight. Fails with
    /// [`OpError::Cancelled`] once the class is closed.
    pub fn acquire(&self) -> Result<Session<'_>> {
        let guard = self.gate.acquire().map_err(|_| OpError::Cancelled)?;
        Ok(Session {
            class: self,
            _guard: guard,
        })
    }

    /// Run one operation and map an error interrupt to
    /// [`OpError::OperationFailed`]
    pub fn execute<F>(&self, trigger: F, failure: FailureKind) -> Result<()>
    where
        F: FnOnce() -> core::result::Result<(), IoError>,
    {
        match self.acquire()?.run(trigger)? {
            Completion::Done => Ok(()),
            Completion::Failed => Err(OpError::OperationFailed(failure)),
        }
    }

    /// Completion interrupt entry point
    pub fn on_complete(&self) {
        self.resolve(OperationState::Done);
    }

    /// Error interrupt entry point
    pub fn on_error(&self) {
        self.resolve(OperationState::Failed);
    }

    fn resolve(&self, next: OperationState) {
        let result = self
            .signal
            .notify(|| self.tracker.try_transition(OperationState::Pending, next));
        if let Err(e) = result {
            let count = self.tracker.record_spurious();
            log::warn!(
                "{}: ignoring {} trigger while {} (spurious #{})",
                self.name,
                next,
                e.actual,
                count
            );
        }
    }

    /// Fail every blocked and future [`acquire`](Self::acquire)
    ///
    /// An operation already in flight still runs to completion.
    pub fn close(&self) {
        log::debug!("{}: closing", self.name);
        self.gate.close();
    }

    /// Block until the operation in flight, if any, has resolved and its
    /// session is dropped
    ///
    /// Call after [`close`](Self::close). There is no timeout: if the chip
    /// never resolves the operation this does not return.
    pub fn drain(&self) {
        self.gate.drain();
        log::debug!("{}: drained", self.name);
    }

    fn internal(&self, err: StateError) -> OpError {
        log::error!("{}: protocol violation: {}", self.name, err);
        OpError::Internal(err)
    }
}

/// Exclusive hold on an [`OperationClass`]
///
/// Plain register accesses made while holding a session cannot interleave
/// with another operation of the same class.
#[derive(Debug)]
pub struct Session<'a> {
    class: &'a OperationClass,
    _guard: GateGuard<'a>,
}

impl Session<'_> {
    /// Issue `trigger` and block until the chip resolves the operation
    ///
    /// If `trigger` fails the state is rolled back and
    /// [`OpError::RequestFailed`] is returned. Once the trigger went out the
    /// wait cannot be cancelled. An unexpected state after wakeup yields
    /// [`OpError::Internal`] and is left in place.
    pub fn run<F>(&mut self, trigger: F) -> Result<Completion>
    where
        F: FnOnce() -> core::result::Result<(), IoError>,
    {
        use OperationState::*;

        let class = self.class;
        class
            .tracker
            .try_transition(Idle, Pending)
            .map_err(|e| class.internal(e))?;
        log::debug!("{}: operation started", class.name);

        if let Err(source) = trigger() {
            log::warn!("{}: trigger failed: {}", class.name, source);
            class
                .tracker
                .try_transition(Pending, Idle)
                .map_err(|e| class.internal(e))?;
            return Err(OpError::RequestFailed { source });
        }

        let resolved = class.signal.wait_while(&class.tracker, Pending);
        let completion = match resolved {
            Done => Completion::Done,
            Failed => Completion::Failed,
            actual => {
                return Err(class.internal(StateError {
                    expected: Done,
                    next: Idle,
                    actual,
                }))
            }
        };
        class
            .tracker
            .try_transition(resolved, Idle)
            .map_err(|e| class.internal(e))?;

        log::debug!("{}: operation finished: {:?}", class.name, completion);
        Ok(completion)
    }

    /// The class this session holds
    pub fn class(&self) -> &OperationClass {
        self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Barrier, Mutex};
    use std::thread;
    use std::time::Duration;

    use OperationState::*;

    fn complete_later(class: &Arc<OperationClass>, ok: bool) {
        let class = Arc::clone(class);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            if ok {
                class.on_complete();
            } else {
                class.on_error();
            }
        });
    }

    #[test]
    fn test_execute_done() {
        let class = Arc::new(OperationClass::new("test"));
        let c = Arc::clone(&class);
        class
            .execute(
                || {
                    complete_later(&c, true);
                    Ok(())
                },
                FailureKind::Rejected,
            )
            .unwrap();
        assert_eq!(class.state(), Idle);
    }

    #[test]
    fn test_execute_failed_maps_kind() {
        let class = Arc::new(OperationClass::new("test"));
        let c = Arc::clone(&class);
        let err = class
            .execute(
                || {
                    complete_later(&c, false);
                    Ok(())
                },
                FailureKind::FlashAccessDenied,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            OpError::OperationFailed(FailureKind::FlashAccessDenied)
        ));
        assert_eq!(class.state(), Idle);
    }

    #[test]
    fn test_completion_inside_trigger() {
        // Interrupt arrives before the initiator starts waiting
        let class = OperationClass::new("test");
        let mut session = class.acquire().unwrap();
        let done = session
            .run(|| {
                class.on_complete();
                Ok(())
            })
            .unwrap();
        assert_eq!(done, Completion::Done);
        drop(session);
        assert_eq!(class.state(), Idle);
        assert_eq!(class.spurious_triggers(), 0);
    }

    #[test]
    fn test_trigger_failure_rolls_back() {
        let class = OperationClass::new("test");
        let err = class
            .execute(|| Err(IoError::Disconnected), FailureKind::Rejected)
            .unwrap_err();
        assert!(matches!(
            err,
            OpError::RequestFailed {
                source: IoError::Disconnected
            }
        ));
        assert_eq!(class.state(), Idle);

        // Gate is free and the class usable again
        let mut session = class.acquire().unwrap();
        let done = session
            .run(|| {
                class.on_complete();
                Ok(())
            })
            .unwrap();
        assert_eq!(done, Completion::Done);
    }

    #[test]
    fn test_spurious_trigger_is_inert() {
        let class = OperationClass::new("test");
        class.on_complete();
        class.on_error();
        assert_eq!(class.state(), Idle);
        assert_eq!(class.spurious_triggers(), 2);

        let mut session = class.acquire().unwrap();
        let r = session.run(|| {
            class.on_error();
            Ok(())
        });
        assert_eq!(r.unwrap(), Completion::Failed);
    }

    #[test]
    fn test_duplicate_trigger_counted() {
        let class = OperationClass::new("test");
        let mut session = class.acquire().unwrap();
        session
            .run(|| {
                class.on_complete();
                class.on_complete();
                Ok(())
            })
            .unwrap();
        assert_eq!(class.spurious_triggers(), 1);
    }

    #[test]
    fn test_observed_sequences() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let class = Arc::new(OperationClass::with_observer(
            "test",
            Box::new(move |from, to| sink.lock().unwrap().push((from, to))),
        ));

        let c = Arc::clone(&class);
        class
            .execute(
                || {
                    complete_later(&c, true);
                    Ok(())
                },
                FailureKind::Rejected,
            )
            .unwrap();
        let c = Arc::clone(&class);
        let _ = class.execute(
            || {
                complete_later(&c, false);
                Ok(())
            },
            FailureKind::Rejected,
        );
        let _ = class.execute(|| Err(IoError::Disconnected), FailureKind::Rejected);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Idle, Pending),
                (Pending, Done),
                (Done, Idle),
                (Idle, Pending),
                (Pending, Failed),
                (Failed, Idle),
                (Idle, Pending),
                (Pending, Idle),
            ]
        );
    }

    #[test]
    fn test_concurrent_callers_serialized() {
        const THREADS: usize = 6;
        const OPS: usize = 20;

        let class = Arc::new(OperationClass::new("test"));
        let inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let class = Arc::clone(&class);
                let inside = Arc::clone(&inside);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for n in 0..OPS {
                        let c = Arc::clone(&class);
                        let inside_t = Arc::clone(&inside);
                        let r = class.execute(
                            move || {
                                assert_eq!(inside_t.fetch_add(1, Ordering::SeqCst), 0);
                                let ok = (i + n) % 3 != 0;
                                let inside_c = Arc::clone(&inside_t);
                                thread::spawn(move || {
                                    inside_c.fetch_sub(1, Ordering::SeqCst);
                                    if ok {
                                        c.on_complete();
                                    } else {
                                        c.on_error();
                                    }
                                });
                                Ok(())
                            },
                            FailureKind::CommandFailed,
                        );
                        if (i + n) % 3 != 0 {
                            r.unwrap();
                        } else {
                            assert!(r.is_err());
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(class.state(), Idle);
        assert_eq!(class.spurious_triggers(), 0);
    }

    #[test]
    fn test_close_cancels_waiting_caller() {
        let class = Arc::new(OperationClass::new("test"));
        let session = class.acquire().unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let class = Arc::clone(&class);
            thread::spawn(move || {
                tx.send(()).unwrap();
                class.execute(|| Ok(()), FailureKind::Rejected)
            })
        };
        rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        class.close();
        assert!(matches!(waiter.join().unwrap(), Err(OpError::Cancelled)));
        drop(session);
        assert_eq!(class.state(), Idle);
    }

    #[test]
    fn test_start_outside_idle_is_internal() {
        let class = OperationClass::new("test");
        class.tracker.force(Done);
        let mut triggered = false;
        let err = class
            .execute(
                || {
                    triggered = true;
                    Ok(())
                },
                FailureKind::Rejected,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            OpError::Internal(StateError {
                expected: Idle,
                next: Pending,
                actual: Done
            })
        ));
        assert!(!triggered);
        // Left for inspection
        assert_eq!(class.state(), Done);
    }

    #[test]
    fn test_unexpected_state_after_wakeup_is_internal() {
        let class = OperationClass::new("test");
        let err = class
            .execute(
                || {
                    class.tracker.force(Idle);
                    Ok(())
                },
                FailureKind::Rejected,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            OpError::Internal(StateError { actual: Idle, .. })
        ));
        assert_eq!(class.state(), Idle);
    }

    #[test]
    fn test_failed_rollback_is_internal() {
        let class = OperationClass::new("test");
        let err = class
            .execute(
                || {
                    class.tracker.force(Failed);
                    Err(IoError::Disconnected)
                },
                FailureKind::Rejected,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            OpError::Internal(StateError {
                expected: Pending,
                next: Idle,
                actual: Failed
            })
        ));
        assert_eq!(class.state(), Failed);
        assert_eq!(class.spurious_triggers(), 0);
    }
}
