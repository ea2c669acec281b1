//! Exclusive operation gate

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Gate acquisition aborted because the gate was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("gate closed")]
pub struct Cancelled;

#[derive(Debug, Default)]
struct GateState {
    held: bool,
    closed: bool,
}

/// Mutual exclusion for one operation class
///
/// Unlike a plain mutex, a blocked [`acquire`](Self::acquire) can be aborted
/// by [`close`](Self::close), which is what device detach relies on.
#[derive(Debug, Default)]
pub struct ExclusiveGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl ExclusiveGate {
    /// Create an open, free gate
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the gate is free and take it
    pub fn acquire(&self) -> Result<GateGuard<'_>, Cancelled> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(Cancelled);
            }
            if !state.held {
                state.held = true;
                return Ok(GateGuard { gate: self });
            }
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take the gate if it is free right now
    pub fn try_acquire(&self) -> Result<Option<GateGuard<'_>>, Cancelled> {
        let mut state = self.lock();
        if state.closed {
            return Err(Cancelled);
        }
        if state.held {
            return Ok(None);
        }
        state.held = true;
        Ok(Some(GateGuard { gate: self }))
    }

    /// Fail every blocked and future acquisition with [`Cancelled`]
    ///
    /// A guard that is already held stays valid until dropped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.cond.notify_all();
    }

    /// Block until the current holder, if any, releases the gate
    ///
    /// Meant to follow [`close`](Self::close); on an open gate a new holder
    /// may take over before this returns.
    pub fn drain(&self) {
        let mut state = self.lock();
        while state.held {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn release(&self) {
        self.lock().held = false;
        // A drainer may be parked next to blocked acquirers
        self.cond.notify_all();
    }
}

/// Proof of holding an [`ExclusiveGate`]; releases it on drop
#[derive(Debug)]
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gate: &'a ExclusiveGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
