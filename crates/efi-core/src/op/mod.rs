//! Long-running operation machinery
//!
//! A long-running operation is started by a few register writes (the
//! *trigger*) and finishes when the chip raises a completion or error
//! interrupt. Each operation class (flash, generic command) owns one of each:
//!
//! - [`StateTracker`] - `Idle -> Pending -> Done|Failed -> Idle`, advanced
//!   with a single compare-and-swap per transition
//! - [`ExclusiveGate`] - serializes whole operations of the class
//! - [`CompletionSignal`] - parks the initiating thread until the interrupt
//!   path has resolved the state
//!
//! [`OperationClass`] bundles the three and implements the initiate / await /
//! resolve protocol once, so the flash and generic-command classes only
//! supply their trigger writes.

mod executor;
mod gate;
mod signal;
mod state;

pub use executor::{Completion, OperationClass, Session};
pub use gate::{Cancelled, ExclusiveGate, GateGuard};
pub use signal::CompletionSignal;
pub use state::{OperationState, StateError, StateTracker, TransitionObserver};
