//! efi-core - Core library for the EFI companion controller
//!
//! The EFI chip is a small controller sitting on a register-oriented bus
//! (SMBus word transfers on real hardware). Plain register reads and writes
//! are synchronous, but a handful of operations (flash checksum check, flash
//! write, segment erase, software mode switch and generic command execution)
//! run on the chip for a while and report completion through an interrupt.
//!
//! This crate provides:
//!
//! - [`RegisterPort`] - the register access capability a backend implements
//! - [`op`] - the operation state machine, gate, completion signal and the
//!   generic executor shared by every long-running operation class
//! - [`FlashOps`] and [`GenericCommand`] - the two operation classes
//! - [`IrqDispatcher`] - decodes the chip's interrupt status registers and
//!   routes events to the operation classes
//! - [`EfiChip`] - the device handle tying all of the above together
//!
//! # Example
//!
//! ```ignore
//! use efi_core::{AttachOptions, EfiChip, Partition};
//!
//! let chip = EfiChip::attach(port, AttachOptions::default())?;
//! // the interrupt source calls chip.irq().handle() on every falling edge
//!
//! chip.flash().set_write_enable(true)?;
//! chip.flash().erase(0x0400)?;
//! chip.flash().write(0x0400, 0x1234)?;
//! let ok = chip.flash().check_checksum(Partition::Loader)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod chip;
pub mod error;
pub mod flash;
pub mod gencmd;
pub mod info;
pub mod irq;
pub mod op;
pub mod port;
pub mod regs;

#[cfg(test)]
mod testing;

pub use chip::{AttachOptions, ChipInfo, EfiChip};
pub use error::{AttachError, FailureKind, IoError, OpError, Result};
pub use flash::{FlashOps, Partition, ProgramPhase, SoftwareMode};
pub use gencmd::GenericCommand;
pub use info::{HardwareInfo, ModuleId, VersionInfo};
pub use irq::{IrqDispatcher, IrqEvent, IrqHandler};
pub use op::{Completion, OperationClass, OperationState};
pub use port::RegisterPort;
