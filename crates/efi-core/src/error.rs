//! Error types for efi-core
//!
//! Register-level failures are [`IoError`]. Everything an operation class can
//! report to its caller is an [`OpError`].

use crate::op::StateError;
use thiserror::Error;

/// Failure of a single register access on the underlying bus
#[derive(Debug, Error)]
pub enum IoError {
    /// Register number has bits set outside the register-number field
    #[error("invalid register number {0:#04x}")]
    InvalidRegister(u8),

    /// Bus transfer failed
    #[error("transfer on register {reg:#04x} failed: {source}")]
    Transfer {
        /// Register being accessed
        reg: u8,
        /// Underlying transport error
        #[source]
        source: std::io::Error,
    },

    /// The device behind the port is gone
    #[error("device disconnected")]
    Disconnected,
}

impl IoError {
    /// Build a transfer error for `reg`
    pub fn transfer(reg: u8, source: std::io::Error) -> Self {
        Self::Transfer { reg, source }
    }
}

/// What a hardware-reported failure means for the operation that got it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Flash write or erase refused (e.g. write enable not set)
    FlashAccessDenied,
    /// Generic command reported an error
    CommandFailed,
    /// The chip rejected the request (e.g. mode switch)
    Rejected,
}

impl core::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FlashAccessDenied => write!(f, "flash access denied"),
            Self::CommandFailed => write!(f, "generic command failed"),
            Self::Rejected => write!(f, "operation rejected"),
        }
    }
}

/// Error returned by the caller-facing operations
#[derive(Debug, Error)]
pub enum OpError {
    /// Synchronous register access failed
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Gate acquisition aborted because the device is detaching
    #[error("operation cancelled")]
    Cancelled,

    /// The register writes that start the operation failed; nothing was started
    #[error("request failed: {source}")]
    RequestFailed {
        /// Failed trigger access
        #[source]
        source: IoError,
    },

    /// Hardware signalled failure
    #[error("{0}")]
    OperationFailed(FailureKind),

    /// Precondition on the current software mode not met
    #[error("operation not allowed in current mode")]
    BadMode,

    /// Argument outside the accepted range
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Flash read-back did not match what was written
    #[error("verify failed at {address:#06x}: expected {expected:#06x}, read {actual:#06x}")]
    VerifyFailed {
        /// Word address
        address: u16,
        /// Value written
        expected: u16,
        /// Value read back
        actual: u16,
    },

    /// Operation state machine saw a transition it must never see
    #[error("internal error: {0}")]
    Internal(StateError),
}

/// Error returned while attaching to a chip
#[derive(Debug, Error)]
pub enum AttachError {
    /// Register access failed during attach
    #[error("I/O error during attach: {0}")]
    Io(#[from] IoError),

    /// Identity register does not describe a supported chip
    #[error("unsupported {field}: {value}")]
    Unsupported {
        /// Which identity field did not match
        field: &'static str,
        /// Value read from the chip
        value: u16,
    },
}

/// Result type alias for operation-level calls
pub type Result<T> = core::result::Result<T, OpError>;
