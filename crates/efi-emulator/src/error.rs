//! Error types for the emulator

use thiserror::Error;

/// Emulator setup errors
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// Reading a configuration file or spawning the firmware thread failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is not valid RON
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Configuration parsed but describes an impossible chip
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for emulator setup
pub type Result<T> = std::result::Result<T, EmulatorError>;
