//! Error types for the Linux backend

use thiserror::Error;

/// Linux backend errors
#[derive(Debug, Error)]
pub enum LinuxError {
    /// Failed to open the I2C adapter
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to select the slave address
    #[error("Failed to set I2C slave address {addr:#04x}: {source}")]
    SetAddressFailed {
        addr: u16,
        #[source]
        source: std::io::Error,
    },

    /// Failed to request the interrupt line
    #[error("Failed to request GPIO line {line} on {chip}: {source}")]
    LineRequestFailed {
        chip: String,
        line: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Failed to start the interrupt watcher thread
    #[error("Failed to spawn interrupt watcher: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for Linux backend operations
pub type Result<T> = std::result::Result<T, LinuxError>;
