//! Register access trait
//!
//! Every backend (emulator, Linux I2C, ...) implements [`RegisterPort`]. The
//! core only ever passes bare register numbers from [`crate::regs`]; encoding
//! direction and set/clear bits into the bus command byte is the port's job.

use crate::error::IoError;
use std::sync::Arc;

/// Synchronous register access
///
/// All methods take `&self`: a port is shared between the operation classes
/// and the interrupt path, so implementations serialize bus transfers
/// internally. Each call is one bus transaction and may fail transiently.
///
/// ## Example: minimal in-memory port
///
/// ```ignore
/// struct Regs(Mutex<[u16; 64]>);
///
/// impl RegisterPort for Regs {
///     fn read(&self, reg: u8) -> Result<u16, IoError> {
///         Ok(self.0.lock().unwrap()[reg as usize])
///     }
///     fn write(&self, reg: u8, value: u16) -> Result<(), IoError> {
///         self.0.lock().unwrap()[reg as usize] = value;
///         Ok(())
///     }
/// }
/// ```
pub trait RegisterPort: Send + Sync {
    /// Read a 16-bit register
    fn read(&self, reg: u8) -> Result<u16, IoError>;

    /// Write a 16-bit register
    fn write(&self, reg: u8, value: u16) -> Result<(), IoError>;

    /// Set the bits of `mask` in a register
    ///
    /// The default implementation is a read-modify-write. Ports whose bus
    /// supports atomic set operations should override it.
    fn set_bits(&self, reg: u8, mask: u16) -> Result<(), IoError> {
        let value = self.read(reg)?;
        self.write(reg, value | mask)
    }

    /// Clear the bits of `mask` in a register
    ///
    /// See [`set_bits`](Self::set_bits) for the default behaviour.
    fn clear_bits(&self, reg: u8, mask: u16) -> Result<(), IoError> {
        let value = self.read(reg)?;
        self.write(reg, value & !mask)
    }
}

impl<T: RegisterPort + ?Sized> RegisterPort for Arc<T> {
    fn read(&self, reg: u8) -> Result<u16, IoError> {
        (**self).read(reg)
    }

    fn write(&self, reg: u8, value: u16) -> Result<(), IoError> {
        (**self).write(reg, value)
    }

    fn set_bits(&self, reg: u8, mask: u16) -> Result<(), IoError> {
        (**self).set_bits(reg, mask)
    }

    fn clear_bits(&self, reg: u8, mask: u16) -> Result<(), IoError> {
        (**self).clear_bits(reg, mask)
    }
}

impl<T: RegisterPort + ?Sized> RegisterPort for Box<T> {
    fn read(&self, reg: u8) -> Result<u16, IoError> {
        (**self).read(reg)
    }

    fn write(&self, reg: u8, value: u16) -> Result<(), IoError> {
        (**self).write(reg, value)
    }

    fn set_bits(&self, reg: u8, mask: u16) -> Result<(), IoError> {
        (**self).set_bits(reg, mask)
    }

    fn clear_bits(&self, reg: u8, mask: u16) -> Result<(), IoError> {
        (**self).clear_bits(reg, mask)
    }
}
