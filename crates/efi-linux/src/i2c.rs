//! SMBus register port
//!
//! Each register access is a single SMBus word transfer on `/dev/i2c-N`. The
//! command byte carries the register number plus the direction and set/clear
//! bits, so set/clear are single transactions instead of read-modify-write.

use crate::error::{LinuxError, Result};

use efi_core::regs::{command_byte, is_valid_register, Access};
use efi_core::{IoError, RegisterPort};

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;

/// Default 7-bit slave address of the EFI chip
pub const DEFAULT_ADDRESS: u16 = 0x48;

/// Linux i2c-dev ioctl definitions
mod ioctl {
    use nix::{ioctl_write_int_bad, ioctl_write_ptr_bad};

    const I2C_SLAVE: u16 = 0x0703;
    const I2C_SMBUS: u16 = 0x0720;

    pub const I2C_SMBUS_READ: u8 = 1;
    pub const I2C_SMBUS_WRITE: u8 = 0;
    pub const I2C_SMBUS_WORD_DATA: u32 = 3;

    /// Must match the kernel's `union i2c_smbus_data`
    #[repr(C)]
    #[allow(dead_code)]
    pub union I2cSmbusData {
        pub byte: u8,
        pub word: u16,
        pub block: [u8; 34],
    }

    /// Must match the kernel's `struct i2c_smbus_ioctl_data`
    #[repr(C)]
    pub struct I2cSmbusIoctlData {
        pub read_write: u8,
        pub command: u8,
        pub size: u32,
        pub data: *mut I2cSmbusData,
    }

    ioctl_write_int_bad!(i2c_slave, I2C_SLAVE);
    ioctl_write_ptr_bad!(i2c_smbus, I2C_SMBUS, I2cSmbusIoctlData);
}

/// I2C adapter and slave address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cConfig {
    /// Adapter device path (e.g. "/dev/i2c-1")
    pub device: String,
    /// 7-bit slave address
    pub address: u16,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            address: DEFAULT_ADDRESS,
        }
    }
}

impl I2cConfig {
    /// Create a configuration for `device` at the default address
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the slave address
    pub fn with_address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }
}

/// Register port over Linux i2c-dev
///
/// No locking: every access is one `I2C_SMBUS` ioctl and the kernel holds the
/// adapter lock for its duration.
pub struct I2cPort {
    file: File,
    device: String,
    address: u16,
}

impl I2cPort {
    /// Open the adapter and bind it to the slave address
    pub fn open(config: &I2cConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxError::InvalidParameter(
                "No device specified. Use dev=/dev/i2c-N".into(),
            ));
        }
        if config.address > 0x7F {
            return Err(LinuxError::InvalidParameter(format!(
                "I2C address {:#x} is not a 7-bit address",
                config.address
            )));
        }

        log::debug!("linux_i2c: Opening device {}", config.device);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|e| LinuxError::OpenFailed {
                path: config.device.clone(),
                source: e,
            })?;

        unsafe {
            ioctl::i2c_slave(file.as_raw_fd(), config.address as libc::c_int).map_err(|e| {
                LinuxError::SetAddressFailed {
                    addr: config.address,
                    source: io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        log::info!(
            "linux_i2c: Opened {} (addr={:#04x})",
            config.device,
            config.address
        );
        Ok(Self {
            file,
            device: config.device.clone(),
            address: config.address,
        })
    }

    /// Adapter device path
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Slave address
    pub fn address(&self) -> u16 {
        self.address
    }

    fn smbus_word(&self, read_write: u8, command: u8, data: &mut ioctl::I2cSmbusData) -> io::Result<()> {
        let args = ioctl::I2cSmbusIoctlData {
            read_write,
            command,
            size: ioctl::I2C_SMBUS_WORD_DATA,
            data,
        };
        unsafe { ioctl::i2c_smbus(self.file.as_raw_fd(), &args) }
            .map(drop)
            .map_err(|e| io::Error::from_raw_os_error(e as i32))
    }

    fn write_word(&self, reg: u8, access: Access, value: u16) -> std::result::Result<(), IoError> {
        check_register(reg)?;
        let mut data = ioctl::I2cSmbusData { word: value };
        let rc = self.smbus_word(ioctl::I2C_SMBUS_WRITE, command_byte(reg, access), &mut data);
        log::trace!(
            "linux_i2c: {:?} reg={:#04x} val={:#06x} ok={}",
            access,
            reg,
            value,
            rc.is_ok()
        );
        rc.map_err(|e| transfer_error(reg, e))
    }
}

fn check_register(reg: u8) -> std::result::Result<(), IoError> {
    if is_valid_register(reg) {
        Ok(())
    } else {
        Err(IoError::InvalidRegister(reg))
    }
}

fn transfer_error(reg: u8, e: io::Error) -> IoError {
    // Adapter removed underneath us
    if e.raw_os_error() == Some(libc::ENODEV) {
        IoError::Disconnected
    } else {
        IoError::transfer(reg, e)
    }
}

impl RegisterPort for I2cPort {
    fn read(&self, reg: u8) -> std::result::Result<u16, IoError> {
        check_register(reg)?;
        let mut data = ioctl::I2cSmbusData { word: 0 };
        self.smbus_word(
            ioctl::I2C_SMBUS_READ,
            command_byte(reg, Access::Read),
            &mut data,
        )
        .map_err(|e| transfer_error(reg, e))?;
        // SAFETY: word transfers fill the `word` member
        let value = unsafe { data.word };
        log::trace!("linux_i2c: Read reg={:#04x} val={:#06x}", reg, value);
        Ok(value)
    }

    fn write(&self, reg: u8, value: u16) -> std::result::Result<(), IoError> {
        self.write_word(reg, Access::Write, value)
    }

    fn set_bits(&self, reg: u8, mask: u16) -> std::result::Result<(), IoError> {
        self.write_word(reg, Access::SetBits, mask)
    }

    fn clear_bits(&self, reg: u8, mask: u16) -> std::result::Result<(), IoError> {
        self.write_word(reg, Access::ClearBits, mask)
    }
}

impl core::fmt::Debug for I2cPort {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("I2cPort")
            .field("device", &self.device)
            .field("address", &format_args!("{:#04x}", self.address))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_device() {
        assert!(matches!(
            I2cPort::open(&I2cConfig::default()),
            Err(LinuxError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_open_rejects_ten_bit_address() {
        let config = I2cConfig::new("/dev/i2c-1").with_address(0x148);
        assert!(matches!(
            I2cPort::open(&config),
            Err(LinuxError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_open_missing_adapter() {
        let config = I2cConfig::new("/nonexistent/i2c-99");
        assert!(matches!(
            I2cPort::open(&config),
            Err(LinuxError::OpenFailed { .. })
        ));
    }

    #[test]
    fn test_transfer_error_mapping() {
        assert!(matches!(
            transfer_error(0x05, io::Error::from_raw_os_error(libc::ENODEV)),
            IoError::Disconnected
        ));
        assert!(matches!(
            transfer_error(0x05, io::Error::from_raw_os_error(libc::EIO)),
            IoError::Transfer { reg: 0x05, .. }
        ));
    }

    /// Needs a chip on the bus: EFI_I2C_DEV=/dev/i2c-1 cargo test -- --ignored
    #[test]
    #[ignore]
    fn test_read_mod_id_on_hardware() {
        let device = std::env::var("EFI_I2C_DEV").unwrap_or_else(|_| "/dev/i2c-1".into());
        let port = I2cPort::open(&I2cConfig::new(device)).unwrap();
        let id = efi_core::ModuleId::from_raw(port.read(efi_core::regs::MOD_ID).unwrap());
        assert_eq!(id.platform, efi_core::ModuleId::SUPPORTED.platform);
    }
}
