//! efi-linux - Linux backend for the EFI companion controller
//!
//! Register access goes through the i2c-dev character device (`/dev/i2c-N`)
//! as SMBus word transfers. The chip interrupt is either a GPIO line watched
//! through the GPIO character device, or, when no line is given, a polling
//! thread.
//!
//! # Usage with efictl
//!
//! ```bash
//! # Interrupt on GPIO 17 of gpiochip0
//! efictl -p linux_i2c:dev=/dev/i2c-1,addr=0x48,gpiochip=0,irq_line=17 info
//!
//! # No interrupt line: poll the status register every 2 ms
//! efictl -p linux_i2c:dev=/dev/i2c-1,poll_ms=2 mode get
//! ```
//!
//! # System Requirements
//!
//! - `i2c-dev` loaded and read/write access to `/dev/i2c-N`
//! - Access to `/dev/gpiochipN` for the interrupt line

pub mod error;
pub mod i2c;
pub mod irq_line;

pub use error::{LinuxError, Result};
pub use i2c::{I2cConfig, I2cPort};
pub use irq_line::{IrqLineConfig, IrqWatcher};

use efi_core::IrqDispatcher;
use std::sync::Arc;
use std::time::Duration;

/// Complete backend configuration parsed from programmer-style options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxI2cConfig {
    /// Bus and address
    pub i2c: I2cConfig,
    /// Interrupt line; `None` selects polling
    pub irq: Option<IrqLineConfig>,
    /// Polling interval when there is no interrupt line
    pub poll_interval: Duration,
}

impl LinuxI2cConfig {
    /// Start the interrupt watcher this configuration asks for
    pub fn start_watcher(&self, dispatcher: Arc<IrqDispatcher>) -> Result<IrqWatcher> {
        match &self.irq {
            Some(line) => IrqWatcher::gpio(line, dispatcher),
            None => IrqWatcher::polling(self.poll_interval, dispatcher),
        }
    }
}

fn parse_number<T>(key: &str, value: &str) -> std::result::Result<T, String>
where
    T: TryFrom<u64>,
{
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed
        .ok()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| format!("Invalid {} value: {}", key, value))
}

/// Parse backend options from a list of key-value pairs
///
/// - `dev=/dev/i2c-1` - Required: I2C adapter
/// - `addr=0x48` - Optional: slave address (default 0x48)
/// - `gpiochip=0` or `gpiochip=/dev/gpiochip0` - GPIO chip of the interrupt line
/// - `irq_line=17` - Interrupt line offset; without it the chip is polled
/// - `pullup=1` - Enable the internal pull-up on the interrupt line
/// - `poll_ms=5` - Polling interval when there is no interrupt line
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxI2cConfig, String> {
    let mut i2c = I2cConfig::default();
    let mut gpiochip: Option<String> = None;
    let mut line_offset: Option<u32> = None;
    let mut pull_up = false;
    let mut poll_interval = irq_line::DEFAULT_POLL_INTERVAL;

    for (key, value) in options {
        match *key {
            "dev" => {
                i2c.device = value.to_string();
            }
            "addr" => {
                i2c.address = parse_number(key, value)?;
                if i2c.address > 0x7F {
                    return Err(format!("Invalid addr: {} (must be 0x00-0x7f)", value));
                }
            }
            "gpiochip" => {
                gpiochip = Some(if value.starts_with('/') {
                    value.to_string()
                } else {
                    let n: u32 = parse_number(key, value)?;
                    format!("/dev/gpiochip{}", n)
                });
            }
            "irq_line" => {
                line_offset = Some(parse_number(key, value)?);
            }
            "pullup" => {
                pull_up = matches!(*value, "1" | "yes" | "on" | "true");
            }
            "poll_ms" => {
                let ms: u64 = parse_number(key, value)?;
                if ms == 0 {
                    return Err("poll_ms must be at least 1".to_string());
                }
                poll_interval = Duration::from_millis(ms);
            }
            _ => {
                log::warn!("linux_i2c: Unknown option: {}={}", key, value);
            }
        }
    }

    if i2c.device.is_empty() {
        return Err("No device specified. Use dev=/dev/i2c-N".to_string());
    }

    let irq = match (gpiochip, line_offset) {
        (Some(chip), Some(line)) => Some(IrqLineConfig {
            chip,
            line,
            pull_up,
        }),
        (None, Some(line)) => Some(IrqLineConfig {
            chip: "/dev/gpiochip0".to_string(),
            line,
            pull_up,
        }),
        (Some(_), None) => {
            return Err("gpiochip given without irq_line".to_string());
        }
        (None, None) => None,
    };

    Ok(LinuxI2cConfig {
        i2c,
        irq,
        poll_interval,
    })
}
