//! Backend registration and dispatch
//!
//! A backend string is `name[:key=value,...]`. Each backend produces a
//! register port, the chip is attached over it, and whatever the backend
//! needs to deliver interrupts is kept alive next to the chip handle.

use efi_core::{AttachOptions, EfiChip};
use std::ops::Deref;

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// All backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "emulator")]
    backends.push(BackendInfo {
        name: "emulator",
        aliases: &["emu"],
        description: "In-memory EFI chip (config=<file.ron>,latency_ms=<n>,mode=<loader|firmware>)",
    });

    #[cfg(all(feature = "linux-i2c", target_os = "linux"))]
    backends.push(BackendInfo {
        name: "linux_i2c",
        aliases: &["linux-i2c", "i2c"],
        description: "Linux i2c-dev (dev=/dev/i2c-N,addr=<a>,gpiochip=<n>,irq_line=<n>,poll_ms=<n>)",
    });

    backends
}

/// Short list of backend names for CLI help
pub fn backend_names_short() -> String {
    let names: Vec<&str> = available_backends().iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Parsed backend string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendParams {
    /// Backend name
    pub name: String,
    /// Options in the order given
    pub options: Vec<(String, String)>,
}

impl BackendParams {
    /// Options as borrowed pairs, the shape backend crates take
    pub fn option_pairs(&self) -> Vec<(&str, &str)> {
        self.options
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Parse a `name[:key=value,...]` backend string
pub fn parse_backend_params(s: &str) -> Result<BackendParams, Box<dyn std::error::Error>> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));
    if name.is_empty() {
        return Err("Empty backend name".into());
    }

    let mut options = Vec::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                options.push((key.to_string(), value.to_string()));
            } else {
                return Err(
                    format!("Invalid parameter format: '{}' (expected key=value)", opt).into(),
                );
            }
        }
    }

    Ok(BackendParams {
        name: name.to_string(),
        options,
    })
}

/// Resources a backend keeps alive while the chip is attached
enum Keepalive {
    #[cfg(feature = "emulator")]
    Emulator(#[allow(dead_code)] std::sync::Arc<efi_emulator::EfiEmulator>),
    #[cfg(all(feature = "linux-i2c", target_os = "linux"))]
    LinuxI2c(#[allow(dead_code)] efi_linux::IrqWatcher),
}

/// Attached chip plus its backend resources
///
/// The chip is declared first so it detaches before the interrupt source
/// goes away.
pub struct ChipHandle {
    chip: EfiChip,
    _keepalive: Keepalive,
}

impl Deref for ChipHandle {
    type Target = EfiChip;

    fn deref(&self) -> &EfiChip {
        &self.chip
    }
}

/// Open a backend and attach the chip behind it
pub fn open_chip(
    backend: &str,
    options: AttachOptions,
) -> Result<ChipHandle, Box<dyn std::error::Error>> {
    let params = parse_backend_params(backend)?;

    match params.name.as_str() {
        #[cfg(feature = "emulator")]
        "emulator" | "emu" => open_emulator(&params, options),

        #[cfg(all(feature = "linux-i2c", target_os = "linux"))]
        "linux_i2c" | "linux-i2c" | "i2c" => open_linux_i2c(&params, options),

        _ => {
            let _ = options;
            Err(format!("Unknown backend: {}", params.name).into())
        }
    }
}

#[cfg(feature = "emulator")]
fn open_emulator(
    params: &BackendParams,
    options: AttachOptions,
) -> Result<ChipHandle, Box<dyn std::error::Error>> {
    use efi_emulator::{EfiEmulator, EmulatorConfig, Mode};
    use std::path::Path;
    use std::sync::Arc;

    let mut config = EmulatorConfig::default();
    let mut latency_ms = None;
    let mut mode = None;
    for (key, value) in params.option_pairs() {
        match key {
            "config" => config = EmulatorConfig::load_file(Path::new(value))?,
            "latency_ms" => {
                latency_ms = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid latency_ms value: {}", value))?,
                )
            }
            "mode" => {
                mode = Some(match value {
                    "loader" => Mode::Loader,
                    "firmware" => Mode::Firmware,
                    _ => return Err(format!("Invalid mode value: {}", value).into()),
                })
            }
            _ => log::warn!("emulator: Unknown option: {}={}", key, value),
        }
    }
    // Explicit options win over the config file regardless of order
    if let Some(ms) = latency_ms {
        config.latency_ms = ms;
    }
    if let Some(mode) = mode {
        config.mode = mode;
    }

    let emulator = Arc::new(EfiEmulator::new(config)?);
    let chip = EfiChip::attach(emulator.clone(), options)?;
    emulator.connect(&chip.irq());
    Ok(ChipHandle {
        chip,
        _keepalive: Keepalive::Emulator(emulator),
    })
}

#[cfg(all(feature = "linux-i2c", target_os = "linux"))]
fn open_linux_i2c(
    params: &BackendParams,
    options: AttachOptions,
) -> Result<ChipHandle, Box<dyn std::error::Error>> {
    use std::sync::Arc;

    let config = efi_linux::parse_options(&params.option_pairs())?;
    let port = Arc::new(efi_linux::I2cPort::open(&config.i2c)?);
    let chip = EfiChip::attach(port, options)?;
    let watcher = config.start_watcher(chip.irq())?;
    Ok(ChipHandle {
        chip,
        _keepalive: Keepalive::LinuxI2c(watcher),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_params() {
        let params = parse_backend_params("linux_i2c:dev=/dev/i2c-1,addr=0x48").unwrap();
        assert_eq!(params.name, "linux_i2c");
        assert_eq!(
            params.option_pairs(),
            vec![("dev", "/dev/i2c-1"), ("addr", "0x48")]
        );

        let params = parse_backend_params("emulator").unwrap();
        assert!(params.options.is_empty());

        assert!(parse_backend_params("emulator:latency_ms").is_err());
        assert!(parse_backend_params(":dev=x").is_err());
    }

    #[test]
    fn test_unknown_backend() {
        assert!(open_chip("nonexistent", AttachOptions::default()).is_err());
    }

    #[cfg(feature = "emulator")]
    #[test]
    fn test_open_emulator() {
        let chip = open_chip("emulator:mode=loader", AttachOptions::default()).unwrap();
        assert_eq!(
            chip.flash().get_mode().unwrap(),
            efi_core::SoftwareMode::Loader
        );
        assert!(chip.flash().check_checksum(efi_core::Partition::Firmware).unwrap());
    }
}
