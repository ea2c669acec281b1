//! Emulator configuration
//!
//! Everything has a default; a RON file only needs the fields it changes:
//!
//! ```ron
//! (
//!     mode: Loader,
//!     firmware_version: (release: 3, version: 1, subversion: 0),
//!     latency_ms: 2,
//! )
//! ```

use crate::error::EmulatorError;
use efi_core::info::{ModuleId, VersionInfo};
use efi_core::regs::{IFLASH_WORD_COUNT, PCBA_REVISION_SHIFT, PCBA_VARIANT_SHIFT};
use efi_core::SoftwareMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Software mode as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Boot loader
    Loader,
    /// Application firmware
    Firmware,
}

impl From<Mode> for SoftwareMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Loader => SoftwareMode::Loader,
            Mode::Firmware => SoftwareMode::Firmware,
        }
    }
}

/// Three-part version number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Release number (0-15)
    pub release: u16,
    /// Version number (0-63)
    pub version: u16,
    /// Subversion number (0-63)
    pub subversion: u16,
}

impl Version {
    /// Register encoding
    pub fn to_raw(self) -> u16 {
        VersionInfo {
            release: self.release,
            version: self.version,
            subversion: self.subversion,
        }
        .to_raw()
    }
}

/// A word range of the main flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// First word address
    pub start: u16,
    /// Length in words
    pub words: u32,
}

impl Region {
    /// One past the last word address
    pub fn end(&self) -> u32 {
        self.start as u32 + self.words
    }

    /// Whether `address` lies inside the region
    pub fn contains(&self, address: u16) -> bool {
        (self.start as u32..self.end()).contains(&(address as u32))
    }

    fn overlaps(&self, other: &Region) -> bool {
        (self.start as u32) < other.end() && (other.start as u32) < self.end()
    }
}

/// Emulated chip description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Platform code reported in `MOD_ID`
    pub platform: u16,
    /// Project code reported in `MOD_ID`
    pub project: u16,
    /// Processor code reported in `MOD_ID`
    pub processor: u16,
    /// Software mode at power-up
    pub mode: Mode,
    /// Firmware version
    pub firmware_version: Version,
    /// Loader version
    pub loader_version: Version,
    /// PCB assembly variant
    pub hw_variant: u16,
    /// PCB assembly revision
    pub hw_revision: u16,
    /// Main flash size in words
    pub flash_words: u32,
    /// Erase segment size in words (power of two)
    pub segment_words: u16,
    /// Loader partition
    pub loader: Region,
    /// Firmware partition
    pub firmware: Region,
    /// Fill both partitions with a checksum-valid image at power-up
    pub valid_images: bool,
    /// Information flash content (missing words read as 0xFFFF)
    pub iflash: Vec<u16>,
    /// Time the firmware takes for each long-running operation
    pub latency_ms: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        let id = ModuleId::SUPPORTED;
        Self {
            platform: id.platform,
            project: id.project,
            processor: id.processor,
            mode: Mode::Firmware,
            firmware_version: Version {
                release: 2,
                version: 4,
                subversion: 1,
            },
            loader_version: Version {
                release: 1,
                version: 2,
                subversion: 0,
            },
            hw_variant: 1,
            hw_revision: 3,
            flash_words: 0x8000,
            segment_words: 0x100,
            loader: Region {
                start: 0x0000,
                words: 0x2000,
            },
            firmware: Region {
                start: 0x2000,
                words: 0x6000,
            },
            valid_images: true,
            iflash: Vec::new(),
            latency_ms: 0,
        }
    }
}

impl EmulatorConfig {
    /// Parse a RON description
    pub fn from_ron(content: &str) -> Result<Self, EmulatorError> {
        let config: Self = ron::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a RON file
    pub fn load_file(path: &Path) -> Result<Self, EmulatorError> {
        let content = fs::read_to_string(path)?;
        log::debug!("Loading emulator config from {}", path.display());
        Self::from_ron(&content)
    }

    /// `MOD_ID` value for the configured identity in `mode`
    pub fn mod_id(&self, mode: SoftwareMode) -> u16 {
        ModuleId {
            platform: self.platform,
            project: self.project,
            processor: self.processor,
            mode: mode.mod_id_field(),
        }
        .to_raw()
    }

    /// `MOD_HW` value
    pub fn mod_hw(&self) -> u16 {
        ((self.hw_variant & 0xFF) << PCBA_VARIANT_SHIFT)
            | ((self.hw_revision & 0xFF) << PCBA_REVISION_SHIFT)
    }

    /// Partition a software mode runs from
    pub fn partition(&self, mode: SoftwareMode) -> Region {
        match mode {
            SoftwareMode::Loader => self.loader,
            SoftwareMode::Firmware => self.firmware,
        }
    }

    /// Check sizes and layout
    pub fn validate(&self) -> Result<(), EmulatorError> {
        let invalid = |msg: String| -> Result<(), EmulatorError> { Err(EmulatorError::Invalid(msg)) };

        if self.flash_words == 0 || self.flash_words > 0x1_0000 {
            return invalid(format!("flash_words {} out of range", self.flash_words));
        }
        if !self.segment_words.is_power_of_two() {
            return invalid(format!(
                "segment_words {} is not a power of two",
                self.segment_words
            ));
        }
        if self.flash_words % self.segment_words as u32 != 0 {
            return invalid("flash_words must be a multiple of segment_words".into());
        }
        for (name, region) in [("loader", &self.loader), ("firmware", &self.firmware)] {
            if region.words == 0 || region.end() > self.flash_words {
                return invalid(format!("{} partition outside flash", name));
            }
        }
        if self.loader.overlaps(&self.firmware) {
            return invalid("loader and firmware partitions overlap".into());
        }
        if self.iflash.len() > IFLASH_WORD_COUNT as usize {
            return invalid(format!(
                "iflash has {} words, at most {} allowed",
                self.iflash.len(),
                IFLASH_WORD_COUNT
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        EmulatorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_ron() {
        let config = EmulatorConfig::from_ron(
            "(mode: Loader, latency_ms: 3, firmware_version: (release: 3, version: 1, subversion: 0))",
        )
        .unwrap();
        assert_eq!(config.mode, Mode::Loader);
        assert_eq!(config.latency_ms, 3);
        assert_eq!(config.firmware_version.release, 3);
        assert_eq!(config.segment_words, 0x100);
    }

    #[test]
    fn test_bundled_config() {
        let config = EmulatorConfig::from_ron(include_str!("../configs/loader-update.ron")).unwrap();
        assert_eq!(config.mode, Mode::Firmware);
        assert!(!config.valid_images);
        assert_eq!(config.iflash.len(), 4);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            EmulatorConfig::from_ron("(mode: Bogus)"),
            Err(EmulatorError::Parse(_))
        ));
    }

    #[test]
    fn test_overlap_rejected() {
        let config = EmulatorConfig {
            firmware: Region {
                start: 0x1000,
                words: 0x2000,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EmulatorError::Invalid(_))));
    }

    #[test]
    fn test_mod_id() {
        let config = EmulatorConfig::default();
        let id = ModuleId::from_raw(config.mod_id(SoftwareMode::Loader));
        assert_eq!(SoftwareMode::from_mod_id(id.to_raw()), SoftwareMode::Loader);
        assert_eq!(id.project, config.project);
    }
}
