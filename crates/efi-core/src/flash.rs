//! Flash operation class
//!
//! Checksum check, word write, segment erase and software mode switch are
//! long-running on the chip and go through the class executor. Reads of the
//! main and information flash, write enable and mode query are plain register
//! accesses but still take the class gate, because they share the flash
//! controller's address and data registers with the long-running operations.

use crate::error::{FailureKind, OpError, Result};
use crate::op::{Completion, OperationClass};
use crate::port::RegisterPort;
use crate::regs::*;
use std::sync::Arc;

/// Software the chip is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftwareMode {
    /// Boot loader
    Loader,
    /// Application firmware
    Firmware,
}

impl SoftwareMode {
    /// Decode the mode field of a raw `MOD_ID` value
    ///
    /// Anything other than the loader code counts as firmware.
    pub fn from_mod_id(raw: u16) -> Self {
        if (raw >> MODID_MODE_SHIFT) & MODID_MODE_MASK == MODID_MODE_LOADER {
            Self::Loader
        } else {
            Self::Firmware
        }
    }

    /// Value of the `MOD_ID` mode field for this mode
    pub fn mod_id_field(self) -> u16 {
        match self {
            Self::Loader => MODID_MODE_LOADER,
            Self::Firmware => MODID_MODE_FIRMWARE,
        }
    }
}

impl core::fmt::Display for SoftwareMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Loader => f.write_str("loader"),
            Self::Firmware => f.write_str("firmware"),
        }
    }
}

/// Flash partition holding one of the software images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Loader image
    Loader,
    /// Firmware image
    Firmware,
}

impl Partition {
    /// The software mode that runs from this partition
    pub fn mode(self) -> SoftwareMode {
        match self {
            Self::Loader => SoftwareMode::Loader,
            Self::Firmware => SoftwareMode::Firmware,
        }
    }

    fn check_bit(self) -> FlashCtrl {
        match self {
            Self::Loader => FlashCtrl::LDRCHK,
            Self::Firmware => FlashCtrl::FWCHK,
        }
    }
}

impl core::fmt::Display for Partition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.mode().fmt(f)
    }
}

/// Step reported by [`FlashOps::program_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramPhase {
    /// Erasing segments
    Erase,
    /// Writing words
    Write,
    /// Reading back and comparing
    Verify,
}

/// Flash operations of one chip
#[derive(Clone)]
pub struct FlashOps {
    port: Arc<dyn RegisterPort>,
    class: Arc<OperationClass>,
}

impl FlashOps {
    /// Create the flash class on top of `port`
    pub fn new(port: Arc<dyn RegisterPort>) -> Self {
        Self::with_class(port, Arc::new(OperationClass::new("flash")))
    }

    /// Create the flash class using an existing operation class
    pub fn with_class(port: Arc<dyn RegisterPort>, class: Arc<OperationClass>) -> Self {
        Self { port, class }
    }

    /// The underlying operation class (interrupt entry points live here)
    pub fn class(&self) -> &Arc<OperationClass> {
        &self.class
    }

    fn read_mode(&self) -> Result<SoftwareMode> {
        Ok(SoftwareMode::from_mod_id(self.port.read(MOD_ID)?))
    }

    /// Check the checksum of a partition
    ///
    /// Only the partition that is not currently running can be checked;
    /// asking for the active one fails with [`OpError::BadMode`] before
    /// anything is written. Returns whether the checksum is valid.
    pub fn check_checksum(&self, partition: Partition) -> Result<bool> {
        log::debug!("Checking {} partition checksum", partition);
        let mut session = self.class.acquire()?;

        let mode = self.read_mode()?;
        if mode == partition.mode() {
            log::warn!("Cannot check partition used by current mode ({})", mode);
            return Err(OpError::BadMode);
        }

        let bit = partition.check_bit().bits();
        let completion = session.run(|| self.port.set_bits(FLASH_CTRL, bit))?;
        let valid = completion == Completion::Done;
        log::info!(
            "{} partition checksum {}",
            partition,
            if valid { "valid" } else { "invalid" }
        );
        Ok(valid)
    }

    /// Program one flash word
    ///
    /// Fails with [`FailureKind::FlashAccessDenied`] if the chip refuses,
    /// e.g. because write enable is off.
    pub fn write(&self, address: u16, value: u16) -> Result<()> {
        log::trace!("Flash write {:#06x} = {:#06x}", address, value);
        self.class.execute(
            || {
                self.port.write(FLASH_ADDR, address)?;
                self.port.write(FLASH_DATA, value)
            },
            FailureKind::FlashAccessDenied,
        )
    }

    /// Erase the segment containing `segment`
    pub fn erase(&self, segment: u16) -> Result<()> {
        log::debug!("Flash erase segment {:#06x}", segment);
        self.class.execute(
            || {
                self.port.write(FLASH_ADDR, segment)?;
                self.port.set_bits(FLASH_CTRL, FlashCtrl::ESEC.bits())
            },
            FailureKind::FlashAccessDenied,
        )
    }

    /// Set or clear the flash write enable bit
    pub fn set_write_enable(&self, enable: bool) -> Result<()> {
        let _session = self.class.acquire()?;
        let bit = FlashCtrl::WREN.bits();
        if enable {
            self.port.set_bits(FLASH_CTRL, bit)?;
        } else {
            self.port.clear_bits(FLASH_CTRL, bit)?;
        }
        log::debug!("Flash write {}", if enable { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Read one flash word
    pub fn read(&self, address: u16) -> Result<u16> {
        let _session = self.class.acquire()?;
        self.port.write(FLASH_ADDR, address)?;
        Ok(self.port.read(FLASH_DATA)?)
    }

    /// Read one word of the information flash (`index` < 64)
    pub fn iflash_read(&self, index: u16) -> Result<u16> {
        if index >= IFLASH_WORD_COUNT {
            log::warn!("Invalid information flash index {}", index);
            return Err(OpError::InvalidArgument("information flash index out of range"));
        }
        let _session = self.class.acquire()?;
        self.port.write(IFLASH_ADDR, index)?;
        Ok(self.port.read(IFLASH_DATA)?)
    }

    /// Software mode the chip is running
    pub fn get_mode(&self) -> Result<SoftwareMode> {
        let _session = self.class.acquire()?;
        self.read_mode()
    }

    /// Switch to `mode`
    ///
    /// Returns immediately if the chip already runs `mode`. A refused switch
    /// (e.g. target image checksum invalid) is [`FailureKind::Rejected`].
    pub fn set_mode(&self, mode: SoftwareMode) -> Result<()> {
        let mut session = self.class.acquire()?;
        let current = self.read_mode()?;
        if current == mode {
            log::debug!("Already in {} mode", mode);
            return Ok(());
        }

        log::info!("Switching from {} to {} mode", current, mode);
        match session.run(|| self.port.set_bits(FLASH_CTRL, FlashCtrl::SWITCH.bits()))? {
            Completion::Done => Ok(()),
            Completion::Failed => Err(OpError::OperationFailed(FailureKind::Rejected)),
        }
    }

    /// Erase, program and verify `words` starting at word address `base`
    ///
    /// Every segment of `segment_words` words touched by the image is erased
    /// first. Write enable is set for the duration and cleared afterwards,
    /// also on failure. `progress` is called with the phase, the number of
    /// steps done and the total for that phase.
    pub fn program_image<F>(
        &self,
        base: u16,
        words: &[u16],
        segment_words: u16,
        mut progress: F,
    ) -> Result<()>
    where
        F: FnMut(ProgramPhase, usize, usize),
    {
        if segment_words == 0 {
            return Err(OpError::InvalidArgument("segment size must be non-zero"));
        }
        if words.is_empty() {
            return Ok(());
        }
        let end = base as usize + words.len();
        if end > u16::MAX as usize + 1 {
            return Err(OpError::InvalidArgument("image does not fit the address space"));
        }

        self.set_write_enable(true)?;
        let result = self.program_enabled(base, words, segment_words, &mut progress);
        let disable = self.set_write_enable(false);
        result.and(disable)
    }

    fn program_enabled<F>(
        &self,
        base: u16,
        words: &[u16],
        segment_words: u16,
        progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(ProgramPhase, usize, usize),
    {
        let seg = segment_words as usize;
        let first = base as usize / seg * seg;
        let last = base as usize + words.len() - 1;
        let segments: Vec<u16> = (first..=last).step_by(seg).map(|a| a as u16).collect();

        log::info!(
            "Programming {} words at {:#06x} ({} segments)",
            words.len(),
            base,
            segments.len()
        );

        for (i, &segment) in segments.iter().enumerate() {
            self.erase(segment)?;
            progress(ProgramPhase::Erase, i + 1, segments.len());
        }

        for (i, &value) in words.iter().enumerate() {
            self.write(base + i as u16, value)?;
            progress(ProgramPhase::Write, i + 1, words.len());
        }

        for (i, &expected) in words.iter().enumerate() {
            let address = base + i as u16;
            let actual = self.read(address)?;
            if actual != expected {
                log::error!(
                    "Verify failed at {:#06x}: expected {:#06x}, got {:#06x}",
                    address,
                    expected,
                    actual
                );
                return Err(OpError::VerifyFailed {
                    address,
                    expected,
                    actual,
                });
            }
            progress(ProgramPhase::Verify, i + 1, words.len());
        }
        Ok(())
    }
}

impl core::fmt::Debug for FlashOps {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlashOps").field("class", &self.class).finish()
    }
}
