//! EFI chip register definitions
//!
//! Register numbers occupy the low six bits of the SMBus command byte. The two
//! high bits select direction and, for writes, whether the value is a plain
//! store or a set/clear mask. Those two bits belong to the port
//! implementation: code above the [`RegisterPort`](crate::RegisterPort) only
//! ever passes bare register numbers.

use bitflags::bitflags;

// ============================================================================
// Command byte encoding
// ============================================================================

/// Bits of the command byte that carry the register number
pub const REGNO_MASK: u8 = 0x3F;
/// Direction bit: read
pub const RW_READ: u8 = 0x80;
/// Direction bit: write
pub const RW_WRITE: u8 = 0x00;
/// Set/clear bit: value is a mask of bits to set
pub const SC_SET: u8 = 0x40;
/// Set/clear bit: value is a mask of bits to clear (also used for plain access)
pub const SC_CLEAR: u8 = 0x00;

/// Returns true if `reg` only has bits inside [`REGNO_MASK`]
pub const fn is_valid_register(reg: u8) -> bool {
    reg & !REGNO_MASK == 0
}

/// Access kind encoded in the command byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read the register
    Read,
    /// Store a value
    Write,
    /// Set the bits of a mask
    SetBits,
    /// Clear the bits of a mask
    ClearBits,
}

/// Build the command byte for an access to `reg`
///
/// Only port implementations need this. `reg` must be valid
/// (see [`is_valid_register`]); extra bits are masked off.
pub const fn command_byte(reg: u8, access: Access) -> u8 {
    let reg = reg & REGNO_MASK;
    match access {
        Access::Read => reg | RW_READ,
        // No set/clear bit: same encoding as a clear
        Access::Write => reg | RW_WRITE,
        Access::SetBits => reg | RW_WRITE | SC_SET,
        Access::ClearBits => reg | RW_WRITE | SC_CLEAR,
    }
}

// ============================================================================
// Module registers
// ============================================================================

/// Module identification (platform, project, processor, software mode)
pub const MOD_ID: u8 = 0x00;
/// Firmware version
pub const MOD_FWV: u8 = 0x01;
/// Loader version
pub const MOD_LDRV: u8 = 0x02;
/// Hardware (PCB) information
pub const MOD_HW: u8 = 0x03;
/// Interrupt enable mask
pub const MOD_IE: u8 = 0x04;
/// Interrupt flags (read to clear)
pub const MOD_IFG: u8 = 0x05;
/// Error flags (read to clear)
pub const MOD_ERR: u8 = 0x06;

// ============================================================================
// Flash controller registers
// ============================================================================

/// Flash control register (see [`FlashCtrl`])
pub const FLASH_CTRL: u8 = 0x08;
/// Flash word address
pub const FLASH_ADDR: u8 = 0x09;
/// Flash data; writing starts a word program cycle
pub const FLASH_DATA: u8 = 0x0A;
/// Information flash index
pub const IFLASH_ADDR: u8 = 0x0B;
/// Information flash data (read only)
pub const IFLASH_DATA: u8 = 0x0C;

/// Number of words in the information flash
pub const IFLASH_WORD_COUNT: u16 = 64;

// ============================================================================
// Generic command registers
// ============================================================================

/// Generic command number; writing starts the command
pub const GENCMD_CMD: u8 = 0x10;
/// Generic command data (input before start, output after completion)
pub const GENCMD_DATA: u8 = 0x11;

/// Generic command: LED test mode (input 0 = off, 1 = on)
pub const CMD_LED_TEST_MODE_WRITE: u16 = 0x0101;
/// Generic command: read LED test mode
pub const CMD_LED_TEST_MODE_READ: u16 = 0x0102;

// ============================================================================
// Power and HMI registers
// ============================================================================

/// Power control
pub const PWR_CTRL: u8 = 0x18;
/// Power source status
pub const PWR_SRC_STATUS: u8 = 0x19;
/// LED control bank 1
pub const LED_CTRL1: u8 = 0x20;
/// LED control bank 2
pub const LED_CTRL2: u8 = 0x21;

bitflags! {
    /// Bits of [`FLASH_CTRL`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FlashCtrl: u16 {
        /// Flash write/erase enable
        const WREN   = 1 << 0;
        /// Erase the segment at [`FLASH_ADDR`]
        const ESEC   = 1 << 1;
        /// Check the firmware partition checksum
        const FWCHK  = 1 << 2;
        /// Check the loader partition checksum
        const LDRCHK = 1 << 3;
        /// Switch to the other software mode
        const SWITCH = 1 << 4;
    }
}

bitflags! {
    /// Bits of [`MOD_IE`] and [`MOD_IFG`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IrqFlags: u16 {
        /// Flash operation finished
        const FLASH = 1 << 0;
        /// Key state changed
        const KEY   = 1 << 1;
        /// Generic command complete
        const GCC   = 1 << 2;
        /// An error is latched in [`MOD_ERR`]
        const ERR   = 1 << 15;
    }
}

bitflags! {
    /// Bits of [`MOD_ERR`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ErrFlags: u16 {
        /// Flash operation failed
        const FLASH = 1 << 0;
        /// Generic command failed
        const GCC   = 1 << 2;
    }
}

// ============================================================================
// MOD_ID fields
// ============================================================================

/// Processor field shift
pub const MODID_PROCESSOR_SHIFT: u16 = 0;
/// Processor field mask
pub const MODID_PROCESSOR_MASK: u16 = 0x0F;
/// Project field shift
pub const MODID_PROJECT_SHIFT: u16 = 4;
/// Project field mask
pub const MODID_PROJECT_MASK: u16 = 0x0F;
/// Platform field shift
pub const MODID_PLATFORM_SHIFT: u16 = 8;
/// Platform field mask
pub const MODID_PLATFORM_MASK: u16 = 0x0F;
/// Software mode field shift
pub const MODID_MODE_SHIFT: u16 = 14;
/// Software mode field mask
pub const MODID_MODE_MASK: u16 = 0x03;

/// Software mode value: loader
pub const MODID_MODE_LOADER: u16 = 1;
/// Software mode value: firmware
pub const MODID_MODE_FIRMWARE: u16 = 2;

/// Supported platform
pub const PLATFORM_SYSTEM1500: u16 = 0x1;
/// Supported project
pub const PROJECT_SKYMASTER: u16 = 0x3;
/// Supported processor
pub const PROCESSOR_EFI: u16 = 0x2;

// ============================================================================
// Version and hardware info fields
// ============================================================================

/// Release field shift
pub const VERSION_RELEASE_SHIFT: u16 = 12;
/// Release field mask
pub const VERSION_RELEASE_MASK: u16 = 0x0F;
/// Version field shift
pub const VERSION_VERSION_SHIFT: u16 = 6;
/// Version field mask
pub const VERSION_VERSION_MASK: u16 = 0x3F;
/// Subversion field shift
pub const VERSION_SUBVERSION_SHIFT: u16 = 0;
/// Subversion field mask
pub const VERSION_SUBVERSION_MASK: u16 = 0x3F;

/// PCB variant shift
pub const PCBA_VARIANT_SHIFT: u16 = 8;
/// PCB variant mask
pub const PCBA_VARIANT_MASK: u16 = 0xFF;
/// PCB revision shift
pub const PCBA_REVISION_SHIFT: u16 = 0;
/// PCB revision mask
pub const PCBA_REVISION_MASK: u16 = 0xFF;
