//! Identity and version registers

use crate::regs::*;

fn field(raw: u16, shift: u16, mask: u16) -> u16 {
    (raw >> shift) & mask
}

/// Decoded [`MOD_ID`] register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleId {
    /// Platform code
    pub platform: u16,
    /// Project code
    pub project: u16,
    /// Processor code
    pub processor: u16,
    /// Raw software mode field (see [`crate::SoftwareMode`])
    pub mode: u16,
}

impl ModuleId {
    /// Decode a raw `MOD_ID` value
    pub fn from_raw(raw: u16) -> Self {
        Self {
            platform: field(raw, MODID_PLATFORM_SHIFT, MODID_PLATFORM_MASK),
            project: field(raw, MODID_PROJECT_SHIFT, MODID_PROJECT_MASK),
            processor: field(raw, MODID_PROCESSOR_SHIFT, MODID_PROCESSOR_MASK),
            mode: field(raw, MODID_MODE_SHIFT, MODID_MODE_MASK),
        }
    }

    /// Encode back into a raw `MOD_ID` value
    pub fn to_raw(self) -> u16 {
        ((self.platform & MODID_PLATFORM_MASK) << MODID_PLATFORM_SHIFT)
            | ((self.project & MODID_PROJECT_MASK) << MODID_PROJECT_SHIFT)
            | ((self.processor & MODID_PROCESSOR_MASK) << MODID_PROCESSOR_SHIFT)
            | ((self.mode & MODID_MODE_MASK) << MODID_MODE_SHIFT)
    }

    /// Identity of the only chip this crate drives, with mode unset
    pub const SUPPORTED: Self = Self {
        platform: PLATFORM_SYSTEM1500,
        project: PROJECT_SKYMASTER,
        processor: PROCESSOR_EFI,
        mode: 0,
    };
}

/// Decoded firmware or loader version register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// Release number
    pub release: u16,
    /// Version number
    pub version: u16,
    /// Subversion number
    pub subversion: u16,
}

impl VersionInfo {
    /// Decode a raw `MOD_FWV` / `MOD_LDRV` value
    pub fn from_raw(raw: u16) -> Self {
        Self {
            release: field(raw, VERSION_RELEASE_SHIFT, VERSION_RELEASE_MASK),
            version: field(raw, VERSION_VERSION_SHIFT, VERSION_VERSION_MASK),
            subversion: field(raw, VERSION_SUBVERSION_SHIFT, VERSION_SUBVERSION_MASK),
        }
    }

    /// Encode back into a raw register value
    pub fn to_raw(self) -> u16 {
        ((self.release & VERSION_RELEASE_MASK) << VERSION_RELEASE_SHIFT)
            | ((self.version & VERSION_VERSION_MASK) << VERSION_VERSION_SHIFT)
            | ((self.subversion & VERSION_SUBVERSION_MASK) << VERSION_SUBVERSION_SHIFT)
    }
}

impl core::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.release, self.version, self.subversion)
    }
}

/// Decoded [`MOD_HW`] register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareInfo {
    /// PCB assembly variant
    pub variant: u16,
    /// PCB assembly revision
    pub revision: u16,
}

impl HardwareInfo {
    /// Decode a raw `MOD_HW` value
    pub fn from_raw(raw: u16) -> Self {
        Self {
            variant: field(raw, PCBA_VARIANT_SHIFT, PCBA_VARIANT_MASK),
            revision: field(raw, PCBA_REVISION_SHIFT, PCBA_REVISION_MASK),
        }
    }
}

impl core::fmt::Display for HardwareInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "variant {} revision {}", self.variant, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_decode() {
        // firmware mode, platform 1, project 3, processor 2
        let id = ModuleId::from_raw(0x8132);
        assert_eq!(id.platform, 1);
        assert_eq!(id.project, 3);
        assert_eq!(id.processor, 2);
        assert_eq!(id.mode, MODID_MODE_FIRMWARE);
        assert_eq!(id.to_raw(), 0x8132);
    }

    #[test]
    fn test_supported_identity() {
        let id = ModuleId {
            mode: MODID_MODE_LOADER,
            ..ModuleId::SUPPORTED
        };
        assert_eq!(id.to_raw(), 0x4132);
    }

    #[test]
    fn test_version_decode() {
        let v = VersionInfo::from_raw((2 << 12) | (5 << 6) | 17);
        assert_eq!(v.to_string(), "2.5.17");
        assert_eq!(VersionInfo::from_raw(v.to_raw()), v);
    }

    #[test]
    fn test_hardware_decode() {
        let hw = HardwareInfo::from_raw(0x0A03);
        assert_eq!(hw.variant, 10);
        assert_eq!(hw.revision, 3);
    }
}
