//! Info and mode commands

use efi_core::{EfiChip, SoftwareMode};

/// Print identity, versions and the running software mode
pub fn cmd_info(chip: &EfiChip) -> Result<(), Box<dyn std::error::Error>> {
    let info = chip.info();
    println!("EFI chip:");
    println!("  Platform:  {}", info.id.platform);
    println!("  Project:   {}", info.id.project);
    println!("  Processor: {}", info.id.processor);
    println!(
        "  Mode:      {}",
        SoftwareMode::from_mod_id(info.id.to_raw())
    );

    let unknown = || "unknown".to_string();
    println!(
        "  Firmware:  {}",
        info.firmware.map(|v| v.to_string()).unwrap_or_else(unknown)
    );
    println!(
        "  Loader:    {}",
        info.loader.map(|v| v.to_string()).unwrap_or_else(unknown)
    );
    println!(
        "  PCB:       {}",
        info.hardware.map(|v| v.to_string()).unwrap_or_else(unknown)
    );
    Ok(())
}

/// Print the running software mode
pub fn cmd_mode_get(chip: &EfiChip) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", chip.flash().get_mode()?);
    Ok(())
}

/// Switch the software mode
pub fn cmd_mode_set(chip: &EfiChip, mode: SoftwareMode) -> Result<(), Box<dyn std::error::Error>> {
    let flash = chip.flash();
    if flash.get_mode()? == mode {
        println!("Already running {}", mode);
        return Ok(());
    }
    flash.set_mode(mode)?;
    println!("Switched to {}", mode);
    Ok(())
}
