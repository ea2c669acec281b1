//! Information flash, generic command and LED test commands

use efi_core::regs::IFLASH_WORD_COUNT;
use efi_core::EfiChip;

/// Print one information flash word, or all of them
pub fn cmd_iflash(chip: &EfiChip, index: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let flash = chip.flash();
    if let Some(index) = index {
        println!("{:#06x}", flash.iflash_read(index)?);
        return Ok(());
    }

    for row in (0..IFLASH_WORD_COUNT).step_by(8) {
        let words = (row..row + 8)
            .map(|i| flash.iflash_read(i).map(|w| format!("{:04x}", w)))
            .collect::<Result<Vec<_>, _>>()?;
        println!("{:02x}: {}", row, words.join(" "));
    }
    Ok(())
}

/// Execute a generic command and print its output word
pub fn cmd_gencmd(
    chip: &EfiChip,
    command: u16,
    input: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = chip.gencmd().execute(command, input)?;
    println!("{:#06x}", output);
    Ok(())
}

/// Switch the LED test mode
pub fn cmd_led_test(chip: &EfiChip, enable: bool) -> Result<(), Box<dyn std::error::Error>> {
    chip.gencmd().set_led_test_mode(enable)?;
    println!("LED test mode {}", if enable { "on" } else { "off" });
    Ok(())
}
