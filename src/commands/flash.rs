//! Flash commands

use super::{words_from_bytes, words_to_bytes};
use efi_core::{EfiChip, Partition, ProgramPhase};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;

/// Check the image checksum of a partition
pub fn cmd_check(chip: &EfiChip, partition: Partition) -> Result<(), Box<dyn std::error::Error>> {
    let valid = chip.flash().check_checksum(partition)?;
    println!(
        "{} image checksum: {}",
        partition,
        if valid { "valid" } else { "INVALID" }
    );
    if valid {
        Ok(())
    } else {
        Err(format!("{} image is not valid", partition).into())
    }
}

/// Read `count` words starting at `address`
pub fn cmd_read(
    chip: &EfiChip,
    address: u16,
    count: u32,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if count == 0 || address as u32 + count > 0x1_0000 {
        return Err(format!("Cannot read {} words at {:#06x}", count, address).into());
    }

    let pb = ProgressBar::new(count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} words ({eta}) Reading")?
            .progress_chars("#>-"),
    );
    if output.is_none() {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let flash = chip.flash();
    let mut words = Vec::with_capacity(count as usize);
    for i in 0..count {
        words.push(flash.read(address + i as u16)?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    match output {
        Some(path) => {
            fs::write(path, words_to_bytes(&words))?;
            println!("Wrote {} words to {:?}", words.len(), path);
        }
        None => {
            for (i, chunk) in words.chunks(8).enumerate() {
                let line: Vec<String> = chunk.iter().map(|w| format!("{:04x}", w)).collect();
                println!("{:04x}: {}", address as usize + i * 8, line.join(" "));
            }
        }
    }
    Ok(())
}

/// Write one word
pub fn cmd_write(chip: &EfiChip, address: u16, value: u16) -> Result<(), Box<dyn std::error::Error>> {
    chip.flash().write(address, value)?;
    println!("Wrote {:#06x} to {:#06x}", value, address);
    Ok(())
}

/// Erase one segment
pub fn cmd_erase(chip: &EfiChip, address: u16) -> Result<(), Box<dyn std::error::Error>> {
    chip.flash().erase(address)?;
    println!("Erased segment at {:#06x}", address);
    Ok(())
}

/// Switch write enable
pub fn cmd_write_enable(chip: &EfiChip, enable: bool) -> Result<(), Box<dyn std::error::Error>> {
    chip.flash().set_write_enable(enable)?;
    println!("Flash write {}", if enable { "enabled" } else { "disabled" });
    Ok(())
}

/// Erase, program and verify an image file
pub fn cmd_program(
    chip: &EfiChip,
    base: u16,
    input: &Path,
    segment_words: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let words = words_from_bytes(&fs::read(input)?)?;
    if words.is_empty() {
        return Err(format!("{:?} is empty", input).into());
    }
    println!(
        "Programming {} words from {:?} at {:#06x}",
        words.len(),
        input,
        base
    );

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let mut current = None;
    let result = chip
        .flash()
        .program_image(base, &words, segment_words, |phase, done, total| {
            if current != Some(phase) {
                current = Some(phase);
                pb.set_length(total as u64);
                pb.reset();
                pb.set_message(match phase {
                    ProgramPhase::Erase => "Erasing",
                    ProgramPhase::Write => "Writing",
                    ProgramPhase::Verify => "Verifying",
                });
            }
            pb.set_position(done as u64);
        });

    match result {
        Ok(()) => {
            pb.finish_with_message("Done");
            println!("Programmed and verified {} words", words.len());
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("Failed");
            Err(e.into())
        }
    }
}
