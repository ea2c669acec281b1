//! CLI argument parsing

use crate::backends;
use clap::{Parser, Subcommand, ValueEnum};
use efi_core::{Partition, SoftwareMode};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u16
pub fn parse_hex_u16(s: &str) -> Result<u16, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u16>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse on/off style switches
fn parse_on_off(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "yes" | "enable" => Ok(true),
        "off" | "0" | "false" | "no" | "disable" => Ok(false),
        _ => Err(format!("Expected on or off, got '{}'", s)),
    }
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Backend to use, name[:key=value,...] [available: {}]",
        backends::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "efictl")]
#[command(author, version, about = "EFI companion controller tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Backend to use
    #[arg(short, long, global = true, help = programmer_help())]
    pub programmer: Option<String>,

    /// Attach even if the chip identity is not the supported one
    #[arg(long, global = true)]
    pub no_verify_id: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Software mode / flash partition selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Boot loader
    Loader,
    /// Application firmware
    Firmware,
}

impl From<Target> for SoftwareMode {
    fn from(t: Target) -> Self {
        match t {
            Target::Loader => SoftwareMode::Loader,
            Target::Firmware => SoftwareMode::Firmware,
        }
    }
}

impl From<Target> for Partition {
    fn from(t: Target) -> Self {
        match t {
            Target::Loader => Partition::Loader,
            Target::Firmware => Partition::Firmware,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show chip identity and versions
    Info,

    /// Get or switch the software mode
    #[command(subcommand)]
    Mode(ModeCommands),

    /// Main flash operations
    #[command(subcommand)]
    Flash(FlashCommands),

    /// Read the information flash
    Iflash {
        /// Word index (0-63); all words if omitted
        #[arg(value_parser = parse_hex_u16)]
        index: Option<u16>,
    },

    /// Execute a generic command
    Gencmd {
        /// Command code
        #[arg(value_parser = parse_hex_u16)]
        command: u16,

        /// Input word
        #[arg(value_parser = parse_hex_u16, default_value = "0")]
        input: u16,
    },

    /// Switch the LED test mode
    LedTest {
        /// on or off
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },

    /// List available backends
    ListBackends,
}

#[derive(Subcommand)]
pub enum ModeCommands {
    /// Print the current software mode
    Get,

    /// Switch to another software mode
    Set {
        /// Mode to run
        #[arg(value_enum)]
        mode: Target,
    },
}

#[derive(Subcommand)]
pub enum FlashCommands {
    /// Check the image checksum of the partition that is not running
    Check {
        /// Partition to check
        #[arg(value_enum)]
        partition: Target,
    },

    /// Read words
    Read {
        /// Word address
        #[arg(value_parser = parse_hex_u16)]
        address: u16,

        /// Number of words
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Write the words to a file (little-endian) instead of printing
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write one word (write enable must be on)
    Write {
        /// Word address
        #[arg(value_parser = parse_hex_u16)]
        address: u16,

        /// Value
        #[arg(value_parser = parse_hex_u16)]
        value: u16,
    },

    /// Erase the segment containing an address (write enable must be on)
    Erase {
        /// Word address inside the segment
        #[arg(value_parser = parse_hex_u16)]
        address: u16,
    },

    /// Switch flash write enable
    WriteEnable {
        /// on or off
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },

    /// Erase, program and verify an image file (little-endian words)
    Program {
        /// Word address the image starts at
        #[arg(value_parser = parse_hex_u16)]
        base: u16,

        /// Image file
        #[arg(short, long)]
        input: PathBuf,

        /// Erase segment size in words
        #[arg(long, value_parser = parse_hex_u16, default_value = "0x100")]
        segment_words: u16,
    },
}

/// Log level for a `-v` count
pub fn log_level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_reaches_logger() {
        use log::Log;

        let cli = Cli::try_parse_from(["efictl", "-vv", "list-backends"]).unwrap();
        assert_eq!(log_level(cli.verbose), log::LevelFilter::Trace);
        assert_eq!(log_level(0), log::LevelFilter::Info);

        let logger = env_logger::Builder::new()
            .filter_level(log_level(1))
            .build();
        let debug = log::Metadata::builder()
            .level(log::Level::Debug)
            .target("efictl")
            .build();
        let trace = log::Metadata::builder()
            .level(log::Level::Trace)
            .target("efictl")
            .build();
        assert!(logger.enabled(&debug));
        assert!(!logger.enabled(&trace));
    }

    #[test]
    fn test_parse_hex_u16() {
        assert_eq!(parse_hex_u16("0x1F"), Ok(0x1F));
        assert_eq!(parse_hex_u16("31"), Ok(31));
        assert!(parse_hex_u16("0x10000").is_err());
    }

    #[test]
    fn test_parse_program() {
        let cli = Cli::try_parse_from([
            "efictl",
            "-p",
            "emulator",
            "flash",
            "program",
            "0x2000",
            "-i",
            "fw.bin",
        ])
        .unwrap();
        match cli.command {
            Commands::Flash(FlashCommands::Program {
                base,
                segment_words,
                ..
            }) => {
                assert_eq!(base, 0x2000);
                assert_eq!(segment_words, 0x100);
            }
            _ => panic!("wrong command"),
        }
        assert_eq!(cli.programmer.as_deref(), Some("emulator"));
    }

    #[test]
    fn test_parse_on_off() {
        assert_eq!(parse_on_off("ON"), Ok(true));
        assert_eq!(parse_on_off("0"), Ok(false));
        assert!(parse_on_off("maybe").is_err());
    }
}
