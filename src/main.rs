//! efictl - command-line tool for the EFI companion controller
//!
//! Talks to the chip through a backend (`-p`): the in-memory emulator, or
//! the Linux i2c-dev bus with a GPIO interrupt line. All chip access goes
//! through the `efi-core` chip handle, so long-running operations (flash
//! write/erase, checksum check, mode switch, generic commands) are
//! serialized and wait for their completion interrupt.

mod backends;
mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, FlashCommands, ModeCommands};
use efi_core::AttachOptions;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG, when set, overrides the -v level
    env_logger::Builder::new()
        .filter_level(cli::log_level(cli.verbose))
        .parse_env(env_logger::Env::default())
        .init();

    if let Commands::ListBackends = cli.command {
        commands::list_backends();
        return Ok(());
    }

    let backend = cli
        .programmer
        .as_deref()
        .ok_or("No backend given. Use -p <backend>, see list-backends")?;
    let chip = backends::open_chip(
        backend,
        AttachOptions {
            verify_identity: !cli.no_verify_id,
        },
    )?;

    match cli.command {
        Commands::Info => commands::info::cmd_info(&chip),
        Commands::Mode(ModeCommands::Get) => commands::info::cmd_mode_get(&chip),
        Commands::Mode(ModeCommands::Set { mode }) => {
            commands::info::cmd_mode_set(&chip, mode.into())
        }
        Commands::Flash(subcmd) => match subcmd {
            FlashCommands::Check { partition } => {
                commands::flash::cmd_check(&chip, partition.into())
            }
            FlashCommands::Read {
                address,
                count,
                output,
            } => commands::flash::cmd_read(&chip, address, count, output.as_deref()),
            FlashCommands::Write { address, value } => {
                commands::flash::cmd_write(&chip, address, value)
            }
            FlashCommands::Erase { address } => commands::flash::cmd_erase(&chip, address),
            FlashCommands::WriteEnable { state } => {
                commands::flash::cmd_write_enable(&chip, state)
            }
            FlashCommands::Program {
                base,
                input,
                segment_words,
            } => commands::flash::cmd_program(&chip, base, &input, segment_words),
        },
        Commands::Iflash { index } => commands::misc::cmd_iflash(&chip, index),
        Commands::Gencmd { command, input } => commands::misc::cmd_gencmd(&chip, command, input),
        Commands::LedTest { state } => commands::misc::cmd_led_test(&chip, state),
        Commands::ListBackends => Ok(()),
    }
}
