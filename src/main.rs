//! uhbflash - host client for the mikroe USB HID bootloader
//!
//! Programs firmware into PIC, dsPIC, PIC32, Stellaris and STM32 boards
//! through the bootloader they ship with.
//!
//! # Architecture
//!
//! The bootloader speaks a small command protocol over 64-byte HID
//! reports. Everything above the transport lives in `uhbflash-core` and
//! works against the `BootloaderDevice` trait, so the same flash code
//! runs against real hardware (`hid`) and the in-memory emulator
//! (`dummy`).

mod cli;
mod commands;
mod transports;

use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use uhbflash_core::variant::{profile, Registry};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let registry = match load_registry(cli.profiles.as_deref()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to load device profiles: {}", e);
            std::process::exit(1);
        }
    };

    log::debug!("Loaded {} device variants", registry.variants().len());

    let result = match cli.command {
        Commands::Flash {
            transport,
            input,
            format,
            base,
            no_reboot,
        } => {
            let dev = transports::open_transport(&transport)?;
            let opts = commands::FlashOptions {
                format,
                base,
                no_reboot,
            };
            commands::run_flash(dev, &registry, &input, &opts)
        }
        Commands::Info { transport } => {
            let dev = transports::open_transport(&transport)?;
            commands::run_info(dev, &registry)
        }
        Commands::ListDevices => commands::list_devices(),
        Commands::ListTransports => {
            commands::list_transports();
            Ok(())
        }
        Commands::ListVariants => {
            commands::list_variants(&registry);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Build the variant registry, adding profiles from `path` if given
fn load_registry(path: Option<&Path>) -> Result<Registry, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let extra = profile::load_profiles(path)?;
            log::info!("Loaded {} variants from {}", extra.len(), path.display());
            Ok(Registry::with_profiles(extra)?)
        }
        None => Ok(Registry::builtin()?),
    }
}
