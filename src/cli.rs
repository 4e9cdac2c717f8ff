//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

const TRANSPORT_HELP: &str =
    "Transport to use: hid[:index=N] or dummy[:mcu=NAME] (see list-transports)";

#[derive(Parser)]
#[command(name = "uhbflash")]
#[command(author, version, about = "USB HID bootloader flasher", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Device profile file (TOML) adding variants to the built-in table
    #[arg(long, global = true)]
    pub profiles: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Firmware file format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Pick by file extension (.hex/.ihex is Intel HEX, anything else raw)
    Auto,
    /// Intel HEX
    Hex,
    /// Raw binary loaded at --base
    Bin,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Program a firmware image through the bootloader
    Flash {
        /// Transport to use
        #[arg(short, long, default_value = "hid", help = TRANSPORT_HELP)]
        transport: String,

        /// Firmware image (Intel HEX or raw binary)
        #[arg(short, long)]
        input: PathBuf,

        /// Image format
        #[arg(long, value_enum, default_value_t = ImageFormat::Auto)]
        format: ImageFormat,

        /// Load address of a raw binary image (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        base: Option<u32>,

        /// Leave the device in the bootloader after programming
        #[arg(long)]
        no_reboot: bool,
    },

    /// Show the boot info reported by the bootloader
    Info {
        /// Transport to use
        #[arg(short, long, default_value = "hid", help = TRANSPORT_HELP)]
        transport: String,
    },

    /// List connected bootloader devices
    ListDevices,

    /// List available transports
    ListTransports,

    /// List device variants and the MCUs they support
    ListVariants,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x08000000"), Ok(0x0800_0000));
        assert_eq!(parse_hex_u32("4096"), Ok(4096));
        assert!(parse_hex_u32("0xZZ").is_err());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flash_args() {
        let cli = Cli::parse_from([
            "uhbflash", "-v", "flash", "-t", "dummy:mcu=STM32F4XX", "-i", "fw.bin", "--base",
            "0x08000000",
        ]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Flash {
                transport,
                base,
                format,
                no_reboot,
                ..
            } => {
                assert_eq!(transport, "dummy:mcu=STM32F4XX");
                assert_eq!(base, Some(0x0800_0000));
                assert_eq!(format, ImageFormat::Auto);
                assert!(!no_reboot);
            }
            _ => panic!("expected flash command"),
        }
    }
}
