//! Flash command implementation

use std::path::Path;

use uhbflash_core::device::BootloaderDevice;
use uhbflash_core::flash::FlashImage;
use uhbflash_core::ihex::{parse_ihex, Segment};
use uhbflash_core::session::Session;
use uhbflash_core::variant::Registry;

use super::info::print_boot_info;
use super::progress::IndicatifProgress;
use crate::cli::ImageFormat;

/// Options for the flash command
#[derive(Debug, Clone)]
pub struct FlashOptions {
    pub format: ImageFormat,
    /// Load address for raw binaries. Defaults to the start of flash.
    pub base: Option<u32>,
    pub no_reboot: bool,
}

/// Firmware contents before placement
enum Firmware {
    Hex(Vec<Segment>),
    Bin(Vec<u8>),
}

fn is_hex_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "hex" | "ihex" | "ihx"))
        .unwrap_or(false)
}

fn load_firmware(path: &Path, format: ImageFormat) -> Result<Firmware, Box<dyn std::error::Error>> {
    let hex = match format {
        ImageFormat::Hex => true,
        ImageFormat::Bin => false,
        ImageFormat::Auto => is_hex_path(path),
    };

    if hex {
        let text = std::fs::read_to_string(path)?;
        let segments = parse_ihex(&text)?;
        let total: usize = segments.iter().map(|s| s.data.len()).sum();
        log::info!(
            "Loaded {} bytes in {} segments from {}",
            total,
            segments.len(),
            path.display()
        );
        Ok(Firmware::Hex(segments))
    } else {
        let data = std::fs::read(path)?;
        log::info!("Loaded {} bytes from {}", data.len(), path.display());
        Ok(Firmware::Bin(data))
    }
}

/// Place firmware contents into the image
fn place_firmware(
    image: &mut FlashImage,
    firmware: &Firmware,
    base: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    match firmware {
        Firmware::Hex(segments) => {
            if base.is_some() {
                log::warn!("--base is ignored for Intel HEX images");
            }
            for segment in segments {
                log::debug!(
                    "Segment 0x{:08X}..0x{:08X}",
                    segment.address,
                    segment.end()
                );
                image.write(segment.address, &segment.data)?;
            }
        }
        Firmware::Bin(data) => {
            let base = base.unwrap_or_else(|| image.flash_mem_offset());
            log::debug!("Placing binary at 0x{:08X}", base);
            image.write(base, data)?;
        }
    }
    Ok(())
}

/// Run the flash command
pub fn run_flash(
    dev: Box<dyn BootloaderDevice>,
    registry: &Registry,
    input: &Path,
    opts: &FlashOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let firmware = load_firmware(input, opts.format)?;

    let mut session = Session::new(dev);
    let info = session.info()?;
    print_boot_info(&info, registry);

    session.enter_bootloader()?;

    let mut image = registry.construct(&info)?;
    place_firmware(&mut image, &firmware, opts.base)?;

    let mut progress = IndicatifProgress::new();
    session.flash_with_progress(&mut image, &mut progress)?;

    if opts.no_reboot {
        println!("Device left in bootloader mode");
    } else {
        session.reboot()?;
        println!("Device rebooted");
    }
    Ok(())
}
