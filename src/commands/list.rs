//! List commands implementation

use uhbflash_core::bootinfo::McuType;
use uhbflash_core::variant::Registry;

use crate::transports::available_transports;

/// List all transports compiled in
pub fn list_transports() {
    println!("Available transports:");
    println!();
    for t in available_transports() {
        let aliases = if t.aliases.is_empty() {
            String::new()
        } else {
            format!(" (aliases: {})", t.aliases.join(", "))
        };
        println!("  {:8} - {}{}", t.name, t.description, aliases);
    }
}

/// List all device variants
pub fn list_variants(registry: &Registry) {
    println!("{:<16} {:<8} {:>12}  MCUs", "Variant", "Patch", "Flash base");
    println!("{}", "-".repeat(70));

    for variant in registry.variants() {
        let mcus: Vec<String> = variant.mcus.iter().map(McuType::to_string).collect();
        let mcus = if mcus.is_empty() {
            "-".to_string()
        } else {
            mcus.join(", ")
        };
        println!(
            "{:<16} {:<8} {:>#12x}  {}",
            variant.name,
            variant.patch.name(),
            variant.geometry.flash_mem_offset(),
            mcus
        );
    }
}

/// List connected bootloader devices
#[cfg(feature = "hid")]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = uhbflash_hid::HidBootloader::list_devices()?;
    if devices.is_empty() {
        println!("No bootloader devices found");
        return Ok(());
    }
    for (index, dev) in devices.iter().enumerate() {
        println!("  hid:index={}  {}", index, dev);
    }
    Ok(())
}

/// List connected bootloader devices
#[cfg(not(feature = "hid"))]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    Err("USB HID support not compiled in (enable the 'hid' feature)".into())
}

/// Format a byte count as a human-readable size
pub fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 && bytes % (1024 * 1024) == 0 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
