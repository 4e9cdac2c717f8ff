//! Info command implementation

use uhbflash_core::bootinfo::BootInfo;
use uhbflash_core::device::BootloaderDevice;
use uhbflash_core::session::Session;
use uhbflash_core::variant::Registry;

use super::list::format_size;

/// Print a boot info record
pub fn print_boot_info(info: &BootInfo, registry: &Registry) {
    println!("MCU type:          {}", info.mcu_type);
    if let Some(desc) = info.description() {
        println!("Board:             {}", desc);
    }
    if let Some(id) = info.mcu_id {
        println!("MCU ID:            0x{:08X}", id);
    }
    if let Some(size) = info.mcu_size {
        println!("Flash size:        {} (0x{:X})", format_size(size), size);
    }
    println!("Erase block:       0x{:X}", info.erase_block);
    if let Some(write_block) = info.write_block {
        println!("Write block:       0x{:X}", write_block);
    }
    println!("Bootloader start:  0x{:08X}", info.boot_start);
    if let Some(rev) = info.boot_rev {
        println!("Bootloader rev:    0x{:04X}", rev);
    }
    match registry.lookup(info.mcu_type) {
        Some(variant) => println!(
            "Variant:           {} (patch: {})",
            variant.name,
            variant.patch.name()
        ),
        None => println!("Variant:           none (flashing not supported)"),
    }
}

/// Run the info command
pub fn run_info(
    dev: Box<dyn BootloaderDevice>,
    registry: &Registry,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::new(dev);
    let info = session.info()?;
    print_boot_info(&info, registry);
    Ok(())
}
