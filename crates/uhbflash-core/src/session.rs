//! Bootloader session
//!
//! The bootloader runs for a few seconds after reset. The host asks for
//! the boot info record, tells the bootloader to stay active, programs the
//! dirty blocks and finally restarts the MCU into the new firmware.

use crate::bootinfo::BootInfo;
use crate::device::BootloaderDevice;
use crate::error::Result;
use crate::flash::{FlashImage, NoProgress, TransferProgress, TransferStats};
use crate::protocol::{Command, Opcode};

/// A conversation with one bootloader
pub struct Session<D: BootloaderDevice> {
    dev: D,
}

impl<D: BootloaderDevice> Session<D> {
    /// Start a session on `dev`
    pub fn new(dev: D) -> Self {
        Self { dev }
    }

    /// Query the boot info record
    pub fn info(&mut self) -> Result<BootInfo> {
        self.dev.send(&Command::simple(Opcode::Info))?;
        let response = self.dev.recv()?;
        let info = BootInfo::parse(response.bytes())?;
        log::debug!("boot info: {:?}", info);
        Ok(info)
    }

    /// Keep the device in the bootloader
    pub fn enter_bootloader(&mut self) -> Result<()> {
        self.dev.send(&Command::simple(Opcode::Boot))?;
        self.dev.recv()?.expect(Opcode::Boot)
    }

    /// Patch the image for the bootloader and transfer its dirty blocks
    pub fn flash(&mut self, image: &mut FlashImage) -> Result<TransferStats> {
        self.flash_with_progress(image, &mut NoProgress)
    }

    /// [`flash`](Self::flash) reporting progress
    pub fn flash_with_progress<P: TransferProgress + ?Sized>(
        &mut self,
        image: &mut FlashImage,
        progress: &mut P,
    ) -> Result<TransferStats> {
        image.fix_bootloader()?;
        image.transfer_with_progress(&mut self.dev, progress)
    }

    /// Restart the MCU. The bootloader does not acknowledge this.
    pub fn reboot(&mut self) -> Result<()> {
        log::info!("Rebooting device");
        self.dev.send(&Command::simple(Opcode::Reboot))
    }

    /// Borrow the underlying device
    pub fn device(&mut self) -> &mut D {
        &mut self.dev
    }

    /// End the session and return the device
    pub fn into_inner(self) -> D {
        self.dev
    }
}
