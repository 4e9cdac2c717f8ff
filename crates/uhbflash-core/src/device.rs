//! Bootloader device abstraction
//!
//! A [`BootloaderDevice`] moves 64-byte HID reports between the host and
//! the bootloader. Implementations own the transport and its timeouts; the
//! protocol logic in this crate only sees commands, raw data reports and
//! received reports.

use alloc::boxed::Box;

use crate::error::Result;
use crate::protocol::{Command, Response};

/// A connection to a device running the USB HID bootloader
pub trait BootloaderDevice {
    /// Send a command report
    fn send(&mut self, cmd: &Command) -> Result<()>;

    /// Send one raw data report (at most one HID packet of firmware bytes)
    fn send_data(&mut self, data: &[u8]) -> Result<()>;

    /// Receive one report, blocking until it arrives or the transport times out
    fn recv(&mut self) -> Result<Response>;
}

impl<D: BootloaderDevice + ?Sized> BootloaderDevice for &mut D {
    fn send(&mut self, cmd: &Command) -> Result<()> {
        (**self).send(cmd)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        (**self).send_data(data)
    }

    fn recv(&mut self) -> Result<Response> {
        (**self).recv()
    }
}

impl<D: BootloaderDevice + ?Sized> BootloaderDevice for Box<D> {
    fn send(&mut self, cmd: &Command) -> Result<()> {
        (**self).send(cmd)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        (**self).send_data(data)
    }

    fn recv(&mut self) -> Result<Response> {
        (**self).recv()
    }
}
