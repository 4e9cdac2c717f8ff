//! HID bootloader device
//!
//! This module provides the `HidBootloader` struct, which moves bootloader
//! reports over the HID interface's interrupt endpoints and implements the
//! `BootloaderDevice` trait.

use nusb::transfer::{Buffer, In, Interrupt, Out, TransferError};
use nusb::{Endpoint, MaybeFuture};
use uhbflash_core::device::BootloaderDevice;
use uhbflash_core::error::Result as CoreResult;
use uhbflash_core::protocol::{Command, Response, HID_PACKET_SIZE};

use crate::error::{HidError, Result};
use crate::protocol::*;

/// Information about a connected bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidDeviceInfo {
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
}

impl std::fmt::Display for HidDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} at bus {} address {}",
            BOOTLOADER_VID, BOOTLOADER_PID, self.bus, self.address
        )
    }
}

/// Bootloader reached over USB HID
pub struct HidBootloader {
    /// Interrupt OUT endpoint for commands and data
    out_ep: Endpoint<Interrupt, Out>,
    /// Interrupt IN endpoint for replies
    in_ep: Endpoint<Interrupt, In>,
    info: HidDeviceInfo,
}

impl HidBootloader {
    /// Open the first connected bootloader
    pub fn open() -> Result<Self> {
        Self::open_nth(0)
    }

    /// Open the nth connected bootloader (0-indexed)
    pub fn open_nth(index: usize) -> Result<Self> {
        let device_info = nusb::list_devices()
            .wait()
            .map_err(HidError::OpenFailed)?
            .filter(|d| d.vendor_id() == BOOTLOADER_VID && d.product_id() == BOOTLOADER_PID)
            .nth(index)
            .ok_or(HidError::DeviceNotFound {
                vid: BOOTLOADER_VID,
                pid: BOOTLOADER_PID,
                index,
            })?;

        let info = HidDeviceInfo {
            bus: device_info.busnum(),
            address: device_info.device_address(),
        };
        log::info!("Opening bootloader {}", info);

        let device = device_info.open().wait().map_err(HidError::OpenFailed)?;

        // The kernel HID driver binds to the interface; detach it first
        let claim_failed = |source| HidError::ClaimFailed {
            interface: HID_INTERFACE,
            source,
        };
        let interface = device
            .detach_and_claim_interface(HID_INTERFACE)
            .wait()
            .map_err(claim_failed)?;
        log::debug!("Claimed interface {}", HID_INTERFACE);

        let out_ep = interface
            .endpoint::<Interrupt, Out>(WRITE_EP)
            .map_err(claim_failed)?;
        let in_ep = interface
            .endpoint::<Interrupt, In>(READ_EP)
            .map_err(claim_failed)?;

        Ok(Self {
            out_ep,
            in_ep,
            info,
        })
    }

    /// List all connected bootloaders
    pub fn list_devices() -> Result<Vec<HidDeviceInfo>> {
        let devices = nusb::list_devices()
            .wait()
            .map_err(HidError::OpenFailed)?
            .filter(|d| d.vendor_id() == BOOTLOADER_VID && d.product_id() == BOOTLOADER_PID)
            .map(|d| HidDeviceInfo {
                bus: d.busnum(),
                address: d.device_address(),
            })
            .collect();
        Ok(devices)
    }

    /// Bus location of the opened device
    pub fn info(&self) -> HidDeviceInfo {
        self.info
    }

    /// Send one report (blocking)
    fn write_report(&mut self, data: &[u8]) -> Result<()> {
        let report = frame_report(data).ok_or(HidError::ReportTooLong(data.len()))?;
        let mut buf = Buffer::new(HID_PACKET_SIZE);
        buf.extend_from_slice(&report);

        self.out_ep
            .transfer_blocking(buf, USB_TIMEOUT)
            .into_result()
            .map_err(transfer_error)?;

        log::trace!("HID OUT {:02x?}", &data[..data.len().min(8)]);
        Ok(())
    }

    /// Receive one report (blocking)
    fn read_report(&mut self) -> Result<Response> {
        let len = request_len(HID_PACKET_SIZE, self.in_ep.max_packet_size());
        let mut buf = Buffer::new(len);
        buf.set_requested_len(len);

        let data = self
            .in_ep
            .transfer_blocking(buf, USB_TIMEOUT)
            .into_result()
            .map_err(transfer_error)?;

        log::trace!("HID IN {} bytes", data.len());
        Ok(Response::new(&data[..]))
    }
}

fn transfer_error(e: TransferError) -> HidError {
    match e {
        TransferError::Cancelled => HidError::Timeout,
        e => HidError::TransferFailed(e.to_string()),
    }
}

impl BootloaderDevice for HidBootloader {
    fn send(&mut self, cmd: &Command) -> CoreResult<()> {
        log::trace!("{:?}", cmd);
        self.write_report(&cmd.to_report())?;
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> CoreResult<()> {
        self.write_report(data)?;
        Ok(())
    }

    fn recv(&mut self) -> CoreResult<Response> {
        Ok(self.read_report()?)
    }
}
