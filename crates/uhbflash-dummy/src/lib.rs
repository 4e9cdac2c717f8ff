//! uhbflash-dummy - In-memory USB HID bootloader emulator
//!
//! This crate provides a bootloader device that keeps the target Flash in
//! memory and answers the host the way the bootloader firmware does,
//! including its buffer-full acknowledgements during WRITE. It's useful
//! for testing and development without real hardware.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use uhbflash_core::bootinfo::{BootInfo, McuType, DEV_DSC_LEN};
use uhbflash_core::device::BootloaderDevice;
use uhbflash_core::error::{Error, Result};
use uhbflash_core::flash::STM32_SECTORS;
use uhbflash_core::protocol::{Command, Opcode, Response, HID_PACKET_SIZE};

/// Configuration for the dummy bootloader
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Record returned for INFO
    pub info: BootInfo,
    /// Erase block sizes from address 0 up to the bootloader
    pub block_sizes: Vec<u32>,
}

impl DummyConfig {
    /// Device with uniform erase blocks of `info.erase_block` bytes
    pub fn uniform(info: BootInfo) -> Self {
        let count = info.boot_start.checked_div(info.erase_block).unwrap_or(0);
        Self {
            block_sizes: vec![info.erase_block; count as usize],
            info,
        }
    }

    /// STM32F4 with 1 MiB of Flash and the bootloader in the last 128 KiB
    pub fn stm32f4() -> Self {
        let mut info = BootInfo::new(McuType::STM32F4XX, 0xE0000, 0x4000);
        info.mcu_size = Some(0x100000);
        info.write_block = Some(4);
        info.boot_rev = Some(0x1310);
        info.dev_dsc = Some(description(b"mikromedia"));
        let block_sizes = STM32_SECTORS
            .iter()
            .flat_map(|run| core::iter::repeat(run.size).take(run.count as usize))
            .collect();
        Self { info, block_sizes }
    }

    /// Device of MCU type `mcu` with 64 KiB of uniformly erased Flash
    pub fn for_mcu(mcu: McuType) -> Self {
        if (McuType::STM32L1XX.0..=McuType::STM32F4XX.0).contains(&mcu.0) {
            let mut config = Self::stm32f4();
            config.info.mcu_type = mcu;
            return config;
        }
        let erase_block = match mcu.alignment() {
            1 => 0x40,
            2 => 0xC00,
            _ => 0x400,
        };
        let mut info = BootInfo::new(mcu, erase_block * (0x10000 / erase_block), erase_block);
        info.mcu_size = Some(info.boot_start + 0x2000);
        info.dev_dsc = Some(description(b"uhbflash dummy"));
        Self::uniform(info)
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self::stm32f4()
    }
}

fn description(name: &[u8]) -> [u8; DEV_DSC_LEN] {
    let mut dsc = [0u8; DEV_DSC_LEN];
    let len = name.len().min(DEV_DSC_LEN);
    dsc[..len].copy_from_slice(&name[..len]);
    dsc
}

/// WRITE command in progress
#[derive(Debug, Clone, Copy)]
struct WriteState {
    addr: u32,
    remaining: usize,
    buffered: usize,
}

/// Emulated bootloader
pub struct DummyBootloader {
    config: DummyConfig,
    /// Start address of each block plus the end of the last one
    block_addr: Vec<u32>,
    data: Vec<u8>,
    replies: VecDeque<Response>,
    write: Option<WriteState>,
    erase_log: Vec<(u32, u16)>,
    write_log: Vec<(u32, u16)>,
    in_bootloader: bool,
    rebooted: bool,
}

impl DummyBootloader {
    /// Create an emulated bootloader with erased Flash
    pub fn new(config: DummyConfig) -> Self {
        let mut block_addr = Vec::with_capacity(config.block_sizes.len() + 1);
        let mut addr = 0u32;
        block_addr.push(addr);
        for &size in &config.block_sizes {
            addr += size;
            block_addr.push(addr);
        }
        Self {
            data: vec![0xFF; addr as usize],
            config,
            block_addr,
            replies: VecDeque::new(),
            write: None,
            erase_log: Vec::new(),
            write_log: Vec::new(),
            in_bootloader: false,
            rebooted: false,
        }
    }

    /// Create an emulated bootloader whose Flash starts with `initial_data`
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut dev = Self::new(config);
        let len = initial_data.len().min(dev.data.len());
        dev.data[..len].copy_from_slice(&initial_data[..len]);
        dev
    }

    /// Flash contents below the bootloader
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// `(address, block count)` of every ERASE received
    pub fn erase_log(&self) -> &[(u32, u16)] {
        &self.erase_log
    }

    /// `(address, byte count)` of every WRITE received
    pub fn write_log(&self) -> &[(u32, u16)] {
        &self.write_log
    }

    /// Whether BOOT was received
    pub fn in_bootloader(&self) -> bool {
        self.in_bootloader
    }

    /// Whether REBOOT was received
    pub fn rebooted(&self) -> bool {
        self.rebooted
    }

    fn buffer_size(&self) -> usize {
        self.config.info.erase_block as usize
    }

    fn block_index(&self, addr: u32) -> Option<usize> {
        self.block_addr
            .windows(2)
            .position(|w| w[0] <= addr && addr < w[1])
    }

    fn handle_erase(&mut self, addr: u32, count: u16) -> Result<()> {
        let last = self
            .block_index(addr)
            .ok_or(Error::AddressOutOfRange { addr })?;
        let first = (last + 1)
            .checked_sub(count as usize)
            .ok_or(Error::AddressOutOfRange { addr })?;
        let start = self.block_addr[first] as usize;
        let end = self.block_addr[last + 1] as usize;
        log::debug!("dummy: erasing 0x{:X}..0x{:X}", start, end);
        self.data[start..end].fill(0xFF);
        self.erase_log.push((addr, count));
        Ok(())
    }

    fn handle_write(&mut self, addr: u32, count: u16) -> Result<()> {
        let end = addr as usize + count as usize;
        if end > self.data.len() {
            return Err(Error::AddressOutOfRange { addr });
        }
        self.write_log.push((addr, count));
        if count > 0 {
            self.write = Some(WriteState {
                addr,
                remaining: count as usize,
                buffered: 0,
            });
        }
        Ok(())
    }
}

impl BootloaderDevice for DummyBootloader {
    fn send(&mut self, cmd: &Command) -> Result<()> {
        // The firmware handles one command at a time and never drops a reply
        if self.write.is_some() || !self.replies.is_empty() || self.rebooted {
            return Err(Error::DeviceNotReady);
        }
        log::trace!("dummy: {:?}", cmd);

        match cmd.opcode {
            Opcode::Info => {
                self.replies.push_back(Response::new(&self.config.info.encode()));
            }
            Opcode::Sync => self.replies.push_back(Response::ack(Opcode::Sync)),
            Opcode::Boot => {
                self.in_bootloader = true;
                self.replies.push_back(Response::ack(Opcode::Boot));
            }
            Opcode::Erase => {
                self.handle_erase(cmd.address, cmd.counter)?;
                self.replies.push_back(Response::ack(Opcode::Erase));
            }
            Opcode::Write => self.handle_write(cmd.address, cmd.counter)?,
            Opcode::Reboot => self.rebooted = true,
        }
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > HID_PACKET_SIZE || !self.replies.is_empty() {
            return Err(Error::DeviceNotReady);
        }
        let buffer_size = self.buffer_size();
        let mut state = self.write.ok_or(Error::DeviceNotReady)?;

        let len = data.len().min(state.remaining);
        let start = state.addr as usize;
        // Programming only clears bits
        for (dst, &src) in self.data[start..start + len].iter_mut().zip(data) {
            *dst &= src;
        }
        state.addr += len as u32;
        state.remaining -= len;
        state.buffered += len;

        if state.buffered >= buffer_size {
            self.replies.push_back(Response::ack(Opcode::Write));
            state.buffered = 0;
        }
        if state.remaining == 0 {
            if state.buffered != 0 {
                self.replies.push_back(Response::ack(Opcode::Write));
            }
            self.write = None;
        } else {
            self.write = Some(state);
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<Response> {
        self.replies.pop_front().ok_or(Error::Timeout)
    }
}
