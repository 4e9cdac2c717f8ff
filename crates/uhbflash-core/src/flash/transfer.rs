//! ERASE/WRITE transfer of dirty blocks

use alloc::vec::Vec;
use core::ops::Range;

use super::{FlashImage, WRITE_MAX};
use crate::device::BootloaderDevice;
use crate::error::{Error, Result};
use crate::protocol::{Command, Opcode, HID_PACKET_SIZE};

/// Statistics from a transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Number of ERASE commands sent
    pub erase_commands: usize,
    /// Number of blocks erased
    pub blocks_erased: usize,
    /// Number of WRITE commands sent
    pub write_commands: usize,
    /// Firmware bytes sent
    pub bytes_written: usize,
}

/// Progress callback for transfers
pub trait TransferProgress {
    /// Called once before anything is sent
    fn started(&mut self, blocks: usize, bytes: usize);

    /// Called before each ERASE command
    fn erasing(&mut self, addr: u32, blocks: usize);

    /// Called after each data packet with the running byte count
    fn write_progress(&mut self, bytes_written: usize);

    /// Called when all dirty blocks have been sent
    fn complete(&mut self, stats: &TransferStats);
}

/// A no-op progress reporter
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn started(&mut self, _blocks: usize, _bytes: usize) {}
    fn erasing(&mut self, _addr: u32, _blocks: usize) {}
    fn write_progress(&mut self, _bytes_written: usize) {}
    fn complete(&mut self, _stats: &TransferStats) {}
}

impl FlashImage {
    /// Maximal runs of consecutive dirty blocks, in address order
    pub fn dirty_runs(&self) -> Vec<Range<usize>> {
        let mut runs = Vec::new();
        let mut start = None;
        for (i, &dirty) in self.dirty().iter().enumerate() {
            match (dirty, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    runs.push(s..i);
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push(s..self.block_count());
        }
        runs
    }

    /// Erase and rewrite every dirty block on the device.
    ///
    /// Dirty flags are left set, so transferring again repeats the same
    /// commands.
    pub fn transfer<D: BootloaderDevice + ?Sized>(&self, dev: &mut D) -> Result<TransferStats> {
        self.transfer_with_progress(dev, &mut NoProgress)
    }

    /// [`transfer`](Self::transfer) reporting progress
    pub fn transfer_with_progress<D, P>(&self, dev: &mut D, progress: &mut P) -> Result<TransferStats>
    where
        D: BootloaderDevice + ?Sized,
        P: TransferProgress + ?Sized,
    {
        let runs = self.dirty_runs();
        let blocks: usize = runs.iter().map(|r| r.len()).sum();
        let bytes: usize = runs
            .iter()
            .flat_map(|r| r.clone())
            .map(|i| self.block(i).len())
            .sum();
        log::info!(
            "Transferring {} dirty blocks (0x{:X} bytes) in {} runs",
            blocks,
            bytes,
            runs.len()
        );
        progress.started(blocks, bytes);

        let mut stats = TransferStats::default();
        for run in runs {
            self.send_block_interval(dev, run.start, run.end, &mut stats, progress)?;
        }

        progress.complete(&stats);
        Ok(stats)
    }

    /// Erase blocks `start..end` with one ERASE command, then write each of
    /// them.
    ///
    /// The device buffers incoming data in a buffer of `erase_block_size`
    /// bytes and acknowledges every time it fills up, plus once at the end of
    /// a WRITE command unless the buffer had just been flushed.
    pub fn send_block_interval<D, P>(
        &self,
        dev: &mut D,
        start: usize,
        end: usize,
        stats: &mut TransferStats,
        progress: &mut P,
    ) -> Result<()>
    where
        D: BootloaderDevice + ?Sized,
        P: TransferProgress + ?Sized,
    {
        let count = u16::try_from(end - start).map_err(|_| Error::InvalidGeometry)?;
        let erase_addr = self.block_erase_addr(end - 1);
        log::debug!("ERASE 0x{:X} x{} (blocks {}..{})", erase_addr, count, start, end);
        progress.erasing(erase_addr, count as usize);
        dev.send(&Command::new(Opcode::Erase, erase_addr, count))?;
        dev.recv()?.expect(Opcode::Erase)?;
        stats.erase_commands += 1;
        stats.blocks_erased += count as usize;

        let dev_buf_size = self.erase_block_size() as usize;
        for blk in start..end {
            let block = self.block(blk);
            let block_addr = self.block_addr(blk);

            for (n, chunk) in block.chunks(WRITE_MAX).enumerate() {
                let addr = block_addr + (n * WRITE_MAX) as u32;
                log::debug!("WRITE 0x{:X} len 0x{:X}", addr, chunk.len());
                // WRITE_MAX fits the 16-bit counter
                dev.send(&Command::new(Opcode::Write, addr, chunk.len() as u16))?;
                stats.write_commands += 1;

                let mut dev_buf_rem = dev_buf_size;
                for packet in chunk.chunks(HID_PACKET_SIZE) {
                    dev.send_data(packet)?;
                    stats.bytes_written += packet.len();
                    progress.write_progress(stats.bytes_written);

                    dev_buf_rem = dev_buf_rem.saturating_sub(packet.len());
                    if dev_buf_rem == 0 {
                        dev.recv()?.expect(Opcode::Write)?;
                        dev_buf_rem = dev_buf_size;
                    }
                }
                if dev_buf_rem != dev_buf_size {
                    dev.recv()?.expect(Opcode::Write)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootinfo::{BootInfo, McuType};
    use crate::flash::{NoPatch, UniformGeometry};
    use crate::protocol::Response;
    use alloc::collections::VecDeque;
    use alloc::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum Sent {
        Cmd(Command),
        Data(usize),
    }

    /// Records what the host sends and replays canned replies
    #[derive(Default)]
    struct ScriptedDevice {
        sent: Vec<Sent>,
        replies: VecDeque<Response>,
        fail_erase_ack: bool,
        /// Only answer with `replies`; reading past them times out
        strict: bool,
    }

    impl ScriptedDevice {
        fn strict(replies: &[Opcode]) -> Self {
            Self {
                replies: replies.iter().map(|&op| Response::ack(op)).collect(),
                strict: true,
                ..Default::default()
            }
        }

        fn data_packets(&self) -> usize {
            self.sent
                .iter()
                .filter(|s| matches!(s, Sent::Data(_)))
                .count()
        }
    }

    impl BootloaderDevice for ScriptedDevice {
        fn send(&mut self, cmd: &Command) -> Result<()> {
            self.sent.push(Sent::Cmd(*cmd));
            Ok(())
        }

        fn send_data(&mut self, data: &[u8]) -> Result<()> {
            self.sent.push(Sent::Data(data.len()));
            Ok(())
        }

        fn recv(&mut self) -> Result<Response> {
            if let Some(reply) = self.replies.pop_front() {
                return Ok(reply);
            }
            if self.strict {
                return Err(Error::Timeout);
            }
            // Acknowledge whatever command was sent last
            let last = self.sent.iter().rev().find_map(|s| match s {
                Sent::Cmd(cmd) => Some(cmd.opcode),
                Sent::Data(_) => None,
            });
            match last {
                Some(Opcode::Erase) if self.fail_erase_ack => Ok(Response::ack(Opcode::Write)),
                Some(opcode) => Ok(Response::ack(opcode)),
                None => Err(Error::DeviceNotReady),
            }
        }
    }

    fn image(boot_start: u32, erase_block: u32) -> FlashImage {
        let info = BootInfo::new(McuType::PIC32, boot_start, erase_block);
        FlashImage::new(&info, &UniformGeometry::default(), Arc::new(NoPatch)).unwrap()
    }

    fn commands(dev: &ScriptedDevice) -> Vec<Command> {
        dev.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Cmd(cmd) => Some(*cmd),
                Sent::Data(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_dirty_runs() {
        let mut img = image(0xA00, 0x100);
        for blk in [1, 2, 4, 7, 8, 9] {
            img.write(blk * 0x100, &[0]).unwrap();
        }
        assert_eq!(img.dirty_runs(), [1..3, 4..5, 7..10]);
        assert!(image(0xA00, 0x100).dirty_runs().is_empty());
    }

    #[test]
    fn test_erase_and_write_commands() {
        let mut img = image(0xA00, 0x100);
        for blk in [1, 2, 4, 7, 8, 9] {
            img.write(blk * 0x100, &[0]).unwrap();
        }
        let mut dev = ScriptedDevice::default();
        let stats = img.transfer(&mut dev).unwrap();

        let cmds = commands(&dev);
        let erases: Vec<_> = cmds.iter().filter(|c| c.opcode == Opcode::Erase).collect();
        assert_eq!(
            erases,
            [
                &Command::new(Opcode::Erase, 0x200, 2),
                &Command::new(Opcode::Erase, 0x400, 1),
                &Command::new(Opcode::Erase, 0x900, 3),
            ]
        );
        assert_eq!(cmds[1], Command::new(Opcode::Write, 0x100, 0x100));
        assert_eq!(cmds[2], Command::new(Opcode::Write, 0x200, 0x100));
        assert_eq!(stats.erase_commands, 3);
        assert_eq!(stats.blocks_erased, 6);
        assert_eq!(stats.write_commands, 6);
        assert_eq!(stats.bytes_written, 0x600);
    }

    #[test]
    fn test_transfer_is_repeatable() {
        let mut img = image(0x400, 0x100);
        img.write(0x150, &[1, 2, 3]).unwrap();
        let mut dev = ScriptedDevice::default();
        img.transfer(&mut dev).unwrap();
        let first = dev.sent.len();
        img.transfer(&mut dev).unwrap();
        assert_eq!(dev.sent.len(), 2 * first);
        assert!(img.is_dirty(1));
    }

    #[test]
    fn test_large_block_split_into_write_commands() {
        // one 64 KiB block, 16 KiB device buffer
        let info = BootInfo::new(McuType::PIC32, 0x10000, 0x4000);
        let geometry = crate::flash::SectorGeometry::new(
            alloc::vec![crate::flash::SectorRun::new(0x10000, 1)],
            0,
        );
        let mut img = FlashImage::new(&info, &geometry, Arc::new(NoPatch)).unwrap();
        img.write(0, &[0]).unwrap();

        let mut dev = ScriptedDevice::default();
        img.transfer(&mut dev).unwrap();
        let cmds = commands(&dev);
        assert_eq!(
            cmds,
            [
                Command::new(Opcode::Erase, 0, 1),
                Command::new(Opcode::Write, 0, 0x8000),
                Command::new(Opcode::Write, 0x8000, 0x8000),
            ]
        );
        let packets = dev.sent.iter().filter(|s| matches!(s, Sent::Data(64))).count();
        assert_eq!(packets, 0x10000 / 64);
    }

    fn single_block_image(block: u32, dev_buf: u32) -> FlashImage {
        let info = BootInfo::new(McuType::PIC32, block, dev_buf);
        let geometry = crate::flash::SectorGeometry::new(
            alloc::vec![crate::flash::SectorRun::new(block, 1)],
            0,
        );
        let mut img = FlashImage::new(&info, &geometry, Arc::new(NoPatch)).unwrap();
        img.write(0, &[0]).unwrap();
        img
    }

    #[test]
    fn test_ack_counting() {
        // 0x140 byte device buffer against a 0x300 byte block: the buffer
        // fills twice (0x280 bytes), then the end-of-WRITE ack follows.
        let img = single_block_image(0x300, 0x140);
        let mut dev = ScriptedDevice::strict(&[
            Opcode::Erase,
            Opcode::Write,
            Opcode::Write,
            Opcode::Write,
        ]);
        img.transfer(&mut dev).unwrap();
        assert!(dev.replies.is_empty());
        assert_eq!(dev.data_packets(), 12);
    }

    #[test]
    fn test_no_end_ack_after_full_buffer() {
        // 0x300 bytes is exactly three device buffers, so the last
        // buffer-full ack is also the last one read
        let img = single_block_image(0x300, 0x100);
        let mut dev = ScriptedDevice::strict(&[
            Opcode::Erase,
            Opcode::Write,
            Opcode::Write,
            Opcode::Write,
        ]);
        img.transfer(&mut dev).unwrap();
        assert!(dev.replies.is_empty());
    }

    #[test]
    fn test_wrong_buffer_full_ack_aborts() {
        let img = single_block_image(0x300, 0x140);
        let mut dev = ScriptedDevice::strict(&[Opcode::Erase, Opcode::Erase]);
        assert_eq!(
            img.transfer(&mut dev),
            Err(Error::ProtocolMismatch {
                expected: Opcode::Write,
                found: Opcode::Erase as u8
            })
        );
        // stopped at the first full buffer
        assert_eq!(dev.data_packets(), 5);
    }

    #[test]
    fn test_wrong_end_ack_aborts() {
        let img = single_block_image(0x300, 0x140);
        let mut dev = ScriptedDevice::strict(&[
            Opcode::Erase,
            Opcode::Write,
            Opcode::Write,
            Opcode::Sync,
        ]);
        assert_eq!(
            img.transfer(&mut dev),
            Err(Error::ProtocolMismatch {
                expected: Opcode::Write,
                found: Opcode::Sync as u8
            })
        );
        assert_eq!(dev.data_packets(), 12);
    }

    #[test]
    fn test_wrong_ack_aborts() {
        let mut img = image(0x400, 0x100);
        img.write(0, &[0]).unwrap();
        let mut dev = ScriptedDevice {
            fail_erase_ack: true,
            ..Default::default()
        };
        assert_eq!(
            img.transfer(&mut dev),
            Err(Error::ProtocolMismatch {
                expected: Opcode::Erase,
                found: Opcode::Write as u8
            })
        );
        // nothing written after the failed ERASE
        assert_eq!(dev.sent.len(), 1);
    }
}
