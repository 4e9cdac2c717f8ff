//! Progress reporting with indicatif

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use uhbflash_core::flash::{TransferProgress, TransferStats};

/// Create a progress bar with custom phase message
fn create_progress_bar_with_phase(
    total: u64,
    phase: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {} {{msg}}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Progress reporter using an indicatif progress bar
pub struct IndicatifProgress {
    bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferProgress for IndicatifProgress {
    fn started(&mut self, blocks: usize, bytes: usize) {
        if blocks == 0 {
            return;
        }
        let pb = create_progress_bar_with_phase(bytes as u64, "Flashing")
            .unwrap_or_else(|_| ProgressBar::new(bytes as u64));
        pb.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(pb);
    }

    fn erasing(&mut self, addr: u32, blocks: usize) {
        if let Some(pb) = &self.bar {
            pb.set_message(format!("(erased {} blocks at 0x{:X})", blocks, addr));
        }
    }

    fn write_progress(&mut self, bytes_written: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(bytes_written as u64);
        }
    }

    fn complete(&mut self, stats: &TransferStats) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message("done");
        }
        if stats.blocks_erased == 0 {
            println!("Nothing to program - the image is empty");
        } else {
            println!(
                "Programmed {} bytes: {} blocks erased with {} ERASE commands, {} WRITE commands",
                stats.bytes_written, stats.blocks_erased, stats.erase_commands, stats.write_commands
            );
        }
    }
}
