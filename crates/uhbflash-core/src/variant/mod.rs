//! Device variants
//!
//! A [`Variant`] ties a set of MCU types to the Flash geometry and the
//! bootloader patch those MCUs need. The [`Registry`] maps the MCU type
//! reported by the bootloader to its variant.

mod registry;

#[cfg(feature = "std")]
pub mod profile;

pub use registry::Registry;

use alloc::borrow::Cow;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::bootinfo::{BootInfo, McuType};
use crate::error::Result;
use crate::flash::{
    BootPatch, FlashGeometry, FlashImage, NoPatch, SectorGeometry, ThumbRedirect, UniformGeometry,
};

/// A family of devices sharing a Flash layout and bootloader patch
#[derive(Debug, Clone)]
pub struct Variant {
    /// Variant name
    pub name: Cow<'static, str>,
    /// MCU types handled by this variant
    pub mcus: Vec<McuType>,
    /// Flash block layout
    pub geometry: Arc<dyn FlashGeometry>,
    /// Firmware patch applied before transfer
    pub patch: Arc<dyn BootPatch>,
}

impl Variant {
    /// Create a variant
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        mcus: Vec<McuType>,
        geometry: Arc<dyn FlashGeometry>,
        patch: Arc<dyn BootPatch>,
    ) -> Self {
        Self {
            name: name.into(),
            mcus,
            geometry,
            patch,
        }
    }

    /// Uniform blocks, no patch. Claims no MCU types.
    pub fn generic() -> Self {
        Self::new(
            "generic",
            Vec::new(),
            Arc::new(UniformGeometry::default()),
            Arc::new(NoPatch),
        )
    }

    /// ARM Cortex-M parts with uniform blocks (Stellaris and generic ARM)
    pub fn arm_thumb() -> Self {
        Self::new(
            "arm-thumb",
            alloc::vec![
                McuType::ARM,
                McuType::STELLARIS_M3,
                McuType::STELLARIS_M4,
                McuType::STELLARIS,
            ],
            Arc::new(UniformGeometry::default()),
            Arc::new(ThumbRedirect),
        )
    }

    /// STM32 parts with the 16/64/128 KiB sector layout
    pub fn stm32() -> Self {
        Self::new(
            "stm32",
            alloc::vec![
                McuType::STM32L1XX,
                McuType::STM32F1XX,
                McuType::STM32F2XX,
                McuType::STM32F4XX,
            ],
            Arc::new(SectorGeometry::stm32()),
            Arc::new(ThumbRedirect),
        )
    }

    /// Build an erased Flash image for a device of this variant
    pub fn build(&self, info: &BootInfo) -> Result<FlashImage> {
        FlashImage::new(info, self.geometry.as_ref(), Arc::clone(&self.patch))
    }
}
