//! MCU type to variant lookup

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::Variant;
use crate::bootinfo::{BootInfo, McuType};
use crate::error::{Error, Result};
use crate::flash::FlashImage;

/// Lookup table from MCU type to device variant
#[derive(Debug, Clone)]
pub struct Registry {
    variants: Vec<Variant>,
    by_mcu: BTreeMap<McuType, usize>,
}

impl Registry {
    /// Build a registry. Each MCU type may be claimed by one variant only.
    pub fn new(variants: Vec<Variant>) -> Result<Self> {
        let mut by_mcu = BTreeMap::new();
        for (index, variant) in variants.iter().enumerate() {
            for &mcu in &variant.mcus {
                if by_mcu.insert(mcu, index).is_some() {
                    log::debug!("{} claimed again by variant {}", mcu, variant.name);
                    return Err(Error::DuplicateMcu { mcu });
                }
            }
        }
        Ok(Self { variants, by_mcu })
    }

    /// The built-in variants: generic, ARM-Thumb and STM32
    pub fn builtin() -> Result<Self> {
        Self::new(builtin_variants())
    }

    /// Built-in variants plus `extra` ones (from device profiles)
    pub fn with_profiles(extra: Vec<Variant>) -> Result<Self> {
        let mut variants = builtin_variants();
        variants.extend(extra);
        Self::new(variants)
    }

    /// Variant handling `mcu`, if any
    pub fn lookup(&self, mcu: McuType) -> Option<&Variant> {
        self.by_mcu.get(&mcu).map(|&index| &self.variants[index])
    }

    /// Build the Flash image for the device described by `info`
    pub fn construct(&self, info: &BootInfo) -> Result<FlashImage> {
        let variant = self
            .lookup(info.mcu_type)
            .ok_or(Error::UnsupportedDevice { mcu: info.mcu_type })?;
        log::debug!("{} handled by variant {}", info.mcu_type, variant.name);
        variant.build(info)
    }

    /// All registered variants
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }
}

fn builtin_variants() -> Vec<Variant> {
    alloc::vec![Variant::generic(), Variant::arm_thumb(), Variant::stm32()]
}
