//! TOML device profiles
//!
//! Profiles declare variants for MCUs the built-in table does not cover,
//! or for boards whose Flash is mapped somewhere else:
//!
//! ```toml
//! [[variant]]
//! name = "pic32-mx7"
//! mcus = ["PIC32"]
//! patch = "none"
//! flash_base = 0x9D000000
//!
//! [[variant]]
//! name = "custom-cortex"
//! mcus = ["ARM"]
//! patch = "thumb"
//! sectors = [{ size = "16 KiB", count = 4 }, { size = "64 KiB" }]
//! ```
//!
//! Without `sectors` the Flash is split into blocks of the device's erase
//! block size. A reported `BootStart` at or above `flash_base` is taken as an
//! address in the program's address space, so the layout covers
//! `BootStart - flash_base` bytes.

use std::fs;
use std::path::Path;
use std::string::String;
use std::sync::Arc;
use std::vec::Vec;
use std::format;

use super::Variant;
use crate::bootinfo::McuType;
use crate::error::{Error, Result};
use crate::flash::{
    BootPatch, FlashGeometry, NoPatch, SectorGeometry, SectorRun, ThumbRedirect, UniformGeometry,
};

/// Profile file structure
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFile {
    #[serde(default)]
    variant: Vec<ProfileVariant>,
}

/// One `[[variant]]` table
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileVariant {
    name: String,
    mcus: Vec<String>,
    #[serde(default)]
    patch: PatchKind,
    #[serde(default, deserialize_with = "deserialize_hex_u32")]
    flash_base: u32,
    sectors: Option<Vec<ProfileSector>>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum PatchKind {
    #[default]
    None,
    Thumb,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileSector {
    #[serde(deserialize_with = "deserialize_size")]
    size: u32,
    #[serde(default = "one")]
    count: u32,
}

fn one() -> u32 {
    1
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum NumberOrStr {
    Int(u32),
    Str(String),
}

/// Deserialize a u32 that can be hex (0x...) or decimal
fn deserialize_hex_u32<'de, D>(deserializer: D) -> core::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match NumberOrStr::deserialize(deserializer)? {
        NumberOrStr::Int(n) => Ok(n),
        NumberOrStr::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

/// Deserialize a size that can be a number or a string like "16 KiB"
fn deserialize_size<'de, D>(deserializer: D) -> core::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match NumberOrStr::deserialize(deserializer)? {
        NumberOrStr::Int(n) => Ok(n),
        NumberOrStr::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> core::result::Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Parse a size string like "128 KiB", "0x4000" or "512"
fn parse_size(s: &str) -> core::result::Result<u32, String> {
    if let Ok(n) = parse_number(s) {
        return Ok(n);
    }

    let lower = s.trim().to_lowercase();
    let (num, multiplier) = if let Some(n) = lower.strip_suffix("mib") {
        (n, 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kib") {
        (n, 1024)
    } else if let Some(n) = lower.strip_suffix('b') {
        (n, 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u32 = num.trim().parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

/// Load variants from a profile file
pub fn load_profiles(path: impl AsRef<Path>) -> Result<Vec<Variant>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        log::error!("cannot read {}: {}", path.display(), e);
        Error::ProfileIo
    })?;
    parse_profiles(&content)
}

/// Parse variants from profile TOML
pub fn parse_profiles(content: &str) -> Result<Vec<Variant>> {
    let file: ProfileFile = toml::from_str(content).map_err(|e| {
        log::error!("invalid device profile: {}", e);
        Error::ProfileParse
    })?;

    file.variant.into_iter().map(into_variant).collect()
}

fn into_variant(profile: ProfileVariant) -> Result<Variant> {
    let mcus = profile
        .mcus
        .iter()
        .map(|name| {
            McuType::from_name(name).ok_or_else(|| {
                log::error!("profile {}: unknown MCU {:?}", profile.name, name);
                Error::UnknownMcuName
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let geometry: Arc<dyn FlashGeometry> = match profile.sectors {
        Some(sectors) => Arc::new(SectorGeometry::new(
            sectors
                .iter()
                .map(|s| SectorRun::new(s.size, s.count))
                .collect::<Vec<_>>(),
            profile.flash_base,
        )),
        None => Arc::new(UniformGeometry::new(profile.flash_base)),
    };
    let patch: Arc<dyn BootPatch> = match profile.patch {
        PatchKind::None => Arc::new(NoPatch),
        PatchKind::Thumb => Arc::new(ThumbRedirect),
    };

    Ok(Variant::new(profile.name, mcus, geometry, patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootinfo::BootInfo;
    use crate::variant::Registry;

    const PROFILES: &str = r#"
[[variant]]
name = "pic32-mx7"
mcus = ["PIC32"]
flash_base = 0x9D000000

[[variant]]
name = "dspic"
mcus = ["dspic33", "PIC24"]
patch = "none"
flash_base = "0x0"
sectors = [{ size = "3 KiB", count = 112 }]
"#;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("0x4000").unwrap(), 0x4000);
        assert_eq!(parse_size("16 KiB").unwrap(), 16 * 1024);
        assert_eq!(parse_size("128KiB").unwrap(), 128 * 1024);
        assert_eq!(parse_size("1 MiB").unwrap(), 1024 * 1024);
        assert!(parse_size("12 parsecs").is_err());
    }

    #[test]
    fn test_parse_profiles() {
        let variants = parse_profiles(PROFILES).unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].name, "pic32-mx7");
        assert_eq!(variants[0].mcus, [McuType::PIC32]);
        assert_eq!(variants[0].patch.name(), "none");
        assert_eq!(variants[0].geometry.flash_mem_offset(), 0x9D00_0000);
        assert_eq!(variants[1].mcus, [McuType::DSPIC33, McuType::PIC24]);
    }

    #[test]
    fn test_profiles_in_registry() {
        let registry = Registry::with_profiles(parse_profiles(PROFILES).unwrap()).unwrap();

        let info = BootInfo::new(McuType::DSPIC33, 0x54000, 0xC00);
        let image = registry.construct(&info).unwrap();
        assert_eq!(image.block_count(), 112);
        assert_eq!(image.block_addr(112), 0x54000);

        let info = BootInfo::new(McuType::PIC32, 0x7C000, 0x1000);
        let image = registry.construct(&info).unwrap();
        assert_eq!(image.flash_mem_offset(), 0x9D00_0000);
    }

    /// INFO record of an MMB MX7 board
    const MMB_MX7_INFO: &str = "380114000300001004000002050000130600000000c0079d07\
        4d4d42204d58370000000000000000000000000000000008000000000008\
        000000000000000000";

    fn unhex(s: &str) -> Vec<u8> {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_pic32_virtual_boot_start() {
        let info = BootInfo::parse(&unhex(MMB_MX7_INFO)).unwrap();
        assert_eq!(info.boot_start, 0x9D07_C000);

        let registry = Registry::with_profiles(parse_profiles(PROFILES).unwrap()).unwrap();
        let mut image = registry.construct(&info).unwrap();
        assert_eq!(image.boot_start(), 0x7C000);
        assert_eq!(image.block_count(), 0x7C);
        assert_eq!(image.block_addr(0x7C), 0x7C000);

        image.write(0x9D00_1000, &[0x55; 4]).unwrap();
        assert!(image.is_dirty(1));
        assert_eq!(
            image.write(0x9D07_C000, &[0]),
            Err(Error::AddressOutOfRange { addr: 0x9D07_C000 })
        );
    }

    #[test]
    fn test_layout_larger_than_flash() {
        // Physical base with a virtual BootStart leaves 2 GiB below the
        // bootloader; the reported 512 KiB Flash size rules that out.
        let info = BootInfo::parse(&unhex(MMB_MX7_INFO)).unwrap();
        let variants = parse_profiles(
            r#"
[[variant]]
name = "pic32-phys"
mcus = ["PIC32"]
flash_base = 0x1D000000
"#,
        )
        .unwrap();
        assert_eq!(
            variants[0].build(&info).unwrap_err(),
            Error::GeometryMismatch {
                expected: 0x80000,
                actual: 0x8007_C000
            }
        );
    }

    #[test]
    fn test_thumb_patch() {
        let variants = parse_profiles(
            r#"
[[variant]]
name = "m0"
mcus = ["PIC18"]
patch = "thumb"
"#,
        )
        .unwrap();
        assert_eq!(variants[0].patch.name(), "thumb");
        assert_eq!(variants[0].geometry.flash_mem_offset(), 0);
    }

    #[test]
    fn test_rejects_bad_profiles() {
        let unknown_mcu = r#"
[[variant]]
name = "x"
mcus = ["Z80"]
"#;
        assert_eq!(parse_profiles(unknown_mcu).unwrap_err(), Error::UnknownMcuName);

        let bad_patch = r#"
[[variant]]
name = "x"
mcus = ["PIC32"]
patch = "jump"
"#;
        assert_eq!(parse_profiles(bad_patch).unwrap_err(), Error::ProfileParse);

        assert_eq!(
            load_profiles("/nonexistent/uhbflash-profiles.toml").unwrap_err(),
            Error::ProfileIo
        );
    }
}
