//! Transport registration and dispatch
//!
//! A transport is selected with a string of the form `name` or
//! `name:key1=value1,key2=value2`, e.g. `hid:index=1` or
//! `dummy:mcu=STM32F4XX`.

use std::collections::HashMap;

use thiserror::Error;
use uhbflash_core::device::BootloaderDevice;

/// Information about a transport
pub struct TransportInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Errors from parsing or opening a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Malformed transport string
    #[error("Invalid parameter format: '{0}' (expected key=value)")]
    InvalidFormat(String),

    /// Transport name not known or not compiled in
    #[error("Unknown transport '{0}'")]
    UnknownTransport(String),

    /// Parameter not understood by the transport
    #[error("Transport '{transport}' does not take parameter '{key}'")]
    UnknownParameter {
        /// Transport name
        transport: String,
        /// Offending key
        key: String,
    },

    /// Parameter value could not be parsed
    #[error("Invalid value '{value}' for parameter '{key}'")]
    InvalidValue {
        /// Parameter name
        key: String,
        /// Offending value
        value: String,
    },

    /// USB HID transport error
    #[cfg(feature = "hid")]
    #[error(transparent)]
    Hid(#[from] uhbflash_hid::HidError),
}

/// Get information about all available transports (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_transports() -> Vec<TransportInfo> {
    let mut transports = Vec::new();

    #[cfg(feature = "hid")]
    transports.push(TransportInfo {
        name: "hid",
        aliases: &["usb"],
        description: "USB HID bootloader (VID:1234 PID:0001) (index=<n>)",
    });

    #[cfg(feature = "dummy")]
    transports.push(TransportInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory bootloader emulator for testing (mcu=<name>)",
    });

    transports
}

/// Find the canonical name of a transport by name or alias
pub fn find_transport(name: &str) -> Option<&'static str> {
    available_transports()
        .into_iter()
        .find(|t| t.name == name || t.aliases.contains(&name))
        .map(|t| t.name)
}

/// Parsed transport parameters
#[derive(Debug)]
pub struct TransportParams {
    /// Transport name as given
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

impl TransportParams {
    /// Fail on parameters other than `allowed`
    #[cfg(any(feature = "hid", feature = "dummy"))]
    fn check_keys(&self, allowed: &[&str]) -> Result<(), TransportError> {
        match self.params.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => Err(TransportError::UnknownParameter {
                transport: self.name.clone(),
                key: key.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Parse a transport string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_transport_params(s: &str) -> Result<TransportParams, TransportError> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            match opt.split_once('=') {
                Some((key, value)) => {
                    params.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => return Err(TransportError::InvalidFormat(opt.to_string())),
            }
        }
    }

    Ok(TransportParams {
        name: name.to_string(),
        params,
    })
}

/// Open the transport described by `spec`
pub fn open_transport(spec: &str) -> Result<Box<dyn BootloaderDevice>, TransportError> {
    let params = parse_transport_params(spec)?;
    let name = find_transport(&params.name)
        .ok_or_else(|| TransportError::UnknownTransport(params.name.clone()))?;

    match name {
        #[cfg(feature = "hid")]
        "hid" => open_hid(&params),
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&params),
        _ => Err(TransportError::UnknownTransport(params.name.clone())),
    }
}

#[cfg(feature = "hid")]
fn open_hid(params: &TransportParams) -> Result<Box<dyn BootloaderDevice>, TransportError> {
    params.check_keys(&["index"])?;
    let index = match params.params.get("index") {
        Some(value) => value.parse().map_err(|_| TransportError::InvalidValue {
            key: "index".to_string(),
            value: value.clone(),
        })?,
        None => 0,
    };
    let dev = uhbflash_hid::HidBootloader::open_nth(index)?;
    Ok(Box::new(dev))
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &TransportParams) -> Result<Box<dyn BootloaderDevice>, TransportError> {
    use uhbflash_core::bootinfo::McuType;
    use uhbflash_dummy::{DummyBootloader, DummyConfig};

    params.check_keys(&["mcu"])?;
    let config = match params.params.get("mcu") {
        Some(name) => {
            let mcu = McuType::from_name(name).ok_or_else(|| TransportError::InvalidValue {
                key: "mcu".to_string(),
                value: name.clone(),
            })?;
            DummyConfig::for_mcu(mcu)
        }
        None => DummyConfig::default(),
    };
    log::info!("Using dummy bootloader for {}", config.info.mcu_type);
    Ok(Box::new(DummyBootloader::new(config)))
}
