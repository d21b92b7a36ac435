//! Alpaca Mount Backend
//!
//! Drives a networked mount over the ASCOM Alpaca REST API. [`AlpacaMount`]
//! plugs into the flip core twice: as the [`safeflip_link::MountMediator`]
//! the safe-time link queries, and as the
//! [`safeflip_sequencer::TelescopeOps`] the flip sequence slews with.

mod client;
mod mount;
mod telescope;

pub use client::*;
pub use mount::*;
pub use telescope::*;

/// Alpaca API version
pub const ALPACA_API_VERSION: u32 = 1;

/// Default Alpaca API port
pub const ALPACA_DEFAULT_PORT: u16 = 11111;

/// Device type segment used in every telescope URL
pub const TELESCOPE_DEVICE_TYPE: &str = "telescope";

/// A telescope exposed by an Alpaca server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlpacaDevice {
    pub device_number: u32,
    pub device_name: String,
    pub base_url: String,
}

impl AlpacaDevice {
    pub fn new(base_url: impl Into<String>, device_number: u32) -> Self {
        Self {
            device_number,
            device_name: String::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get a unique identifier for this device
    pub fn id(&self) -> String {
        format!("alpaca:{}:{}:{}", self.base_url, TELESCOPE_DEVICE_TYPE, self.device_number)
    }

    pub fn display_name(&self) -> String {
        if self.device_name.is_empty() {
            format!("Telescope #{}", self.device_number)
        } else {
            self.device_name.clone()
        }
    }
}

impl std::fmt::Display for AlpacaDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.display_name(), self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_identity() {
        let device = AlpacaDevice::new("http://192.168.1.20:11111/", 0);
        assert_eq!(device.base_url, "http://192.168.1.20:11111");
        assert_eq!(device.id(), "alpaca:http://192.168.1.20:11111:telescope:0");
        assert_eq!(device.to_string(), "Telescope #0 at http://192.168.1.20:11111");
    }
}
