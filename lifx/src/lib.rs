//! A client for controlling LIFX bulbs over the LAN protocol.
//!
//! There are a few levels you can use:
//!
//!  * [lifx_core] encodes and decodes the packets themselves.
//!  * [Transport] owns the UDP socket and matches replies to the requests waiting for them.
//!  * [Client] and [Device] are what most programs want: discover bulbs, then query or change
//!  them one request at a time.
//!
//! ```no_run
//! use lifx::{Client, ClientConfig};
//!
//! # fn main() -> lifx::Result<()> {
//! let client = Client::new(ClientConfig::default())?;
//! for mut bulb in client.discover()? {
//!     let label = bulb.get_label()?;
//!     bulb.set_power(true, 500)?;
//!     println!("turned on {}", label);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Nothing here spawns threads.  Every call blocks until its reply arrives or its timeout
//! passes, and a [Client] (or the [Transport] inside it) can be shared between threads.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub use lifx_core::{HardwareAddress, HSBK};

mod config;
mod device;
mod discovery;
mod error;
mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use config::ClientConfig;
pub use device::{
    ColorState, ColorUpdate, Device, DeviceSnapshot, DeviceState, FirmwareInfo, Membership,
    RuntimeInfo, SignalInfo, VersionInfo,
};
pub use discovery::discover;
pub use error::{Error, Result};
pub use transport::{Broadcast, Expect, Transport};

/// A bound socket plus the settings every device handle inherits.
pub struct Client {
    transport: Arc<Transport>,
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Client> {
        let transport = Arc::new(Transport::bind(&config)?);
        Ok(Client { transport, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Discovers bulbs for the configured discovery window.
    pub fn discover(&self) -> Result<Vec<Device>> {
        self.discover_for(self.config.discovery_window)
    }

    pub fn discover_for(&self, window: Duration) -> Result<Vec<Device>> {
        discover(&self.transport, &self.config, window)
    }

    /// A handle for a bulb whose address isn't known yet.
    ///
    /// Requests are broadcast with the target set, so only this bulb answers; its address is
    /// remembered after the first reply.
    pub fn device(&self, hw: HardwareAddress) -> Device {
        Device::new(hw, None, self.transport.clone(), &self.config)
    }

    /// A handle for a bulb at a known address.
    pub fn device_at(&self, hw: HardwareAddress, addr: SocketAddr) -> Device {
        Device::new(hw, Some(addr), self.transport.clone(), &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_config, Behaviour, FakeBulb};

    #[test]
    fn client_discovers_and_controls() {
        let hw: HardwareAddress = "d0:73:d5:01:02:03".parse().unwrap();
        let bulb = FakeBulb::spawn(hw, Behaviour::Normal);
        let client = Client::new(test_config(vec![bulb.addr])).unwrap();

        let devices = client.discover().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].hardware_address(), hw);

        let mut by_address = client.device_at(hw, bulb.addr);
        assert!(by_address.get_power().unwrap());

        let mut by_mac = client.device(hw);
        by_mac.set_power_with_response(false, 0).unwrap();
        assert_eq!(by_mac.addr(), Some(bulb.addr));
        assert_eq!(client.transport().outstanding(), 0);
    }
}
