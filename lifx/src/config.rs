//! Client configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use lifx_core::LIFX_PORT;
use rand::Rng;

/// Settings shared by the transport, discovery and every device handle.
///
/// Nothing in this crate reads global state; build one of these and hand it to
/// [crate::Client::new].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Local address for the UDP socket.  Port 0 lets the OS pick one.
    pub bind_addr: SocketAddr,
    /// Port bulbs listen on.
    pub port: u16,
    /// Where broadcasts go.  When empty, every IPv4 interface's broadcast address is used.
    pub broadcast_addrs: Vec<SocketAddr>,
    /// Client identifier put in every packet.  Must be non-zero, or bulbs broadcast their
    /// replies instead of answering us directly.
    pub source: u32,
    /// How long a request waits for its reply.
    pub timeout: Duration,
    /// How long discovery listens for StateService replies.
    pub discovery_window: Duration,
    /// How many times a getter is re-sent after a timeout.  Setters are never retried.
    pub retries: u32,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            port: LIFX_PORT,
            broadcast_addrs: Vec::new(),
            source: rand::thread_rng().gen_range(1..=u32::MAX),
            timeout: Duration::from_secs(1),
            discovery_window: Duration::from_secs(1),
            retries: 2,
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> ClientConfig {
        self.timeout = timeout;
        self
    }

    pub fn with_discovery_window(mut self, window: Duration) -> ClientConfig {
        self.discovery_window = window;
        self
    }

    pub fn with_broadcast_addrs(mut self, addrs: Vec<SocketAddr>) -> ClientConfig {
        self.broadcast_addrs = addrs;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> ClientConfig {
        self.retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 56700);
        assert_ne!(config.source, 0);
        assert_eq!(config.bind_addr.port(), 0);
        assert!(config.broadcast_addrs.is_empty());

        let config = config.with_retries(0).with_timeout(Duration::from_millis(10));
        assert_eq!(config.retries, 0);
        assert_eq!(config.timeout, Duration::from_millis(10));
    }
}
