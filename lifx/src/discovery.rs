//! Finding bulbs with a broadcast GetService.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lifx_core::{HardwareAddress, Message, RawMessage, Service};
use log::{debug, info, trace};

use crate::config::ClientConfig;
use crate::device::Device;
use crate::error::Result;
use crate::transport::Transport;

/// Broadcasts GetService and listens for `window`.
///
/// Each hardware address yields one device.  If the same bulb answers from more than one
/// address, the first address heard is kept.  No answers at all is an empty list, not an error.
pub fn discover(
    transport: &Arc<Transport>,
    config: &ClientConfig,
    window: Duration,
) -> Result<Vec<Device>> {
    let replies = transport.broadcast(Message::GetService, window)?;
    debug!(
        "Discovering for {:?} with seq {}",
        window,
        replies.sequence()
    );

    let mut order = Vec::new();
    let mut found: HashMap<HardwareAddress, SocketAddr> = HashMap::new();
    for reply in replies {
        let (sender, raw) = reply?;
        let (hw, addr) = match service_addr(&raw, sender) {
            Some(pair) => pair,
            None => continue,
        };
        match found.get(&hw) {
            Some(first) if *first != addr => {
                debug!("{} also answered from {}, keeping {}", hw, addr, first);
            }
            Some(_) => {}
            None => {
                trace!("Found {} at {}", hw, addr);
                found.insert(hw, addr);
                order.push(hw);
            }
        }
    }

    info!("Discovered {} device(s)", order.len());
    Ok(order
        .into_iter()
        .map(|hw| Device::discovered(hw, found[&hw], transport.clone(), config))
        .collect())
}

/// Pulls the device identity and UDP endpoint out of a StateService reply.
fn service_addr(raw: &RawMessage, sender: SocketAddr) -> Option<(HardwareAddress, SocketAddr)> {
    let port = match Message::from_raw(raw) {
        Ok(Message::StateService {
            port,
            service: Service::UDP,
        }) => port,
        Ok(other) => {
            trace!("Ignoring message type {} during discovery", other.get_num());
            return None;
        }
        Err(e) => {
            debug!("Bad discovery reply from {}: {}", sender, e);
            return None;
        }
    };
    // port 0 means the service is currently unavailable
    let port = match u16::try_from(port) {
        Ok(0) | Err(_) => return None,
        Ok(port) => port,
    };
    let hw = HardwareAddress::from_target(raw.frame_addr.target)?;
    Some((hw, SocketAddr::new(sender.ip(), port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_config, Behaviour, FakeBulb};
    use std::net::{Ipv4Addr, UdpSocket};

    fn hw(last: u8) -> HardwareAddress {
        HardwareAddress::new([0xd0, 0x73, 0xd5, 0x00, 0x00, last])
    }

    fn run(broadcast_addrs: Vec<SocketAddr>) -> Vec<Device> {
        let config = test_config(broadcast_addrs);
        let transport = Arc::new(Transport::bind(&config).unwrap());
        discover(&transport, &config, config.discovery_window).unwrap()
    }

    #[test]
    fn finds_every_bulb() {
        let a = FakeBulb::spawn(hw(1), Behaviour::Normal);
        let b = FakeBulb::spawn(hw(2), Behaviour::Normal);

        let devices = run(vec![a.addr, b.addr]);
        let mut found: Vec<_> = devices
            .iter()
            .map(|d| (d.hardware_address(), d.addr()))
            .collect();
        found.sort_by_key(|(hw, _)| hw.target());
        assert_eq!(found, vec![(a.hw, Some(a.addr)), (b.hw, Some(b.addr))]);
        assert!(devices.iter().all(|d| d.state().last_seen.is_some()));
        assert_eq!(a.received(), vec![Message::GetService]);
    }

    #[test]
    fn nothing_answering_is_empty() {
        // bound, so the datagram is accepted, but never read
        let hole = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        assert!(run(vec![hole.local_addr().unwrap()]).is_empty());

        let silent = FakeBulb::spawn(hw(3), Behaviour::Silent);
        assert!(run(vec![silent.addr]).is_empty());
        assert_eq!(silent.received(), vec![Message::GetService]);
    }

    #[test]
    fn duplicate_hardware_address_keeps_first() {
        let first = FakeBulb::spawn(hw(4), Behaviour::Normal);
        let second = FakeBulb::spawn(hw(4), Behaviour::Delayed(Duration::from_millis(100)));

        let devices = run(vec![first.addr, second.addr]);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].hardware_address(), hw(4));
        assert_eq!(devices[0].addr(), Some(first.addr));
        assert_eq!(second.received(), vec![Message::GetService]);
    }

    #[test]
    fn discovered_devices_are_usable() {
        let bulb = FakeBulb::spawn(hw(5), Behaviour::Normal);
        let mut devices = run(vec![bulb.addr]);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].get_label().unwrap(), "Fake");
    }
}
