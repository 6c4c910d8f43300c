//! An in-process bulb on 127.0.0.1 for exercising the network code.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lifx_core::{
    BuildOptions, HardwareAddress, LifxIdent, LifxString, Message, PowerLevel, RawMessage,
    Service, HSBK,
};

use crate::config::ClientConfig;

/// Client settings pointing at fake bulbs instead of the LAN.
pub fn test_config(broadcast_addrs: Vec<SocketAddr>) -> ClientConfig {
    ClientConfig {
        bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        ..ClientConfig::default()
    }
    .with_broadcast_addrs(broadcast_addrs)
    .with_timeout(Duration::from_millis(500))
    .with_discovery_window(Duration::from_millis(300))
    .with_retries(0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behaviour {
    /// Answers everything straight away.
    Normal,
    /// Records requests, never answers.
    Silent,
    /// Answers every request after a pause.
    Delayed(Duration),
    /// Ignores the first `n` requests, then behaves normally.
    DropFirst(usize),
    /// Never answers messages of this type; everything else is answered.
    Ignores(u16),
}

#[derive(Debug, Clone)]
pub struct BulbState {
    pub label: String,
    pub power: PowerLevel,
    pub color: HSBK,
}

impl Default for BulbState {
    fn default() -> BulbState {
        BulbState {
            label: "Fake".to_owned(),
            power: PowerLevel::Enabled,
            color: HSBK {
                hue: 100,
                saturation: 200,
                brightness: 300,
                kelvin: 3500,
            },
        }
    }
}

pub struct FakeBulb {
    pub addr: SocketAddr,
    pub hw: HardwareAddress,
    received: Arc<Mutex<Vec<Message>>>,
    state: Arc<Mutex<BulbState>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeBulb {
    pub fn spawn(hw: HardwareAddress, behaviour: Behaviour) -> FakeBulb {
        FakeBulb::with_state(hw, behaviour, BulbState::default())
    }

    pub fn with_state(hw: HardwareAddress, behaviour: Behaviour, state: BulbState) -> FakeBulb {
        let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        sock.set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let addr = sock.local_addr().unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(Mutex::new(state));
        let stop = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            sock,
            hw,
            behaviour,
            received: received.clone(),
            state: state.clone(),
            seen: 0,
        };
        let thread_stop = stop.clone();
        let handle = thread::spawn(move || worker.run(&thread_stop));

        FakeBulb {
            addr,
            hw,
            received,
            state,
            stop,
            handle: Some(handle),
        }
    }

    /// Every message the bulb has decoded so far, in arrival order.
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }

    pub fn state(&self) -> BulbState {
        self.state.lock().unwrap().clone()
    }
}

impl Drop for FakeBulb {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    sock: UdpSocket,
    hw: HardwareAddress,
    behaviour: Behaviour,
    received: Arc<Mutex<Vec<Message>>>,
    state: Arc<Mutex<BulbState>>,
    seen: usize,
}

impl Worker {
    fn run(mut self, stop: &AtomicBool) {
        let mut buf = [0; 1024];
        while !stop.load(Ordering::SeqCst) {
            let (nbytes, from) = match self.sock.recv_from(&mut buf) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let raw = match RawMessage::unpack(&buf[..nbytes]) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            if raw.frame_addr.target != 0 && raw.frame_addr.target != self.hw.target() {
                continue;
            }
            let msg = match Message::from_raw(&raw) {
                Ok(msg) => msg,
                Err(_) => continue,
            };
            self.received.lock().unwrap().push(msg.clone());
            self.seen += 1;

            match self.behaviour {
                Behaviour::Silent => continue,
                Behaviour::DropFirst(n) if self.seen <= n => continue,
                Behaviour::Ignores(typ) if typ == msg.get_num() => continue,
                Behaviour::Delayed(pause) => thread::sleep(pause),
                _ => {}
            }

            for reply in self.answer(&raw, msg) {
                self.send(&raw, from, reply);
            }
        }
    }

    fn send(&self, request: &RawMessage, to: SocketAddr, reply: Message) {
        let opts = BuildOptions {
            target: Some(self.hw.target()),
            sequence: request.frame_addr.sequence,
            source: request.frame.source,
            ..BuildOptions::default()
        };
        let bytes = RawMessage::build(&opts, reply).unwrap().pack().unwrap();
        self.sock.send_to(&bytes, to).unwrap();
    }

    fn light_state(state: &BulbState) -> Message {
        Message::LightState {
            color: state.color,
            reserved: 0,
            power: state.power,
            label: LifxString::new(&state.label),
            reserved2: 0,
        }
    }

    fn answer(&self, raw: &RawMessage, msg: Message) -> Vec<Message> {
        let mut replies = Vec::new();
        if raw.frame_addr.ack_required {
            replies.push(Message::Acknowledgement {
                seq: raw.frame_addr.sequence,
            });
        }
        let res_required = raw.frame_addr.res_required;
        let mut state = self.state.lock().unwrap();

        let reply = match msg {
            Message::GetService => Some(Message::StateService {
                port: self.sock.local_addr().unwrap().port() as u32,
                service: Service::UDP,
            }),
            Message::GetPower => Some(Message::StatePower { level: state.power }),
            Message::SetPower { level } => {
                state.power = level;
                Some(Message::StatePower { level }).filter(|_| res_required)
            }
            Message::LightSetPower { level, .. } => {
                state.power = PowerLevel::from_bool(level > 0);
                Some(Message::LightStatePower { level }).filter(|_| res_required)
            }
            Message::GetLabel => Some(Message::StateLabel {
                label: LifxString::new(&state.label),
            }),
            Message::SetLabel { label } => {
                state.label = label.0.clone();
                Some(Message::StateLabel { label }).filter(|_| res_required)
            }
            Message::LightGet => Some(Self::light_state(&state)),
            Message::LightSetColor { mut color, .. } => {
                // real bulbs clamp what they're given; make the echo differ from the request
                color.brightness = color.brightness.min(60000);
                state.color = color;
                Some(Self::light_state(&state)).filter(|_| res_required)
            }
            Message::GetHostInfo => Some(Message::StateHostInfo {
                signal: 1e-5,
                tx: 1200,
                rx: 3400,
                reserved: 0,
            }),
            Message::GetWifiInfo => Some(Message::StateWifiInfo {
                signal: 2e-5,
                tx: 5600,
                rx: 7800,
                reserved: 0,
            }),
            Message::GetHostFirmware => Some(Message::StateHostFirmware {
                build: 1_500_000_000_000_000_000,
                reserved: 0,
                version: (2 << 16) | 80,
            }),
            Message::GetWifiFirmware => Some(Message::StateWifiFirmware {
                build: 1_400_000_000_000_000_000,
                reserved: 0,
                version: (1 << 16) | 2,
            }),
            Message::GetVersion => Some(Message::StateVersion {
                vendor: 1,
                product: 27,
                version: 0,
            }),
            Message::GetInfo => Some(Message::StateInfo {
                time: 1_600_000_000_000_000_000,
                uptime: 3_600_000_000_000,
                downtime: 5_000_000_000,
            }),
            Message::GetLocation => Some(Message::StateLocation {
                location: LifxIdent([0xab; 16]),
                label: LifxString::new("Home"),
                updated_at: 42,
            }),
            Message::GetGroup => Some(Message::StateGroup {
                group: LifxIdent([0xcd; 16]),
                label: LifxString::new("Kitchen"),
                updated_at: 43,
            }),
            _ => None,
        };
        replies.extend(reply);
        replies
    }
}
