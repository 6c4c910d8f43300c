//! A handle to a single bulb.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use lifx_core::{
    check_component, check_kelvin, get_product_info, HardwareAddress, LifxIdent, LifxString,
    Message, PowerLevel, HSBK,
};
use log::{debug, warn};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::transport::{Expect, Transport};

/// Color, power and label, as reported by a bulb's State message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorState {
    pub color: HSBK,
    pub power: bool,
    pub label: String,
}

impl fmt::Display for ColorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Label: {}", self.label)?;
        writeln!(f, "Power: {}", if self.power { "on" } else { "off" })?;
        write!(
            f,
            "Color: {} (hue {} saturation {} brightness {} kelvin {})",
            self.color.describe(false),
            self.color.hue,
            self.color.saturation,
            self.color.brightness,
            self.color.kelvin
        )
    }
}

/// Radio statistics (StateHostInfo / StateWifiInfo).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalInfo {
    /// milliwatts
    pub signal: f32,
    pub tx: u32,
    pub rx: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareInfo {
    /// nanoseconds since the epoch
    pub build: u64,
    pub version: u32,
}

impl FirmwareInfo {
    pub fn major(&self) -> u16 {
        (self.version >> 16) as u16
    }

    pub fn minor(&self) -> u16 {
        (self.version & 0xffff) as u16
    }
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub vendor: u32,
    pub product: u32,
    pub version: u32,
    /// From the built in product table, when the product is known.
    pub product_name: Option<&'static str>,
}

/// StateInfo; all values in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    pub time: u64,
    pub uptime: u64,
    pub downtime: u64,
}

/// A location or group the bulb belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub id: String,
    pub label: String,
    pub updated_at: u64,
}

impl Membership {
    fn new(id: LifxIdent, label: LifxString, updated_at: u64) -> Membership {
        Membership {
            id: id.to_string(),
            label: label.0,
            updated_at,
        }
    }
}

/// Whatever the getters have seen most recently.
///
/// This is informational only: every getter goes to the bulb, and a field stays `None` until
/// the matching getter has succeeded at least once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<HSBK>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_info: Option<SignalInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_firmware: Option<FirmwareInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_info: Option<SignalInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_firmware: Option<FirmwareInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<RuntimeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Membership>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Membership>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Local>>,
}

/// A serializable copy of a device's identity and cached state.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub hardware_address: HardwareAddress,
    pub address: Option<SocketAddr>,
    #[serde(flatten)]
    pub state: DeviceState,
}

/// A color change where any component may be left as it is.
///
/// Values are wider than the wire fields so out of range input can be rejected instead of
/// silently wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorUpdate {
    pub hue: Option<u32>,
    pub saturation: Option<u32>,
    pub brightness: Option<u32>,
    pub kelvin: Option<u32>,
}

impl ColorUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ColorUpdate::default()
    }

    /// Checks every supplied component.
    pub fn validate(&self) -> Result<()> {
        if let Some(h) = self.hue {
            check_component("hue", h)?;
        }
        if let Some(s) = self.saturation {
            check_component("saturation", s)?;
        }
        if let Some(b) = self.brightness {
            check_component("brightness", b)?;
        }
        if let Some(k) = self.kelvin {
            check_kelvin(k)?;
        }
        Ok(())
    }

    /// The full color, if every component was supplied.
    pub fn complete(&self) -> Result<Option<HSBK>> {
        match (self.hue, self.saturation, self.brightness, self.kelvin) {
            (Some(h), Some(s), Some(b), Some(k)) => Ok(Some(HSBK::checked(h, s, b, k)?)),
            _ => Ok(None),
        }
    }

    /// Overlays the supplied components on `base`.
    pub fn apply_to(&self, base: HSBK) -> Result<HSBK> {
        Ok(HSBK {
            hue: self.hue.map_or(Ok(base.hue), |h| check_component("hue", h))?,
            saturation: self
                .saturation
                .map_or(Ok(base.saturation), |s| check_component("saturation", s))?,
            brightness: self
                .brightness
                .map_or(Ok(base.brightness), |b| check_component("brightness", b))?,
            kelvin: self.kelvin.map_or(Ok(base.kelvin), check_kelvin)?,
        })
    }
}

fn unexpected(expected: &'static str, got: &Message) -> Error {
    Error::UnexpectedMessage {
        expected,
        got: got.get_num(),
    }
}

/// One bulb, addressed by hardware address.
///
/// Handles come from [crate::Client::discover] or are built directly with
/// [crate::Client::device].  A handle without a known network address sends to the broadcast
/// addresses (with its target set) and remembers where the first reply came from.
pub struct Device {
    hw: HardwareAddress,
    addr: Option<SocketAddr>,
    transport: Arc<Transport>,
    timeout: Duration,
    retries: u32,
    state: DeviceState,
}

impl Device {
    pub(crate) fn new(
        hw: HardwareAddress,
        addr: Option<SocketAddr>,
        transport: Arc<Transport>,
        config: &ClientConfig,
    ) -> Device {
        Device {
            hw,
            addr,
            transport,
            timeout: config.timeout,
            retries: config.retries,
            state: DeviceState::default(),
        }
    }

    pub(crate) fn discovered(
        hw: HardwareAddress,
        addr: SocketAddr,
        transport: Arc<Transport>,
        config: &ClientConfig,
    ) -> Device {
        let mut device = Device::new(hw, Some(addr), transport, config);
        device.state.last_seen = Some(Local::now());
        device
    }

    pub fn hardware_address(&self) -> HardwareAddress {
        self.hw
    }

    /// Last known network address.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            hardware_address: self.hw,
            address: self.addr,
            state: self.state.clone(),
        }
    }

    fn exchange(&mut self, msg: Message, expect: Expect) -> Result<Message> {
        let (from, raw) = self
            .transport
            .request(self.addr, Some(self.hw), msg, expect, self.timeout)?;
        if self.addr != Some(from) {
            debug!("{} answered from {}", self.hw, from);
            self.addr = Some(from);
        }
        self.state.last_seen = Some(Local::now());
        Ok(Message::from_raw(&raw)?)
    }

    /// Request/response for getters, re-sent on timeout up to the configured number of retries.
    fn query(&mut self, msg: Message) -> Result<Message> {
        let mut attempt = 0;
        loop {
            match self.exchange(msg.clone(), Expect::Response) {
                Err(e) if e.is_timeout() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "{}: no reply to message type {}, retrying ({}/{})",
                        self.hw,
                        msg.get_num(),
                        attempt,
                        self.retries
                    );
                }
                other => return other,
            }
        }
    }

    fn send(&self, msg: Message) -> Result<()> {
        self.transport.send(self.addr, Some(self.hw), msg)
    }

    fn color_state(&mut self, color: HSBK, power: PowerLevel, label: LifxString) -> ColorState {
        let state = ColorState {
            color,
            power: power.is_on(),
            label: label.0,
        };
        self.state.color = Some(state.color);
        self.state.power = Some(state.power);
        self.state.label = Some(state.label.clone());
        state
    }

    pub fn get_label(&mut self) -> Result<String> {
        match self.query(Message::GetLabel)? {
            Message::StateLabel { label } => {
                self.state.label = Some(label.0.clone());
                Ok(label.0)
            }
            other => Err(unexpected("StateLabel", &other)),
        }
    }

    /// Renames the bulb (labels longer than 32 bytes are truncated) and returns the label the
    /// bulb reports back.
    pub fn set_label(&mut self, label: &str) -> Result<String> {
        let msg = Message::SetLabel {
            label: LifxString::new(label),
        };
        match self.exchange(msg, Expect::Response)? {
            Message::StateLabel { label } => {
                self.state.label = Some(label.0.clone());
                Ok(label.0)
            }
            other => Err(unexpected("StateLabel", &other)),
        }
    }

    pub fn get_power(&mut self) -> Result<bool> {
        match self.query(Message::GetPower)? {
            Message::StatePower { level } => {
                self.state.power = Some(level.is_on());
                Ok(level.is_on())
            }
            other => Err(unexpected("StatePower", &other)),
        }
    }

    /// Turns the bulb on or off, fading over `duration_ms` milliseconds (0 is immediate).
    ///
    /// Returns once the request is sent; nothing is read back.
    pub fn set_power(&self, on: bool, duration_ms: u32) -> Result<()> {
        let msg = if duration_ms == 0 {
            Message::SetPower {
                level: PowerLevel::from_bool(on),
            }
        } else {
            Message::LightSetPower {
                level: PowerLevel::from_bool(on) as u16,
                duration: duration_ms,
            }
        };
        self.send(msg)
    }

    /// Like [Device::set_power], but waits for the bulb to report its power level.
    pub fn set_power_with_response(&mut self, on: bool, duration_ms: u32) -> Result<bool> {
        let msg = Message::LightSetPower {
            level: PowerLevel::from_bool(on) as u16,
            duration: duration_ms,
        };
        match self.exchange(msg, Expect::Response)? {
            Message::LightStatePower { level } => {
                self.state.power = Some(level > 0);
                Ok(level > 0)
            }
            other => Err(unexpected("LightStatePower", &other)),
        }
    }

    pub fn get_color(&mut self) -> Result<ColorState> {
        match self.query(Message::LightGet)? {
            Message::LightState {
                color,
                power,
                label,
                ..
            } => Ok(self.color_state(color, power, label)),
            other => Err(unexpected("LightState", &other)),
        }
    }

    /// Changes the color, fading over `duration_ms` milliseconds.  Returns once the request is
    /// sent.
    pub fn set_color(&self, color: HSBK, duration_ms: u32) -> Result<()> {
        color.validate()?;
        self.send(Message::LightSetColor {
            reserved: 0,
            color,
            duration: duration_ms,
        })
    }

    /// Changes the color and returns the state the bulb reports afterwards.
    ///
    /// Bulbs clamp colors to what they can display, so the returned color is the one actually
    /// applied and may differ from `color`.
    pub fn set_color_with_response(&mut self, color: HSBK, duration_ms: u32) -> Result<ColorState> {
        color.validate()?;
        let msg = Message::LightSetColor {
            reserved: 0,
            color,
            duration: duration_ms,
        };
        match self.exchange(msg, Expect::Response)? {
            Message::LightState {
                color,
                power,
                label,
                ..
            } => Ok(self.color_state(color, power, label)),
            other => Err(unexpected("LightState", &other)),
        }
    }

    /// Applies a partial color change.
    ///
    /// Components left out of `update` keep the bulb's current value, which is read first
    /// unless all four are given.  Everything is validated before anything is sent.
    pub fn update_color(&mut self, update: &ColorUpdate, duration_ms: u32) -> Result<ColorState> {
        update.validate()?;
        let color = match update.complete()? {
            Some(color) => color,
            None => {
                let current = self.get_color()?.color;
                update.apply_to(current)?
            }
        };
        self.set_color_with_response(color, duration_ms)
    }

    pub fn get_host_info(&mut self) -> Result<SignalInfo> {
        match self.query(Message::GetHostInfo)? {
            Message::StateHostInfo { signal, tx, rx, .. } => {
                let info = SignalInfo { signal, tx, rx };
                self.state.host_info = Some(info);
                Ok(info)
            }
            other => Err(unexpected("StateHostInfo", &other)),
        }
    }

    pub fn get_wifi_info(&mut self) -> Result<SignalInfo> {
        match self.query(Message::GetWifiInfo)? {
            Message::StateWifiInfo { signal, tx, rx, .. } => {
                let info = SignalInfo { signal, tx, rx };
                self.state.wifi_info = Some(info);
                Ok(info)
            }
            other => Err(unexpected("StateWifiInfo", &other)),
        }
    }

    pub fn get_host_firmware(&mut self) -> Result<FirmwareInfo> {
        match self.query(Message::GetHostFirmware)? {
            Message::StateHostFirmware { build, version, .. } => {
                let fw = FirmwareInfo { build, version };
                self.state.host_firmware = Some(fw);
                Ok(fw)
            }
            other => Err(unexpected("StateHostFirmware", &other)),
        }
    }

    pub fn get_wifi_firmware(&mut self) -> Result<FirmwareInfo> {
        match self.query(Message::GetWifiFirmware)? {
            Message::StateWifiFirmware { build, version, .. } => {
                let fw = FirmwareInfo { build, version };
                self.state.wifi_firmware = Some(fw);
                Ok(fw)
            }
            other => Err(unexpected("StateWifiFirmware", &other)),
        }
    }

    pub fn get_version(&mut self) -> Result<VersionInfo> {
        match self.query(Message::GetVersion)? {
            Message::StateVersion {
                vendor,
                product,
                version,
            } => {
                let info = VersionInfo {
                    vendor,
                    product,
                    version,
                    product_name: get_product_info(vendor, product).map(|p| p.name),
                };
                self.state.version = Some(info.clone());
                Ok(info)
            }
            other => Err(unexpected("StateVersion", &other)),
        }
    }

    pub fn get_info(&mut self) -> Result<RuntimeInfo> {
        match self.query(Message::GetInfo)? {
            Message::StateInfo {
                time,
                uptime,
                downtime,
            } => {
                let info = RuntimeInfo {
                    time,
                    uptime,
                    downtime,
                };
                self.state.info = Some(info);
                Ok(info)
            }
            other => Err(unexpected("StateInfo", &other)),
        }
    }

    pub fn get_location(&mut self) -> Result<Membership> {
        match self.query(Message::GetLocation)? {
            Message::StateLocation {
                location,
                label,
                updated_at,
            } => {
                let location = Membership::new(location, label, updated_at);
                self.state.location = Some(location.clone());
                Ok(location)
            }
            other => Err(unexpected("StateLocation", &other)),
        }
    }

    pub fn get_group(&mut self) -> Result<Membership> {
        match self.query(Message::GetGroup)? {
            Message::StateGroup {
                group,
                label,
                updated_at,
            } => {
                let group = Membership::new(group, label, updated_at);
                self.state.group = Some(group.clone());
                Ok(group)
            }
            other => Err(unexpected("StateGroup", &other)),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Device")
            .field("hw", &self.hw)
            .field("addr", &self.addr)
            .field("state", &self.state)
            .finish()
    }
}

fn nanos(ns: u64) -> Duration {
    Duration::from_nanos(ns)
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = &self.state;
        match self.addr {
            Some(addr) => writeln!(f, "Bulb {} ({})", self.hw, addr)?,
            None => writeln!(f, "Bulb {}", self.hw)?,
        }
        if let Some(label) = &s.label {
            writeln!(f, "  Label: {}", label)?;
        }
        if let Some(power) = s.power {
            writeln!(f, "  Power: {}", if power { "on" } else { "off" })?;
        }
        if let Some(color) = &s.color {
            writeln!(
                f,
                "  Color: {} (hue {} saturation {} brightness {} kelvin {})",
                color.describe(false),
                color.hue,
                color.saturation,
                color.brightness,
                color.kelvin
            )?;
        }
        if let Some(info) = &s.host_info {
            writeln!(
                f,
                "  Host: signal {:e} mW, tx {} rx {}",
                info.signal, info.tx, info.rx
            )?;
        }
        if let Some(fw) = &s.host_firmware {
            writeln!(f, "  Host firmware: {}", fw)?;
        }
        if let Some(info) = &s.wifi_info {
            writeln!(
                f,
                "  Wifi: signal {:e} mW, tx {} rx {}",
                info.signal, info.tx, info.rx
            )?;
        }
        if let Some(fw) = &s.wifi_firmware {
            writeln!(f, "  Wifi firmware: {}", fw)?;
        }
        if let Some(v) = &s.version {
            writeln!(
                f,
                "  Version: vendor {} product {} ({}) hardware {}",
                v.vendor,
                v.product,
                v.product_name.unwrap_or("unknown model"),
                v.version
            )?;
        }
        if let Some(info) = &s.info {
            writeln!(
                f,
                "  Uptime: {:?}, last downtime: {:?}",
                nanos(info.uptime),
                nanos(info.downtime)
            )?;
        }
        if let Some(loc) = &s.location {
            writeln!(f, "  Location: {} ({})", loc.label, loc.id)?;
        }
        if let Some(group) = &s.group {
            writeln!(f, "  Group: {} ({})", group.label, group.id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_config, Behaviour, BulbState, FakeBulb};

    fn hw() -> HardwareAddress {
        "56:84:7a:fe:97:99".parse().unwrap()
    }

    fn device_for(bulb: &FakeBulb, config: ClientConfig) -> Device {
        let transport = Arc::new(Transport::bind(&config).unwrap());
        Device::new(bulb.hw, Some(bulb.addr), transport, &config)
    }

    fn light_messages(bulb: &FakeBulb) -> Vec<Message> {
        bulb.received()
            .into_iter()
            .filter(|m| matches!(m, Message::LightSetColor { .. } | Message::LightGet))
            .collect()
    }

    #[test]
    fn partial_color_update_keeps_other_components() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Normal);
        let mut device = device_for(&bulb, test_config(vec![]));

        let update = ColorUpdate {
            kelvin: Some(4000),
            ..ColorUpdate::default()
        };
        let state = device.update_color(&update, 0).unwrap();

        assert_eq!(
            light_messages(&bulb),
            vec![
                Message::LightGet,
                Message::LightSetColor {
                    reserved: 0,
                    color: HSBK {
                        hue: 100,
                        saturation: 200,
                        brightness: 300,
                        kelvin: 4000
                    },
                    duration: 0,
                }
            ]
        );
        assert_eq!(state.color.kelvin, 4000);
        assert_eq!(device.state().color, Some(state.color));
    }

    #[test]
    fn full_color_update_skips_the_read() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Normal);
        let mut device = device_for(&bulb, test_config(vec![]));

        let update = ColorUpdate {
            hue: Some(1),
            saturation: Some(2),
            brightness: Some(3),
            kelvin: Some(9000),
        };
        device.update_color(&update, 250).unwrap();
        assert_eq!(
            light_messages(&bulb),
            vec![Message::LightSetColor {
                reserved: 0,
                color: HSBK {
                    hue: 1,
                    saturation: 2,
                    brightness: 3,
                    kelvin: 9000
                },
                duration: 250,
            }]
        );
    }

    #[test]
    fn echoed_color_is_what_the_bulb_applied() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Normal);
        let mut device = device_for(&bulb, test_config(vec![]));

        let asked = HSBK {
            hue: 0,
            saturation: 0,
            brightness: 65535,
            kelvin: 2700,
        };
        let state = device.set_color_with_response(asked, 0).unwrap();
        // the fake bulb caps brightness
        assert_eq!(state.color.brightness, 60000);
        assert_eq!(bulb.state().color.brightness, 60000);
    }

    #[test]
    fn invalid_colors_never_reach_the_wire() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Normal);
        let mut device = device_for(&bulb, test_config(vec![]));

        let too_warm = ColorUpdate {
            kelvin: Some(2499),
            ..ColorUpdate::default()
        };
        assert!(device.update_color(&too_warm, 0).unwrap_err().is_validation());

        let too_much_hue = ColorUpdate {
            hue: Some(65536),
            ..ColorUpdate::default()
        };
        assert!(device
            .update_color(&too_much_hue, 0)
            .unwrap_err()
            .is_validation());

        let bad = HSBK {
            hue: 0,
            saturation: 0,
            brightness: 0,
            kelvin: 9001,
        };
        assert!(device.set_color(bad, 0).unwrap_err().is_validation());
        assert!(device
            .set_color_with_response(bad, 0)
            .unwrap_err()
            .is_validation());

        // give a stray datagram time to show up
        std::thread::sleep(Duration::from_millis(100));
        assert!(bulb.received().is_empty());
    }

    #[test]
    fn color_update_boundaries() {
        let base = HSBK {
            hue: 100,
            saturation: 200,
            brightness: 300,
            kelvin: 3500,
        };
        let update = |hue, kelvin| ColorUpdate {
            hue,
            kelvin,
            ..ColorUpdate::default()
        };
        assert!(update(None, Some(2500)).apply_to(base).is_ok());
        assert!(update(None, Some(9000)).apply_to(base).is_ok());
        assert!(update(None, Some(2499)).validate().is_err());
        assert!(update(Some(65535), None).validate().is_ok());
        assert!(update(Some(65536), None).validate().is_err());
        assert_eq!(update(None, None).apply_to(base).unwrap(), base);
        assert!(update(None, None).is_empty());
        assert_eq!(update(Some(1), None).complete().unwrap(), None);
    }

    #[test]
    fn set_power_picks_message_by_duration() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Normal);
        let device = device_for(&bulb, test_config(vec![]));

        device.set_power(false, 0).unwrap();
        device.set_power(true, 1500).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(
            bulb.received(),
            vec![
                Message::SetPower {
                    level: PowerLevel::Standby
                },
                Message::LightSetPower {
                    level: 65535,
                    duration: 1500
                },
            ]
        );
        assert_eq!(bulb.state().power, PowerLevel::Enabled);
    }

    #[test]
    fn set_power_with_response() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Normal);
        let mut device = device_for(&bulb, test_config(vec![]));

        assert!(!device.set_power_with_response(false, 0).unwrap());
        assert_eq!(device.state().power, Some(false));
        assert!(!device.get_power().unwrap());
    }

    #[test]
    fn getters_fill_the_cache() {
        let bulb = FakeBulb::with_state(
            hw(),
            Behaviour::Normal,
            BulbState {
                label: "Porch".to_owned(),
                ..BulbState::default()
            },
        );
        let mut device = device_for(&bulb, test_config(vec![]));
        assert!(device.state().label.is_none());

        assert_eq!(device.get_label().unwrap(), "Porch");
        assert_eq!(device.set_label("Back porch").unwrap(), "Back porch");
        assert!(device.get_power().unwrap());

        let fw = device.get_host_firmware().unwrap();
        assert_eq!((fw.major(), fw.minor()), (2, 80));
        assert_eq!(fw.to_string(), "2.80");
        assert_eq!(device.get_wifi_firmware().unwrap().to_string(), "1.2");
        assert_eq!(device.get_host_info().unwrap().tx, 1200);
        assert_eq!(device.get_wifi_info().unwrap().rx, 7800);

        let version = device.get_version().unwrap();
        assert_eq!(version.product_name, Some("LIFX A19"));
        assert_eq!(device.get_info().unwrap().downtime, 5_000_000_000);
        assert_eq!(device.get_location().unwrap().label, "Home");
        let group = device.get_group().unwrap();
        assert_eq!(group.label, "Kitchen");
        assert_eq!(group.id, "cd".repeat(16));

        let state = device.state();
        assert_eq!(state.label.as_deref(), Some("Back porch"));
        assert!(state.version.is_some() && state.group.is_some() && state.last_seen.is_some());

        let text = device.to_string();
        assert!(text.contains("Label: Back porch"));
        assert!(text.contains("LIFX A19"));
        assert!(text.contains("Group: Kitchen"));
    }

    #[test]
    fn getters_retry_after_timeouts() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::DropFirst(2));
        let config = test_config(vec![])
            .with_timeout(Duration::from_millis(100))
            .with_retries(2);
        let mut device = device_for(&bulb, config);

        assert!(device.get_power().unwrap());
        assert_eq!(bulb.received().len(), 3);
    }

    #[test]
    fn getters_give_up_after_retries() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Silent);
        let config = test_config(vec![])
            .with_timeout(Duration::from_millis(50))
            .with_retries(1);
        let mut device = device_for(&bulb, config);

        assert!(device.get_label().unwrap_err().is_timeout());
        assert_eq!(bulb.received().len(), 2);
    }

    #[test]
    fn setters_are_not_retried() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Silent);
        let config = test_config(vec![])
            .with_timeout(Duration::from_millis(50))
            .with_retries(3);
        let mut device = device_for(&bulb, config);

        assert!(device.set_label("x").unwrap_err().is_timeout());
        assert_eq!(bulb.received().len(), 1);
    }

    #[test]
    fn unknown_address_is_learned_from_the_reply() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Normal);
        let config = test_config(vec![bulb.addr]);
        let transport = Arc::new(Transport::bind(&config).unwrap());
        let mut device = Device::new(hw(), None, transport, &config);

        assert_eq!(device.addr(), None);
        device.get_power().unwrap();
        assert_eq!(device.addr(), Some(bulb.addr));
    }

    #[test]
    fn snapshot_serializes() {
        let bulb = FakeBulb::spawn(hw(), Behaviour::Normal);
        let mut device = device_for(&bulb, test_config(vec![]));
        device.get_color().unwrap();

        let json = serde_json::to_value(device.snapshot()).unwrap();
        assert_eq!(json["hardware_address"], "56:84:7a:fe:97:99");
        assert_eq!(json["label"], "Fake");
        assert_eq!(json["power"], true);
        assert_eq!(json["color"]["kelvin"], 3500);
        assert!(json.get("group").is_none());
    }
}
