//! This crate provides low-level message types and structures for dealing with the LIFX LAN protocol.
//!
//! This lets you control lights on your local area network.  More info can be found here:
//! https://lan.developer.lifx.com/
//!
//! Since this is a low-level library, it does not deal with issues like talking to the network,
//! caching light state, or waiting for replies.  That is the job of the `lifx` crate.
//!
//! # Discovery
//!
//! To discover lights on your LAN, send a [Message::GetService] message as a UDP broadcast to port 56700
//! When a device is discovered, the [Service] types and IP port are provided.  To get additional
//! info about each device, send additional Get messages directly to each device (by setting the
//! [FrameAddress::target] field to the bulbs target ID, and then send a UDP packet to the IP address
//! associated with the device).
//!
//! # Reserved fields
//! When *constructing* packets, you must always set every reserved field to zero.  However, it's
//! possible to receive packets with these fields set to non-zero values.  Be conservative in what
//! you send, and liberal in what you accept.
//!
//! # Malformed input
//! [RawMessage::unpack] and [Message::from_raw] never panic.  Anything that doesn't fit the
//! binary layout is reported as [Error::Malformed].

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::str::FromStr;
use std::{fmt, io};

/// The UDP port LIFX devices listen on.
pub const LIFX_PORT: u16 = 56700;

/// Size of the Frame + FrameAddress + ProtocolHeader, in bytes.
pub const HEADER_SIZE: usize = 36;

/// Lowest color temperature accepted by [HSBK::validate].
pub const KELVIN_MIN: u16 = 2500;

/// Highest color temperature accepted by [HSBK::validate].
pub const KELVIN_MAX: u16 = 9000;

/// Various message encoding/decoding errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// This error means we were unable to parse a raw message because its type is unknown.
    ///
    /// LIFX devices are known to send messages that are not officially documented, so this error
    /// type does not necessarily represent a bug.
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    /// This error means one of the message fields contains an invalid or unsupported value.
    ///
    /// The inner string is a description of the error.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The bytes don't describe a well-formed packet: too short, truncated payload, or a size
    /// field that disagrees with the buffer.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// A caller supplied value (color component, hardware address) is out of range or unparsable.
    /// Nothing is ever sent when this is returned.
    #[error("invalid value: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(io::Error),
}

impl std::convert::From<io::Error> for Error {
    fn from(io: io::Error) -> Self {
        // every read in this crate is from an in-memory buffer, so running out of bytes means the
        // packet was short
        if io.kind() == io::ErrorKind::UnexpectedEof {
            Error::Malformed("unexpected end of data".to_owned())
        } else {
            Error::Io(io)
        }
    }
}

trait LifxFrom<T>: Sized {
    fn from(val: T) -> Result<Self, Error>;
}

macro_rules! derive_lifx_from {
{ $( $t:ty ),*} => {
    $(
        impl LifxFrom<$t> for $t {
            fn from(val: $t) -> Result<Self, Error> { Ok(val)}
        }
    )*

}
}

derive_lifx_from! {
    u8, u16, i16, u32, f32, u64, LifxIdent, LifxString, HSBK
}

impl LifxFrom<u8> for Service {
    fn from(val: u8) -> Result<Service, Error> {
        if val != Service::UDP as u8 {
            Err(Error::ProtocolError(format!(
                "Unknown service value {}",
                val
            )))
        } else {
            Ok(Service::UDP)
        }
    }
}

impl LifxFrom<u16> for PowerLevel {
    fn from(val: u16) -> Result<PowerLevel, Error> {
        match val {
            x if x == PowerLevel::Enabled as u16 => Ok(PowerLevel::Enabled),
            x if x == PowerLevel::Standby as u16 => Ok(PowerLevel::Standby),
            x => Err(Error::ProtocolError(format!("Unknown power level {}", x))),
        }
    }
}

/// A 16 byte identifier, used for location and group IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LifxIdent(pub [u8; 16]);

impl fmt::Display for LifxIdent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Lifx strings are fixed-length (32-bytes maximum)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LifxString(pub String);

impl LifxString {
    /// Constructs a new LifxString, truncating to 32 bytes (on a character boundary).
    pub fn new(s: &str) -> LifxString {
        let mut end = s.len().min(32);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        LifxString(s[..end].to_owned())
    }
}

impl std::fmt::Display for LifxString {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

impl std::cmp::PartialEq<str> for LifxString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[cfg(feature = "arbitrary")]
impl<'a> arbitrary::Arbitrary<'a> for LifxString {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let s: String = u.arbitrary()?;
        // NULs terminate a label on the wire, so they can't survive a round trip
        Ok(LifxString::new(&s.replace('\0', "")))
    }
}

trait LittleEndianWriter<T>: WriteBytesExt {
    fn write_val(&mut self, v: T) -> Result<(), io::Error>;
}

macro_rules! derive_writer {
{ $( $m:ident: $t:ty ),*} => {
    $(
        impl<T: WriteBytesExt> LittleEndianWriter<$t> for T {
            fn write_val(&mut self, v: $t) -> Result<(), io::Error> {
                self . $m ::<LittleEndian>(v)
            }
        }
    )*

}
}

derive_writer! { write_u32: u32, write_u16: u16, write_i16: i16, write_u64: u64, write_f32: f32 }

impl<T: WriteBytesExt> LittleEndianWriter<u8> for T {
    fn write_val(&mut self, v: u8) -> Result<(), io::Error> {
        self.write_u8(v)
    }
}

impl<T> LittleEndianWriter<LifxString> for T
where
    T: WriteBytesExt,
{
    fn write_val(&mut self, v: LifxString) -> Result<(), io::Error> {
        let bytes = v.0.as_bytes();
        for idx in 0..32 {
            self.write_u8(bytes.get(idx).copied().unwrap_or(0))?;
        }
        Ok(())
    }
}

impl<T> LittleEndianWriter<LifxIdent> for T
where
    T: WriteBytesExt,
{
    fn write_val(&mut self, v: LifxIdent) -> Result<(), io::Error> {
        self.write_all(&v.0)
    }
}

impl<T> LittleEndianWriter<HSBK> for T
where
    T: WriteBytesExt,
{
    fn write_val(&mut self, v: HSBK) -> Result<(), io::Error> {
        self.write_val(v.hue)?;
        self.write_val(v.saturation)?;
        self.write_val(v.brightness)?;
        self.write_val(v.kelvin)?;
        Ok(())
    }
}

impl<T> LittleEndianWriter<PowerLevel> for T
where
    T: WriteBytesExt,
{
    fn write_val(&mut self, v: PowerLevel) -> Result<(), io::Error> {
        self.write_u16::<LittleEndian>(v as u16)
    }
}

trait LittleEndianReader<T> {
    fn read_val(&mut self) -> Result<T, io::Error>;
}

macro_rules! derive_reader {
{ $( $m:ident: $t:ty ),*} => {
    $(
        impl<T: ReadBytesExt> LittleEndianReader<$t> for T {
            fn read_val(&mut self) -> Result<$t, io::Error> {
                self . $m ::<LittleEndian>()
            }
        }
    )*

}
}

derive_reader! { read_u32: u32, read_u16: u16, read_i16: i16, read_u64: u64, read_f32: f32 }

impl<R: ReadBytesExt> LittleEndianReader<u8> for R {
    fn read_val(&mut self) -> Result<u8, io::Error> {
        self.read_u8()
    }
}

impl<R: ReadBytesExt> LittleEndianReader<HSBK> for R {
    fn read_val(&mut self) -> Result<HSBK, io::Error> {
        let hue = self.read_val()?;
        let sat = self.read_val()?;
        let bri = self.read_val()?;
        let kel = self.read_val()?;
        Ok(HSBK {
            hue,
            saturation: sat,
            brightness: bri,
            kelvin: kel,
        })
    }
}

impl<R: ReadBytesExt> LittleEndianReader<LifxIdent> for R {
    fn read_val(&mut self) -> Result<LifxIdent, io::Error> {
        let mut val = [0; 16];
        self.read_exact(&mut val)?;
        Ok(LifxIdent(val))
    }
}

impl<R: ReadBytesExt> LittleEndianReader<LifxString> for R {
    fn read_val(&mut self) -> Result<LifxString, io::Error> {
        let mut raw = [0; 32];
        self.read_exact(&mut raw)?;
        let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
        Ok(LifxString(String::from_utf8_lossy(&raw[..end]).into_owned()))
    }
}

macro_rules! unpack {
    ($msg:ident, $typ:ident, $( $n:ident: $t:ident ),*) => {
        {
        let mut c = Cursor::new(&$msg.payload);
        $(
            let $n: $t = c.read_val()?;
        )*

        Message::$typ{
            $(
                $n: LifxFrom::from($n)?,
            )*
        }
        }

    };
}

/// A device's 6 byte hardware (MAC) address.
///
/// This is what identifies a bulb on the wire: padded with two zero bytes, it becomes the
/// little-endian [FrameAddress::target] field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HardwareAddress([u8; 6]);

impl HardwareAddress {
    pub const fn new(octets: [u8; 6]) -> HardwareAddress {
        HardwareAddress(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// The 8 byte wire form: the six octets followed by two zero bytes.
    pub fn padded(&self) -> [u8; 8] {
        let mut p = [0; 8];
        p[..6].copy_from_slice(&self.0);
        p
    }

    /// The value to put in [FrameAddress::target] / [BuildOptions::target].
    pub fn target(&self) -> u64 {
        u64::from_le_bytes(self.padded())
    }

    /// Recovers the address from a [FrameAddress::target] value, ignoring the padding bytes.
    ///
    /// Returns `None` for the all-devices target (zero).
    pub fn from_target(target: u64) -> Option<HardwareAddress> {
        if target == 0 {
            return None;
        }
        let mut octets = [0; 6];
        octets.copy_from_slice(&target.to_le_bytes()[..6]);
        Some(HardwareAddress(octets))
    }
}

impl FromStr for HardwareAddress {
    type Err = Error;

    /// Parses colon separated hex like `56:84:7a:fe:97:99`.  The colons are optional.
    fn from_str(s: &str) -> Result<HardwareAddress, Error> {
        let digits: String = s.chars().filter(|&c| c != ':').collect();
        if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Validation(format!(
                "hardware address {:?} is not a sequence of hex octets",
                s
            )));
        }
        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| {
                Error::Validation(format!("hardware address {:?} contains non-hex digits", s))
            })?;

        let octets: [u8; 6] = bytes.as_slice().try_into().map_err(|_| {
            Error::Validation(format!(
                "hardware address {:?} has {} octets, expected 6",
                s,
                bytes.len()
            ))
        })?;
        Ok(HardwareAddress(octets))
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for HardwareAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for HardwareAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What services are exposed by the device.
///
/// LIFX only documents the UDP service, though bulbs may support other undocumented services.
/// Since these other services are unsupported by the lifx-core library, a message with a non-UDP
/// service cannot be constructed.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum Service {
    UDP = 1,
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerLevel {
    Standby = 0,
    Enabled = 65535,
}

impl PowerLevel {
    pub fn from_bool(on: bool) -> PowerLevel {
        if on {
            PowerLevel::Enabled
        } else {
            PowerLevel::Standby
        }
    }

    pub fn is_on(self) -> bool {
        self == PowerLevel::Enabled
    }
}

/// A decoded message payload.
///
/// Only the device and light messages this crate needs are modelled.  Any other type decodes to
/// [Error::UnknownMessageType] from [Message::from_raw]; the bytes are still in
/// [RawMessage::payload].
///
/// `Get*` messages carry no payload and are answered with the matching `State*`.  `Set*` messages
/// are answered with a `State*` only when `res_required` is set.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum Message {
    /// 2: broadcast to find devices.
    GetService,

    /// 3
    StateService {
        /// 0 when the service is unavailable
        port: u32,
        service: Service,
    },

    /// 12
    GetHostInfo,

    /// 13
    StateHostInfo {
        /// milliwatts
        signal: f32,
        /// bytes sent since boot
        tx: u32,
        /// bytes received since boot
        rx: u32,
        reserved: i16,
    },

    /// 14
    GetHostFirmware,

    /// 15
    StateHostFirmware {
        /// nanoseconds since the epoch
        build: u64,
        reserved: u64,
        /// major in the upper 16 bits, minor in the lower
        version: u32,
    },

    /// 16
    GetWifiInfo,

    /// 17: same layout as [Message::StateHostInfo], for the radio.
    StateWifiInfo {
        signal: f32,
        tx: u32,
        rx: u32,
        reserved: i16,
    },

    /// 18
    GetWifiFirmware,

    /// 19: same layout as [Message::StateHostFirmware].
    StateWifiFirmware {
        build: u64,
        reserved: u64,
        version: u32,
    },

    /// 20
    GetPower,

    /// 21: switch on or off immediately.  [Message::LightSetPower] takes a transition time.
    SetPower { level: PowerLevel },

    /// 22
    StatePower { level: PowerLevel },

    /// 23
    GetLabel,

    /// 24
    SetLabel { label: LifxString },

    /// 25
    StateLabel { label: LifxString },

    /// 32
    GetVersion,

    /// 33: look the ids up with [get_product_info].
    StateVersion {
        vendor: u32,
        product: u32,
        version: u32,
    },

    /// 34
    GetInfo,

    /// 35: all values in nanoseconds.
    StateInfo {
        /// device clock, since the epoch
        time: u64,
        uptime: u64,
        /// length of the last power off, to roughly 5 seconds
        downtime: u64,
    },

    /// 45: reply to anything sent with `ack_required`.
    ///
    /// There is no payload; `seq` is copied from the frame address so the variant is useful on
    /// its own.
    Acknowledgement { seq: u8 },

    /// 48
    GetLocation,

    /// 50
    StateLocation {
        location: LifxIdent,
        label: LifxString,
        /// nanoseconds since the epoch
        updated_at: u64,
    },

    /// 51
    GetGroup,

    /// 53
    StateGroup {
        group: LifxIdent,
        label: LifxString,
        updated_at: u64,
    },

    /// 101
    LightGet,

    /// 102: `duration` is the fade time in milliseconds.
    LightSetColor {
        reserved: u8,
        color: HSBK,
        duration: u32,
    },

    /// 107: answer to [Message::LightGet] and [Message::LightSetColor].
    LightState {
        color: HSBK,
        reserved: i16,
        power: PowerLevel,
        label: LifxString,
        reserved2: u64,
    },

    /// 116
    LightGetPower,

    /// 117: `duration` is in milliseconds.  Any non-zero `level` is sent as 65535.
    LightSetPower { level: u16, duration: u32 },

    /// 118
    LightStatePower { level: u16 },
}

impl Message {
    pub fn get_num(&self) -> u16 {
        match *self {
            Message::GetService => 2,
            Message::StateService { .. } => 3,
            Message::GetHostInfo => 12,
            Message::StateHostInfo { .. } => 13,
            Message::GetHostFirmware => 14,
            Message::StateHostFirmware { .. } => 15,
            Message::GetWifiInfo => 16,
            Message::StateWifiInfo { .. } => 17,
            Message::GetWifiFirmware => 18,
            Message::StateWifiFirmware { .. } => 19,
            Message::GetPower => 20,
            Message::SetPower { .. } => 21,
            Message::StatePower { .. } => 22,
            Message::GetLabel => 23,
            Message::SetLabel { .. } => 24,
            Message::StateLabel { .. } => 25,
            Message::GetVersion => 32,
            Message::StateVersion { .. } => 33,
            Message::GetInfo => 34,
            Message::StateInfo { .. } => 35,
            Message::Acknowledgement { .. } => 45,
            Message::GetLocation => 48,
            Message::StateLocation { .. } => 50,
            Message::GetGroup => 51,
            Message::StateGroup { .. } => 53,
            Message::LightGet => 101,
            Message::LightSetColor { .. } => 102,
            Message::LightState { .. } => 107,
            Message::LightGetPower => 116,
            Message::LightSetPower { .. } => 117,
            Message::LightStatePower { .. } => 118,
        }
    }

    /// Tries to parse the payload in a [RawMessage], based on its message type.
    pub fn from_raw(msg: &RawMessage) -> Result<Message, Error> {
        match msg.protocol_header.typ {
            2 => Ok(Message::GetService),
            3 => Ok(unpack!(msg, StateService, service: u8, port: u32)),
            12 => Ok(Message::GetHostInfo),
            13 => Ok(unpack!(
                msg,
                StateHostInfo,
                signal: f32,
                tx: u32,
                rx: u32,
                reserved: i16
            )),
            14 => Ok(Message::GetHostFirmware),
            15 => Ok(unpack!(
                msg,
                StateHostFirmware,
                build: u64,
                reserved: u64,
                version: u32
            )),
            16 => Ok(Message::GetWifiInfo),
            17 => Ok(unpack!(
                msg,
                StateWifiInfo,
                signal: f32,
                tx: u32,
                rx: u32,
                reserved: i16
            )),
            18 => Ok(Message::GetWifiFirmware),
            19 => Ok(unpack!(
                msg,
                StateWifiFirmware,
                build: u64,
                reserved: u64,
                version: u32
            )),
            20 => Ok(Message::GetPower),
            21 => Ok(unpack!(msg, SetPower, level: u16)),
            22 => Ok(unpack!(msg, StatePower, level: u16)),
            23 => Ok(Message::GetLabel),
            24 => Ok(unpack!(msg, SetLabel, label: LifxString)),
            25 => Ok(unpack!(msg, StateLabel, label: LifxString)),
            32 => Ok(Message::GetVersion),
            33 => Ok(unpack!(
                msg,
                StateVersion,
                vendor: u32,
                product: u32,
                version: u32
            )),
            34 => Ok(Message::GetInfo),
            35 => Ok(unpack!(
                msg,
                StateInfo,
                time: u64,
                uptime: u64,
                downtime: u64
            )),
            45 => Ok(Message::Acknowledgement {
                seq: msg.frame_addr.sequence,
            }),
            48 => Ok(Message::GetLocation),
            50 => Ok(unpack!(
                msg,
                StateLocation,
                location: LifxIdent,
                label: LifxString,
                updated_at: u64
            )),
            51 => Ok(Message::GetGroup),
            53 => Ok(unpack!(
                msg,
                StateGroup,
                group: LifxIdent,
                label: LifxString,
                updated_at: u64
            )),
            101 => Ok(Message::LightGet),
            102 => Ok(unpack!(
                msg,
                LightSetColor,
                reserved: u8,
                color: HSBK,
                duration: u32
            )),
            107 => Ok(unpack!(
                msg,
                LightState,
                color: HSBK,
                reserved: i16,
                power: u16,
                label: LifxString,
                reserved2: u64
            )),
            116 => Ok(Message::LightGetPower),
            117 => Ok(unpack!(msg, LightSetPower, level: u16, duration: u32)),
            118 => Ok(unpack!(msg, LightStatePower, level: u16)),
            _ => Err(Error::UnknownMessageType(msg.protocol_header.typ)),
        }
    }
}

/// Bulb color (Hue-Saturation-Brightness-Kelvin)
///
/// # Notes:
///
/// Colors are represented as Hue-Saturation-Brightness-Kelvin, or HSBK
///
/// When a light is displaying whites, saturation will be zero, hue will be ignored, and only
/// brightness and kelvin will matter.
///
/// Valid values for "kelvin" are from 2500 (warm/yellow) to 9000 (cool/blue).  Use
/// [HSBK::validate] or [HSBK::checked] before sending a color.
///
/// When a light is displaying colors, kelvin is ignored.
///
/// To display "pure" colors, set saturation to full (65535).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HSBK {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

/// Checks that a caller supplied color component fits in 16 bits.
pub fn check_component(field: &str, value: u32) -> Result<u16, Error> {
    u16::try_from(value)
        .map_err(|_| Error::Validation(format!("{} {} is outside 0..=65535", field, value)))
}

/// Checks that a caller supplied color temperature is within [KELVIN_MIN]..=[KELVIN_MAX].
pub fn check_kelvin(value: u32) -> Result<u16, Error> {
    if value < KELVIN_MIN as u32 || value > KELVIN_MAX as u32 {
        return Err(Error::Validation(format!(
            "kelvin {} is outside {}..={}",
            value, KELVIN_MIN, KELVIN_MAX
        )));
    }
    Ok(value as u16)
}

impl HSBK {
    /// Builds a color from wider integers, rejecting anything out of range.
    pub fn checked(hue: u32, saturation: u32, brightness: u32, kelvin: u32) -> Result<HSBK, Error> {
        Ok(HSBK {
            hue: check_component("hue", hue)?,
            saturation: check_component("saturation", saturation)?,
            brightness: check_component("brightness", brightness)?,
            kelvin: check_kelvin(kelvin)?,
        })
    }

    /// Rejects a kelvin value the bulbs don't accept.
    pub fn validate(&self) -> Result<(), Error> {
        check_kelvin(self.kelvin as u32).map(|_| ())
    }

    pub fn describe(&self, short: bool) -> String {
        match short {
            true if self.saturation == 0 => format!("{}K", self.kelvin),
            true => format!(
                "{:.0}/{:.0}",
                (self.hue as f32 / 65535.0) * 360.0,
                self.saturation as f32 / 655.35
            ),
            false if self.saturation == 0 => format!(
                "{:.0}% White ({})",
                self.brightness as f32 / 655.35,
                describe_kelvin(self.kelvin)
            ),
            false => format!(
                "{:.0}% hue: {} sat: {}",
                self.brightness as f32 / 655.35,
                self.hue,
                self.saturation
            ),
        }
    }
}

/// Describe (in english words) the color temperature as given in kelvin.
///
/// These descriptions match the values shown in the LIFX mobile app.
pub fn describe_kelvin(k: u16) -> &'static str {
    match k {
        0..=2500 => "Ultra Warm",
        2501..=2700 => "Incandescent",
        2701..=3000 => "Warm",
        3001..=3200 => "Neutral Warm",
        3201..=3500 => "Neutral",
        3501..=4000 => "Cool",
        4001..=4500 => "Cool Daylight",
        4501..=5000 => "Soft Daylight",
        5001..=5500 => "Daylight",
        5501..=6000 => "Noon Daylight",
        6001..=6500 => "Bright Daylight",
        6501..=7000 => "Cloudy Daylight",
        7001..=7500 => "Blue Daylight",
        7501..=8000 => "Blue Overcast",
        8001..=8500 => "Blue Water",
        _ => "Blue Ice",
    }
}

/// One packet: the three header sections and the undecoded payload.
///
/// Built with [RawMessage::build] or [RawMessage::unpack]; decode the payload with
/// [Message::from_raw].
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub frame: Frame,
    pub frame_addr: FrameAddress,
    pub protocol_header: ProtocolHeader,
    pub payload: Vec<u8>,
}

/// First 8 bytes of the header.
///
/// When `tagged` is set the packet is for every device and [FrameAddress::target] is zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Length of the whole packet, header included.
    pub size: u16,
    /// 2 bits, always 0.
    pub origin: u8,
    pub tagged: bool,
    /// Always set.
    pub addressable: bool,
    /// 12 bits, always 1024.
    pub protocol: u16,
    /// Client id, copied into replies.  With a source of 0 devices may broadcast their replies.
    pub source: u32,
}

/// Bytes 8..24 of the header: who the packet is for and what it expects back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAddress {
    /// Padded hardware address (see [HardwareAddress::target]), or 0 for all devices.
    pub target: u64,
    pub reserved: [u8; 6],
    /// Upper 6 bits of the flags byte.
    pub reserved2: u8,
    pub ack_required: bool,
    pub res_required: bool,
    /// Copied into replies.
    pub sequence: u8,
}

/// Bytes 24..36 of the header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtocolHeader {
    pub reserved: u64,
    /// Message type; see [Message::get_num].
    pub typ: u16,
    pub reserved2: u16,
}

const ORIGIN_SHIFT: u16 = 14;
const TAGGED_BIT: u16 = 1 << 13;
const ADDRESSABLE_BIT: u16 = 1 << 12;
const PROTOCOL_MASK: u16 = 0x0fff;

const ACK_BIT: u8 = 0b10;
const RES_BIT: u8 = 0b01;

impl Frame {
    fn packed_size() -> usize {
        8
    }

    fn validate(&self) -> Result<(), Error> {
        if self.origin >= 4 {
            return Err(Error::ProtocolError(format!(
                "frame origin {} doesn't fit in 2 bits",
                self.origin
            )));
        }
        if !self.addressable {
            return Err(Error::Malformed("frame is not addressable".to_owned()));
        }
        if self.protocol != 1024 {
            return Err(Error::Malformed(format!(
                "frame had protocol version {}",
                self.protocol
            )));
        }
        Ok(())
    }

    fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut bits = (<u16 as From<u8>>::from(self.origin) & 0b11) << ORIGIN_SHIFT;
        if self.tagged {
            bits |= TAGGED_BIT;
        }
        if self.addressable {
            bits |= ADDRESSABLE_BIT;
        }
        bits |= self.protocol & PROTOCOL_MASK;

        let mut v = Vec::with_capacity(Self::packed_size());
        v.write_val(self.size)?;
        v.write_val(bits)?;
        v.write_val(self.source)?;
        Ok(v)
    }

    fn unpack(v: &[u8]) -> Result<Frame, Error> {
        let mut c = Cursor::new(v);
        let size = c.read_val()?;
        let bits: u16 = c.read_val()?;
        let source = c.read_val()?;

        let frame = Frame {
            size,
            origin: (bits >> ORIGIN_SHIFT) as u8,
            tagged: bits & TAGGED_BIT != 0,
            addressable: bits & ADDRESSABLE_BIT != 0,
            protocol: bits & PROTOCOL_MASK,
            source,
        };
        frame.validate()?;
        Ok(frame)
    }
}

impl FrameAddress {
    fn packed_size() -> usize {
        16
    }

    fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut flags = (self.reserved2 & 0b11_1111) << 2;
        if self.ack_required {
            flags |= ACK_BIT;
        }
        if self.res_required {
            flags |= RES_BIT;
        }

        let mut v = Vec::with_capacity(Self::packed_size());
        v.write_val(self.target)?;
        v.write_all(&self.reserved)?;
        v.write_val(flags)?;
        v.write_val(self.sequence)?;
        Ok(v)
    }

    fn unpack(v: &[u8]) -> Result<FrameAddress, Error> {
        let mut c = Cursor::new(v);
        let target = c.read_val()?;
        let mut reserved = [0; 6];
        c.read_exact(&mut reserved)?;
        let flags: u8 = c.read_val()?;
        let sequence = c.read_val()?;

        Ok(FrameAddress {
            target,
            reserved,
            reserved2: flags >> 2,
            ack_required: flags & ACK_BIT != 0,
            res_required: flags & RES_BIT != 0,
            sequence,
        })
    }
}

impl ProtocolHeader {
    fn packed_size() -> usize {
        12
    }

    pub fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut v = Vec::with_capacity(Self::packed_size());
        v.write_val(self.reserved)?;
        v.write_val(self.typ)?;
        v.write_val(self.reserved2)?;
        Ok(v)
    }

    fn unpack(v: &[u8]) -> Result<ProtocolHeader, Error> {
        let mut c = Cursor::new(v);
        Ok(ProtocolHeader {
            reserved: c.read_val()?,
            typ: c.read_val()?,
            reserved2: c.read_val()?,
        })
    }
}

/// Header settings for [RawMessage::build].
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Device to address, from [HardwareAddress::target].  `None` addresses every device and
    /// sets the tagged bit.
    pub target: Option<u64>,
    /// Ask for an [Message::Acknowledgement].
    pub ack_required: bool,
    /// Ask for a `State*` reply.  Get messages are only answered when this is set.
    pub res_required: bool,
    /// Echoed in replies, so they can be told apart.
    pub sequence: u8,
    /// Client id, echoed in replies.  Devices answer a zero source by broadcast.
    pub source: u32,
}

impl RawMessage {
    /// Encodes `msg` behind a header made from `options`.
    ///
    /// The frame size is filled in from the encoded payload.
    pub fn build(options: &BuildOptions, msg: Message) -> Result<RawMessage, Error> {
        let frame = Frame {
            size: 0,
            origin: 0,
            tagged: options.target.is_none(),
            addressable: true,
            protocol: 1024,
            source: options.source,
        };
        let frame_addr = FrameAddress {
            target: options.target.unwrap_or(0),
            reserved: [0; 6],
            reserved2: 0,
            ack_required: options.ack_required,
            res_required: options.res_required,
            sequence: options.sequence,
        };
        let protocol_header = ProtocolHeader {
            reserved: 0,
            typ: msg.get_num(),
            reserved2: 0,
        };

        let mut v = Vec::new();
        match msg {
            Message::GetService
            | Message::GetHostInfo
            | Message::GetHostFirmware
            | Message::GetWifiFirmware
            | Message::GetWifiInfo
            | Message::GetPower
            | Message::GetLabel
            | Message::GetVersion
            | Message::GetInfo
            | Message::Acknowledgement { .. }
            | Message::GetLocation
            | Message::GetGroup
            | Message::LightGet
            | Message::LightGetPower => {
                // these types have no payload
            }
            Message::StateService { port, service } => {
                v.write_val(service as u8)?;
                v.write_val(port)?;
            }
            Message::StateHostInfo {
                signal,
                tx,
                rx,
                reserved,
            }
            | Message::StateWifiInfo {
                signal,
                tx,
                rx,
                reserved,
            } => {
                v.write_val(signal)?;
                v.write_val(tx)?;
                v.write_val(rx)?;
                v.write_val(reserved)?;
            }
            Message::StateHostFirmware {
                build,
                reserved,
                version,
            }
            | Message::StateWifiFirmware {
                build,
                reserved,
                version,
            } => {
                v.write_val(build)?;
                v.write_val(reserved)?;
                v.write_val(version)?;
            }
            Message::SetPower { level } | Message::StatePower { level } => {
                v.write_val(level)?;
            }
            Message::SetLabel { label } | Message::StateLabel { label } => {
                v.write_val(label)?;
            }
            Message::StateVersion {
                vendor,
                product,
                version,
            } => {
                v.write_val(vendor)?;
                v.write_val(product)?;
                v.write_val(version)?;
            }
            Message::StateInfo {
                time,
                uptime,
                downtime,
            } => {
                v.write_val(time)?;
                v.write_val(uptime)?;
                v.write_val(downtime)?;
            }
            Message::StateLocation {
                location: ident,
                label,
                updated_at,
            }
            | Message::StateGroup {
                group: ident,
                label,
                updated_at,
            } => {
                v.write_val(ident)?;
                v.write_val(label)?;
                v.write_val(updated_at)?;
            }
            Message::LightSetColor {
                reserved,
                color,
                duration,
            } => {
                v.write_val(reserved)?;
                v.write_val(color)?;
                v.write_val(duration)?;
            }
            Message::LightState {
                color,
                reserved,
                power,
                label,
                reserved2,
            } => {
                v.write_val(color)?;
                v.write_val(reserved)?;
                v.write_val(power)?;
                v.write_val(label)?;
                v.write_val(reserved2)?;
            }
            Message::LightSetPower { level, duration } => {
                v.write_val(if level > 0 { 65535u16 } else { 0u16 })?;
                v.write_val(duration)?;
            }
            Message::LightStatePower { level } => {
                v.write_val(level)?;
            }
        }

        let mut raw = RawMessage {
            frame,
            frame_addr,
            protocol_header,
            payload: v,
        };
        raw.frame.size = raw.packed_size() as u16;
        Ok(raw)
    }

    /// The total size (in bytes) of the packed version of this message.
    pub fn packed_size(&self) -> usize {
        Frame::packed_size()
            + FrameAddress::packed_size()
            + ProtocolHeader::packed_size()
            + self.payload.len()
    }

    /// Checks that the header is consistent with itself and with the payload.
    pub fn validate(&self) -> Result<(), Error> {
        self.frame.validate()?;
        if self.frame.size as usize != self.packed_size() {
            return Err(Error::Malformed(format!(
                "frame size {} disagrees with packed size {}",
                self.frame.size,
                self.packed_size()
            )));
        }
        Ok(())
    }

    /// Packs this RawMessage into some bytes that can be send over the network.
    ///
    /// The length of the returned data will be [RawMessage::packed_size] in size.
    pub fn pack(&self) -> Result<Vec<u8>, Error> {
        self.validate()?;
        let mut v = Vec::with_capacity(self.packed_size());
        v.extend(self.frame.pack()?);
        v.extend(self.frame_addr.pack()?);
        v.extend(self.protocol_header.pack()?);
        v.extend(&self.payload);
        Ok(v)
    }

    /// Given some bytes (generally read from a network socket), unpack the data into a
    /// `RawMessage` structure.
    ///
    /// The payload is kept as opaque bytes; see [Message::from_raw].
    pub fn unpack(v: &[u8]) -> Result<RawMessage, Error> {
        if v.len() < HEADER_SIZE {
            return Err(Error::Malformed(format!(
                "{} bytes is shorter than the {} byte header",
                v.len(),
                HEADER_SIZE
            )));
        }
        let mut start = 0;
        let frame = Frame::unpack(v)?;
        start += Frame::packed_size();
        let addr = FrameAddress::unpack(&v[start..])?;
        start += FrameAddress::packed_size();
        let proto = ProtocolHeader::unpack(&v[start..])?;
        start += ProtocolHeader::packed_size();

        if frame.size as usize != v.len() {
            return Err(Error::Malformed(format!(
                "frame size {} but received {} bytes",
                frame.size,
                v.len()
            )));
        }

        let body = Vec::from(&v[start..]);

        Ok(RawMessage {
            frame,
            frame_addr: addr,
            protocol_header: proto,
            payload: body,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ProductInfo {
    pub name: &'static str,
    pub color: bool,
    pub infrared: bool,
    pub multizone: bool,
    pub chain: bool,
}

macro_rules! products {
    (@has $want:ident) => { false };
    (@has color color $($rest:ident)*) => { true };
    (@has infrared infrared $($rest:ident)*) => { true };
    (@has multizone multizone $($rest:ident)*) => { true };
    (@has chain chain $($rest:ident)*) => { true };
    (@has $want:ident $other:ident $($rest:ident)*) => { products!(@has $want $($rest)*) };
    ( $( $pid:literal => $name:literal [ $($feat:ident),* ] ),* $(,)? ) => {
        &[ $( ($pid, ProductInfo {
            name: $name,
            color: products!(@has color $($feat)*),
            infrared: products!(@has infrared $($feat)*),
            multizone: products!(@has multizone $($feat)*),
            chain: products!(@has chain $($feat)*),
        }) ),* ]
    };
}

/// LIFX (vendor 1) products, by product ID.
static PRODUCTS: &[(u32, ProductInfo)] = products! {
    1 => "Original 1000" [color],
    3 => "Color 650" [color],
    10 => "White 800 (Low Voltage)" [],
    11 => "White 800 (High Voltage)" [],
    18 => "White 900 BR30 (Low Voltage)" [],
    20 => "Color 1000 BR30" [color],
    22 => "Color 1000" [color],
    27 => "LIFX A19" [color],
    28 => "LIFX BR30" [color],
    29 => "LIFX+ A19" [color, infrared],
    30 => "LIFX+ BR30" [color, infrared],
    31 => "LIFX Z" [color, multizone],
    32 => "LIFX Z 2" [color, multizone],
    36 => "LIFX Downlight" [color],
    37 => "LIFX Downlight" [color],
    38 => "LIFX Beam" [color, multizone],
    43 => "LIFX A19" [color],
    44 => "LIFX BR30" [color],
    45 => "LIFX+ A19" [color, infrared],
    46 => "LIFX+ BR30" [color, infrared],
    49 => "LIFX Mini" [color],
    50 => "LIFX Mini Day and Dusk" [],
    51 => "LIFX Mini White" [],
    52 => "LIFX GU10" [color],
    55 => "LIFX Tile" [color, chain],
    59 => "LIFX Mini Color" [color],
    60 => "LIFX Mini Day and Dusk" [],
    61 => "LIFX Mini White" [],
};

/// Look up info about what a LIFX product supports.
///
/// You can get the vendor and product IDs from a bulb by receiving a [Message::StateVersion] message
///
/// Data is taken from https://github.com/LIFX/products/blob/master/products.json
pub fn get_product_info(vendor: u32, product: u32) -> Option<&'static ProductInfo> {
    if vendor != 1 {
        return None;
    }
    PRODUCTS
        .iter()
        .find(|(pid, _)| *pid == product)
        .map(|(_, info)| info)
}
