//! Command line front end: look up bulbs on the LAN, or control one by hardware address.
//!
//! Set `RUST_LOG=lifx=debug` to see what goes over the wire.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use lifx::{Client, ClientConfig, ColorUpdate, Device, HardwareAddress};
use log::debug;

#[derive(Parser, Debug)]
#[command(name = "lifx", version)]
#[command(about = "Discover and control LIFX bulbs on the local network", long_about = None)]
struct Args {
    /// Look up bulbs on the local network and print them
    #[arg(long)]
    lookup: bool,

    /// Get bulb label. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    label: bool,
    /// Get bulb host info. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    hostinfo: bool,
    /// Get bulb host firmware. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    hostfirmware: bool,
    /// Get bulb Wi-Fi info. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    wifiinfo: bool,
    /// Get bulb Wi-Fi firmware. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    wififirmware: bool,
    /// Get bulb power state. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    powerstate: bool,
    /// Get bulb version. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    bulbversion: bool,
    /// Get bulb runtime info. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    info: bool,
    /// Get bulb location. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    location: bool,
    /// Get bulb group. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    group: bool,
    /// Get bulb color, label and power state. Use with --lookup
    #[arg(long, help_heading = "Lookup")]
    color: bool,

    /// Bulb to control, by MAC address (like 56:84:7a:fe:97:99)
    #[arg(long, value_name = "MAC", help_heading = "Control")]
    bulb: Option<String>,
    /// Turn the bulb on. Use with --bulb
    #[arg(long, conflicts_with = "off", help_heading = "Control")]
    on: bool,
    /// Turn the bulb off. Use with --bulb
    #[arg(long, help_heading = "Control")]
    off: bool,
    /// Transition time in milliseconds for power and color changes
    #[arg(long, default_value_t = 0, value_name = "MS", help_heading = "Control")]
    duration: u32,
    /// Set color hue, 0 to 65535. Use with --bulb
    #[arg(long, help_heading = "Control")]
    hue: Option<u32>,
    /// Set color saturation, 0 to 65535. Use with --bulb
    #[arg(long, help_heading = "Control")]
    saturation: Option<u32>,
    /// Set color brightness, 0 to 65535. Use with --bulb
    #[arg(long, help_heading = "Control")]
    brightness: Option<u32>,
    /// Set color temperature, 2500 (warm) to 9000 (cool). Use with --bulb
    #[arg(long, help_heading = "Control")]
    kelvin: Option<u32>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
    /// Ignore errors instead of exiting
    #[arg(long)]
    silent: bool,

    /// How long to wait for each reply, in milliseconds
    #[arg(long, env = "LIFX_TIMEOUT_MS", default_value_t = 1000, value_name = "MS")]
    timeout: u64,
    /// How long discovery listens for bulbs, in milliseconds
    #[arg(long, env = "LIFX_DISCOVERY_MS", default_value_t = 1000, value_name = "MS")]
    window: u64,
    /// Broadcast address to use instead of the interfaces' own (repeatable)
    #[arg(long, value_name = "ADDR:PORT")]
    broadcast: Vec<SocketAddr>,
    /// How many times a query is re-sent when a bulb doesn't answer
    #[arg(long, default_value_t = 2)]
    retries: u32,
}

impl Args {
    fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_timeout(Duration::from_millis(self.timeout))
            .with_discovery_window(Duration::from_millis(self.window))
            .with_broadcast_addrs(self.broadcast.clone())
            .with_retries(self.retries)
    }

    fn color_update(&self) -> ColorUpdate {
        ColorUpdate {
            hue: self.hue,
            saturation: self.saturation,
            brightness: self.brightness,
            kelvin: self.kelvin,
        }
    }

    fn policy(&self) -> ErrorPolicy {
        if self.silent {
            ErrorPolicy::Silent
        } else {
            ErrorPolicy::Fatal
        }
    }
}

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorPolicy {
    /// Stop and report it.
    Fatal,
    /// Drop it and carry on with the next step.
    Silent,
}

impl ErrorPolicy {
    fn check<T, E>(self, result: Result<T, E>) -> anyhow::Result<Option<T>>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if self == ErrorPolicy::Silent => {
                debug!("ignoring error: {}", e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn control(args: &Args, client: &Client, mac: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let policy = args.policy();
    let hw = match policy.check(mac.parse::<HardwareAddress>())? {
        Some(hw) => hw,
        None => return Ok(()),
    };
    let mut bulb = client.device(hw);

    if args.on || args.off {
        policy.check(bulb.set_power(args.on, args.duration))?;
        return Ok(());
    }

    let update = args.color_update();
    if update.is_empty() {
        return Ok(());
    }
    if policy.check(update.validate())?.is_none() {
        return Ok(());
    }
    if let Some(state) = policy.check(bulb.update_color(&update, args.duration))? {
        if args.json {
            writeln!(out, "{}", serde_json::to_string(&state)?)?;
        } else {
            writeln!(out, "{}", state)?;
        }
    }
    Ok(())
}

fn query(args: &Args, bulb: &mut Device) -> anyhow::Result<()> {
    let policy = args.policy();
    if args.label {
        policy.check(bulb.get_label())?;
    }
    if args.hostinfo {
        policy.check(bulb.get_host_info())?;
    }
    if args.hostfirmware {
        policy.check(bulb.get_host_firmware())?;
    }
    if args.wifiinfo {
        policy.check(bulb.get_wifi_info())?;
    }
    if args.wififirmware {
        policy.check(bulb.get_wifi_firmware())?;
    }
    if args.powerstate {
        policy.check(bulb.get_power())?;
    }
    if args.bulbversion {
        policy.check(bulb.get_version())?;
    }
    if args.info {
        policy.check(bulb.get_info())?;
    }
    if args.location {
        policy.check(bulb.get_location())?;
    }
    if args.group {
        policy.check(bulb.get_group())?;
    }
    if args.color {
        policy.check(bulb.get_color())?;
    }
    Ok(())
}

fn lookup(args: &Args, client: &Client, out: &mut impl Write) -> anyhow::Result<()> {
    let mut bulbs = match args.policy().check(client.discover())? {
        Some(bulbs) => bulbs,
        None => return Ok(()),
    };
    for bulb in bulbs.iter_mut() {
        query(args, bulb)?;
    }

    if args.json {
        let snapshots: Vec<_> = bulbs.iter().map(Device::snapshot).collect();
        writeln!(out, "{}", serde_json::to_string(&snapshots)?)?;
    } else {
        for (idx, bulb) in bulbs.iter().enumerate() {
            write!(out, "{}", bulb)?;
            if idx + 1 < bulbs.len() {
                writeln!(out, "----------------")?;
            }
        }
    }
    Ok(())
}

fn run(args: &Args, out: &mut impl Write) -> anyhow::Result<()> {
    let client = match args.policy().check(Client::new(args.config()))? {
        Some(client) => client,
        None => return Ok(()),
    };

    if let Some(mac) = &args.bulb {
        return control(args, &client, mac, out).with_context(|| format!("bulb {}", mac));
    }
    if args.lookup {
        return lookup(args, &client, out);
    }
    Args::command().print_help()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args = Args::parse();
    debug!("{:?}", args);
    run(&args, &mut io::stdout().lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifx::testutil::{Behaviour, FakeBulb};
    use lifx::HSBK;
    use lifx_core::{Message, PowerLevel};

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("lifx").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn partial_color_flags() {
        let args = parse(&["--bulb", "56:84:7a:fe:97:99", "--kelvin", "4000"]);
        let update = args.color_update();
        assert_eq!(update.kelvin, Some(4000));
        assert_eq!(update.hue, None);
        assert!(!update.is_empty());
        assert_eq!(args.policy(), ErrorPolicy::Fatal);
    }

    #[test]
    fn on_and_off_conflict() {
        let argv = ["lifx", "--bulb", "56:84:7a:fe:97:99", "--on", "--off"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn config_from_flags() {
        let args = parse(&[
            "--lookup",
            "--timeout",
            "250",
            "--window",
            "2000",
            "--broadcast",
            "192.168.1.255:56700",
            "--retries",
            "0",
        ]);
        let config = args.config();
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.discovery_window, Duration::from_secs(2));
        assert_eq!(
            config.broadcast_addrs,
            vec!["192.168.1.255:56700".parse::<SocketAddr>().unwrap()]
        );
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn silent_swallows_errors() {
        let bad_mac = "56:84:7a".parse::<HardwareAddress>();
        assert!(ErrorPolicy::Silent.check(bad_mac).unwrap().is_none());

        let bad_mac = "56:84:7a".parse::<HardwareAddress>();
        let err = ErrorPolicy::Fatal.check(bad_mac).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<lifx_core::Error>(),
            Some(lifx_core::Error::Validation(_))
        ));

        let fine: Result<u8, lifx::Error> = Ok(3);
        assert_eq!(ErrorPolicy::Fatal.check(fine).unwrap(), Some(3));
    }

    #[test]
    fn invalid_color_is_rejected_before_sending() {
        let args = parse(&["--bulb", "56:84:7a:fe:97:99", "--kelvin", "9001"]);
        assert!(args.color_update().validate().unwrap_err().is_validation());
    }

    const NET: [&str; 6] = ["--timeout", "200", "--window", "300", "--retries", "0"];

    fn run_against(bulb: &FakeBulb, argv: &[&str]) -> (anyhow::Result<()>, String) {
        let addr = bulb.addr.to_string();
        let mut full = vec!["--broadcast", addr.as_str()];
        full.extend_from_slice(&NET);
        full.extend_from_slice(argv);
        let mut out = Vec::new();
        let result = run(&parse(&full), &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn silent_lookup_keeps_going_after_a_failed_step() {
        let hw: HardwareAddress = "d0:73:d5:0a:0b:0c".parse().unwrap();
        // GetLabel is never answered
        let bulb = FakeBulb::spawn(hw, Behaviour::Ignores(23));

        let (result, out) =
            run_against(&bulb, &["--lookup", "--label", "--powerstate", "--silent"]);
        result.unwrap();
        assert!(out.starts_with(&format!("Bulb {} ({})", hw, bulb.addr)), "{}", out);
        assert!(out.contains("  Power: on"), "{}", out);
        assert!(!out.contains("Label:"), "{}", out);
        assert!(bulb.received().iter().any(|m| matches!(m, Message::GetPower)));
    }

    #[test]
    fn lookup_stops_at_the_first_failed_step() {
        let hw: HardwareAddress = "d0:73:d5:0a:0b:0d".parse().unwrap();
        let bulb = FakeBulb::spawn(hw, Behaviour::Ignores(23));

        let (result, out) = run_against(&bulb, &["--lookup", "--label", "--powerstate"]);
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<lifx::Error>().unwrap().is_timeout());
        assert!(out.is_empty());
        assert!(!bulb.received().iter().any(|m| matches!(m, Message::GetPower)));
    }

    #[test]
    fn control_merges_partial_color() {
        let hw: HardwareAddress = "d0:73:d5:0a:0b:0e".parse().unwrap();
        let bulb = FakeBulb::spawn(hw, Behaviour::Normal);
        let mac = hw.to_string();

        let (result, out) = run_against(&bulb, &["--bulb", &mac, "--kelvin", "4000"]);
        result.unwrap();
        let merged = HSBK {
            hue: 100,
            saturation: 200,
            brightness: 300,
            kelvin: 4000,
        };
        assert_eq!(bulb.state().color, merged);
        assert!(out.contains("Label: Fake"), "{}", out);
        assert!(out.contains("kelvin 4000"), "{}", out);

        let (result, out) = run_against(&bulb, &["--bulb", &mac, "--hue", "7", "--json"]);
        result.unwrap();
        let json: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(json["color"]["hue"], 7);
        assert_eq!(json["color"]["kelvin"], 4000);
    }

    #[test]
    fn silent_control_with_bad_mac_prints_nothing() {
        let hw: HardwareAddress = "d0:73:d5:0a:0b:0f".parse().unwrap();
        let bulb = FakeBulb::spawn(hw, Behaviour::Normal);

        let (result, out) =
            run_against(&bulb, &["--bulb", "d0:73", "--kelvin", "4000", "--silent"]);
        result.unwrap();
        assert!(out.is_empty());
        assert!(bulb.received().is_empty());

        let (result, _) = run_against(&bulb, &["--bulb", "d0:73", "--kelvin", "4000"]);
        assert!(result.is_err());
    }

    #[test]
    fn control_power_off() {
        let hw: HardwareAddress = "d0:73:d5:0a:0b:10".parse().unwrap();
        let bulb = FakeBulb::spawn(hw, Behaviour::Normal);

        let (result, out) = run_against(&bulb, &["--bulb", &hw.to_string(), "--off"]);
        result.unwrap();
        assert!(out.is_empty());
        // set_power doesn't wait for the bulb
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while bulb.state().power != PowerLevel::Standby && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(bulb.state().power, PowerLevel::Standby);
    }
}
