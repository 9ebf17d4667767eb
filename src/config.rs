use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;

// Stock Teensy USB serial microcontroller program id data
const DEFAULT_VENDOR_ID: u16 = 0x16C0;
const DEFAULT_PRODUCT_ID: u16 = 0x0483;
const DEFAULT_SERIAL_NUMBER: &str = "12345";

const DEFAULT_TICK: Duration = Duration::from_millis(200);
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_BAUD_RATE: u32 = 9600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {field} id {value:?}: expected 1 to 4 hex digits")]
    InvalidId { field: &'static str, value: String },
    #[error("serial number must not be empty")]
    EmptySerial,
    #[error("{0} interval must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("baud rate must be greater than zero")]
    ZeroBaudRate,
}

/// The (vendor id, product id, serial number) triple of the target board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    vendor_id: u16,
    product_id: u16,
    serial_number: String,
}

impl DeviceIdentity {
    pub fn new(vendor_id: u16, product_id: u16, serial_number: &str) -> Result<Self, ConfigError> {
        if serial_number.is_empty() {
            return Err(ConfigError::EmptySerial);
        }

        Ok(DeviceIdentity {
            vendor_id,
            product_id,
            serial_number: serial_number.to_string(),
        })
    }

    /// Substring the OS hardware description must contain for this device.
    pub fn match_pattern(&self) -> String {
        format!(
            "USB VID:PID={:04X}:{:04X} SER={}",
            self.vendor_id, self.product_id, self.serial_number
        )
    }
}

fn parse_usb_id(field: &'static str, value: &str) -> Result<u16, ConfigError> {
    let digits = value.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);

    let invalid = || ConfigError::InvalidId {
        field,
        value: value.to_string(),
    };

    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    u16::from_str_radix(digits, 16).map_err(|_| invalid())
}

#[derive(Debug, clap::Parser)]
#[command(version, about = "Streams CPU and RAM load to a USB serial board", long_about = None)]
pub struct Cli {
    /// JSON file with any of the settings below; flags win over the file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// USB vendor id of the board, in hex.
    #[arg(long)]
    pub vendor_id: Option<String>,
    /// USB product id of the board, in hex.
    #[arg(long)]
    pub product_id: Option<String>,
    /// USB serial number of the board.
    #[arg(long)]
    pub serial_number: Option<String>,
    /// Milliseconds between two frames.
    #[arg(long)]
    pub tick_ms: Option<u64>,
    /// Milliseconds to wait after a failed discovery or open.
    #[arg(long)]
    pub backoff_ms: Option<u64>,
    /// Serial line speed in baud.
    #[arg(long)]
    pub baud_rate: Option<u32>,
    /// Print every serial device with its hardware description, then exit.
    #[arg(long)]
    pub list_devices: bool,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    pub serial_number: Option<String>,
    pub tick_ms: Option<u64>,
    pub backoff_ms: Option<u64>,
    pub baud_rate: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<FileConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;

        serde_json::from_str(&text)
            .with_context(|| format!("Could not parse config file {}", path.display()))
    }

    /// Fields set on `other` replace ours.
    fn overlay(self, other: FileConfig) -> FileConfig {
        FileConfig {
            vendor_id: other.vendor_id.or(self.vendor_id),
            product_id: other.product_id.or(self.product_id),
            serial_number: other.serial_number.or(self.serial_number),
            tick_ms: other.tick_ms.or(self.tick_ms),
            backoff_ms: other.backoff_ms.or(self.backoff_ms),
            baud_rate: other.baud_rate.or(self.baud_rate),
        }
    }
}

impl From<&Cli> for FileConfig {
    fn from(cli: &Cli) -> Self {
        FileConfig {
            vendor_id: cli.vendor_id.clone(),
            product_id: cli.product_id.clone(),
            serial_number: cli.serial_number.clone(),
            tick_ms: cli.tick_ms,
            backoff_ms: cli.backoff_ms,
            baud_rate: cli.baud_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub identity: DeviceIdentity,
    pub tick: Duration,
    pub backoff: Duration,
    pub baud_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            identity: DeviceIdentity {
                vendor_id: DEFAULT_VENDOR_ID,
                product_id: DEFAULT_PRODUCT_ID,
                serial_number: DEFAULT_SERIAL_NUMBER.to_string(),
            },
            tick: DEFAULT_TICK,
            backoff: DEFAULT_BACKOFF,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl Config {
    /// Defaults, then the config file, then explicit flags.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Config> {
        let file = match cli.config {
            Some(ref path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        Config::from_settings(file.overlay(cli.into())).map_err(Into::into)
    }

    pub fn from_settings(settings: FileConfig) -> Result<Config, ConfigError> {
        let defaults = Config::default();

        let vendor_id = match settings.vendor_id {
            Some(ref s) => parse_usb_id("vendor", s)?,
            None => defaults.identity.vendor_id,
        };
        let product_id = match settings.product_id {
            Some(ref s) => parse_usb_id("product", s)?,
            None => defaults.identity.product_id,
        };
        let serial_number = settings
            .serial_number
            .unwrap_or(defaults.identity.serial_number);

        let tick = settings.tick_ms.map(Duration::from_millis).unwrap_or(defaults.tick);
        if tick.is_zero() {
            return Err(ConfigError::ZeroInterval("tick"));
        }

        let backoff = settings
            .backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff);
        if backoff.is_zero() {
            return Err(ConfigError::ZeroInterval("backoff"));
        }

        let baud_rate = settings.baud_rate.unwrap_or(defaults.baud_rate);
        if baud_rate == 0 {
            return Err(ConfigError::ZeroBaudRate);
        }

        Ok(Config {
            identity: DeviceIdentity::new(vendor_id, product_id, &serial_number)?,
            tick,
            backoff,
            baud_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn default_identity_matches_stock_teensy() {
        let config = Config::default();
        assert_eq!(config.identity.match_pattern(), "USB VID:PID=16C0:0483 SER=12345");
        assert_eq!(config.tick, Duration::from_millis(200));
        assert_eq!(config.backoff, Duration::from_secs(1));
        assert_eq!(config.baud_rate, 9600);
    }

    #[test]
    fn ids_are_rendered_as_uppercase_four_digit_hex() {
        let settings = FileConfig {
            vendor_id: Some("0x16c0".to_string()),
            product_id: Some("483".to_string()),
            serial_number: Some("ABC-1".to_string()),
            ..Default::default()
        };
        let identity = Config::from_settings(settings).unwrap().identity;
        assert_eq!(identity.vendor_id, 0x16C0);
        assert_eq!(identity.product_id, 0x0483);
        assert_eq!(identity.match_pattern(), "USB VID:PID=16C0:0483 SER=ABC-1");
    }

    #[test]
    fn accepts_hex_ids_in_any_case_with_or_without_prefix() {
        for (text, id) in [("16C0", 0x16C0), ("16c0", 0x16C0), ("0X16C0", 0x16C0), (" a ", 0xA), ("FFFF", 0xFFFF)] {
            assert_eq!(parse_usb_id("vendor", text), Ok(id), "{text:?}");
        }
    }

    #[test]
    fn rejects_bad_ids() {
        for bad in ["", "0x", "12345", "G123", "-1", "1 2", "+1"] {
            assert_eq!(
                parse_usb_id("product", bad),
                Err(ConfigError::InvalidId {
                    field: "product",
                    value: bad.to_string()
                }),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn rejects_empty_serial() {
        assert_eq!(DeviceIdentity::new(0x16C0, 0x0483, ""), Err(ConfigError::EmptySerial));

        let settings = FileConfig {
            serial_number: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(Config::from_settings(settings), Err(ConfigError::EmptySerial));
    }

    #[test]
    fn rejects_zero_intervals_and_baud_rate() {
        let zero_tick = FileConfig {
            tick_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(Config::from_settings(zero_tick), Err(ConfigError::ZeroInterval("tick")));

        let zero_backoff = FileConfig {
            backoff_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(
            Config::from_settings(zero_backoff),
            Err(ConfigError::ZeroInterval("backoff"))
        );

        let zero_baud = FileConfig {
            baud_rate: Some(0),
            ..Default::default()
        };
        assert_eq!(Config::from_settings(zero_baud), Err(ConfigError::ZeroBaudRate));
    }

    #[test]
    fn file_config_parses_json_and_rejects_unknown_fields() {
        let parsed: FileConfig =
            serde_json::from_str(r#"{ "vendor_id": "2E8A", "tick_ms": 50 }"#).unwrap();
        assert_eq!(parsed.vendor_id.as_deref(), Some("2E8A"));
        assert_eq!(parsed.tick_ms, Some(50));
        assert_eq!(parsed.product_id, None);

        assert!(serde_json::from_str::<FileConfig>(r#"{ "vid": "2E8A" }"#).is_err());
    }

    #[test]
    fn flags_override_file_which_overrides_defaults() {
        let path = std::env::temp_dir().join(format!(
            "teensy_sysmon_config_{}.json",
            std::process::id()
        ));
        fs::write(
            &path,
            r#"{ "vendor_id": "2E8A", "product_id": "000A", "tick_ms": 50, "baud_rate": 115200 }"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "teensy_sysmon_server",
            "--config",
            path.to_str().unwrap(),
            "--product-id",
            "0x0005",
            "--serial-number",
            "E6614C311B",
        ]);
        let config = Config::resolve(&cli).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(
            config.identity.match_pattern(),
            "USB VID:PID=2E8A:0005 SER=E6614C311B"
        );
        assert_eq!(config.tick, Duration::from_millis(50));
        assert_eq!(config.backoff, Duration::from_secs(1));
        assert_eq!(config.baud_rate, 115200);
    }

    #[test]
    fn every_flag_has_help_text() {
        use clap::CommandFactory;

        for arg in Cli::command()
            .get_arguments()
            .filter(|a| a.get_id() != "help" && a.get_id() != "version")
        {
            assert!(arg.get_help().is_some(), "--{} has no help", arg.get_id());
        }
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::parse_from([
            "teensy_sysmon_server",
            "--config",
            "/nonexistent/teensy_sysmon.json",
        ]);
        let err = Config::resolve(&cli).unwrap_err();
        assert!(err.to_string().contains("Could not read config file"));
    }
}
