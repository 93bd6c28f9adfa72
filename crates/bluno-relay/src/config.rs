//! Relay configuration.
//!
//! Parsed from TOML into all-optional `*Input` structs, then resolved against
//! the deployment defaults. An empty document yields [`RelayConfig::default`].
//!
//! ```toml
//! version = 1
//! output_dir = "output"
//! verify_crc = true
//!
//! [[devices]]
//! mac = "F4:B8:5E:42:61:62"
//! player_id = 1
//! role = "glove"
//!
//! [timing]
//! ble_timeout_ms = 250
//! queue_get_timeout_ms = 1000
//! packets_per_action = 60
//! cooldown_period_ms = 3000
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bluno_wire::handshake::{Handshake, BLE_TIMEOUT, MAX_RETRANSMITS};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::action::ImuRelay;

pub const CONFIG_VERSION: u32 = 1;

/// Bluno serial GATT service.
pub const GATT_SERIAL_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000dfb0_0000_1000_8000_00805f9b34fb);

/// Bluno serial GATT characteristic carrying the frames.
pub const GATT_SERIAL_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000dfb1_0000_1000_8000_00805f9b34fb);

/// Directory session logs are written under.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// IMU frames handed to inference per candidate action.
pub const PACKETS_PER_ACTION: usize = 60;

pub const COOLDOWN_PERIOD: Duration = Duration::from_secs(3);

pub const QUEUE_GET_TIMEOUT: Duration = Duration::from_secs(1);

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Beetles deployed in the current kit.
const DEFAULT_DEVICES: &[(&str, u8, DeviceRole)] = &[
    ("F4:B8:5E:42:61:62", 1, DeviceRole::Glove),
    ("D0:39:72:DF:CA:F2", 1, DeviceRole::Ankle),
    ("B4:99:4C:89:18:72", 1, DeviceRole::Gun),
    ("F4:B8:5E:42:6D:0E", 1, DeviceRole::Vest),
    ("B4:99:4C:89:1B:FD", 2, DeviceRole::Glove),
    ("34:08:E1:2A:08:61", 2, DeviceRole::Ankle),
    ("F4:B8:5E:42:67:2B", 2, DeviceRole::Gun),
    ("F4:B8:5E:42:6D:75", 2, DeviceRole::Vest),
    ("F4:B8:5E:42:67:6E", 1, DeviceRole::Extra),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),
    #[error("device {mac} has player id {player_id}, expected 1 or 2")]
    InvalidPlayer { mac: MacAddr, player_id: u8 },
    #[error("device {0} listed more than once")]
    DuplicateDevice(MacAddr),
}

// ─── MAC address ─────────────────────────────────────────────────────────────

/// A 48-bit BLE hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = ConfigError;

    /// Accepts `:` or `-` separators in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidMac(s.to_string());
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(|c: char| c == ':' || c == '-');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

// ─── Input (TOML) ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Glove,
    Ankle,
    Gun,
    Vest,
    Extra,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfigInput {
    pub version: u32,
    pub output_dir: Option<PathBuf>,
    pub verify_crc: Option<bool>,
    /// Replaces the built-in roster when present.
    pub devices: Option<Vec<DeviceInput>>,
    pub gatt: GattInput,
    pub timing: TimingInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInput {
    pub mac: String,
    pub player_id: u8,
    pub role: Option<DeviceRole>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GattInput {
    pub service_uuid: Option<Uuid>,
    pub characteristic_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimingInput {
    pub ble_timeout_ms: Option<u64>,
    pub queue_get_timeout_ms: Option<u64>,
    pub cooldown_period_ms: Option<u64>,
    pub max_retransmits: Option<u32>,
    pub packets_per_action: Option<usize>,
    pub queue_capacity: Option<usize>,
}

// ─── Resolved ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub mac: MacAddr,
    pub player_id: u8,
    pub role: DeviceRole,
}

/// Known peripherals, loaded once at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRoster {
    devices: Vec<Device>,
}

impl DeviceRoster {
    pub fn get(&self, mac: &MacAddr) -> Option<&Device> {
        self.devices.iter().find(|d| d.mac == *mac)
    }

    pub fn player_for(&self, mac: &MacAddr) -> Option<u8> {
        self.get(mac).map(|d| d.player_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattConfig {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}

impl Default for GattConfig {
    fn default() -> Self {
        Self {
            service_uuid: GATT_SERIAL_SERVICE_UUID,
            characteristic_uuid: GATT_SERIAL_CHARACTERISTIC_UUID,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    pub ble_timeout: Duration,
    pub queue_get_timeout: Duration,
    pub cooldown_period: Duration,
    pub max_retransmits: u32,
    pub packets_per_action: usize,
    pub queue_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ble_timeout: BLE_TIMEOUT,
            queue_get_timeout: QUEUE_GET_TIMEOUT,
            cooldown_period: COOLDOWN_PERIOD,
            max_retransmits: MAX_RETRANSMITS,
            packets_per_action: PACKETS_PER_ACTION,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub version: u32,
    pub output_dir: PathBuf,
    pub verify_crc: bool,
    pub roster: DeviceRoster,
    pub gatt: GattConfig,
    pub timing: TimingConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let devices = DEFAULT_DEVICES
            .iter()
            .filter_map(|&(mac, player_id, role)| {
                Some(Device {
                    mac: mac.parse().ok()?,
                    player_id,
                    role,
                })
            })
            .collect();
        Self {
            version: CONFIG_VERSION,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            verify_crc: true,
            roster: DeviceRoster { devices },
            gatt: GattConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl RelayConfigInput {
    pub fn resolve(self) -> Result<RelayConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let defaults = RelayConfig::default();

        let roster = match self.devices {
            None => defaults.roster,
            Some(inputs) => {
                let mut seen = HashSet::new();
                let mut devices = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let mac: MacAddr = input.mac.parse()?;
                    if !matches!(input.player_id, 1 | 2) {
                        return Err(ConfigError::InvalidPlayer {
                            mac,
                            player_id: input.player_id,
                        });
                    }
                    if !seen.insert(mac) {
                        return Err(ConfigError::DuplicateDevice(mac));
                    }
                    devices.push(Device {
                        mac,
                        player_id: input.player_id,
                        role: input.role.unwrap_or(DeviceRole::Extra),
                    });
                }
                DeviceRoster { devices }
            }
        };

        let gatt = GattConfig {
            service_uuid: self.gatt.service_uuid.unwrap_or(defaults.gatt.service_uuid),
            characteristic_uuid: self
                .gatt
                .characteristic_uuid
                .unwrap_or(defaults.gatt.characteristic_uuid),
        };

        let t = self.timing;
        let d = defaults.timing;
        let timing = TimingConfig {
            ble_timeout: t.ble_timeout_ms.map(Duration::from_millis).unwrap_or(d.ble_timeout),
            queue_get_timeout: t
                .queue_get_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(d.queue_get_timeout),
            cooldown_period: t
                .cooldown_period_ms
                .map(Duration::from_millis)
                .unwrap_or(d.cooldown_period),
            max_retransmits: t.max_retransmits.unwrap_or(d.max_retransmits),
            packets_per_action: t.packets_per_action.unwrap_or(d.packets_per_action).max(1),
            queue_capacity: t.queue_capacity.unwrap_or(d.queue_capacity).max(1),
        };

        let output_dir = self
            .output_dir
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(defaults.output_dir);

        Ok(RelayConfig {
            version,
            output_dir,
            verify_crc: self.verify_crc.unwrap_or(defaults.verify_crc),
            roster,
            gatt,
            timing,
        })
    }
}

impl RelayConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(RelayConfig::default());
        }
        let parsed: RelayConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// A handshake driver using this config's timeout and retransmit budget.
    pub fn handshake(&self) -> Handshake {
        Handshake::new(self.timing.ble_timeout, self.timing.max_retransmits)
    }

    /// An action windower for `player_id` using this config's window size
    /// and cooldown.
    pub fn imu_relay(&self, player_id: u8) -> ImuRelay {
        ImuRelay::new(player_id, &self.timing)
    }
}
