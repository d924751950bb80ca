//! Settings schema for backups and preset synchronization.
//!
//! # Example TOML
//!
//! ```toml
//! [backup]
//! path = "/wled-manager/backups"
//! time_of_day = "03:00"
//! start_delay_secs = 30
//! devices = ["wled-kitchen.local", "192.168.1.42"]
//! health = "https://hc-ping.com/your-uuid"
//!
//! [[sync]]
//! source = "wled-kitchen.local"
//! targets = ["wled-living.local", "wled-desk.local"]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Result, WledError};

/// Default storage root inside the container image.
pub const DEFAULT_BACKUP_PATH: &str = "/wled-manager/backups";

/// Complete settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Backup schedule and device list.
    pub backup: BackupSettings,

    /// Preset synchronization rules, applied in order.
    pub sync: SyncSettings,
}

/// Settings read by the backup scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Root directory; each device gets a `<root>/<name>/` subdirectory.
    pub path: PathBuf,

    /// Local wall-clock time of the daily run.
    #[serde(with = "time_of_day")]
    pub time_of_day: NaiveTime,

    /// Delay before the startup run. `None` disables the startup run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_delay_secs: Option<u64>,

    /// Hostnames, IP addresses or URLs of devices to back up.
    pub devices: Vec<String>,

    /// Optional monitoring endpoint notified of every run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_BACKUP_PATH),
            time_of_day: NaiveTime::from_hms_opt(3, 0, 0).unwrap_or_default(),
            start_delay_secs: None,
            devices: Vec::new(),
            health: None,
        }
    }
}

impl BackupSettings {
    /// Startup delay as a [`Duration`].
    pub fn start_delay(&self) -> Option<Duration> {
        self.start_delay_secs.map(Duration::from_secs)
    }
}

/// One source device whose presets are pushed to every target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncRule {
    /// Address of the device holding the canonical presets.
    pub source: String,

    /// Addresses of the devices receiving them.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Ordered list of sync rules.
pub type SyncSettings = Vec<SyncRule>;

impl Settings {
    /// Validate addresses and the health URL.
    ///
    /// # Errors
    ///
    /// Returns [`WledError::ConfigInvalid`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        trace!("Validating settings");

        for device in &self.backup.devices {
            validate_address(device, "backup.devices")?;
        }

        if let Some(health) = &self.backup.health {
            validate_health_url(health)?;
        }

        for (idx, rule) in self.sync.iter().enumerate() {
            validate_address(&rule.source, &format!("sync[{idx}].source"))?;
            for target in &rule.targets {
                validate_address(target, &format!("sync[{idx}].targets"))?;
            }
        }

        Ok(())
    }
}

fn validate_address(address: &str, field: &str) -> Result<()> {
    if address.trim().is_empty() {
        return Err(WledError::ConfigInvalid(format!(
            "{field} contains an empty device address"
        )));
    }
    Ok(())
}

fn validate_health_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|e| WledError::ConfigInvalid(format!("backup.health '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(WledError::ConfigInvalid(format!(
            "backup.health '{url}': unsupported scheme '{other}'"
        ))),
    }
}

/// Serde adapter accepting `"HH:MM"` and `"HH:MM:SS"`.
pub mod time_of_day {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

    /// Parse a time of day in one of the accepted formats.
    pub fn parse(value: &str) -> Option<NaiveTime> {
        let value = value.trim();
        FORMATS
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| {
            D::Error::custom(format!("invalid time of day '{raw}', expected HH:MM or HH:MM:SS"))
        })
    }
}
