//! Device configuration as reported by `cfg.json`.

use serde::Deserialize;

use crate::error::Result;

/// LED count assumed when a target does not report one.
pub const DEFAULT_LED_COUNT: u64 = 512;

/// The parts of a device's `cfg.json` the manager reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfiguration {
    /// Device name from `id.name`.
    pub name: Option<String>,
    /// Total LED count of the attached strip from `hw.led.total`.
    pub led_count: Option<u64>,
}

#[derive(Deserialize)]
struct RawConfiguration {
    id: Option<RawIdentity>,
    hw: Option<RawHardware>,
}

#[derive(Deserialize)]
struct RawIdentity {
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawHardware {
    led: Option<RawLeds>,
}

#[derive(Deserialize)]
struct RawLeds {
    total: Option<u64>,
}

impl DeviceConfiguration {
    /// Parse the relevant fields out of a raw `cfg.json` payload.
    ///
    /// Unknown fields are ignored; missing sections leave the field empty.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: RawConfiguration = serde_json::from_slice(bytes)?;
        Ok(Self {
            name: raw.id.and_then(|id| id.name),
            led_count: raw.hw.and_then(|hw| hw.led).and_then(|led| led.total),
        })
    }

    /// The device name, if present and non-empty.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// The LED count, falling back to [`DEFAULT_LED_COUNT`].
    pub fn led_count_or_default(&self) -> u64 {
        self.led_count.unwrap_or(DEFAULT_LED_COUNT)
    }
}
