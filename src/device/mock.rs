//! Mock device client for unit testing.
//!
//! Serves canned `cfg.json`/`presets.json` payloads per address, records
//! every call, and keeps the uploaded preset documents for assertions.
//!
//! # Example
//!
//! ```rust,ignore
//! use wledm::device::mock::{MockDeviceClient, Operation};
//!
//! let mock = MockDeviceClient::new()
//!     .with_device("wled-a", r#"{"id":{"name":"Kitchen"}}"#, "{}")
//!     .with_unreachable("wled-b");
//!
//! // ... run a backup pass against `mock` ...
//!
//! mock.assert_contains(&Operation::GetPresets { address: "wled-a".into() });
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, trace};

use super::DeviceClient;
use crate::error::{Result, WledError};

/// Recorded operation for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetConfiguration { address: String },
    GetPresets { address: String },
    SetPresets { address: String, json: String },
}

/// Canned state of one mock device. `None` payloads make the call fail.
#[derive(Debug, Clone, Default)]
struct MockDevice {
    config: Option<Vec<u8>>,
    presets: Option<Vec<u8>>,
    reject_uploads: bool,
    uploads: Vec<String>,
}

/// Mock device client for testing without real hardware.
#[derive(Debug, Default)]
pub struct MockDeviceClient {
    devices: Mutex<HashMap<String, MockDevice>>,
    operation_log: Mutex<Vec<Operation>>,
}

impl MockDeviceClient {
    /// Create a mock with no devices; every address is unreachable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reachable device.
    #[must_use]
    pub fn with_device(self, address: &str, config: &str, presets: &str) -> Self {
        debug!(address, "Registering mock device");
        self.lock_devices().insert(
            address.to_string(),
            MockDevice {
                config: Some(config.as_bytes().to_vec()),
                presets: Some(presets.as_bytes().to_vec()),
                ..MockDevice::default()
            },
        );
        self
    }

    /// Register a device answering `cfg.json` but failing `presets.json`.
    #[must_use]
    pub fn with_config_only(self, address: &str, config: &str) -> Self {
        self.lock_devices().insert(
            address.to_string(),
            MockDevice {
                config: Some(config.as_bytes().to_vec()),
                ..MockDevice::default()
            },
        );
        self
    }

    /// Register a device that is known but does not answer.
    #[must_use]
    pub fn with_unreachable(self, address: &str) -> Self {
        self.lock_devices()
            .insert(address.to_string(), MockDevice::default());
        self
    }

    /// Make uploads to `address` fail.
    #[must_use]
    pub fn rejecting_uploads(self, address: &str) -> Self {
        self.lock_devices()
            .entry(address.to_string())
            .or_default()
            .reject_uploads = true;
        self
    }

    /// Preset documents uploaded to `address`, oldest first.
    pub fn uploads(&self, address: &str) -> Vec<String> {
        self.lock_devices()
            .get(address)
            .map(|d| d.uploads.clone())
            .unwrap_or_default()
    }

    /// All recorded operations, in call order.
    pub fn operations(&self) -> Vec<Operation> {
        self.operation_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Assert the exact sequence of recorded operations.
    ///
    /// # Panics
    ///
    /// Panics if the recorded operations differ.
    pub fn assert_operations(&self, expected: &[Operation]) {
        assert_eq!(self.operations(), expected, "Operation log mismatch");
    }

    /// Assert that an operation was recorded.
    ///
    /// # Panics
    ///
    /// Panics if the operation was never recorded.
    pub fn assert_contains(&self, op: &Operation) {
        let ops = self.operations();
        assert!(ops.contains(op), "Expected {op:?} in {ops:?}");
    }

    fn record(&self, op: Operation) {
        trace!(?op, "Mock operation");
        self.operation_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(op);
    }

    fn lock_devices(&self) -> std::sync::MutexGuard<'_, HashMap<String, MockDevice>> {
        self.devices
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn fetch(
        &self,
        address: &str,
        endpoint: &str,
        pick: impl Fn(&MockDevice) -> Option<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        self.lock_devices()
            .get(address)
            .and_then(pick)
            .ok_or_else(|| unreachable_error(address, endpoint))
    }
}

fn unreachable_error(address: &str, endpoint: &str) -> WledError {
    WledError::Other(format!("{address}: connection refused ({endpoint})"))
}

impl DeviceClient for MockDeviceClient {
    async fn get_configuration(&self, address: &str) -> Result<Vec<u8>> {
        self.record(Operation::GetConfiguration {
            address: address.to_string(),
        });
        self.fetch(address, "cfg.json", |d| d.config.clone())
    }

    async fn get_presets(&self, address: &str) -> Result<Vec<u8>> {
        self.record(Operation::GetPresets {
            address: address.to_string(),
        });
        self.fetch(address, "presets.json", |d| d.presets.clone())
    }

    async fn set_presets(&self, address: &str, json: String) -> Result<()> {
        self.record(Operation::SetPresets {
            address: address.to_string(),
            json: json.clone(),
        });
        let mut devices = self.lock_devices();
        match devices.get_mut(address) {
            Some(device) if device.config.is_some() && !device.reject_uploads => {
                device.uploads.push(json);
                Ok(())
            }
            _ => Err(unreachable_error(address, "upload")),
        }
    }
}
