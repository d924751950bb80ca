//! Device abstraction layer for WLED controllers.
//!
//! This module provides a trait-based abstraction over the real HTTP client
//! and a mock implementation, so backup and sync passes can be tested without
//! hardware.

mod http;
mod info;
pub mod mock;

pub use http::{DEVICE_TIMEOUT, WledClient, device_base_url};
pub use info::{DEFAULT_LED_COUNT, DeviceConfiguration};

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, WledError};

/// The three device operations the manager needs.
///
/// Devices are addressed by hostname, IP address, or full `http(s)` URL.
/// Payloads are raw bytes so backups can be written byte-for-byte.
///
/// # Implementation Notes
///
/// - Every call is independent; implementations must not keep per-device state
///   that outlives a call
/// - Cancellation is done by dropping the returned future
pub trait DeviceClient: Send + Sync + 'static {
    /// Fetch `cfg.json`.
    fn get_configuration(&self, address: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Fetch `presets.json`.
    fn get_presets(&self, address: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Replace the device's `presets.json` with `json`.
    fn set_presets(&self, address: &str, json: String) -> impl Future<Output = Result<()>> + Send;
}

/// Race `fut` against `cancel`, returning [`WledError::Cancelled`] if the
/// token fires first.
pub(crate) async fn or_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(WledError::Cancelled),
        res = fut => res,
    }
}
