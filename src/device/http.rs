//! HTTP client for the WLED JSON API.
//!
//! Wraps a shared `reqwest` client; connections are pooled across devices.

use std::time::Duration;

use reqwest::Url;
use reqwest::multipart::{Form, Part};
use tracing::{debug, trace};

use super::DeviceClient;
use crate::error::{Result, WledError};

/// Per-request timeout for device calls.
pub const DEVICE_TIMEOUT: Duration = Duration::from_secs(15);

/// Real WLED HTTP client.
#[derive(Debug, Clone)]
pub struct WledClient {
    http: reqwest::Client,
}

impl WledClient {
    /// Create a client with the default 15s request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEVICE_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WledError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    async fn get(&self, address: &str, endpoint: &'static str) -> Result<Vec<u8>> {
        let url = endpoint_url(address, endpoint)?;
        trace!(%url, "GET");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| http_error(address, source))?;
        check_status(address, endpoint, &response)?;

        let body = response
            .bytes()
            .await
            .map_err(|source| http_error(address, source))?;
        debug!(address, endpoint, bytes = body.len(), "Fetched");
        Ok(body.to_vec())
    }
}

impl DeviceClient for WledClient {
    async fn get_configuration(&self, address: &str) -> Result<Vec<u8>> {
        self.get(address, "cfg.json").await
    }

    async fn get_presets(&self, address: &str) -> Result<Vec<u8>> {
        self.get(address, "presets.json").await
    }

    async fn set_presets(&self, address: &str, json: String) -> Result<()> {
        let url = endpoint_url(address, "upload")?;
        let bytes = json.len();
        let part = Part::text(json)
            .file_name("/presets.json")
            .mime_str("application/json")
            .map_err(|source| http_error(address, source))?;
        let form = Form::new().part("data", part);

        trace!(%url, bytes, "POST presets");
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| http_error(address, source))?;
        check_status(address, "upload", &response)?;

        debug!(address, bytes, "Uploaded presets");
        Ok(())
    }
}

/// Base URL of a device.
///
/// Absolute `http`/`https` URLs are used as given; anything else is treated
/// as a host (optionally with port) reached over plain `http`. The result
/// always ends with `/`.
pub fn device_base_url(address: &str) -> Result<Url> {
    let address = address.trim();
    let invalid = |reason: String| WledError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let mut url = match Url::parse(address) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => url,
        _ => Url::parse(&format!("http://{address}/")).map_err(|e| invalid(e.to_string()))?,
    };

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn endpoint_url(address: &str, endpoint: &str) -> Result<Url> {
    device_base_url(address)?
        .join(endpoint)
        .map_err(|e| WledError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

fn check_status(address: &str, endpoint: &'static str, response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(WledError::Status {
            address: address.to_string(),
            endpoint,
            status: status.as_u16(),
        })
    }
}

fn http_error(address: &str, source: reqwest::Error) -> WledError {
    WledError::Http {
        address: address.to_string(),
        source,
    }
}
