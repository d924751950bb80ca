//! Error types for WLED manager operations.

use thiserror::Error;

/// Primary error type for backup, sync, and health-check operations.
#[derive(Error, Debug)]
pub enum WledError {
    // Device errors
    #[error("Invalid device address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Request to '{address}' failed: {source}")]
    Http {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Device '{address}' answered {status} for {endpoint}")]
    Status {
        address: String,
        endpoint: &'static str,
        status: u16,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    // Health check errors
    #[error("Health check '{url}' has already been completed")]
    HealthCheckCompleted { url: String },

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // Web server errors
    #[error("Web server failed to start on {addr}: {reason}")]
    WebServerFailed { addr: String, reason: String },

    // General errors
    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl WledError {
    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. }
                | Self::ConfigNotFound { .. }
                | Self::ConfigParse(_)
                | Self::ConfigInvalid(_)
                | Self::WebServerFailed { .. }
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => Some("Pass --config <PATH> or set WLEDM_CONFIG"),
            Self::InvalidAddress { .. } => Some("Use a hostname, an IP address, or an http(s) URL"),
            Self::WebServerFailed { .. } => Some("Use --port to pick a free port"),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using WledError.
pub type Result<T> = std::result::Result<T, WledError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| WledError::Other(format!("{}: {e}", f().into())))
    }
}
