//! Settings file loading.
//!
//! The format is picked from the file extension: TOML, YAML or JSON.

use std::path::Path;

use tracing::{debug, info, instrument, trace};

use super::path::{config_dir, resolve_path};
use super::schema::Settings;
use crate::error::{Result, WledError};

/// Settings file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format (.toml).
    Toml,
    /// YAML format (.yaml, .yml).
    Yaml,
    /// JSON format (.json).
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        trace!(extension = %ext, "Detecting config format from extension");
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Load settings from a file, resolving the backup path against the file's
/// directory.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The format cannot be detected from the extension
/// - The file content cannot be parsed
/// - Validation fails
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    debug!("Loading settings file");

    let format = ConfigFormat::from_extension(path).ok_or_else(|| {
        WledError::ConfigParse(format!(
            "Unknown config format for '{}': expected .toml, .yaml, .yml or .json",
            path.display()
        ))
    })?;

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WledError::ConfigNotFound {
                path: path.display().to_string(),
            }
        } else {
            WledError::Io(e)
        }
    })?;
    debug!(bytes = content.len(), format = ?format, "Read settings file");

    let mut settings = load_settings_from_str(&content, format)?;
    settings.backup.path = resolve_path(&settings.backup.path, &config_dir(path))?;

    info!(
        devices = settings.backup.devices.len(),
        sync_rules = settings.sync.len(),
        "Settings loaded"
    );
    Ok(settings)
}

/// Parse and validate settings from a string with a specified format.
///
/// Empty content yields the default settings.
///
/// # Errors
///
/// Returns an error if parsing or validation fails.
#[instrument(skip(content), fields(format = ?format, content_len = content.len()))]
pub fn load_settings_from_str(content: &str, format: ConfigFormat) -> Result<Settings> {
    if content.trim().is_empty() {
        debug!("Empty settings, using defaults");
        return Ok(Settings::default());
    }

    let settings: Settings = match format {
        ConfigFormat::Toml => toml::from_str(content)
            .map_err(|e| WledError::ConfigParse(format!("TOML: {e}")))?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| WledError::ConfigParse(format!("YAML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| WledError::ConfigParse(format!("JSON: {e}")))?,
    };

    settings.validate()?;
    Ok(settings)
}
