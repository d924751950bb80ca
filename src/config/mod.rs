//! Settings for the backup scheduler and the preset synchronizer.
//!
//! Handles loading the settings file (TOML, YAML or JSON), validating it,
//! and distributing live updates to the running services.

mod loader;
mod path;
mod schema;
mod watch;

pub use loader::{ConfigFormat, load_settings, load_settings_from_str};
pub use path::{config_dir, home_dir, resolve_path};
pub use schema::{
    BackupSettings, DEFAULT_BACKUP_PATH, Settings, SyncRule, SyncSettings, time_of_day,
};
pub use watch::{SettingsChange, SettingsHub, reload, spawn_file_watcher};

/// Default location of the settings file inside the container image.
pub const DEFAULT_CONFIG_PATH: &str = "/wled-manager/config.toml";
