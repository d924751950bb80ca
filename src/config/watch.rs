//! Live settings: change channels and the settings file watcher.
//!
//! [`SettingsHub`] owns one `watch` channel per settings section. Each
//! consumer loop holds its own receiver: the current value is readable
//! immediately and `changed()` resolves on every later update of that
//! section. Publishing a reloaded file only wakes the sections whose value
//! actually changed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::loader::load_settings;
use super::schema::{BackupSettings, Settings, SyncSettings};
use crate::error::{Result, WledError};

/// Quiet period after a file event before the file is re-read.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

/// Which settings sections a publish changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub backup: bool,
    pub sync: bool,
}

impl SettingsChange {
    pub const fn any(self) -> bool {
        self.backup || self.sync
    }
}

/// Owner of the live settings channels.
#[derive(Debug)]
pub struct SettingsHub {
    backup: watch::Sender<BackupSettings>,
    sync: watch::Sender<SyncSettings>,
}

impl SettingsHub {
    /// Create a hub seeded with the initial settings.
    pub fn new(settings: Settings) -> Self {
        let (backup, _) = watch::channel(settings.backup);
        let (sync, _) = watch::channel(settings.sync);
        Self { backup, sync }
    }

    /// Subscribe to backup settings.
    pub fn backup(&self) -> watch::Receiver<BackupSettings> {
        self.backup.subscribe()
    }

    /// Subscribe to sync settings.
    pub fn sync(&self) -> watch::Receiver<SyncSettings> {
        self.sync.subscribe()
    }

    /// Snapshot of the current settings.
    pub fn current(&self) -> Settings {
        Settings {
            backup: self.backup.borrow().clone(),
            sync: self.sync.borrow().clone(),
        }
    }

    /// Replace the settings, notifying only the sections that changed.
    pub fn publish(&self, settings: Settings) -> SettingsChange {
        let Settings { backup, sync } = settings;
        let change = SettingsChange {
            backup: self.backup.send_if_modified(|current| replace_if_changed(current, backup)),
            sync: self.sync.send_if_modified(|current| replace_if_changed(current, sync)),
        };
        debug!(backup = change.backup, sync = change.sync, "Settings published");
        change
    }
}

fn replace_if_changed<T: PartialEq>(current: &mut T, next: T) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

/// Re-read the settings file and publish it.
///
/// # Errors
///
/// Returns the load error; the hub keeps its previous settings in that case.
pub fn reload(path: &Path, hub: &SettingsHub) -> Result<SettingsChange> {
    let settings = load_settings(path)?;
    Ok(hub.publish(settings))
}

/// Watch the settings file and publish every valid new version until
/// `cancel` fires.
///
/// The parent directory is watched rather than the file itself so that
/// editors replacing the file by rename are still noticed.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn spawn_file_watcher(
    path: PathBuf,
    hub: Arc<SettingsHub>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let dir = super::path::config_dir(&path);
    let file_name = path
        .file_name()
        .map(ToOwned::to_owned)
        .ok_or_else(|| WledError::ConfigInvalid(format!("Not a file: {}", path.display())))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = tx.send(event);
        })
        .map_err(|e| WledError::Other(format!("Failed to create file watcher: {e}")))?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| WledError::Other(format!("Failed to watch {}: {e}", dir.display())))?;
    info!(dir = %dir.display(), "Watching settings file for changes");

    Ok(tokio::spawn(async move {
        // Dropping the watcher stops the notifications.
        let _watcher = watcher;

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                Ok(event) if event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) => {
                    trace!(kind = ?event.kind, "Settings file event");
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "File watcher error");
                    continue;
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(RELOAD_DEBOUNCE) => {}
            }
            while rx.try_recv().is_ok() {}

            match reload(&path, &hub) {
                Ok(change) if change.any() => {
                    info!(backup = change.backup, sync = change.sync, "Settings reloaded");
                }
                Ok(_) => debug!("Settings file touched without changes"),
                Err(e) => error!(error = %e, "Failed to reload settings, keeping previous ones"),
            }
        }

        debug!("Settings watcher stopped");
    }))
}
