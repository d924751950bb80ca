//! Scheduled device backups.
//!
//! A backup pass visits every configured device in order and copies its
//! `cfg.json` and `presets.json` byte-for-byte to
//! `<root>/<device name>/config.json` and `<root>/<device name>/presets.json`.
//! One failing device never stops the others; any failure is reported on the
//! pass's health-check session instead of the success ping.
//!
//! Passes are serialized: a manual request arriving while the daily pass is
//! running waits for it.
//!
//! [`BackupService::run`] owns the daily timer. It runs a startup pass after
//! the configured delay, fires daily at the configured time of day, and
//! re-arms the timer in place whenever the backup settings change.

mod timer;

pub use timer::{Clock, DAY, DailyTimer, ManualClock, SystemClock, due_after};

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use crate::config::BackupSettings;
use crate::device::{DeviceClient, DeviceConfiguration, or_cancelled};
use crate::error::{Result, ResultExt, WledError};
use crate::health::{HealthCheck, HealthChecks};

/// File name of the configuration copy.
pub const CONFIG_FILE: &str = "config.json";

/// File name of the presets copy.
pub const PRESETS_FILE: &str = "presets.json";

/// Outcome of backing up one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceBackupOutcome {
    pub address: String,
    /// Storage directory name, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one backup pass.
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub run_id: Uuid,
    pub devices: Vec<DeviceBackupOutcome>,
}

impl BackupReport {
    pub fn succeeded(&self) -> usize {
        self.devices.iter().filter(|d| d.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.devices.len() - self.succeeded()
    }
}

/// Backup scheduler and pass runner.
pub struct BackupService<C> {
    client: C,
    health: HealthChecks,
    settings: watch::Receiver<BackupSettings>,
    pass_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl<C: DeviceClient> BackupService<C> {
    pub fn new(client: C, health: HealthChecks, settings: watch::Receiver<BackupSettings>) -> Self {
        Self {
            client,
            health,
            settings,
            pass_lock: Mutex::new(()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for the time of day instead of the host's local time.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one backup pass over the current device list.
    ///
    /// Device errors are recorded in the report and on the health check,
    /// never returned.
    ///
    /// # Errors
    ///
    /// Returns [`WledError::Cancelled`] if `cancel` fires before or during the
    /// pass. The health-check session is closed with a failure first.
    pub async fn run_backup_now(&self, cancel: &CancellationToken) -> Result<BackupReport> {
        let _pass = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WledError::Cancelled),
            guard = self.pass_lock.lock() => guard,
        };

        let settings = self.settings.borrow().clone();
        let run_id = Uuid::new_v4();

        async {
            trace!(
                devices = settings.devices.len(),
                root = %settings.path.display(),
                "Starting backup"
            );
            let hc = self.health.start_new(settings.health.as_deref());

            let mut devices = Vec::with_capacity(settings.devices.len());
            for address in &settings.devices {
                match self.backup_device(&settings.path, address, cancel).await {
                    Ok(name) => {
                        info!(address = %address, name = %name, "Backed up device");
                        devices.push(DeviceBackupOutcome {
                            address: address.clone(),
                            name: Some(name),
                            ok: true,
                            error: None,
                        });
                    }
                    Err(WledError::Cancelled) => {
                        warn!("Backup cancelled");
                        report_failure(&hc, &WledError::Cancelled);
                        hc.complete().await;
                        return Err(WledError::Cancelled);
                    }
                    Err(e) => {
                        error!(address = %address, error = %e, "Failed to back up device");
                        report_failure(&hc, &e);
                        devices.push(DeviceBackupOutcome {
                            address: address.clone(),
                            name: None,
                            ok: false,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
            hc.complete().await;

            let report = BackupReport { run_id, devices };
            info!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                "Backup finished"
            );
            Ok(report)
        }
        .instrument(info_span!("backup", %run_id))
        .await
    }

    async fn backup_device(
        &self,
        root: &Path,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let config = or_cancelled(cancel, self.client.get_configuration(address)).await?;
        let name = storage_name(address, &config);
        let dir = root.join(&name);

        or_cancelled(cancel, async {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))
        })
        .await?;
        write_file(&dir.join(CONFIG_FILE), &config, cancel).await?;

        let presets = or_cancelled(cancel, self.client.get_presets(address)).await?;
        write_file(&dir.join(PRESETS_FILE), &presets, cancel).await?;

        debug!(
            address,
            dir = %dir.display(),
            config_bytes = config.len(),
            presets_bytes = presets.len(),
            "Wrote backup files"
        );
        Ok(name)
    }

    /// Run the scheduler until `cancel` fires.
    ///
    /// Passes are spawned and joined before returning, so a pass in progress
    /// at shutdown observes the cancellation and stops.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut settings = self.settings.clone();
        let initial = settings.borrow_and_update().clone();
        let mut passes: JoinSet<Result<BackupReport>> = JoinSet::new();

        match initial.start_delay() {
            Some(delay) => {
                info!(delay = ?delay, "Startup backup scheduled");
                let this = Arc::clone(&self);
                let cancel = cancel.clone();
                passes.spawn(async move {
                    tokio::select! {
                        () = cancel.cancelled() => Err(WledError::Cancelled),
                        () = tokio::time::sleep(delay) => this.run_backup_now(&cancel).await,
                    }
                });
            }
            None => debug!("No startup delay configured, skipping startup backup"),
        }

        let mut timer = DailyTimer::arm(initial.time_of_day, self.clock.as_ref());
        info!(
            time_of_day = %timer.time_of_day(),
            next_in = ?timer.remaining(),
            "Backup timer armed"
        );

        let mut settings_open = true;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = settings.changed(), if settings_open => {
                    if changed.is_err() {
                        debug!("Backup settings channel closed, keeping current schedule");
                        settings_open = false;
                        continue;
                    }
                    let time_of_day = settings.borrow_and_update().time_of_day;
                    timer.rearm(time_of_day, self.clock.as_ref());
                    info!(
                        time_of_day = %timer.time_of_day(),
                        next_in = ?timer.remaining(),
                        "Backup settings changed, timer re-armed"
                    );
                }
                () = timer.tick() => {
                    info!("Backup timer fired");
                    let this = Arc::clone(&self);
                    let cancel = cancel.clone();
                    passes.spawn(async move { this.run_backup_now(&cancel).await });
                }
                Some(joined) = passes.join_next() => log_pass(joined),
            }
        }

        trace!("Backup timer disposed");
        while let Some(joined) = passes.join_next().await {
            log_pass(joined);
        }
        debug!("Backup service stopped");
    }
}

/// Report `reason` on `hc` unless a failure was already reported.
fn report_failure(hc: &HealthCheck, reason: &WledError) {
    if hc.has_failed() {
        return;
    }
    if let Err(e) = hc.set_failed(reason) {
        warn!(error = %e, "Failed to report backup failure");
    }
}

async fn write_file(path: &Path, contents: &[u8], cancel: &CancellationToken) -> Result<()> {
    or_cancelled(cancel, async {
        tokio::fs::write(path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    })
    .await
}

/// Directory name for a device: its configured name, or the address when the
/// name is missing or unusable as a single path component.
pub fn storage_name(address: &str, config: &[u8]) -> String {
    let parsed = match DeviceConfiguration::parse(config) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(address, error = %e, "Unreadable configuration, storing backup under the address");
            return path_component(address);
        }
    };

    match parsed.display_name() {
        Some(name) if is_plain_component(name) => name.to_string(),
        Some(name) => {
            warn!(address, name, "Device name is not a valid directory name, storing backup under the address");
            path_component(address)
        }
        None => {
            warn!(address, "Device has no name, storing backup under the address");
            path_component(address)
        }
    }
}

fn is_plain_component(name: &str) -> bool {
    !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// The address, with path separators replaced so URLs stay one directory.
fn path_component(address: &str) -> String {
    let component = address.replace(['/', '\\'], "_");
    if is_plain_component(&component) {
        component
    } else {
        format!("_{component}")
    }
}

fn log_pass(joined: std::result::Result<Result<BackupReport>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(_)) => {}
        Ok(Err(WledError::Cancelled)) => debug!("Backup pass cancelled"),
        Ok(Err(e)) => error!(error = %e, "Backup pass failed"),
        Err(e) => error!(error = %e, "Backup pass panicked"),
    }
}
