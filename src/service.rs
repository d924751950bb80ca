//! Daemon wiring.
//!
//! Starts the backup scheduler, the sync loop, the settings watcher and the
//! trigger server on one [`CancellationToken`], and joins them all on
//! shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backup::BackupService;
use crate::config::{SettingsHub, load_settings, spawn_file_watcher};
use crate::device::{DeviceClient, WledClient};
use crate::error::{Result, WledError};
use crate::health::HealthChecks;
use crate::server::{self, AppState};
use crate::sync::SyncService;

/// Run the daemon against real devices until `cancel` fires.
pub async fn run(config_path: PathBuf, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
    let client = WledClient::new()?;
    run_with_client(client, HealthChecks::new()?, config_path, listener, cancel).await
}

/// Run the daemon with a given device client.
///
/// # Errors
///
/// Fails if the settings cannot be loaded or watched, or if the trigger
/// server stops with an error. Background loops are always joined first.
pub async fn run_with_client<C: DeviceClient + Clone>(
    client: C,
    health: HealthChecks,
    config_path: PathBuf,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<()> {
    let settings = load_settings(&config_path)?;
    info!(
        config = %config_path.display(),
        devices = settings.backup.devices.len(),
        rules = settings.sync.len(),
        "Settings loaded"
    );

    let hub = Arc::new(SettingsHub::new(settings));
    let backup = Arc::new(BackupService::new(client.clone(), health, hub.backup()));
    let sync = Arc::new(SyncService::new(client, hub.sync()));

    let watcher = spawn_file_watcher(config_path, Arc::clone(&hub), cancel.clone())?;

    let mut tasks = JoinSet::new();
    tasks.spawn({
        let backup = Arc::clone(&backup);
        let cancel = cancel.clone();
        async move {
            backup.run(cancel).await;
            Ok(())
        }
    });
    tasks.spawn({
        let sync = Arc::clone(&sync);
        let cancel = cancel.clone();
        async move {
            sync.run(cancel).await;
            Ok(())
        }
    });
    tasks.spawn({
        let state = AppState {
            backup,
            sync,
            cancel: cancel.clone(),
        };
        server::serve(listener, state, cancel.clone())
    });

    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(WledError::Other(format!("Task panicked: {e}"))));
        if let Err(e) = outcome {
            error!(error = %e, "Service task failed, shutting down");
            cancel.cancel();
            if result.is_ok() {
                result = Err(e);
            }
        }
    }

    if let Err(e) = watcher.await {
        warn!(error = %e, "Settings watcher ended abnormally");
    }
    info!("Shutdown complete");
    result
}

/// Cancel `cancel` on Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            res = tokio::signal::ctrl_c() => {
                match res {
                    Ok(()) => info!("Ctrl-C received, shutting down"),
                    Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
                }
                cancel.cancel();
            }
        }
        debug!("Signal handler stopped");
    });
}
