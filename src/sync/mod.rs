//! Preset synchronization from a source device to its targets.
//!
//! A pass walks every [`SyncRule`]: the source's `presets.json` is fetched
//! once, then each target gets a copy patched for its own LED count. A target
//! failure only skips that target; a source failure only skips that rule.
//!
//! [`SyncService::run`] performs one pass at startup and a full new pass
//! every time the sync settings change, without waiting for the previous one.

mod patch;

pub use patch::{SEGMENTS_KEY, STOP_KEY, patch_presets};

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use crate::config::{SyncRule, SyncSettings};
use crate::device::{DeviceClient, DeviceConfiguration, DEFAULT_LED_COUNT, or_cancelled};
use crate::error::{Result, WledError};

/// Outcome of pushing presets to one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub address: String,
    /// LED count the presets were patched for.
    pub led_count: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one sync rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub source: String,
    /// Set when the source presets could not be loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub targets: Vec<TargetOutcome>,
}

/// Result of one sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub rules: Vec<RuleOutcome>,
}

impl SyncReport {
    /// Number of targets that received their presets.
    pub fn synced_count(&self) -> usize {
        self.rules
            .iter()
            .flat_map(|r| &r.targets)
            .filter(|t| t.ok)
            .count()
    }

    /// Number of failed rules plus failed targets.
    pub fn error_count(&self) -> usize {
        self.rules
            .iter()
            .map(|r| usize::from(r.error.is_some()) + r.targets.iter().filter(|t| !t.ok).count())
            .sum()
    }
}

/// Preset synchronization service.
pub struct SyncService<C> {
    client: C,
    settings: watch::Receiver<SyncSettings>,
}

impl<C: DeviceClient> SyncService<C> {
    /// Create a service reading rules from `settings`.
    pub fn new(client: C, settings: watch::Receiver<SyncSettings>) -> Self {
        Self { client, settings }
    }

    /// The device client, mainly for test assertions.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one full sync pass over the current rules.
    ///
    /// Device errors are recorded in the report, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`WledError::Cancelled`] if `cancel` fires during the pass.
    pub async fn run_sync_now(&self, cancel: &CancellationToken) -> Result<SyncReport> {
        let rules = self.settings.borrow().clone();
        let run_id = Uuid::new_v4();

        async {
            trace!(rules = rules.len(), "Starting sync of presets");

            let mut outcomes = Vec::with_capacity(rules.len());
            for rule in &rules {
                outcomes.push(self.sync_rule(rule, cancel).await?);
            }

            let report = SyncReport {
                run_id,
                rules: outcomes,
            };
            info!(
                synced = report.synced_count(),
                errors = report.error_count(),
                "Sync finished"
            );
            Ok::<_, WledError>(report)
        }
        .instrument(info_span!("sync", %run_id))
        .await
    }

    async fn sync_rule(&self, rule: &SyncRule, cancel: &CancellationToken) -> Result<RuleOutcome> {
        trace!(
            source = %rule.source,
            targets = %rule.targets.join("', '"),
            "Starting sync of presets from source"
        );

        let presets = match self.load_source(&rule.source, cancel).await {
            Ok(presets) => presets,
            Err(WledError::Cancelled) => return Err(WledError::Cancelled),
            Err(e) => {
                error!(source = %rule.source, error = %e, "Failed to load presets from source");
                return Ok(RuleOutcome {
                    source: rule.source.clone(),
                    error: Some(e.to_string()),
                    targets: Vec::new(),
                });
            }
        };

        let mut targets = Vec::with_capacity(rule.targets.len());
        for target in &rule.targets {
            let led_count = self.target_led_count(target, cancel).await?;
            let outcome = match self.push_presets(&presets, target, led_count, cancel).await {
                Ok(()) => {
                    info!(source = %rule.source, address = %target, led_count, "Synced presets");
                    TargetOutcome {
                        address: target.clone(),
                        led_count,
                        ok: true,
                        error: None,
                    }
                }
                Err(WledError::Cancelled) => return Err(WledError::Cancelled),
                Err(e) => {
                    error!(source = %rule.source, address = %target, error = %e, "Failed to sync presets");
                    TargetOutcome {
                        address: target.clone(),
                        led_count,
                        ok: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            targets.push(outcome);
        }

        Ok(RuleOutcome {
            source: rule.source.clone(),
            error: None,
            targets,
        })
    }

    async fn load_source(&self, source: &str, cancel: &CancellationToken) -> Result<Value> {
        let raw = or_cancelled(cancel, self.client.get_presets(source)).await?;
        let presets: Value = serde_json::from_slice(&raw)?;
        if !presets.is_object() {
            return Err(WledError::Other(format!(
                "Presets of '{source}' are not a JSON object"
            )));
        }
        debug!(source, presets = presets.as_object().map_or(0, serde_json::Map::len), "Loaded source presets");
        Ok(presets)
    }

    /// LED count of `target`, defaulting to [`DEFAULT_LED_COUNT`] when the
    /// configuration or the field is unavailable.
    async fn target_led_count(&self, target: &str, cancel: &CancellationToken) -> Result<u64> {
        let raw = match or_cancelled(cancel, self.client.get_configuration(target)).await {
            Ok(raw) => raw,
            Err(WledError::Cancelled) => return Err(WledError::Cancelled),
            Err(e) => {
                warn!(address = target, error = %e, default = DEFAULT_LED_COUNT, "Failed to read target configuration, using default LED count");
                return Ok(DEFAULT_LED_COUNT);
            }
        };

        match DeviceConfiguration::parse(&raw) {
            Ok(config) => {
                if config.led_count.is_none() {
                    warn!(address = target, default = DEFAULT_LED_COUNT, "Target reports no LED count, using default");
                }
                Ok(config.led_count_or_default())
            }
            Err(e) => {
                warn!(address = target, error = %e, default = DEFAULT_LED_COUNT, "Invalid target configuration, using default LED count");
                Ok(DEFAULT_LED_COUNT)
            }
        }
    }

    async fn push_presets(
        &self,
        presets: &Value,
        target: &str,
        led_count: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut patched = presets.clone();
        let rewritten = patch_presets(&mut patched, led_count);
        debug!(address = target, led_count, rewritten, "Patched presets");

        let json = serde_json::to_string(&patched)?;
        or_cancelled(cancel, self.client.set_presets(target, json)).await
    }

    /// Sync at startup, then again on every settings change, until `cancel`
    /// fires. Passes triggered by changes run concurrently with older ones.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut settings = self.settings.clone();
        settings.borrow_and_update();

        let mut passes = JoinSet::new();
        let mut trigger = true;

        loop {
            if trigger {
                trigger = false;
                let this = Arc::clone(&self);
                let cancel = cancel.clone();
                passes.spawn(async move { this.run_sync_now(&cancel).await });
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                changed = settings.changed() => {
                    if changed.is_err() {
                        debug!("Sync settings channel closed");
                        cancel.cancelled().await;
                        break;
                    }
                    settings.borrow_and_update();
                    info!("Sync settings changed, running a new pass");
                    trigger = true;
                }
                Some(joined) = passes.join_next() => log_pass(joined),
            }
        }

        while let Some(joined) = passes.join_next().await {
            log_pass(joined);
        }
        debug!("Sync service stopped");
    }
}

fn log_pass(joined: std::result::Result<Result<SyncReport>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(_)) => {}
        Ok(Err(WledError::Cancelled)) => debug!("Sync pass cancelled"),
        Ok(Err(e)) => error!(error = %e, "Sync pass failed"),
        Err(e) => error!(error = %e, "Sync pass panicked"),
    }
}
