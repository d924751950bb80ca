//! The full daemon: startup sync, trigger endpoints and settings reload.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use wledm::device::WledClient;
use wledm::health::HealthChecks;
use wledm::service;

use crate::common::fake_wled::{FakeWled, config_json};
use crate::common::{init_test_logging, local_listener, wait_until};

const WAIT: Duration = Duration::from_secs(10);
const PRESETS: &str = r#"{"1":{"n":"Warm","seg":[{"stop":200}]}}"#;

fn write_settings(path: &Path, root: &Path, source: &str, targets: &[&str]) {
    let targets = targets
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let toml = format!(
        r#"[backup]
path = "{}"
time_of_day = "03:00"
devices = ["{source}"]

[[sync]]
source = "{source}"
targets = [{targets}]
"#,
        root.display()
    );
    std::fs::write(path, toml).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_syncs_serves_triggers_and_reloads() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let backups = dir.path().join("backups");
    let config = dir.path().join("config.toml");

    let source = FakeWled::start(&config_json("Source", 200), PRESETS).await;
    let first = FakeWled::named("First", 20).await;
    let second = FakeWled::named("Second", 40).await;
    write_settings(&config, &backups, &source.address, &[&first.address]);

    let listener = local_listener().await;
    let base = format!("http://{}", listener.local_addr().unwrap());
    let cancel = CancellationToken::new();
    let daemon = tokio::spawn(service::run_with_client(
        WledClient::with_timeout(Duration::from_secs(2)).unwrap(),
        HealthChecks::with_timeout(Duration::from_secs(2)).unwrap(),
        config.clone(),
        listener,
        cancel.clone(),
    ));

    // Startup sync
    wait_until(WAIT, || !first.uploads().is_empty()).await;
    assert_eq!(first.uploads()[0].body, r#"{"1":{"n":"Warm","seg":[{"stop":20}]}}"#);

    // Manual backup trigger
    let http = reqwest::Client::new();
    let response = http.post(format!("{base}/api/backups/run")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["devices"][0]["name"], "Source");
    assert_eq!(
        std::fs::read_to_string(backups.join("Source").join("presets.json")).unwrap(),
        PRESETS
    );

    // Manual sync trigger
    let response = http.post(format!("{base}/api/presets/sync")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(first.uploads().len(), 2);

    // Settings reload runs a new sync pass
    write_settings(&config, &backups, &source.address, &[&second.address]);
    wait_until(WAIT, || !second.uploads().is_empty()).await;
    assert_eq!(second.uploads()[0].body, r#"{"1":{"n":"Warm","seg":[{"stop":40}]}}"#);

    cancel.cancel();
    daemon.await.unwrap().unwrap();
}

#[tokio::test]
async fn daemon_fails_on_missing_settings() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let result = service::run(
        dir.path().join("missing.toml"),
        local_listener().await,
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        result,
        Err(wledm::error::WledError::ConfigNotFound { .. })
    ));
}
