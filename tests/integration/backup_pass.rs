//! Full backup passes over HTTP.

use std::time::Duration;

use axum::http::StatusCode;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use wledm::backup::BackupService;
use wledm::config::BackupSettings;
use wledm::device::WledClient;
use wledm::health::HealthChecks;

use crate::common::fake_monitor::FakeMonitor;
use crate::common::fake_wled::{FakeWled, config_json};
use crate::common::{init_test_logging, unreachable_address};

const PRESETS: &str = r#"{"0":{},"1":{"n":"Evening","on":true,"seg":[{"id":0,"start":0,"stop":120,"fx":2}]}}"#;

fn service(settings: BackupSettings) -> BackupService<WledClient> {
    // A pass only reads the current value; the sender can go.
    let (_, rx) = watch::channel(settings);
    BackupService::new(
        WledClient::with_timeout(Duration::from_secs(2)).unwrap(),
        HealthChecks::with_timeout(Duration::from_secs(2)).unwrap(),
        rx,
    )
}

fn assert_failed_session(actions: &[String]) {
    assert_eq!(actions, ["start", "fail"]);
}

#[tokio::test]
async fn backup_writes_files_only_for_reachable_device_and_reports_failure() {
    init_test_logging();
    let root = tempfile::tempdir().unwrap();
    let good = FakeWled::start(&config_json("Kitchen", 120), PRESETS).await;
    let bad = unreachable_address().await;
    let monitor = FakeMonitor::start().await;

    let svc = service(BackupSettings {
        path: root.path().to_path_buf(),
        devices: vec![bad.clone(), good.address.clone()],
        health: Some(monitor.url.clone()),
        ..BackupSettings::default()
    });

    let report = svc.run_backup_now(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.devices[0].address, bad);
    assert!(!report.devices[0].ok);

    let dir = root.path().join("Kitchen");
    assert_eq!(
        std::fs::read_to_string(dir.join("config.json")).unwrap(),
        config_json("Kitchen", 120)
    );
    assert_eq!(std::fs::read_to_string(dir.join("presets.json")).unwrap(), PRESETS);

    let entries: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
    assert_eq!(entries.len(), 1, "only the reachable device is stored");

    assert_failed_session(&monitor.actions());
}

#[tokio::test]
async fn successful_backup_sends_start_then_ping() {
    init_test_logging();
    let root = tempfile::tempdir().unwrap();
    let device = FakeWled::start(&config_json("Desk", 30), "{}").await;
    let monitor = FakeMonitor::start().await;

    let svc = service(BackupSettings {
        path: root.path().to_path_buf(),
        devices: vec![device.address.clone()],
        health: Some(monitor.url.clone()),
        ..BackupSettings::default()
    });

    let report = svc.run_backup_now(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.failed(), 0);

    assert_eq!(monitor.actions(), ["start", "ping"]);
}

#[tokio::test]
async fn presets_not_found_fails_the_device() {
    init_test_logging();
    let root = tempfile::tempdir().unwrap();
    let device = FakeWled::start(&config_json("Shelf", 40), PRESETS).await;
    device.answer_with("/presets.json", StatusCode::NOT_FOUND);
    let monitor = FakeMonitor::start().await;

    let svc = service(BackupSettings {
        path: root.path().to_path_buf(),
        devices: vec![device.address.clone()],
        health: Some(monitor.url.clone()),
        ..BackupSettings::default()
    });

    let report = svc.run_backup_now(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.failed(), 1);
    let error = report.devices[0].error.as_deref().unwrap();
    assert!(error.contains("404") && error.contains("presets.json"), "{error}");

    let dir = root.path().join("Shelf");
    assert!(dir.join("config.json").exists());
    assert!(!dir.join("presets.json").exists());

    assert_failed_session(&monitor.actions());
}

#[tokio::test]
async fn unnamed_device_is_stored_under_its_address() {
    init_test_logging();
    let root = tempfile::tempdir().unwrap();
    let device = FakeWled::start(r#"{"id":{"name":""},"hw":{"led":{"total":8}}}"#, "{}").await;

    let svc = service(BackupSettings {
        path: root.path().to_path_buf(),
        devices: vec![device.address.clone()],
        ..BackupSettings::default()
    });
    svc.run_backup_now(&CancellationToken::new()).await.unwrap();

    assert!(root.path().join(&device.address).join("presets.json").exists());
}

#[tokio::test]
async fn concurrent_passes_are_serialized() {
    init_test_logging();
    let root = tempfile::tempdir().unwrap();
    let device = FakeWled::start(&config_json("Porch", 50), PRESETS).await;

    let svc = service(BackupSettings {
        path: root.path().to_path_buf(),
        devices: vec![device.address.clone()],
        ..BackupSettings::default()
    });
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(svc.run_backup_now(&cancel), svc.run_backup_now(&cancel));
    assert_eq!(a.unwrap().succeeded(), 1);
    assert_eq!(b.unwrap().succeeded(), 1);
    assert_eq!(
        std::fs::read_to_string(root.path().join("Porch").join("presets.json")).unwrap(),
        PRESETS
    );
}
