//! Backup timer behavior under paused time.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use tokio_util::sync::CancellationToken;
use wledm::backup::{BackupService, DAY, ManualClock};
use wledm::config::{BackupSettings, Settings, SettingsHub};
use wledm::device::mock::{MockDeviceClient, Operation};
use wledm::health::HealthChecks;

use crate::common::init_test_logging;

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn passes(svc: &BackupService<MockDeviceClient>) -> usize {
    svc.client()
        .operations()
        .iter()
        .filter(|op| matches!(op, Operation::GetConfiguration { .. }))
        .count()
}

fn hub_with(time_of_day: NaiveTime) -> SettingsHub {
    SettingsHub::new(Settings {
        backup: BackupSettings {
            time_of_day,
            devices: vec!["wled-a".to_string()],
            ..BackupSettings::default()
        },
        sync: Vec::new(),
    })
}

fn start(hub: &SettingsHub, now: NaiveTime) -> (Arc<BackupService<MockDeviceClient>>, CancellationToken, tokio::task::JoinHandle<()>) {
    let mock = MockDeviceClient::new().with_unreachable("wled-a");
    let svc = Arc::new(
        BackupService::new(mock, HealthChecks::new().unwrap(), hub.backup()).with_clock(ManualClock::new(now)),
    );
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&svc).run(cancel.clone()));
    (svc, cancel, task)
}

#[tokio::test(start_paused = true)]
async fn rapid_settings_changes_leave_exactly_one_timer() {
    init_test_logging();
    let hub = hub_with(time(3, 0));
    let (svc, cancel, task) = start(&hub, time(2, 0));
    tokio::task::yield_now().await;

    for i in 0..50 {
        let mut settings = hub.current();
        settings.backup.time_of_day = if i % 2 == 0 { time(3, 30) } else { time(4, 0) };
        hub.publish(settings);
        tokio::task::yield_now().await;
    }
    let mut settings = hub.current();
    settings.backup.time_of_day = time(5, 0);
    hub.publish(settings);
    tokio::task::yield_now().await;

    tokio::time::sleep(Duration::from_secs(3 * 3600 - 1)).await;
    assert_eq!(passes(&svc), 0, "no stale timer may fire before 05:00");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(passes(&svc), 1, "exactly one timer fires at 05:00");

    tokio::time::sleep(DAY).await;
    assert_eq!(passes(&svc), 2, "the timer repeats daily");

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn moving_the_time_earlier_reschedules() {
    init_test_logging();
    let hub = hub_with(time(5, 0));
    let (svc, cancel, task) = start(&hub, time(2, 0));
    tokio::task::yield_now().await;

    let mut settings = hub.current();
    settings.backup.time_of_day = time(2, 30);
    hub.publish(settings);

    tokio::time::sleep(Duration::from_secs(30 * 60 + 1)).await;
    assert_eq!(passes(&svc), 1);

    tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
    assert_eq!(passes(&svc), 1, "the old 05:00 timer was disposed");

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unrelated_change_does_not_notify_backup() {
    init_test_logging();
    let hub = hub_with(time(3, 0));
    let mut rx = hub.backup();
    rx.borrow_and_update();

    let mut settings = hub.current();
    settings.sync.push(wledm::config::SyncRule {
        source: "wled-a".to_string(),
        targets: Vec::new(),
    });
    let change = hub.publish(settings);

    assert!(change.sync);
    assert!(!change.backup);
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_scheduler() {
    init_test_logging();
    let hub = hub_with(time(3, 0));
    let (svc, cancel, task) = start(&hub, time(2, 0));
    tokio::task::yield_now().await;

    cancel.cancel();
    task.await.unwrap();

    tokio::time::sleep(DAY).await;
    assert_eq!(passes(&svc), 0);
}
