//! Health-check message ordering against a live monitor.

use std::time::Duration;

use wledm::error::WledError;
use wledm::health::{HealthChecks, SessionState};

use crate::common::fake_monitor::FakeMonitor;
use crate::common::{init_test_logging, wait_until};

const WAIT: Duration = Duration::from_secs(5);

fn checks() -> HealthChecks {
    HealthChecks::with_timeout(Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn released_session_sends_start_then_ping() {
    init_test_logging();
    let monitor = FakeMonitor::start().await;
    let hc = checks().start_new(Some(&monitor.url));
    hc.complete().await;

    assert_eq!(monitor.actions(), ["start", "ping"]);
}

#[tokio::test]
async fn failed_session_sends_start_then_fail() {
    init_test_logging();
    let monitor = FakeMonitor::start().await;
    let hc = checks().start_new(Some(&monitor.url));
    hc.set_failed(&"device unreachable").unwrap();
    hc.complete().await;

    assert_eq!(monitor.actions(), ["start", "fail"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn immediate_outcomes_always_follow_start() {
    init_test_logging();
    for round in 0..10 {
        let monitor = FakeMonitor::start().await;
        let hc = checks().start_new(Some(&monitor.url));
        if round % 2 == 0 {
            hc.set_failed(&"boom").unwrap();
            hc.complete().await;
            assert_eq!(monitor.actions(), ["start", "fail"]);
        } else {
            hc.complete().await;
            assert_eq!(monitor.actions(), ["start", "ping"]);
        }
    }
}

#[tokio::test]
async fn second_failure_is_a_contract_violation() {
    init_test_logging();
    let monitor = FakeMonitor::start().await;
    let hc = checks().start_new(Some(&monitor.url));

    hc.set_failed(&"first").unwrap();
    let err = hc.set_failed(&"second").unwrap_err();
    assert!(matches!(err, WledError::HealthCheckCompleted { .. }));

    hc.complete().await;
    assert_eq!(monitor.actions(), ["start", "fail"]);
}

#[tokio::test]
async fn dropped_session_still_pings() {
    init_test_logging();
    let monitor = FakeMonitor::start().await;
    {
        let hc = checks().start_new(Some(&monitor.url));
        assert_eq!(hc.state(), Some(SessionState::Sending));
    }

    wait_until(WAIT, || monitor.has("ping")).await;
    assert_eq!(monitor.actions(), ["start", "ping"]);
}

#[tokio::test]
async fn unreachable_monitor_never_fails_the_caller() {
    init_test_logging();
    let url = format!("http://{}/check", crate::common::unreachable_address().await);
    let hc = checks().start_new(Some(&url));
    hc.set_failed(&"device down").unwrap();
    hc.complete().await;
}
