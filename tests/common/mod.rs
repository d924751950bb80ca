//! Common test utilities for WLED Manager.
//!
//! - `fake_wled`: in-process WLED device serving `cfg.json`/`presets.json`
//!   and accepting preset uploads
//! - `fake_monitor`: in-process uptime monitor recording health checks
#![allow(dead_code)]

pub mod fake_monitor;
pub mod fake_wled;

use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Bind an ephemeral port on localhost.
pub async fn local_listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener")
}

/// An address nothing listens on.
pub async fn unreachable_address() -> String {
    let listener = local_listener().await;
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Poll `cond` every 10ms, panicking after `timeout`.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not reached within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
