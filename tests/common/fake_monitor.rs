//! Fake uptime monitor.
//!
//! Serves `/check/` (ping), `/check/start` and `/check/fail`, recording the
//! action of every request in arrival order.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use super::local_listener;

type Log = Arc<Mutex<Vec<String>>>;

pub struct FakeMonitor {
    /// Check URL without trailing slash.
    pub url: String,
    log: Log,
    shutdown: CancellationToken,
}

impl FakeMonitor {
    pub async fn start() -> Self {
        let log = Log::default();
        let app = Router::new()
            .route("/check/", get(ping))
            .route("/check/{action}", get(action))
            .with_state(Arc::clone(&log));

        let listener = local_listener().await;
        let url = format!("http://{}/check", listener.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
                .unwrap();
        });

        Self { url, log, shutdown }
    }

    /// Recorded actions: `start`, `fail` or `ping`.
    pub fn actions(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn has(&self, action: &str) -> bool {
        self.actions().iter().any(|a| a == action)
    }
}

impl Drop for FakeMonitor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn ping(State(log): State<Log>) -> &'static str {
    log.lock().unwrap().push("ping".to_string());
    "OK"
}

async fn action(State(log): State<Log>, Path(action): Path<String>) -> &'static str {
    log.lock().unwrap().push(action);
    "OK"
}
