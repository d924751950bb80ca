//! Health-check reporting to an external uptime monitor.
//!
//! A [`HealthCheck`] session wraps one monitored run. Creating it sends
//! `start` in the background; closing it sends exactly one terminal message:
//! `fail` if [`HealthCheck::set_failed`] was called, the bare ping otherwise.
//! The terminal message is only issued once the `start` send has settled,
//! so the monitor never sees them out of order. `start` is never abandoned:
//! closing a session right away waits for it, bounded by the request timeout.
//!
//! ```text
//! Sending ──set_failed()──▶ Failing ──fail sent──▶ Failed
//!    │
//!    └──────complete()/drop──── ping sent ───────▶ Succeeded
//! ```
//!
//! Sends are never retried and their errors are only logged: the monitoring
//! channel must not fail the operation it monitors. Misusing a session
//! (reporting failure twice) is a programming error and is returned to the
//! caller.

use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::Url;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::{Result, WledError};

/// Timeout of each individual health-check request.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `start` is in flight or sent; no outcome reported yet.
    Sending,
    /// Failure reported; `fail` is being sent.
    Failing,
    /// `fail` sent (or attempted).
    Failed,
    /// Bare ping sent (or attempted).
    Succeeded,
}

impl SessionState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Succeeded)
    }
}

/// Factory for health-check sessions, sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct HealthChecks {
    http: reqwest::Client,
}

impl HealthChecks {
    /// Create a factory with the default 5s request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(HEALTH_TIMEOUT)
    }

    /// Create a factory with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WledError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Open a session against `url`.
    ///
    /// Without a URL (or with one that does not parse) the session is a no-op
    /// that accepts every call without touching the network.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime while `url` is set.
    pub fn start_new(&self, url: Option<&str>) -> HealthCheck {
        let Some(raw) = url else {
            return HealthCheck::noop();
        };

        match check_url(raw) {
            Ok(url) => HealthCheck::start(url, self.http.clone()),
            Err(e) => {
                error!(url = raw, error = %e, "Invalid health check URL, reporting disabled");
                HealthCheck::noop()
            }
        }
    }
}

/// Normalize a check URL so that `start`/`fail` resolve below it.
pub fn check_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| WledError::ConfigInvalid(format!("health URL '{raw}': {e}")))
}

/// One reporting session. See the module docs for the protocol.
///
/// Close it with [`HealthCheck::complete`]. Dropping an open session closes it
/// in the background.
#[derive(Debug)]
pub struct HealthCheck {
    inner: Option<Arc<Session>>,
}

#[derive(Debug)]
struct Session {
    url: Url,
    http: reqwest::Client,
    start: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<SessionState>,
}

impl HealthCheck {
    /// A session that reports nothing.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    fn start(url: Url, http: reqwest::Client) -> Self {
        let start = tokio::spawn({
            let http = http.clone();
            let url = url.clone();
            async move { send(&http, &url, Some("start")).await }
        });
        let (state, _) = watch::channel(SessionState::Sending);

        Self {
            inner: Some(Arc::new(Session {
                url,
                http,
                start: Mutex::new(Some(start)),
                state,
            })),
        }
    }

    /// True when no monitoring endpoint is configured.
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// Current state, `None` for a no-op session.
    pub fn state(&self) -> Option<SessionState> {
        self.inner.as_ref().map(|s| *s.state.borrow())
    }

    /// True once a failure has been reported on this session.
    pub fn has_failed(&self) -> bool {
        matches!(
            self.state(),
            Some(SessionState::Failing | SessionState::Failed)
        )
    }

    /// Report the run as failed.
    ///
    /// Waits for `start` to settle, then sends `fail`, all in the background.
    /// Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`WledError::HealthCheckCompleted`] if an outcome was already
    /// reported on this session.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn set_failed(&self, reason: &dyn Display) -> Result<()> {
        let Some(session) = &self.inner else {
            return Ok(());
        };

        let accepted = session.state.send_if_modified(|state| {
            if *state == SessionState::Sending {
                *state = SessionState::Failing;
                true
            } else {
                false
            }
        });
        if !accepted {
            return Err(WledError::HealthCheckCompleted {
                url: session.url.to_string(),
            });
        }

        debug!(url = %session.url, reason = %reason, "Reporting failure");
        let session = Arc::clone(session);
        tokio::spawn(async move {
            session.settle_start().await;
            send(&session.http, &session.url, Some("fail")).await;
            session.state.send_replace(SessionState::Failed);
        });
        Ok(())
    }

    /// Close the session.
    ///
    /// Sends the bare ping if no failure was reported; otherwise waits for the
    /// `fail` send to finish. Never re-sends anything.
    pub async fn complete(mut self) {
        if let Some(session) = self.inner.take() {
            session.release().await;
        }
    }
}

impl Drop for HealthCheck {
    fn drop(&mut self) {
        let Some(session) = self.inner.take() else {
            return;
        };
        if session.state.borrow().is_terminal() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                trace!(url = %session.url, "Health check dropped, completing in background");
                handle.spawn(async move { session.release().await });
            }
            Err(_) => {
                warn!(url = %session.url, "Health check dropped outside a runtime, outcome not reported");
            }
        }
    }
}

impl Session {
    /// Wait until the `start` send has settled.
    async fn settle_start(&self) {
        let handle = self
            .start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(url = %self.url, error = %e, "Start send task ended abnormally");
            }
        }
    }

    async fn release(&self) {
        let state = *self.state.borrow();
        match state {
            SessionState::Sending => {
                self.settle_start().await;
                send(&self.http, &self.url, None).await;
                self.state.send_replace(SessionState::Succeeded);
            }
            SessionState::Failing => {
                let mut rx = self.state.subscribe();
                let _ = rx.wait_for(|s| *s == SessionState::Failed).await;
            }
            SessionState::Failed | SessionState::Succeeded => {}
        }
    }
}

/// Send one health-check message. `None` is the bare success ping.
///
/// Errors are logged, never returned.
async fn send(http: &reqwest::Client, base: &Url, action: Option<&'static str>) {
    let label = action.unwrap_or("ping");
    let url = match base.join(action.unwrap_or("")) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %base, action = label, error = %e, "Invalid health check URL");
            return;
        }
    };
    trace!(url = %base, action = label, "Sending health check");

    let result = http
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);

    match result {
        Ok(_) => debug!(url = %base, action = label, "Sent health check"),
        Err(e) => error!(url = %base, action = label, error = %e, "Failed to send health check"),
    }
}
