//! HTTP trigger endpoints.
//!
//! - `POST /api/backups/run` runs one backup pass and returns its report
//! - `POST /api/presets/sync` runs one sync pass and returns its report
//!
//! Both wait for the pass to finish. Per-device failures are part of the
//! report and still answer `200`; an error returned by the pass itself
//! answers `500`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::backup::{BackupReport, BackupService};
use crate::device::DeviceClient;
use crate::error::{Result, WledError};
use crate::sync::{SyncReport, SyncService};

/// Shared state of the trigger handlers.
pub struct AppState<C> {
    pub backup: Arc<BackupService<C>>,
    pub sync: Arc<SyncService<C>>,
    /// Daemon shutdown token; passes run on a child of it.
    pub cancel: CancellationToken,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            backup: Arc::clone(&self.backup),
            sync: Arc::clone(&self.sync),
            cancel: self.cancel.clone(),
        }
    }
}

/// Build the trigger router.
pub fn router<C: DeviceClient>(state: AppState<C>) -> Router {
    Router::new()
        .route("/api/backups/run", post(run_backup::<C>))
        .route("/api/presets/sync", post(run_sync::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn run_backup<C: DeviceClient>(
    State(state): State<AppState<C>>,
) -> std::result::Result<Json<BackupReport>, ApiError> {
    let cancel = state.cancel.child_token();
    let report = state.backup.run_backup_now(&cancel).await?;
    Ok(Json(report))
}

async fn run_sync<C: DeviceClient>(
    State(state): State<AppState<C>>,
) -> std::result::Result<Json<SyncReport>, ApiError> {
    let cancel = state.cancel.child_token();
    let report = state.sync.run_sync_now(&cancel).await?;
    Ok(Json(report))
}

/// A pass error rendered as `500` with a JSON body.
#[derive(Debug)]
pub struct ApiError(WledError);

impl From<WledError> for ApiError {
    fn from(err: WledError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Triggered run failed");
        let kind = match &self.0 {
            WledError::Cancelled => "cancelled",
            _ => "internal",
        };
        let body = json!({
            "error": kind,
            "message": self.0.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Bind `addr`.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| WledError::WebServerFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        })
}

/// Serve the trigger endpoints on `listener` until `cancel` fires.
pub async fn serve<C: DeviceClient>(
    listener: TcpListener,
    state: AppState<C>,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Trigger server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| WledError::WebServerFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

    info!("Trigger server stopped");
    Ok(())
}
