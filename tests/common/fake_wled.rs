//! Fake WLED device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;

use super::local_listener;

/// One multipart field received on `/upload`.
#[derive(Debug, Clone)]
pub struct Upload {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Clone)]
struct DeviceState {
    config: Arc<String>,
    presets: Arc<String>,
    uploads: Arc<Mutex<Vec<Upload>>>,
    /// Status answered instead of 200, keyed by path.
    statuses: Arc<Mutex<HashMap<&'static str, StatusCode>>>,
}

impl DeviceState {
    fn status(&self, path: &str) -> StatusCode {
        self.statuses
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(StatusCode::OK)
    }
}

/// A WLED device on an ephemeral localhost port. Stops when dropped.
pub struct FakeWled {
    pub address: String,
    state: DeviceState,
    shutdown: CancellationToken,
}

impl FakeWled {
    pub async fn start(config: &str, presets: &str) -> Self {
        let state = DeviceState {
            config: Arc::new(config.to_string()),
            presets: Arc::new(presets.to_string()),
            uploads: Arc::default(),
            statuses: Arc::default(),
        };
        let app = Router::new()
            .route("/cfg.json", get(cfg_json))
            .route("/presets.json", get(presets_json))
            .route("/upload", post(upload))
            .with_state(state.clone());

        let listener = local_listener().await;
        let address = listener.local_addr().unwrap().to_string();
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            address,
            state,
            shutdown,
        }
    }

    /// A device with the given name and LED count and no presets.
    pub async fn named(name: &str, led_total: u64) -> Self {
        Self::start(&config_json(name, led_total), "{}").await
    }

    /// Answer `path` (`/cfg.json`, `/presets.json` or `/upload`) with `status`
    /// from now on. Uploads are still recorded.
    pub fn answer_with(&self, path: &'static str, status: StatusCode) {
        self.state.statuses.lock().unwrap().insert(path, status);
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.uploads.lock().unwrap().clone()
    }
}

impl Drop for FakeWled {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A minimal `cfg.json`.
pub fn config_json(name: &str, led_total: u64) -> String {
    format!(
        r#"{{"rev":[1,0],"id":{{"mdns":"wled","name":"{name}","inv":"Light"}},"hw":{{"led":{{"total":{led_total},"maxpwr":850}}}}}}"#
    )
}

async fn cfg_json(State(state): State<DeviceState>) -> (StatusCode, String) {
    (state.status("/cfg.json"), state.config.as_ref().clone())
}

async fn presets_json(State(state): State<DeviceState>) -> (StatusCode, String) {
    (state.status("/presets.json"), state.presets.as_ref().clone())
}

async fn upload(State(state): State<DeviceState>, mut multipart: Multipart) -> StatusCode {
    while let Ok(Some(field)) = multipart.next_field().await {
        let upload = Upload {
            field: field.name().unwrap_or_default().to_string(),
            file_name: field.file_name().map(ToString::to_string),
            content_type: field.content_type().map(ToString::to_string),
            body: field.text().await.unwrap_or_default(),
        };
        state.uploads.lock().unwrap().push(upload);
    }
    state.status("/upload")
}
