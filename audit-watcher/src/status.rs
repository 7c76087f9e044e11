//! Read-only status endpoint.
//!
//! Serves the watcher's counters as JSON on `GET /status`; every other path
//! answers 404.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::info;

use crate::types::Result;

const NOT_FOUND_BODY: &str = "{ \"message\" : \"This is not the server you're looking for.\" }\n";

/// Where the poll cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Starting,
    Authenticating,
    Fetching,
    Filtering,
    Classifying,
    Notifying,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTimes {
    pub start: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    /// HTTP status of the last audit query.
    pub last_status: Option<u16>,
    pub wake: Option<DateTime<Utc>>,
    pub current: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertCounts {
    pub total: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatus {
    pub version: String,
    pub organization: String,
    pub phase: CyclePhase,
    pub cycles: u64,
    pub n_requests: u64,
    pub times: StatusTimes,
    pub alert_counts: AlertCounts,
}

impl WatcherStatus {
    pub fn new(organization: &str) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            organization: organization.to_string(),
            phase: CyclePhase::Starting,
            cycles: 0,
            n_requests: 0,
            times: StatusTimes {
                start: Some(Utc::now()),
                ..Default::default()
            },
            alert_counts: AlertCounts::default(),
        }
    }
}

pub type SharedStatus = Arc<RwLock<WatcherStatus>>;

pub fn shared(organization: &str) -> SharedStatus {
    Arc::new(RwLock::new(WatcherStatus::new(organization)))
}

pub fn router(status: SharedStatus) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .fallback(not_found_handler)
        .with_state(status)
}

/// Serve the status endpoint until `shutdown` flips to `true`.
pub async fn serve(addr: SocketAddr, status: SharedStatus, shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "status server listening");

    let mut shutdown = shutdown;
    axum::serve(listener, router(status))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|&v| v).await;
        })
        .await?;
    Ok(())
}

async fn status_handler(State(status): State<SharedStatus>) -> impl IntoResponse {
    let snapshot = {
        let mut status = status.write().await;
        status.times.current = Some(Utc::now());
        status.n_requests += 1;
        status.clone()
    };

    match serde_json::to_string_pretty(&snapshot) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body + "\n",
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "message": e.to_string() }).to_string(),
        ),
    }
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "application/json")],
        NOT_FOUND_BODY,
    )
}
