//! Probe endpoints: `/healthz` (process up), `/readyz` (ledger reachable)
//! and `/livez` (bare 200).

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

const SERVICE_NAME: &str = "rsvp-admission";

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,

    /// Only present on `/readyz`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<ComponentStatus>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ComponentStatus {
    /// `ok` or `unavailable`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthResponse {
    fn new(healthy: bool, storage: Option<ComponentStatus>) -> Self {
        Self {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            storage,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse::new(true, None))
}

async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.admission().health_check().await {
        Ok(()) => {
            let storage = ComponentStatus {
                status: "ok".to_string(),
                message: None,
            };
            (StatusCode::OK, Json(HealthResponse::new(true, Some(storage))))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed: ledger unreachable");
            let storage = ComponentStatus {
                status: "unavailable".to_string(),
                message: Some(e.to_string()),
            };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::new(false, Some(storage))),
            )
        }
    }
}

async fn livez() -> StatusCode {
    StatusCode::OK
}
