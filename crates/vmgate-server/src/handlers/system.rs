//! Service status and product information handlers.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::api::AppState;
use crate::error::{ApiError, Result};

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "inflight": state.inflight.load(Ordering::SeqCst),
    }))
}

/// `GET /version`
pub async fn version(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "version": state.version }))
}

/// `GET /vmware/info`
pub async fn vmware_info(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let info = state.driver.vmware_info().await?;
    tracing::trace!(version = %info.version, product = %info.product,
        "vmware version info");
    Ok(Json(serde_json::to_value(info).map_err(|err| {
        ApiError::Server(err.to_string())
    })?))
}

/// `GET /vmware/paths`
pub async fn vmware_paths(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let paths = state.driver.vmware_paths().clone();
    Ok(Json(serde_json::to_value(paths).map_err(|err| {
        ApiError::Server(err.to_string())
    })?))
}

/// Reserved routes respond 501.
pub async fn not_implemented() -> ApiError {
    ApiError::NotImplemented
}

/// Unmatched routes respond 404.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
