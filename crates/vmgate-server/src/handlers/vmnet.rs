//! Host virtual network device handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use vmgate_driver::{Vmnet, Vmnets};

use crate::api::AppState;
use crate::error::{ApiError, Result};
use crate::handlers::parse_slot;

/// `GET /vmnet`
pub async fn list_devices(State(state): State<AppState>) -> Result<Json<Vmnets>> {
    tracing::debug!("vmnet list request");
    Ok(Json(state.driver.vmnets().await?))
}

/// `POST /vmnet`
pub async fn create_device(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<Vmnet>> {
    let _guard = state.net_lock.lock().await;
    tracing::debug!("vmnet create request");
    let mut device: Vmnet =
        serde_json::from_slice(&body).map_err(|err| ApiError::BadRequest(err.to_string()))?;
    state.driver.add_vmnet(&mut device).await?;
    Ok(Json(device))
}

/// `POST /vmnet/verify`
pub async fn verify(State(state): State<AppState>) -> Result<StatusCode> {
    let _guard = state.net_lock.lock().await;
    tracing::debug!("vmnet verification request");
    state.driver.verify_vmnet().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /vmnet/{name}`
pub async fn get_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vmnet>> {
    tracing::debug!(name = %name, "vmnet device request");
    let devices = state.driver.vmnets().await?;
    devices
        .vmnets
        .into_iter()
        .find(|device| device.name == name)
        .map(Json)
        .ok_or_else(|| ApiError::BadRequest("device not found".to_string()))
}

/// `PUT /vmnet/{name}`
pub async fn update_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<Vmnet>> {
    let _guard = state.net_lock.lock().await;
    tracing::debug!(name = %name, "vmnet update request");
    let mut device: Vmnet =
        serde_json::from_slice(&body).map_err(|err| ApiError::BadRequest(err.to_string()))?;
    device.name = name;
    state.driver.update_vmnet(&mut device).await?;
    Ok(Json(device))
}

/// `DELETE /vmnet/{name}`
pub async fn delete_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    let _guard = state.net_lock.lock().await;
    tracing::debug!(name = %name, "vmnet delete request");
    let device = Vmnet {
        name: name.clone(),
        ..Vmnet::default()
    };
    state.driver.delete_vmnet(&device).await?;
    tracing::debug!(name = %name, "vmnet device removed");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /vmnet/{name}/dhcplease/{mac}`
pub async fn dhcp_lease(
    State(state): State<AppState>,
    Path((name, mac)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
    tracing::debug!(device = %name, mac = %mac, "vmnet dhcp lease request");
    let ip = state.driver.lookup_dhcp_address(&name, &mac).await?;
    Ok(Json(json!({ "ip": ip })))
}

/// `PUT /vmnet/{name}/dhcpreserve/{mac}/{ip}`
pub async fn reserve_dhcp_address(
    State(state): State<AppState>,
    Path((name, mac, ip)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let _guard = state.net_lock.lock().await;
    tracing::debug!(device = %name, mac = %mac, address = %ip,
        "vmnet dhcp reserve request");
    let slot = parse_slot(&name)?;
    state.driver.reserve_dhcp_address(slot, &mac, &ip).await?;
    Ok(StatusCode::NO_CONTENT)
}
