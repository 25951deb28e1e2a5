//! Port forward handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use vmgate_driver::{PortForward, PortForwards};

use crate::api::AppState;
use crate::error::{ApiError, Result};
use crate::handlers::parse_slot;

/// Request bodies may carry one forward or an array of them.
fn parse_body(body: &Bytes) -> Result<Vec<PortForward>> {
    match serde_json::from_slice::<Vec<PortForward>>(body) {
        Ok(fwds) => Ok(fwds),
        Err(_) => {
            tracing::debug!("port forward re-parse attempt as non-collection");
            serde_json::from_slice::<PortForward>(body)
                .map(|fwd| vec![fwd])
                .map_err(|err| ApiError::BadRequest(err.to_string()))
        }
    }
}

/// `GET /vmnet/{name}/portforward`
pub async fn list_device_fwds(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PortForwards>> {
    let slot = parse_slot(&name)?;
    tracing::debug!(slot, "port forward list");
    Ok(Json(state.driver.port_fwds(Some(slot)).await?))
}

/// `PUT /vmnet/{name}/portforward`
pub async fn add_device_fwds(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Vec<PortForward>>> {
    let _guard = state.net_lock.lock().await;
    let slot = parse_slot(&name)?;
    tracing::debug!(slot, "port forward request");
    let mut fwds = parse_body(&body)?;
    for fwd in &mut fwds {
        fwd.slot = slot;
    }
    tracing::debug!(count = fwds.len(), "adding port forwards");
    state.driver.add_port_fwds(fwds.clone()).await?;
    Ok(Json(fwds))
}

/// `DELETE /vmnet/{name}/portforward`
pub async fn delete_device_fwds(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<StatusCode> {
    let _guard = state.net_lock.lock().await;
    let slot = parse_slot(&name)?;
    tracing::debug!(slot, "port forward delete");
    let mut fwds = parse_body(&body)?;
    for fwd in &mut fwds {
        fwd.slot = slot;
    }
    state.driver.delete_port_fwds(fwds).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /portforwards`
pub async fn list_all(State(state): State<AppState>) -> Result<Json<PortForwards>> {
    tracing::debug!("full port forward list");
    Ok(Json(state.driver.port_fwds(None).await?))
}

/// `DELETE /portforwards`
pub async fn prune(State(state): State<AppState>) -> Result<StatusCode> {
    let _guard = state.net_lock.lock().await;
    tracing::debug!("prune inactive port forwards");
    state.driver.prune_port_fwds().await?;
    Ok(StatusCode::NO_CONTENT)
}
