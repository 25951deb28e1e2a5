//! Request middleware: admission, validation gating, inflight
//! tracking and content-type stamping.

use std::sync::atomic::Ordering;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::AppState;
use crate::error::ApiError;
use crate::API_CONTENT_TYPE;

/// Rejects requests that do not carry the orchestrator marker header
/// and the pinned origin. Every response, including rejections, is
/// stamped with the API content type.
pub async fn admission(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let valid_origin = format!("https://{}:{}", state.address, state.port);

    let requested_with: Vec<_> = request
        .headers()
        .get_all("x-requested-with")
        .iter()
        .collect();
    let origin: Vec<_> = request.headers().get_all(header::ORIGIN).iter().collect();
    let valid = requested_with.len() == 1
        && requested_with[0] == "Vagrant"
        && origin.len() == 1
        && origin[0] == valid_origin.as_str();

    let mut response = if valid {
        next.run(request).await
    } else {
        ApiError::Forbidden.into_response()
    };
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(API_CONTENT_TYPE),
    );
    response
}

/// Fails every matched route with the validation reason while the
/// driver reports not-validated. Checked per request.
pub async fn validation_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.driver.validated() {
        return ApiError::ValidationFailure(state.driver.validation_reason()).into_response();
    }
    next.run(request).await
}

/// Counts requests in flight for `/status` reporting and shutdown
/// draining.
pub async fn track_inflight(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    state.inflight.fetch_add(1, Ordering::SeqCst);
    tracing::debug!(method = %request.method(), path = %request.uri().path(),
        "starting request");
    let response = next.run(request).await;
    state.inflight.fetch_sub(1, Ordering::SeqCst);
    tracing::debug!(code = response.status().as_u16(), "completed request");
    response
}
