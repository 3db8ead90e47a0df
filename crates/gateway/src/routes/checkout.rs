//! The blocking checkout endpoint and the release callback.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub status: u16,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub order_id: String,
    pub status: u16,
    pub released: bool,
}

/// GET|POST /checkout/{order_id}: starts the order's checkout saga and
/// answers with its final status once the saga finishes.
#[tracing::instrument(skip(state))]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let status = state
        .bridge
        .await_completion(&order_id, state.initiator.as_ref())
        .await?;
    let code = StatusCode::from_u16(status)
        .map_err(|_| ApiError::Internal(format!("saga released invalid status {status}")))?;

    tracing::info!(status, "checkout finished");
    Ok((code, Json(CheckoutResponse { order_id, status })))
}

/// POST /release/{order_id}/{status}: hands a saga's outcome to the
/// checkout waiting on that order.
#[tracing::instrument(skip(state))]
pub async fn release(
    State(state): State<Arc<AppState>>,
    Path((order_id, status)): Path<(String, String)>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let status = status
        .parse::<u16>()
        .ok()
        .filter(|&s| StatusCode::from_u16(s).is_ok())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid status code: {status}")))?;

    if !state.bridge.release_status(&order_id, status) {
        return Err(ApiError::BadRequest(format!(
            "No checkout waiting for order {order_id}"
        )));
    }

    Ok(Json(ReleaseResponse {
        order_id,
        status,
        released: true,
    }))
}
