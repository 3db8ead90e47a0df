//! Saga log inspection.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::SagaId;
use saga::SagaState;
use saga_log::SagaLogStore;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct SagaResponse {
    pub saga_id: i64,
    pub state: SagaState,
    pub order_id: Option<String>,
    pub entries: Vec<LogEntryResponse>,
}

#[derive(Debug, Serialize)]
pub struct LogEntryResponse {
    pub id: i64,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

/// GET /sagas/{saga_id}: the saga's log, oldest first, and its state.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SagaResponse>, ApiError> {
    let saga_id: SagaId = id
        .parse()
        .ok()
        .filter(|id: &SagaId| !id.is_unassigned())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid saga id: {id}")))?;

    let orchestrator = &state.orchestrator;
    let entries = orchestrator.log().entries(saga_id).await?;
    if entries.is_empty() {
        return Err(ApiError::NotFound(format!("Saga not found: {saga_id}")));
    }

    let names: Vec<_> = entries.iter().filter_map(|e| e.name().ok()).collect();
    let order_id = entries
        .last()
        .and_then(|e| e.to_message().ok())
        .map(|m| m.payload.order_id);

    Ok(Json(SagaResponse {
        saga_id: saga_id.as_i64(),
        state: SagaState::derive(orchestrator.tables(), &names),
        order_id,
        entries: entries
            .iter()
            .map(|e| LogEntryResponse {
                id: e.id,
                name: e
                    .name()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|_| format!("UNKNOWN({}, {})", e.message_type, e.message_event)),
                timestamp: e.timestamp,
            })
            .collect(),
    }))
}
