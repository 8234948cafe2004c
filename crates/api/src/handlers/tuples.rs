use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use nexus_models::{TuplePrimaryKey, WriteTupleRequest};
use nexus_store::TupleStore;
use serde::Serialize;

use crate::error::{to_response, ErrorResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SeqResponse {
    pub seq: i64,
}

pub async fn write_tuple(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WriteTupleRequest>,
) -> Result<Json<SeqResponse>, (StatusCode, Json<ErrorResponse>)> {
    state.ensure_invalidator_running(&request.tenant_id);
    let seq = state.store.write(request).await.map_err(|e| to_response(e.into()))?;
    Ok(Json(SeqResponse { seq }))
}

pub async fn delete_tuple(
    State(state): State<Arc<AppState>>,
    Json(pk): Json<TuplePrimaryKey>,
) -> Result<Json<SeqResponse>, (StatusCode, Json<ErrorResponse>)> {
    let seq = state
        .store
        .delete(&pk.tenant_id, &pk)
        .await
        .map_err(|e| to_response(e.into()))?;
    Ok(Json(SeqResponse { seq }))
}
