use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use nexus_models::{
    BulkCheckItem, BulkCheckRequest, CheckRequest, Consistency, Decision, ObjectRef, Principal,
};
use serde::{Deserialize, Serialize};

use crate::error::{to_response, ErrorResponse};
use crate::state::AppState;

pub async fn check(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<Decision>, (StatusCode, Json<ErrorResponse>)> {
    state.ensure_invalidator_running(request.tenant());
    state.evaluator.check(request).await.map(Json).map_err(|e| to_response(e.into()))
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub tenant_id: String,
    pub subject_type: String,
    pub subject_id: String,
    pub permission: String,
    pub object_type: String,
    pub object_id: String,
    /// Set to explain a cross-tenant check: the tenant holding the
    /// object, when it differs from `tenant_id`.
    #[serde(default)]
    pub object_tenant_id: Option<String>,
}

/// `GET /v1/explain` is a read-only witness-trace lookup, so it takes its
/// arguments as query parameters instead of a check body. Always runs at
/// `Eventual` consistency with the default deadline; callers that need a
/// trace under a specific consistency mode should read `trace` off a
/// regular `check` response instead (both paths set it the same way).
pub async fn explain(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExplainQuery>,
) -> Result<Json<Decision>, (StatusCode, Json<ErrorResponse>)> {
    state.ensure_invalidator_running(query.object_tenant_id.as_deref().unwrap_or(&query.tenant_id));
    let request = CheckRequest {
        principal: Principal::new(query.tenant_id, query.subject_type, query.subject_id),
        permission: query.permission,
        object: ObjectRef::new(query.object_type, query.object_id),
        query_tenant_id: query.object_tenant_id,
        consistency: Consistency::Eventual,
        deadline: std::time::Duration::from_millis(500),
    };
    state.evaluator.explain(request).await.map(Json).map_err(|e| to_response(e.into()))
}

#[derive(Debug, Serialize)]
pub struct BulkCheckResult {
    pub permission: String,
    pub object: ObjectRef,
    pub decision: Decision,
}

#[derive(Debug, Serialize)]
pub struct BulkCheckResponse {
    pub results: Vec<BulkCheckResult>,
}

pub async fn bulk_check(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkCheckRequest>,
) -> Result<Json<BulkCheckResponse>, (StatusCode, Json<ErrorResponse>)> {
    state.ensure_invalidator_running(request.tenant());
    let results = state
        .evaluator
        .bulk_check(request)
        .await
        .map_err(|e| to_response(e.into()))?
        .into_iter()
        .map(|(item, decision): (BulkCheckItem, Decision)| BulkCheckResult {
            permission: item.permission,
            object: item.object,
            decision,
        })
        .collect();
    Ok(Json(BulkCheckResponse { results }))
}

pub async fn filter(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkCheckRequest>,
) -> Result<Json<Vec<ObjectRef>>, (StatusCode, Json<ErrorResponse>)> {
    state.ensure_invalidator_running(request.tenant());
    state.evaluator.filter(request).await.map(Json).map_err(|e| to_response(e.into()))
}
