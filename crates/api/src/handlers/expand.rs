use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use nexus_models::{ObjectRef, RelationTuple};
use serde::Deserialize;

use crate::error::{to_response, ErrorResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExpandQuery {
    pub tenant_id: String,
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
}

/// Returns the direct tuples backing a relation, the leaf level of a
/// userset tree. Callers that need the full recursive tree (usersets
/// resolved through `computed`/`tuple_to_userset`) walk it client-side
/// from these leaves; the engine doesn't materialize the whole tree
/// itself.
pub async fn expand(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExpandQuery>,
) -> Result<Json<Vec<RelationTuple>>, (StatusCode, Json<ErrorResponse>)> {
    let object = ObjectRef::new(query.object_type, query.object_id);
    state
        .evaluator
        .expand(&query.tenant_id, &object, &query.relation)
        .await
        .map(Json)
        .map_err(|e| to_response(e.into()))
}
