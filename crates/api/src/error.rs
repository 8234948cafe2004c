use axum::http::StatusCode;
use axum::Json;
use nexus_models::NexusError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self { error: error.to_string(), message: message.to_string() }
    }
}

/// Maps a `NexusError` kind to an HTTP status. `UnknownPermission` and
/// `UnknownObjectType` never actually reach here as errors; the evaluator
/// already folds them into a plain deny, but they're mapped for completeness.
pub fn to_response(err: NexusError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        NexusError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        NexusError::UnknownPermission { .. } => (StatusCode::OK, "unknown_permission"),
        NexusError::UnknownObjectType(_) => (StatusCode::OK, "unknown_object_type"),
        NexusError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        NexusError::TenantGone(_) => (StatusCode::NOT_FOUND, "tenant_gone"),
        NexusError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        NexusError::DeadlineExceeded => (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded"),
        NexusError::CycleDetected(_) => (StatusCode::BAD_REQUEST, "cycle_detected"),
        NexusError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (status, Json(ErrorResponse::new(code, &err.to_string())))
}
