use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/v1/check", post(handlers::check::check))
        .route("/v1/explain", get(handlers::check::explain))
        .route("/v1/bulk-check", post(handlers::check::bulk_check))
        .route("/v1/filter", post(handlers::check::filter))
        .route("/v1/expand", get(handlers::expand::expand))
        .route("/v1/tuples", post(handlers::tuples::write_tuple).delete(handlers::tuples::delete_tuple))
        .route("/v1/watch", get(handlers::watch::watch))
        .with_state(state)
}
