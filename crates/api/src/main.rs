mod config;
mod error;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use config::Config;
use dotenvy::dotenv;
use nexus_cache::CacheStack;
use nexus_engine::Evaluator;
use nexus_interner::Interner;
use nexus_invalidator::Invalidator;
use nexus_schema::{PostgresSchemaRegistry, SchemaRegistry};
use nexus_store::{PostgresTupleStore, StorePool, TupleStore};
use state::AppState;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,nexus_api=debug,tower_http=debug".to_string()),
        )
        .init();

    tracing::info!("🚀 Starting Nexus Core API");
    tracing::info!("📦 Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    tracing::info!("🔌 Server: {}:{}", config.server_host, config.server_port);

    tracing::info!("🗄️  Connecting to database...");
    let pool = StorePool::connect(config.store.clone()).await.expect("failed to connect to database");
    pool.ping().await.expect("database ping failed");
    tracing::info!("✅ Database connected");

    let store: Arc<dyn TupleStore> = Arc::new(PostgresTupleStore::new(pool.pool().clone()));
    let schema: Arc<dyn SchemaRegistry> = Arc::new(PostgresSchemaRegistry::new(pool.pool().clone()));
    tracing::info!("📖 Schema registry initialized");

    let cache = Arc::new(CacheStack::new(config.cache.clone()));
    tracing::info!("⚡ Cache stack initialized");

    let interner = Arc::new(Interner::new());

    let evaluator = Evaluator::new(store.clone(), schema.clone(), cache.clone(), interner.clone(), config.evaluator);
    tracing::info!("🛡️  Evaluator initialized");

    let invalidator = Arc::new(Invalidator::new(store.clone(), cache.clone(), interner.clone(), config.invalidator));
    tracing::info!("🔁 Invalidator initialized");

    let state = Arc::new(AppState::new(store, schema, cache, evaluator, invalidator));

    let app = routes::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    tracing::info!("📡 Routes configured:");
    tracing::info!("   GET    /health");
    tracing::info!("   POST   /v1/check");
    tracing::info!("   GET    /v1/explain");
    tracing::info!("   POST   /v1/bulk-check");
    tracing::info!("   POST   /v1/filter");
    tracing::info!("   GET    /v1/expand");
    tracing::info!("   POST   /v1/tuples");
    tracing::info!("   DELETE /v1/tuples");
    tracing::info!("   GET    /v1/watch");

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind to address");

    tracing::info!("✅ Server ready at http://{}", addr);

    axum::serve(listener, app).await.expect("server error");

    Ok(())
}
