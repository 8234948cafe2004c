use nexus_cache::CacheStackConfig;
use nexus_engine::EvaluatorConfig;
use nexus_invalidator::InvalidatorConfig;
use nexus_store::StoreConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub store: StoreConfig,
    pub cache: CacheStackConfig,
    pub evaluator: EvaluatorConfig,
    pub invalidator: InvalidatorConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_host: std::env::var("NEXUS_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: std::env::var("NEXUS_SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            store: StoreConfig::from_env(),
            cache: CacheStackConfig::default(),
            evaluator: EvaluatorConfig::from_env(),
            invalidator: InvalidatorConfig::default(),
        }
    }
}
