use std::time::Duration;

/// Retry policy for transient `TupleStore` failures during a check.
/// `UnknownPermission`/`UnknownObjectType` never retry — they resolve
/// straight to deny.
#[derive(Debug, Clone, Copy)]
pub struct EvaluatorConfig {
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Tiger probes are skipped (treated as `unknown`) for a tenant
    /// whose invalidator lag exceeds this many milliseconds.
    pub tiger_lag_threshold_ms: i64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(50),
            retry_max_delay: Duration::from_millis(500),
            tiger_lag_threshold_ms: 2_000,
        }
    }
}

impl EvaluatorConfig {
    pub fn from_env() -> Self {
        Self {
            retry_attempts: std::env::var("NEXUS_EVALUATOR_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            retry_base_delay: Duration::from_millis(
                std::env::var("NEXUS_EVALUATOR_RETRY_BASE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(50),
            ),
            retry_max_delay: Duration::from_millis(
                std::env::var("NEXUS_EVALUATOR_RETRY_MAX_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(500),
            ),
            tiger_lag_threshold_ms: std::env::var("NEXUS_TIGER_LAG_THRESHOLD_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2_000),
        }
    }

    /// Exponential backoff delay for retry attempt `n` (0-indexed),
    /// capped at `retry_max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let scaled = self.retry_base_delay.saturating_mul(1 << attempt.min(10));
        scaled.min(self.retry_max_delay)
    }
}
