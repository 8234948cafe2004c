use ahash::AHashMap;
use parking_lot::RwLock;

/// Tracks how far behind the Change Log Invalidator's per-tenant poller
/// is, in milliseconds. The invalidator records lag after processing
/// each change-log entry; the evaluator consults it before trusting a
/// Tiger probe, since a lagging invalidator means stale bitmaps could
/// answer `yes` for access that was just revoked.
#[derive(Default)]
pub struct LagTracker {
    lag_ms: RwLock<AHashMap<String, i64>>,
}

impl LagTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tenant_id: &str, lag_ms: i64) {
        self.lag_ms.write().insert(tenant_id.to_string(), lag_ms);
    }

    pub fn current(&self, tenant_id: &str) -> i64 {
        self.lag_ms.read().get(tenant_id).copied().unwrap_or(0)
    }

    pub fn is_lagging(&self, tenant_id: &str, threshold_ms: i64) -> bool {
        self.current(tenant_id) > threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecorded_tenant_is_not_lagging() {
        let tracker = LagTracker::new();
        assert!(!tracker.is_lagging("t1", 1000));
    }

    #[test]
    fn recorded_lag_above_threshold_is_lagging() {
        let tracker = LagTracker::new();
        tracker.record("t1", 5000);
        assert!(tracker.is_lagging("t1", 1000));
        assert!(!tracker.is_lagging("t1", 10_000));
    }
}
