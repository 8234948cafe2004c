use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nexus_models::Decision;

use crate::dedup::Deduplicator;
use crate::keys::FinalKey;

/// Buckets a Unix timestamp (seconds) into a fixed window so requests
/// arriving within the same quantum share one Final Cache entry. A
/// smaller window gives fresher answers at the cost of cache hit rate.
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    window_secs: i64,
}

impl Quantizer {
    pub fn new(window_secs: i64) -> Self {
        assert!(window_secs > 0, "quantizer window must be positive");
        Self { window_secs }
    }

    pub fn quantum(&self, unix_secs: i64) -> i64 {
        unix_secs / self.window_secs
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Caches final decisions keyed by the quantized request. Built on
/// `Deduplicator` so that a thundering herd of identical checks within
/// one quantum triggers exactly one evaluator run.
pub struct FinalCache {
    inner: Deduplicator<FinalKey, Decision>,
}

impl FinalCache {
    pub fn new(window_secs: i64, max_capacity: u64) -> Self {
        Self { inner: Deduplicator::new(Duration::from_secs(window_secs.max(1) as u64), max_capacity) }
    }

    pub async fn get_or_evaluate<F>(&self, key: FinalKey, evaluate: F) -> Decision
    where
        F: Future<Output = Decision>,
    {
        self.inner.get_or_compute(key, evaluate).await
    }

    /// Like `get_or_evaluate`, but for an `evaluate` that can fail. A
    /// failure is never cached, so a transient store error doesn't get
    /// replayed as a stale decision to other callers sharing the quantum.
    pub async fn get_or_try_evaluate<F, E>(&self, key: FinalKey, evaluate: F) -> Result<Decision, Arc<E>>
    where
        F: Future<Output = Result<Decision, E>>,
        E: StdError + Send + Sync + 'static,
    {
        self.inner.get_or_try_compute(key, evaluate).await
    }

    pub fn invalidate(&self, key: &FinalKey) {
        self.inner.invalidate(key);
    }
}
