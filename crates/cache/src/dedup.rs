use std::error::Error as StdError;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

/// Coalesces concurrent identical computations onto a single in-flight
/// future. Built directly on `moka`'s `get_with`, whose single-flight
/// semantics already match the contract this wraps: every caller
/// racing on the same key during the same window shares one
/// computation; none of them can cancel it for the others.
///
/// `ttl` bounds how long a *completed* result is replayed to new
/// callers before a fresh computation is forced — it is not a
/// correctness mechanism, just a bound on staleness.
pub struct Deduplicator<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inflight: Cache<K, V>,
}

impl<K, V> Deduplicator<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self { inflight: Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build() }
    }

    /// Runs `compute` for `key` unless another caller's computation for
    /// the same key is already in flight or has a result still within
    /// `ttl` — in which case this call shares that result instead.
    pub async fn get_or_compute<F>(&self, key: K, compute: F) -> V
    where
        F: Future<Output = V>,
    {
        self.inflight.get_with(key, compute).await
    }

    /// Like `get_or_compute`, but for a fallible `compute`. A failed
    /// computation is never inserted — every waiter on that attempt sees
    /// the same `Arc<E>`, and the next call retries from scratch rather
    /// than replaying a cached failure.
    pub async fn get_or_try_compute<F, E>(&self, key: K, compute: F) -> Result<V, Arc<E>>
    where
        F: Future<Output = Result<V, E>>,
        E: StdError + Send + Sync + 'static,
    {
        self.inflight.try_get_with(key, compute).await
    }

    pub fn invalidate(&self, key: &K) {
        self.inflight.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_identical_keys_compute_once() {
        let dedup: Arc<Deduplicator<&'static str, u32>> = Arc::new(Deduplicator::new(Duration::from_secs(5), 100));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dedup = dedup.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                dedup
                    .get_or_compute("k", async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        42
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_compute_independently() {
        let dedup: Deduplicator<&'static str, u32> = Deduplicator::new(Duration::from_secs(5), 100);
        let a = dedup.get_or_compute("a", async { 1 }).await;
        let b = dedup.get_or_compute("b", async { 2 }).await;
        assert_eq!((a, b), (1, 2));
    }
}
