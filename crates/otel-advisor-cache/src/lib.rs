#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-cache** – memoizes advisory recommendations by the
//! deliberately lossy [`Sample::fingerprint`] for a configurable TTL.
//!
//! Follows the same `Arc<RwLock<HashMap<_>>>` plus periodic `retain`-based
//! sweep this codebase's rate limiter storage uses to keep its usage map
//! from growing unbounded between lookups.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use otel_advisor_types::{ParsedRecommendations, Sample};
use tokio::sync::RwLock;
use tracing::debug;

struct Entry {
    value: ParsedRecommendations,
    inserted_at: DateTime<Utc>,
}

/// A TTL-based recommendation cache keyed by sample fingerprint.
///
/// Keys never contain attribute-derived material: see
/// [`Sample::fingerprint`] for why a cache hit only means "approximately
/// similar workload shape", not payload equality.
pub struct RecommendationCache {
    entries: RwLock<HashMap<String, Entry>>,
    expiration: Duration,
}

impl RecommendationCache {
    /// Construct a cache with the given time-to-live for entries.
    pub fn new(expiration: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            expiration,
        }
    }

    /// Look up a cached recommendation for `sample`. Returns `None` on miss
    /// or on an expired entry (which is evicted as a side effect).
    pub async fn lookup(&self, sample: &Sample) -> Option<ParsedRecommendations> {
        let key = sample.fingerprint();
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key) {
                let age = Utc::now().signed_duration_since(entry.inserted_at);
                if age.to_std().unwrap_or(Duration::MAX) <= self.expiration {
                    return Some(entry.value.clone());
                }
            } else {
                return None;
            }
        }
        // Expired: evict under a write lock.
        let mut entries = self.entries.write().await;
        entries.remove(&key);
        None
    }

    /// Store a recommendation batch for `sample`, stamped with the current
    /// time.
    pub async fn store(&self, sample: &Sample, value: ParsedRecommendations) {
        let key = sample.fingerprint();
        self.entries.write().await.insert(key, Entry { value, inserted_at: Utc::now() });
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Evict every entry older than the configured expiration. Intended to
    /// be called periodically by a background task so the map does not
    /// grow unbounded between lookups of live keys.
    pub async fn sweep(&self) {
        let expiration = self.expiration;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            Utc::now()
                .signed_duration_since(entry.inserted_at)
                .to_std()
                .unwrap_or(Duration::MAX)
                <= expiration
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "swept expired recommendation cache entries");
        }
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if the cache currently holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Spawn a background task that periodically sweeps `cache` until
/// `interval` elapses are no longer observed (task runs until dropped or
/// the runtime shuts down).
pub fn spawn_sweeper(cache: Arc<RecommendationCache>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            cache.sweep().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel_advisor_types::SampleMetadata;
    use std::collections::BTreeSet;

    fn sample(total_traces: usize) -> Sample {
        Sample {
            traces: vec![],
            metrics: vec![],
            logs: vec![],
            metadata: SampleMetadata {
                total_traces,
                total_metrics: 0,
                total_logs: 0,
                services: BTreeSet::new(),
                sampled_at: Utc::now(),
                time_range: "recent".to_string(),
            },
        }
    }

    fn recs() -> ParsedRecommendations {
        ParsedRecommendations::from_recommendations(vec![], Utc::now())
    }

    #[tokio::test]
    async fn hit_within_ttl() {
        let cache = RecommendationCache::new(Duration::from_secs(3600));
        let s = sample(5);
        cache.store(&s, recs()).await;
        assert!(cache.lookup(&s).await.is_some());
    }

    #[tokio::test]
    async fn miss_after_ttl_elapsed() {
        let cache = RecommendationCache::new(Duration::from_millis(1));
        let s = sample(5);
        cache.store(&s, recs()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.lookup(&s).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn miss_for_unknown_key() {
        let cache = RecommendationCache::new(Duration::from_secs(60));
        assert!(cache.lookup(&sample(1)).await.is_none());
    }

    #[tokio::test]
    async fn clear_empties_cache() {
        let cache = RecommendationCache::new(Duration::from_secs(60));
        cache.store(&sample(1), recs()).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let cache = RecommendationCache::new(Duration::from_millis(10));
        cache.store(&sample(1), recs()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.store(&sample(2), recs()).await;
        cache.sweep().await;
        assert_eq!(cache.len().await, 1);
    }
}
