//! Per-event token-analysis snapshot cache.
//!
//! One event fans out to every active configuration, but each external
//! data source is consulted at most once per event. The cache is bounded
//! and time-boxed, and the orchestrator evicts an entry as soon as the
//! event's fan-out completes; the TTL only covers entries orphaned by a
//! crash mid-event.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use sniper_core::{RetryPolicy, SnipeError, TokenAnalysis, TokenAnalysisProvider};

#[derive(Debug, Clone, Copy)]
pub struct AuxFetchSettings {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

struct CacheEntry {
    analysis: Arc<TokenAnalysis>,
    fetched_at: Instant,
}

pub struct AuxCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl AuxCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached snapshot for the mint, fetching it once if
    /// absent or expired. Provider failures degrade to unavailable
    /// sub-snapshots; this never errors.
    pub async fn snapshot(
        &self,
        provider: &dyn TokenAnalysisProvider,
        token_mint: &str,
        settings: &AuxFetchSettings,
    ) -> Arc<TokenAnalysis> {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(token_mint) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Arc::clone(&entry.analysis);
                }
            }
        }

        let analysis = Arc::new(fetch_analysis(provider, token_mint, settings).await);

        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity && !entries.contains_key(token_mint) {
            // Drop the oldest entry to stay bounded.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(mint, _)| mint.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            token_mint.to_string(),
            CacheEntry {
                analysis: Arc::clone(&analysis),
                fetched_at: Instant::now(),
            },
        );
        analysis
    }

    /// Drops the entry once the event's fan-out is done.
    pub async fn evict(&self, token_mint: &str) {
        self.entries.lock().await.remove(token_mint);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Fetches the three analysis sources concurrently, each with its own
/// timeout and retry budget. A source that stays down after the budget is
/// simply unavailable in the snapshot.
async fn fetch_analysis(
    provider: &dyn TokenAnalysisProvider,
    token_mint: &str,
    settings: &AuxFetchSettings,
) -> TokenAnalysis {
    let (volume, market, holders) = tokio::join!(
        fetch_source("volume", settings, || provider.volume(token_mint)),
        fetch_source("market", settings, || provider.market(token_mint)),
        fetch_source("holders", settings, || provider.holders(token_mint)),
    );
    TokenAnalysis {
        volume,
        market,
        holders,
    }
}

async fn fetch_source<T, F, Fut>(what: &str, settings: &AuxFetchSettings, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, SnipeError>>,
{
    let policy = RetryPolicy::new(settings.attempts, settings.backoff);
    let timeout = settings.timeout;
    let result = policy
        .run(what, || {
            let fut = op();
            async move {
                tokio::time::timeout(timeout, fut)
                    .await
                    .map_err(|_| SnipeError::Transient(format!("{what} fetch timed out")))?
            }
        })
        .await;

    match result {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!(source = what, error = %err, "analysis source unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use sniper_core::{HolderSnapshot, MarketSnapshot, VolumeSnapshot};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn settings() -> AuxFetchSettings {
        AuxFetchSettings {
            timeout: Duration::from_millis(200),
            attempts: 2,
            backoff: Duration::from_millis(1),
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        volume_calls: AtomicU32,
        fail_volume: bool,
    }

    #[async_trait]
    impl TokenAnalysisProvider for CountingProvider {
        async fn volume(&self, _mint: &str) -> Result<Option<VolumeSnapshot>, SnipeError> {
            self.volume_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_volume {
                return Err(SnipeError::Transient("provider down".to_string()));
            }
            Ok(Some(VolumeSnapshot {
                volume_24h_usd: dec!(25_000),
            }))
        }

        async fn market(&self, _mint: &str) -> Result<Option<MarketSnapshot>, SnipeError> {
            Ok(None)
        }

        async fn holders(&self, _mint: &str) -> Result<Option<HolderSnapshot>, SnipeError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn snapshot_is_fetched_once_per_event() {
        let cache = AuxCache::new(Duration::from_secs(60), 8);
        let provider = CountingProvider::default();

        let first = cache.snapshot(&provider, "MintA", &settings()).await;
        let second = cache.snapshot(&provider, "MintA", &settings()).await;

        assert!(first.volume.is_some());
        assert!(second.volume.is_some());
        assert_eq!(provider.volume_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn eviction_allows_a_fresh_fetch() {
        let cache = AuxCache::new(Duration::from_secs(60), 8);
        let provider = CountingProvider::default();

        cache.snapshot(&provider, "MintA", &settings()).await;
        cache.evict("MintA").await;
        cache.snapshot(&provider, "MintA", &settings()).await;

        assert_eq!(provider.volume_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_source_degrades_to_unavailable() {
        let cache = AuxCache::new(Duration::from_secs(60), 8);
        let provider = CountingProvider {
            fail_volume: true,
            ..CountingProvider::default()
        };

        let snapshot = cache.snapshot(&provider, "MintA", &settings()).await;

        assert!(snapshot.volume.is_none());
        // Retried up to the budget before giving up.
        assert_eq!(provider.volume_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_stays_within_capacity() {
        let cache = AuxCache::new(Duration::from_secs(60), 2);
        let provider = CountingProvider::default();

        cache.snapshot(&provider, "MintA", &settings()).await;
        cache.snapshot(&provider, "MintB", &settings()).await;
        cache.snapshot(&provider, "MintC", &settings()).await;

        assert_eq!(cache.len().await, 2);
    }
}
