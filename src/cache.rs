use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::NormalizedResult;

/// Memoization of prior outcomes, keyed by request content
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<NormalizedResult>;

    fn put(&self, key: CacheKey, result: NormalizedResult);

    /// Drop every entry
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SHA-256 over the length-prefixed source followed by stdin
///
/// The length prefix keeps `("a:b", "")` and `("a", "b")` apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(source_code: &str, stdin: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((source_code.len() as u64).to_le_bytes());
        hasher.update(source_code.as_bytes());
        hasher.update(stdin.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0[..12])
    }
}

/// Process-lifetime cache without eviction, emptied only by `clear`
#[derive(Default)]
pub struct InMemoryResultCache {
    entries: RwLock<HashMap<CacheKey, NormalizedResult>>,
}

impl ResultCache for InMemoryResultCache {
    fn get(&self, key: &CacheKey) -> Option<NormalizedResult> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: CacheKey, result: NormalizedResult) {
        self.entries.write().insert(key, result);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Spawns the task that empties `cache` every `period` until `token` fires
pub fn spawn_sweeper(
    cache: Arc<dyn ResultCache>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // completes immediately

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("Cache sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let dropped = cache.len();
                    cache.clear();
                    log::info!("Cache cleared ({dropped} entries)");
                }
            }
        }
    })
}
