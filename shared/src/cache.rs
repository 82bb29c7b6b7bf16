//! Single-value cache with a time-to-live.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Lifetime of the predefined-attribute catalog.
pub const CATALOG_TTL: Duration = Duration::from_secs(300);

struct Entry<T> {
    value: Arc<T>,
    computed_at: Instant,
}

/// Holds one computed value until it is older than the TTL.
///
/// The lock is not held while refreshing: concurrent misses each recompute
/// and the last write wins. Failed refreshes are not cached.
pub struct TtlCache<T> {
    ttl: Duration,
    entry: RwLock<Option<Entry<T>>>,
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached value, if still fresh.
    pub async fn get(&self) -> Option<Arc<T>> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| e.computed_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.value))
    }

    /// Replace the cached value unconditionally.
    pub async fn put(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        *self.entry.write().await = Some(Entry {
            value: Arc::clone(&value),
            computed_at: Instant::now(),
        });
        value
    }

    /// Return the fresh value or compute, store and return a new one.
    pub async fn get_or_refresh<F, Fut, E>(&self, refresh: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get().await {
            debug!("Cache hit");
            return Ok(value);
        }
        debug!("Cache miss, refreshing");
        let value = refresh().await?;
        Ok(self.put(value).await)
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}
