use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::entity::{channel, notification_template, subscription};
use crate::stats::StatsOverview;

#[derive(Clone)]
pub struct CacheEntry<T> {
    data: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }

    pub fn data(&self) -> &T {
        &self.data
    }
}

/// A read-through TTL cache namespace.
///
/// Expired entries are reclaimed lazily on access and by the periodic sweep
/// started via [`spawn_cache_sweeper`]. Caching is a pure performance
/// optimization: every read path behaves identically with it disabled, only
/// slower.
#[derive(Clone)]
pub struct TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: Arc<DashMap<K, CacheEntry<V>>>,
    default_ttl: Duration,
    last_cleanup: Arc<std::sync::Mutex<Instant>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            default_ttl,
            last_cleanup: Arc::new(std::sync::Mutex::new(Instant::now())),
        }
    }

    /// Perform lazy cleanup if enough time has passed
    fn maybe_cleanup(&self) {
        const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

        // Check if cleanup is needed (non-blocking)
        if let Ok(mut last_cleanup) = self.last_cleanup.try_lock() {
            if last_cleanup.elapsed() >= CLEANUP_INTERVAL {
                *last_cleanup = Instant::now();
                drop(last_cleanup); // Release lock before cleanup

                self.cache.retain(|_, entry| !entry.is_expired());
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.maybe_cleanup();

        self.cache.get(key).and_then(|entry| {
            if entry.is_expired() {
                None
            } else {
                Some(entry.data().clone())
            }
        })
    }

    pub fn insert(&self, key: K, value: V) {
        self.maybe_cleanup();

        self.cache
            .insert(key, CacheEntry::new(value, self.default_ttl));
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.cache.insert(key, CacheEntry::new(value, ttl));
    }

    /// Read-through lookup: a hit within TTL returns the stored value; a miss
    /// or expired entry runs `factory` and stores the result. A factory error
    /// propagates and nothing is stored (no negative caching).
    pub async fn get_or_try_insert_with<E, F, Fut>(&self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = factory().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        self.cache.remove(key);
    }

    /// Drop every entry in the namespace, used whenever the underlying
    /// relational data is mutated.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Drop expired entries now, regardless of the lazy-cleanup interval.
    pub fn purge_expired(&self) {
        self.cache.retain(|_, entry| !entry.is_expired());
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

// Namespace caches in front of the relational store, keyed by query shape.
pub type ChannelCache = TtlCache<String, Vec<channel::Model>>;
pub type SubscriptionCache = TtlCache<String, Vec<subscription::Model>>;
pub type TemplateCache = TtlCache<String, Vec<notification_template::Model>>;
pub type StatsCache = TtlCache<String, StatsOverview>;

impl Default for ChannelCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl Default for SubscriptionCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// All gateway cache namespaces, constructed once at process start.
#[derive(Clone, Default)]
pub struct GatewayCaches {
    pub channels: ChannelCache,
    pub subscriptions: SubscriptionCache,
    pub templates: TemplateCache,
    pub stats: StatsCache,
}

impl GatewayCaches {
    pub fn purge_expired(&self) {
        self.channels.purge_expired();
        self.subscriptions.purge_expired();
        self.templates.purge_expired();
        self.stats.purge_expired();
    }
}

/// Spawn the periodic full sweep over every cache namespace. The interval is
/// independent of any single TTL.
pub fn spawn_cache_sweeper(caches: GatewayCaches) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            caches.purge_expired();
        }
    });
}
