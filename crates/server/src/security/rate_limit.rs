//! Fixed-window rate limiting keyed by client identifier.
//!
//! The backing store is a strategy: an optional shared counter store (for
//! multi-instance deployments) tried first, with the process-local map used
//! transparently whenever the shared store errors. Availability wins over
//! strict global accuracy of the counter; the limiter itself never fails a
//! request for infrastructure reasons.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
#[error("counter store unavailable: {0}")]
pub struct CounterStoreError(pub String);

/// One fixed window of request counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowState {
    pub count: u32,
    pub reset_at: OffsetDateTime,
}

/// Result of admitting one request against the limiter.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: OffsetDateTime,
}

/// A shared window store, e.g. a networked key-value service. Implementations
/// only need get/set-with-expiry; best-effort atomicity is acceptable under
/// the fixed-window scheme.
#[async_trait::async_trait]
pub trait CounterStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Option<WindowState>, CounterStoreError>;
    async fn store(
        &self,
        key: &str,
        state: WindowState,
        expire_after: Duration,
    ) -> Result<(), CounterStoreError>;
}

/// Process-local window map, also the fallback when a shared store errors.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: DashMap<String, WindowState>,
    last_sweep: std::sync::Mutex<Option<Instant>>,
}

impl MemoryCounterStore {
    const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self::default()
    }

    /// Reclaim expired windows at most once per sweep interval.
    fn maybe_sweep(&self, now: OffsetDateTime) {
        if let Ok(mut last) = self.last_sweep.try_lock() {
            let due = last.is_none_or(|at| at.elapsed() >= Self::SWEEP_INTERVAL);
            if due {
                *last = Some(Instant::now());
                drop(last);
                self.windows.retain(|_, state| now <= state.reset_at);
            }
        }
    }

    fn admit(&self, key: &str, window: Duration, max_requests: u32) -> RateLimitDecision {
        let now = OffsetDateTime::now_utc();
        self.maybe_sweep(now);

        let mut entry = self.windows.entry(key.to_string()).or_insert(WindowState {
            count: 0,
            reset_at: now + window,
        });
        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        if entry.count >= max_requests {
            return RateLimitDecision {
                allowed: false,
                limit: max_requests,
                remaining: 0,
                reset_at: entry.reset_at,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: max_requests,
            remaining: max_requests - entry.count,
            reset_at: entry.reset_at,
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Fixed-window limiter with a pluggable shared store and a transparent
/// in-process fallback.
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    shared: Option<Arc<dyn CounterStore>>,
    fallback: MemoryCounterStore,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            shared: None,
            fallback: MemoryCounterStore::new(),
        }
    }

    pub fn with_shared_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.shared = Some(store);
        self
    }

    /// Admit or deny one request for the given identifier. Never errors: a
    /// shared-store failure degrades to the in-process fallback.
    pub async fn check(&self, identifier: &str) -> RateLimitDecision {
        if let Some(shared) = &self.shared {
            match self.admit_shared(shared.as_ref(), identifier).await {
                Ok(decision) => return decision,
                Err(e) => {
                    tracing::warn!(
                        name = "security.rate_limit.shared_store_fallback",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        error = %e,
                        message = "Shared counter store unavailable, using in-process fallback"
                    );
                }
            }
        }
        self.fallback
            .admit(identifier, self.window, self.max_requests)
    }

    async fn admit_shared(
        &self,
        store: &dyn CounterStore,
        identifier: &str,
    ) -> Result<RateLimitDecision, CounterStoreError> {
        let now = OffsetDateTime::now_utc();
        let current = store.fetch(identifier).await?;

        let state = match current {
            Some(state) if now <= state.reset_at => state,
            _ => WindowState {
                count: 0,
                reset_at: now + self.window,
            },
        };

        if state.count >= self.max_requests {
            return Ok(RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_at: state.reset_at,
            });
        }

        let next = WindowState {
            count: state.count + 1,
            reset_at: state.reset_at,
        };
        let expire_after = (next.reset_at - now)
            .try_into()
            .unwrap_or(self.window);
        store.store(identifier, next, expire_after).await?;

        Ok(RateLimitDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - next.count,
            reset_at: next.reset_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn window_counts_down_then_denies() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 3);

        let first = limiter.check("1.2.3.4").await;
        assert!(first.allowed);
        assert_eq!(first.remaining, 2);

        assert_eq!(limiter.check("1.2.3.4").await.remaining, 1);
        assert_eq!(limiter.check("1.2.3.4").await.remaining, 0);

        let denied = limiter.check("1.2.3.4").await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at, first.reset_at);
    }

    #[tokio::test]
    async fn identifiers_are_independent() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check("a").await.allowed);
        assert!(!limiter.check("a").await.allowed);
        assert!(limiter.check("b").await.allowed);
    }

    #[tokio::test]
    async fn expired_window_resets() {
        let limiter = FixedWindowLimiter::new(Duration::from_millis(30), 3);
        for _ in 0..3 {
            assert!(limiter.check("x").await.allowed);
        }
        assert!(!limiter.check("x").await.allowed);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let fresh = limiter.check("x").await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 2);
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl CounterStore for FailingStore {
        async fn fetch(&self, _key: &str) -> Result<Option<WindowState>, CounterStoreError> {
            Err(CounterStoreError("connection refused".into()))
        }

        async fn store(
            &self,
            _key: &str,
            _state: WindowState,
            _expire_after: Duration,
        ) -> Result<(), CounterStoreError> {
            Err(CounterStoreError("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn shared_store_failure_degrades_to_fallback() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 2)
            .with_shared_store(Arc::new(FailingStore));

        // The broken store must never block the request path.
        assert!(limiter.check("y").await.allowed);
        assert!(limiter.check("y").await.allowed);
        assert!(!limiter.check("y").await.allowed);
    }

    struct MapStore(DashMap<String, WindowState>);

    #[async_trait::async_trait]
    impl CounterStore for MapStore {
        async fn fetch(&self, key: &str) -> Result<Option<WindowState>, CounterStoreError> {
            Ok(self.0.get(key).map(|v| *v))
        }

        async fn store(
            &self,
            key: &str,
            state: WindowState,
            _expire_after: Duration,
        ) -> Result<(), CounterStoreError> {
            self.0.insert(key.to_string(), state);
            Ok(())
        }
    }

    #[tokio::test]
    async fn shared_store_is_preferred_when_healthy() {
        let map = Arc::new(MapStore(DashMap::new()));
        let limiter =
            FixedWindowLimiter::new(Duration::from_secs(60), 5).with_shared_store(map.clone());

        assert_eq!(limiter.check("z").await.remaining, 4);
        assert_eq!(limiter.check("z").await.remaining, 3);
        assert_eq!(map.0.get("z").unwrap().count, 2);
    }

    #[test]
    fn memory_store_sweeps_expired_windows() {
        let store = MemoryCounterStore::new();
        store.windows.insert(
            "old".into(),
            WindowState {
                count: 5,
                reset_at: OffsetDateTime::now_utc() - time::Duration::minutes(5),
            },
        );
        store.maybe_sweep(OffsetDateTime::now_utc());
        assert!(store.is_empty());
    }
}
