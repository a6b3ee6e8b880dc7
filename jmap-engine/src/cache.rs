// jmap-engine/src/cache.rs
//! Per-user session cache.
//!
//! Entries live for a fixed time after they were loaded; reading an entry
//! does not extend it. Concurrent misses for the same user share one load.
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::config::SessionCacheConfig;
use crate::error::JmapError;
use crate::events::{SessionEventListener, SessionOutdated};
use crate::http::RequestContext;
use crate::session::Session;

/// Fetches a fresh session for a user, typically from the well-known endpoint
#[async_trait]
pub trait SessionLoader: Send + Sync {
    async fn load(&self, username: &str) -> Result<Session, JmapError>;
}

/// Supplies the name of the user the current call acts for
#[async_trait]
pub trait UsernameResolver: Send + Sync {
    async fn current_username(&self, ctx: &RequestContext) -> Result<String, JmapError>;
}

struct Loaded {
    result: Result<Session, JmapError>,
    at: Instant,
}

struct Entry {
    created: Instant,
    cell: OnceCell<Loaded>,
}

pub struct SessionCache {
    loader: Arc<dyn SessionLoader>,
    entries: Mutex<HashMap<String, Arc<Entry>>>,
    ttl: Duration,
    failure_ttl: Duration,
    max_capacity: usize,
    reap_interval: Duration,
}

impl SessionCache {
    pub fn new(loader: Arc<dyn SessionLoader>, config: &SessionCacheConfig) -> Self {
        Self {
            loader,
            entries: Mutex::new(HashMap::new()),
            ttl: config.ttl(),
            failure_ttl: config.failure_ttl(),
            max_capacity: config.max_capacity.max(1),
            reap_interval: config.reap_interval(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Entry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        // still loading
        let Some(loaded) = entry.cell.get() else {
            return false;
        };
        let ttl = if loaded.result.is_ok() {
            self.ttl
        } else {
            self.failure_ttl
        };
        // a ttl past the clock's range never expires
        loaded.at.checked_add(ttl).is_some_and(|expiry| now >= expiry)
    }

    /// The cached session for `username`, loading it on a miss
    pub async fn get(&self, username: &str) -> Result<Session, JmapError> {
        let entry = self.entry(username);

        let loaded = entry
            .cell
            .get_or_init(|| async {
                debug!(username, "loading session");
                let result = self.loader.load(username).await;
                if let Err(e) = &result {
                    debug!(username, error = %e, "session load failed");
                }
                Loaded {
                    result,
                    at: Instant::now(),
                }
            })
            .await;

        if loaded.result.is_err() && self.failure_ttl.is_zero() {
            let mut entries = self.lock();
            if entries
                .get(username)
                .is_some_and(|current| Arc::ptr_eq(current, &entry))
            {
                entries.remove(username);
            }
        }
        loaded.result.clone()
    }

    /// Resolve the current user through `resolver`, then [`SessionCache::get`]
    pub async fn session_for(
        &self,
        ctx: &RequestContext,
        resolver: &dyn UsernameResolver,
    ) -> Result<Session, JmapError> {
        let username = resolver.current_username(ctx).await?;
        self.get(&username).await
    }

    fn entry(&self, username: &str) -> Arc<Entry> {
        let now = Instant::now();
        let mut entries = self.lock();
        if let Some(entry) = entries.get(username) {
            if !self.is_expired(entry, now) {
                return entry.clone();
            }
            debug!(username, "session expired");
        }

        entries.remove(username);
        if entries.len() >= self.max_capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.created)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(username = %oldest, "evicting session, cache is full");
                entries.remove(&oldest);
            }
        }

        let entry = Arc::new(Entry {
            created: now,
            cell: OnceCell::new(),
        });
        entries.insert(username.to_string(), entry.clone());
        entry
    }

    /// Drop the entry for `username`; returns whether there was one
    pub fn invalidate(&self, username: &str) -> bool {
        let removed = self.lock().remove(username).is_some();
        if removed {
            debug!(username, "session invalidated");
        }
        removed
    }

    /// Remove every expired entry
    pub fn reap(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let reaped = before - entries.len();
        if reaped > 0 {
            debug!(reaped, "reaped expired sessions");
        }
        reaped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reap periodically until the cache is dropped.
    ///
    /// Returns `None` when the configured interval is zero.
    pub fn start_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.reap_interval.is_zero() {
            return None;
        }
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.reap_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.reap();
            }
        }))
    }
}

impl SessionEventListener for SessionCache {
    fn on_session_outdated(&self, event: &SessionOutdated) {
        self.invalidate(&event.username);
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .field("failure_ttl", &self.failure_ttl)
            .field("max_capacity", &self.max_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, SessionProblem};
    use crate::session::tests::test_session;
    use crate::types::SessionState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingLoader {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                delay: Duration::from_millis(50),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionLoader for CountingLoader {
        async fn load(&self, _username: &str) -> Result<Session, JmapError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(SessionProblem::MissingApiUrl.into())
            } else {
                Ok(test_session())
            }
        }
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl UsernameResolver for Fixed {
        async fn current_username(&self, _ctx: &RequestContext) -> Result<String, JmapError> {
            Ok(self.0.to_string())
        }
    }

    fn config(ttl: u64, failure_ttl: u64, max_capacity: usize) -> SessionCacheConfig {
        SessionCacheConfig {
            ttl,
            failure_ttl,
            max_capacity,
            reap_interval: 60,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_load_once() {
        let loader = CountingLoader::new(false);
        let cache = Arc::new(SessionCache::new(loader.clone(), &config(300, 0, 16)));

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get("alice").await })
            })
            .collect();

        let expected = test_session();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), expected);
        }
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_failure() {
        let loader = CountingLoader::new(true);
        let cache = Arc::new(SessionCache::new(loader.clone(), &config(300, 0, 16)));

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get("alice").await })
            })
            .collect();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidSessionResponse);
        }
        assert_eq!(loader.calls(), 1);

        // a zero failure ttl means the next call retries
        assert!(cache.is_empty());
        assert!(cache.get("alice").await.is_err());
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_ttl_caches_failures() {
        let loader = CountingLoader::new(true);
        let cache = SessionCache::new(loader.clone(), &config(300, 10, 16));

        assert!(cache.get("alice").await.is_err());
        assert!(cache.get("alice").await.is_err());
        assert_eq!(loader.calls(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get("alice").await.is_err());
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_do_not_extend_ttl() {
        let loader = CountingLoader::new(false);
        let cache = SessionCache::new(loader.clone(), &config(300, 0, 16));

        cache.get("alice").await.unwrap();
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(50)).await;
            cache.get("alice").await.unwrap();
        }
        assert_eq!(loader.calls(), 1);

        // 250s of reads later the entry still expires 300s after loading
        tokio::time::advance(Duration::from_secs(60)).await;
        cache.get("alice").await.unwrap();
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_removes_expired() {
        let loader = CountingLoader::new(false);
        let cache = SessionCache::new(loader.clone(), &config(10, 0, 16));
        cache.get("alice").await.unwrap();
        cache.get("bob").await.unwrap();
        assert_eq!(cache.reap(), 0);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.reap(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_ttl_never_expires() {
        let loader = CountingLoader::new(false);
        let cache = SessionCache::new(loader.clone(), &config(u64::MAX, 0, 16));

        cache.get("alice").await.unwrap();
        tokio::time::advance(Duration::from_secs(86_400)).await;
        cache.get("alice").await.unwrap();
        assert_eq!(cache.reap(), 0);
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let loader = CountingLoader::new(false);
        let cache = SessionCache::new(loader.clone(), &config(300, 0, 2));
        cache.get("alice").await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get("bob").await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get("carol").await.unwrap();
        assert_eq!(cache.len(), 2);

        // bob is still cached, alice was evicted
        cache.get("bob").await.unwrap();
        assert_eq!(loader.calls(), 3);
        cache.get("alice").await.unwrap();
        assert_eq!(loader.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outdated_event_evicts() {
        let loader = CountingLoader::new(false);
        let cache = SessionCache::new(loader.clone(), &config(300, 0, 16));
        let session = cache
            .session_for(&RequestContext::new(), &Fixed("alice"))
            .await
            .unwrap();

        cache.on_session_outdated(&SessionOutdated {
            username: "alice".to_string(),
            account_ids: Vec::new(),
            previous_state: session.state().clone(),
            new_state: SessionState::from("next"),
        });
        assert!(cache.is_empty());
        cache.get("alice").await.unwrap();
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_stops_with_cache() {
        let loader = CountingLoader::new(false);
        let cache = Arc::new(SessionCache::new(loader.clone(), &config(10, 0, 16)));
        let reaper = cache.start_reaper().unwrap();

        cache.get("alice").await.unwrap();
        tokio::time::sleep(Duration::from_secs(75)).await;
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::sleep(Duration::from_secs(61)).await;
        reaper.await.unwrap();
    }
}
