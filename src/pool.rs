//! Server pool
//!
//! Tracks which endpoints of the cluster are live and hands them out in
//! round-robin order. Endpoints that fail are quarantined for a fixed time
//! and then rejoin the rotation at the back of the line.

use crate::error::{MonkError, MonkResult};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// One addressable server, identified by its base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Arc<str>);

impl Endpoint {
    pub fn new(url: impl AsRef<str>) -> Self {
        Self(Arc::from(url.as_ref()))
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Endpoint::new(url)
    }
}

/// Point-in-time view of the pool for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub active: Vec<Endpoint>,
    pub inactive: Vec<Endpoint>,
    /// Position of the next endpoint in `active`.
    pub index: usize,
}

struct PoolState {
    active: Vec<Endpoint>,
    /// Failed endpoints in failure order; the front is the oldest.
    inactive: Vec<(Endpoint, Instant)>,
    index: usize,
}

impl PoolState {
    fn restore_expired(&mut self, quarantine: Duration, now: Instant) -> usize {
        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.inactive)
            .into_iter()
            .partition(|(_, since)| now.saturating_duration_since(*since) >= quarantine);
        self.inactive = waiting;
        let restored = expired.len();
        for (endpoint, _) in expired {
            tracing::info!("Restoring {} to rotation", endpoint);
            self.active.push(endpoint);
        }
        restored
    }
}

/// Round-robin pool of endpoints with time-boxed quarantine.
///
/// Every endpoint is always either active or inactive. The pool is shared
/// by all requests of one client; each operation takes the lock briefly and
/// never across a network call or a backoff sleep.
///
/// # Example
/// ```ignore
/// let pool = ServerPool::new(["http://a:4200", "http://b:4200"], Duration::from_secs(30));
/// let endpoint = pool.next().await?;
/// // ... request failed ...
/// pool.mark_failed(&endpoint).await;
/// ```
pub struct ServerPool {
    servers: Vec<Endpoint>,
    quarantine: Duration,
    state: Mutex<PoolState>,
}

impl ServerPool {
    /// Create a pool. Duplicate URLs are collapsed.
    pub fn new<I, S>(servers: I, quarantine: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<Endpoint> = Vec::new();
        for url in servers {
            let endpoint = Endpoint::new(url);
            if !unique.contains(&endpoint) {
                unique.push(endpoint);
            }
        }
        Self {
            state: Mutex::new(PoolState {
                active: unique.clone(),
                inactive: Vec::new(),
                index: 0,
            }),
            servers: unique,
            quarantine,
        }
    }

    /// All configured endpoints, in configuration order.
    pub fn servers(&self) -> &[Endpoint] {
        &self.servers
    }

    pub fn quarantine(&self) -> Duration {
        self.quarantine
    }

    /// Pick the next endpoint.
    ///
    /// Expired quarantines are lifted first. If nothing is active afterwards
    /// the oldest quarantined endpoint is revived, so callers are never
    /// starved while any endpoint exists.
    pub async fn next(&self) -> MonkResult<Endpoint> {
        let mut state = self.state.lock().await;
        state.restore_expired(self.quarantine, Instant::now());

        if state.active.is_empty() {
            if state.inactive.is_empty() {
                return Err(MonkError::NoEndpointsAvailable);
            }
            let (revived, _) = state.inactive.remove(0);
            tracing::warn!("All servers quarantined, reviving {}", revived);
            state.active.push(revived);
            state.index = 0;
        }

        let endpoint = state.active[state.index].clone();
        state.index = (state.index + 1) % state.active.len();
        Ok(endpoint)
    }

    /// Take an endpoint out of rotation.
    ///
    /// Returns `false` if the endpoint was not active, e.g. because another
    /// request already reported it.
    pub async fn mark_failed(&self, endpoint: &Endpoint) -> bool {
        let mut state = self.state.lock().await;
        let Some(pos) = state.active.iter().position(|e| e == endpoint) else {
            tracing::debug!("{} already out of rotation", endpoint);
            return false;
        };

        let failed = state.active.remove(pos);
        tracing::warn!(
            "Quarantining {} for {}ms",
            failed,
            self.quarantine.as_millis()
        );
        state.inactive.push((failed, Instant::now()));
        // Rotation restarts rather than keeping its relative position.
        if state.index >= state.active.len() {
            state.index = 0;
        }
        true
    }

    /// Move every endpoint whose quarantine has elapsed back into rotation.
    /// Returns how many were restored.
    pub async fn restore_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        state.restore_expired(self.quarantine, Instant::now())
    }

    pub async fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock().await;
        PoolSnapshot {
            active: state.active.clone(),
            inactive: state.inactive.iter().map(|(e, _)| e.clone()).collect(),
            index: state.index,
        }
    }

    /// Drop every endpoint. Subsequent `next()` calls fail.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.active.clear();
        state.inactive.clear();
        state.index = 0;
    }
}

impl fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPool")
            .field("servers", &self.servers)
            .field("quarantine", &self.quarantine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const QUARANTINE: Duration = Duration::from_secs(30);

    fn pool(urls: &[&str]) -> ServerPool {
        ServerPool::new(urls.iter().copied(), QUARANTINE)
    }

    fn urls(endpoints: &[Endpoint]) -> Vec<&str> {
        endpoints.iter().map(Endpoint::url).collect()
    }

    #[tokio::test]
    async fn test_round_robin_visits_each_once() {
        let pool = pool(&["a", "b", "c"]);
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(pool.next().await.unwrap().url().to_string());
        }
        assert_eq!(seen, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_duplicates_collapsed() {
        let pool = pool(&["a", "a", "b"]);
        assert_eq!(urls(pool.servers()), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_mark_failed_moves_to_inactive() {
        let pool = pool(&["a", "b", "c"]);
        let a = pool.next().await.unwrap();
        assert!(pool.mark_failed(&a).await);
        assert!(!pool.mark_failed(&a).await);

        let snap = pool.snapshot().await;
        assert_eq!(urls(&snap.active), vec!["b", "c"]);
        assert_eq!(urls(&snap.inactive), vec!["a"]);

        for _ in 0..4 {
            assert_ne!(pool.next().await.unwrap().url(), "a");
        }
    }

    #[tokio::test]
    async fn test_index_resets_when_out_of_range() {
        let pool = pool(&["a", "b"]);
        pool.next().await.unwrap();
        let b = pool.next().await.unwrap();
        assert_eq!(pool.snapshot().await.index, 0);
        pool.next().await.unwrap();
        assert_eq!(pool.snapshot().await.index, 1);
        pool.mark_failed(&b).await;
        let snap = pool.snapshot().await;
        assert_eq!(urls(&snap.active), vec!["a"]);
        assert_eq!(snap.index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quarantine_expires() {
        let pool = pool(&["a", "b", "c"]);
        let a = pool.next().await.unwrap();
        pool.mark_failed(&a).await;

        tokio::time::advance(QUARANTINE - Duration::from_millis(1)).await;
        assert_eq!(pool.restore_expired().await, 0);
        assert_eq!(urls(&pool.snapshot().await.inactive), vec!["a"]);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(pool.restore_expired().await, 1);
        let snap = pool.snapshot().await;
        assert_eq!(urls(&snap.active), vec!["b", "c", "a"]);
        assert!(snap.inactive.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_restores_before_choosing() {
        let pool = pool(&["a", "b"]);
        let a = pool.next().await.unwrap();
        pool.mark_failed(&a).await;
        tokio::time::advance(QUARANTINE).await;
        assert_eq!(pool.next().await.unwrap().url(), "b");
        assert_eq!(pool.next().await.unwrap().url(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_timestamp_not_reset_by_checks() {
        let pool = pool(&["a", "b"]);
        let a = pool.next().await.unwrap();
        pool.mark_failed(&a).await;
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(10)).await;
            pool.restore_expired().await;
        }
        assert_eq!(urls(&pool.snapshot().await.active), vec!["b", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_down_revives_oldest() {
        let pool = pool(&["a", "b"]);
        let a = pool.next().await.unwrap();
        pool.mark_failed(&a).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        let b = pool.next().await.unwrap();
        pool.mark_failed(&b).await;

        assert_eq!(pool.next().await.unwrap().url(), "a");
        let snap = pool.snapshot().await;
        assert_eq!(urls(&snap.active), vec!["a"]);
        assert_eq!(urls(&snap.inactive), vec!["b"]);
    }

    #[tokio::test]
    async fn test_empty_pool_fails() {
        let pool = ServerPool::new(Vec::<String>::new(), QUARANTINE);
        assert!(matches!(pool.next().await, Err(MonkError::NoEndpointsAvailable)));

        let pool = self::pool(&["a"]);
        pool.close().await;
        assert!(matches!(pool.next().await, Err(MonkError::NoEndpointsAvailable)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_keeps_invariants() {
        let pool = Arc::new(self::pool(&["a", "b", "c", "d"]));
        let mut handles = Vec::new();
        for i in 0..32 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let endpoint = pool.next().await.unwrap();
                if i % 3 == 0 {
                    pool.mark_failed(&endpoint).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = pool.snapshot().await;
        let mut all: Vec<_> = snap.active.iter().chain(&snap.inactive).map(Endpoint::url).collect();
        all.sort();
        assert_eq!(all, vec!["a", "b", "c", "d"]);
        assert!(snap.active.is_empty() || snap.index < snap.active.len());
    }
}
