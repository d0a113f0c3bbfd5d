//! Fixed-size connection pooling per ledger endpoint
//!
//! - Each endpoint gets exactly `pool_size` connections, built together on
//!   the first `acquire` for that endpoint and kept for the process lifetime
//! - Connections are handed out round-robin; concurrent first use builds one set
//! - No eviction: the pool is read-mostly once warmed
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

type Connector<C> = Arc<dyn Fn(&str) -> C + Send + Sync>;

/// Connections for a single endpoint
struct EndpointSlots<C> {
    connections: Vec<Arc<C>>,
    next: AtomicU64,
    acquisitions: AtomicU64,
}

impl<C> EndpointSlots<C> {
    fn build(endpoint: &str, size: usize, connector: &Connector<C>) -> Self {
        let connections = (0..size).map(|_| Arc::new(connector(endpoint))).collect();
        info!(url = %endpoint, size, "Created pooled connections");
        Self {
            connections,
            next: AtomicU64::new(0),
            acquisitions: AtomicU64::new(0),
        }
    }

    fn next_connection(&self) -> Arc<C> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        let idx = self.next.fetch_add(1, Ordering::Relaxed) as usize % self.connections.len();
        Arc::clone(&self.connections[idx])
    }
}

/// Pool of reusable connections keyed by endpoint URL
pub struct ConnectionPool<C> {
    pool_size: usize,
    connector: Connector<C>,
    endpoints: DashMap<String, Arc<EndpointSlots<C>>>,
}

impl<C> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("pool_size", &self.pool_size)
            .field("endpoints", &self.endpoints.len())
            .finish_non_exhaustive()
    }
}

impl<C: Send + Sync + 'static> ConnectionPool<C> {
    /// Create an empty pool; `pool_size` is clamped to at least one
    pub fn new<F>(pool_size: usize, connector: F) -> Self
    where
        F: Fn(&str) -> C + Send + Sync + 'static,
    {
        Self {
            pool_size: pool_size.max(1),
            connector: Arc::new(connector),
            endpoints: DashMap::new(),
        }
    }

    /// Get a connection to `endpoint`, building the endpoint's set on first use
    pub fn acquire(&self, endpoint: &str) -> Arc<C> {
        if let Some(slots) = self.endpoints.get(endpoint) {
            return slots.next_connection();
        }

        // The entry guard holds the shard lock while the set is built, so
        // racing callers observe a single set
        let slots = self
            .endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(EndpointSlots::build(endpoint, self.pool_size, &self.connector))
            })
            .clone();

        debug!(url = %endpoint, "Acquired pooled connection");
        slots.next_connection()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            endpoints: self.endpoints.len(),
            connections: 0,
            acquisitions: 0,
        };
        for entry in self.endpoints.iter() {
            stats.connections += entry.connections.len();
            stats.acquisitions += entry.acquisitions.load(Ordering::Relaxed);
        }
        stats
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub endpoints: usize,
    pub connections: usize,
    pub acquisitions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_pool(size: usize) -> (Arc<ConnectionPool<usize>>, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let pool = ConnectionPool::new(size, move |_url| counter.fetch_add(1, Ordering::SeqCst));
        (Arc::new(pool), built)
    }

    #[test]
    fn test_lazy_creation() {
        let (pool, built) = counting_pool(2);
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().endpoints, 0);

        pool.acquire("http://localhost:8899");
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_round_robin_reuse() {
        let (pool, built) = counting_pool(2);
        let a = pool.acquire("http://a");
        let b = pool.acquire("http://a");
        let c = pool.acquire("http://a");

        assert_ne!(*a, *b);
        assert_eq!(*a, *c);
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().acquisitions, 3);
    }

    #[test]
    fn test_endpoints_isolated() {
        let (pool, built) = counting_pool(3);
        pool.acquire("http://a");
        pool.acquire("http://b");

        let stats = pool.stats();
        assert_eq!(stats.endpoints, 2);
        assert_eq!(stats.connections, 6);
        assert_eq!(built.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_zero_size_clamped() {
        let (pool, _) = counting_pool(0);
        assert_eq!(pool.pool_size(), 1);
        pool.acquire("http://a");
        assert_eq!(pool.stats().connections, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_is_bounded() {
        let (pool, built) = counting_pool(2);

        let mut handles = Vec::new();
        for _ in 0..64 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.acquire("http://shared");
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().acquisitions, 64);
    }
}
