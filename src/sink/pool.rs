//! Shared memcached clients keyed by backend address.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::emit;
use crate::metrics::events::PooledConnections;

use super::memcache::MemcacheClient;

/// Address -> client map shared by every file task.
///
/// The loader pre-populates the pool with every configured backend before
/// any file is processed, so lookups during a run only read. Addresses
/// that were not pre-populated get a client on first request; the shard
/// lock guarantees one client per address.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    clients: DashMap<String, Arc<MemcacheClient>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool holding a client for each of `addrs`.
    pub fn with_addresses<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pool = Self::new();
        for addr in addrs {
            pool.acquire(addr.as_ref());
        }
        pool
    }

    /// Client for `addr`, created on first request.
    ///
    /// Never fails: creating a client does not connect, so connection
    /// errors surface on the first command.
    pub fn acquire(&self, addr: &str) -> Arc<MemcacheClient> {
        if let Some(client) = self.clients.get(addr) {
            return Arc::clone(client.value());
        }
        let client = Arc::clone(
            self.clients
                .entry(addr.to_string())
                .or_insert_with(|| {
                    debug!("Creating memcached client for {}", addr);
                    Arc::new(MemcacheClient::new(addr))
                })
                .value(),
        );
        emit!(PooledConnections {
            count: self.clients.len()
        });
        client
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_reuses_client() {
        let pool = ConnectionPool::new();
        let a = pool.acquire("127.0.0.1:33013");
        let b = pool.acquire("127.0.0.1:33013");
        let c = pool.acquire("127.0.0.1:33014");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.addr(), "127.0.0.1:33014");
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_prepopulated_pool() {
        let pool = ConnectionPool::with_addresses(["a:1", "b:2", "a:1"]);
        assert_eq!(pool.len(), 2);
        let before = pool.acquire("b:2");
        assert!(Arc::ptr_eq(&before, &pool.acquire("b:2")));
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_creates_one_client() {
        let pool = Arc::new(ConnectionPool::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.acquire("10.0.0.1:11211") })
            })
            .collect();

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }
        assert_eq!(pool.len(), 1);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    }
}
