//! Output side of the loader: payload encoding and delivery to memcached.

pub mod memcache;
pub mod payload;
pub mod pool;

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::emit;
use crate::error::DeliveryError;
use crate::metrics::events::DeliveryCompleted;

pub use self::memcache::MemcacheClient;
pub use payload::UserApps;
pub use pool::ConnectionPool;

/// Writes encoded records to the backend chosen for their device type.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    pool: Arc<ConnectionPool>,
    dry_run: bool,
}

impl DeliveryClient {
    pub fn new(pool: Arc<ConnectionPool>, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    /// Send one payload to `addr` under `key`.
    ///
    /// In dry-run mode the write is only logged and always succeeds. There
    /// is no retry: the first error is returned.
    pub async fn deliver(
        &self,
        addr: &str,
        key: &str,
        payload: &UserApps,
    ) -> Result<(), DeliveryError> {
        if self.dry_run {
            info!("{} - {} -> {:?}", addr, key, payload);
            return Ok(());
        }

        let start = Instant::now();
        let client = self.pool.acquire(addr);
        client.set(key, payload.to_bytes()).await?;
        emit!(DeliveryCompleted {
            duration: start.elapsed()
        });
        Ok(())
    }
}
