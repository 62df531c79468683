//! memcached client for one backend address.
//!
//! Wraps [`memcache::Client`] (ASCII protocol) and runs its blocking calls
//! on tokio's blocking thread pool. The underlying connection is opened on
//! first use; a failed connect leaves the client unconnected so the next
//! command tries again. Commands are never retried.

use bytes::Bytes;
use snafu::prelude::*;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{
    CommandSnafu, ConnectSnafu, DeliveryError, DeliveryJoinSnafu, InvalidKeySnafu,
};

/// Longest key memcached accepts.
pub const MAX_KEY_LEN: usize = 250;

/// Seconds to wait for a backend connection before giving up.
pub const CONNECT_TIMEOUT_SECS: u64 = 2;

/// Seconds a single command may block on the socket.
pub const IO_TIMEOUT_SECS: u64 = 10;

/// Client for a single memcached server.
pub struct MemcacheClient {
    addr: String,
    inner: OnceCell<memcache::Client>,
}

impl std::fmt::Debug for MemcacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcacheClient")
            .field("addr", &self.addr)
            .field("connected", &self.inner.initialized())
            .finish()
    }
}

impl MemcacheClient {
    /// Create a client for `addr` (`host:port`). No connection is made until first use.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            inner: OnceCell::new(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Store `value` under `key` with no expiry.
    pub async fn set(&self, key: &str, value: Bytes) -> Result<(), DeliveryError> {
        validate_key(key)?;
        let client = self.connection().await?;
        let key = key.to_string();
        tokio::task::spawn_blocking(move || client.set(&key, value.as_ref(), 0))
            .await
            .context(DeliveryJoinSnafu { addr: &self.addr })?
            .context(CommandSnafu { addr: &self.addr })
    }

    /// Fetch the value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, DeliveryError> {
        validate_key(key)?;
        let client = self.connection().await?;
        let key = key.to_string();
        let value = tokio::task::spawn_blocking(move || client.get::<Vec<u8>>(&key))
            .await
            .context(DeliveryJoinSnafu { addr: &self.addr })?
            .context(CommandSnafu { addr: &self.addr })?;
        Ok(value.map(Bytes::from))
    }

    /// Handle to the connected client, connecting on first call.
    async fn connection(&self) -> Result<memcache::Client, DeliveryError> {
        let client = self.inner.get_or_try_init(|| self.connect()).await?;
        Ok(client.clone())
    }

    async fn connect(&self) -> Result<memcache::Client, DeliveryError> {
        let url = connection_url(&self.addr);
        debug!("Connecting to memcached at {}", self.addr);
        tokio::task::spawn_blocking(move || memcache::Client::connect(url.as_str()))
            .await
            .context(DeliveryJoinSnafu { addr: &self.addr })?
            .context(ConnectSnafu { addr: &self.addr })
    }
}

/// `host:port` -> connection URL for the ASCII protocol.
pub fn connection_url(addr: &str) -> String {
    format!(
        "memcache://{addr}?protocol=ascii&tcp_nodelay=true&connect_timeout={CONNECT_TIMEOUT_SECS}&timeout={IO_TIMEOUT_SECS}"
    )
}

/// Keys must be 1..=250 bytes without whitespace or control characters.
pub fn validate_key(key: &str) -> Result<(), DeliveryError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.bytes().all(|b| b > b' ' && b != 0x7f);
    ensure!(valid, InvalidKeySnafu { key });
    Ok(())
}
