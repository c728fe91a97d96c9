use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::{RedisConfigStore, RedisCounterStore, RedisKey};

/// Configuration for Redis-backed stores.
///
/// # Examples
///
/// ```ignore
/// use tiergate::redis::{RedisKey, RedisStoreOptions};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let connection_manager = client.get_connection_manager().await?;
///
/// let options = RedisStoreOptions {
///     connection_manager,
///     prefix: Some(RedisKey::try_from("myllm".to_string())?), // Keys: myllm:counter:<user>
/// };
/// ```
#[derive(Clone)]
pub struct RedisStoreOptions {
    /// Redis connection manager from the `redis` crate.
    ///
    /// Use `ConnectionManager` for automatic reconnection.
    pub connection_manager: ConnectionManager,

    /// Optional namespace for all keys. Defaults to `"tiergate"`.
    ///
    /// Two gateways sharing a prefix share their quota state.
    pub prefix: Option<RedisKey>,
}

/// Config and counter stores sharing one Redis namespace.
///
/// # Consistency Semantics
///
/// - **Atomic operations:** each counter script executes atomically within Redis
/// - **Exact per-user counting:** conditional updates never lose or duplicate
///   increments, whichever process issues them
/// - **Best-effort under failures:** a request that fails after its increment
///   (e.g. the connection drops before the reply) may still have consumed quota
pub struct RedisStoreProvider {
    config: Arc<RedisConfigStore>,
    counters: Arc<RedisCounterStore>,
}

impl RedisStoreProvider {
    /// Create both stores from `options`.
    pub fn new(options: RedisStoreOptions) -> Self {
        Self {
            config: Arc::new(RedisConfigStore::new(options.clone())),
            counters: Arc::new(RedisCounterStore::new(options)),
        }
    }

    /// Tier configuration and user accounts.
    pub fn config(&self) -> Arc<RedisConfigStore> {
        Arc::clone(&self.config)
    }

    /// Per-user counters.
    pub fn counters(&self) -> Arc<RedisCounterStore> {
        Arc::clone(&self.counters)
    }
}
