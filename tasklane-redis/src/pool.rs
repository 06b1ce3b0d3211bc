//! Redis connection pool.

use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::aio::MultiplexedConnection;
use std::ops::{Deref, DerefMut};
use tracing::{info, warn};

use crate::{RedisConfig, RedisError, Result};

pub type RedisPool = Pool<RedisConnectionManager>;

/// A connection checked out of the pool.
///
/// The connection is exclusive to its holder until dropped, so per-connection
/// server state such as `WATCH` belongs to the holder alone.
pub struct RedisConnection<'a> {
    conn: PooledConnection<'a, RedisConnectionManager>,
}

/// A checked-out connection that does not borrow the pool.
pub type OwnedConnection = RedisConnection<'static>;

impl<'a> RedisConnection<'a> {
    pub fn new(conn: PooledConnection<'a, RedisConnectionManager>) -> Self {
        Self { conn }
    }
}

impl Deref for RedisConnection<'_> {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for RedisConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

/// Builds a pool and proves the server answers before handing it out.
pub struct RedisPoolBuilder {
    config: RedisConfig,
}

impl RedisPoolBuilder {
    pub fn new(config: RedisConfig) -> Self {
        Self { config }
    }

    /// Build the pool, then PING through it.
    ///
    /// Fails with [`RedisError::Connection`] when the server cannot be
    /// reached within `connection_timeout`.
    pub async fn build(self) -> Result<RedisPool> {
        let url = self.config.connection_url()?;
        let shown = self.config.display_url();

        let manager = RedisConnectionManager::new(url)
            .map_err(|e| RedisError::Config(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(self.config.pool_size)
            .min_idle(self.config.min_idle)
            .connection_timeout(self.config.connection_timeout)
            .retry_connection(self.config.retry_on_timeout)
            .build(manager)
            .await
            .map_err(|e| RedisError::Connection(format!("{}: {}", shown, e)))?;

        {
            let mut conn = pool.get().await.map_err(|e| {
                warn!(url = %shown, error = %e, "Redis unreachable");
                RedisError::Connection(format!("could not connect to {}: {}", shown, e))
            })?;
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|e| RedisError::Connection(format!("PING to {} failed: {}", shown, e)))?;
        }

        info!(
            pool_size = self.config.pool_size,
            url = %shown,
            "Connected to Redis"
        );

        Ok(pool)
    }
}
