//! Shared Redis handle.

use crate::{
    RedisConfig, Result,
    clock::{ServerTime, server_time},
    pool::{OwnedConnection, RedisConnection, RedisPool, RedisPoolBuilder},
};

/// Connection pool plus the configuration it was built from.
///
/// Construction fails fast: [`RedisService::new`] returns an error instead of
/// a service whose first command would fail.
pub struct RedisService {
    config: RedisConfig,
    pool: RedisPool,
}

impl RedisService {
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = RedisPoolBuilder::new(config.clone()).build().await?;
        Ok(Self { config, pool })
    }

    /// Connect using [`RedisConfig::from_env`].
    pub async fn from_env() -> Result<Self> {
        Self::new(RedisConfig::from_env().build()).await
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Check out a pooled connection.
    pub async fn get(&self) -> Result<RedisConnection<'_>> {
        let conn = self.pool.get().await?;
        Ok(RedisConnection::new(conn))
    }

    /// Check out a pooled connection that can outlive the borrow of `self`.
    pub async fn get_owned(&self) -> Result<OwnedConnection> {
        let conn = self.pool.get_owned().await?;
        Ok(RedisConnection::new(conn))
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }

    /// Current time according to the server.
    pub async fn server_time(&self) -> Result<ServerTime> {
        let mut conn = self.get().await?;
        server_time(&mut *conn).await
    }
}
