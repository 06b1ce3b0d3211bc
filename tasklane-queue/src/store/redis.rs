//! Redis-backed store.

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tasklane_redis::{OwnedConnection, RedisConfig, RedisService};

use super::{Op, StoreSession, TaskStore, Transaction};
use crate::error::QueueResult;

/// Store that runs each session on its own pooled connection.
///
/// WATCH state lives on the connection, so a session keeps its connection
/// checked out until it is dropped.
#[derive(Clone)]
pub struct RedisStore {
    redis: Arc<RedisService>,
}

impl RedisStore {
    pub fn new(redis: Arc<RedisService>) -> Self {
        Self { redis }
    }

    /// Connect and verify the server answers before returning.
    pub async fn connect(config: RedisConfig) -> QueueResult<Self> {
        let redis = RedisService::new(config).await?;
        Ok(Self::new(Arc::new(redis)))
    }

    /// Connect using `REDIS_*` environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        let redis = RedisService::from_env().await?;
        Ok(Self::new(Arc::new(redis)))
    }

    pub fn service(&self) -> &Arc<RedisService> {
        &self.redis
    }
}

#[async_trait]
impl TaskStore for RedisStore {
    async fn session(&self) -> QueueResult<Box<dyn StoreSession>> {
        let mut conn = self.redis.get_owned().await?;

        // A caller that failed mid-operation may have returned this
        // connection while still watching keys.
        let _: () = ::redis::cmd("UNWATCH").query_async(&mut *conn).await?;

        Ok(Box::new(RedisSession { conn }))
    }
}

struct RedisSession {
    conn: OwnedConnection,
}

impl RedisSession {
    fn conn(&mut self) -> &mut MultiplexedConnection {
        &mut self.conn
    }
}

#[async_trait]
impl StoreSession for RedisSession {
    async fn watch(&mut self, key: &str) -> QueueResult<()> {
        let _: () = ::redis::cmd("WATCH").arg(key).query_async(self.conn()).await?;
        Ok(())
    }

    async fn unwatch(&mut self) -> QueueResult<()> {
        let _: () = ::redis::cmd("UNWATCH").query_async(self.conn()).await?;
        Ok(())
    }

    async fn list_range(&mut self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>> {
        Ok(self.conn().lrange(key, start, stop).await?)
    }

    async fn list_len(&mut self, key: &str) -> QueueResult<usize> {
        Ok(self.conn().llen(key).await?)
    }

    async fn hash_get_all(&mut self, key: &str) -> QueueResult<HashMap<String, String>> {
        Ok(self.conn().hgetall(key).await?)
    }

    async fn set_contains(&mut self, key: &str, member: &str) -> QueueResult<bool> {
        Ok(self.conn().sismember(key, member).await?)
    }

    async fn set_members(&mut self, key: &str) -> QueueResult<Vec<String>> {
        Ok(self.conn().smembers(key).await?)
    }

    async fn set_len(&mut self, key: &str) -> QueueResult<usize> {
        Ok(self.conn().scard(key).await?)
    }

    async fn server_time(&mut self) -> QueueResult<i64> {
        let time = tasklane_redis::server_time(self.conn()).await?;
        Ok(time.secs)
    }

    async fn exec(&mut self, tx: Transaction) -> QueueResult<bool> {
        let mut pipe = ::redis::pipe();
        pipe.atomic();

        for op in tx.into_ops() {
            match op {
                Op::HashSet { key, fields } => {
                    pipe.cmd("HSET").arg(key).arg(fields).ignore();
                }
                Op::ListPush { key, value } => {
                    pipe.cmd("RPUSH").arg(key).arg(value).ignore();
                }
                Op::ListPopFront { key } => {
                    pipe.cmd("LPOP").arg(key).ignore();
                }
                Op::ListRemove { key, value } => {
                    pipe.cmd("LREM").arg(key).arg(1).arg(value).ignore();
                }
                Op::SetAdd { key, member } => {
                    pipe.cmd("SADD").arg(key).arg(member).ignore();
                }
                Op::SetRemove { key, member } => {
                    pipe.cmd("SREM").arg(key).arg(member).ignore();
                }
            }
        }

        // EXEC answers nil when a watched key changed.
        let reply: Option<()> = pipe.query_async(self.conn()).await?;
        Ok(reply.is_some())
    }
}
