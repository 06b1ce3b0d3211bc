//! Server-side clock.
//!
//! Workers on different hosts compare heartbeats written by each other, so
//! timestamps are taken from the Redis server rather than the local clock.

use redis::aio::ConnectionLike;
use serde::{Deserialize, Serialize};

use crate::{RedisError, Result};

/// A reading of the server clock, as returned by `TIME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerTime {
    /// Unix time in seconds.
    pub secs: i64,
    /// Microseconds elapsed in the current second.
    pub micros: u32,
}

impl ServerTime {
    /// Parse the two-element `TIME` reply.
    pub fn from_reply(secs: &str, micros: &str) -> Result<Self> {
        let secs = secs
            .parse()
            .map_err(|_| RedisError::Command(format!("TIME returned bad seconds '{}'", secs)))?;
        let micros = micros
            .parse()
            .map_err(|_| RedisError::Command(format!("TIME returned bad micros '{}'", micros)))?;
        Ok(Self { secs, micros })
    }
}

/// Query `TIME` on the given connection.
pub async fn server_time<C>(conn: &mut C) -> Result<ServerTime>
where
    C: ConnectionLike + Send,
{
    let (secs, micros): (String, String) = redis::cmd("TIME").query_async(conn).await?;
    ServerTime::from_reply(&secs, &micros)
}
