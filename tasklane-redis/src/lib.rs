//! # tasklane-redis
//!
//! Redis connectivity shared by the tasklane crates: configuration (from code
//! or the environment), a bb8 connection pool that verifies the server is
//! reachable before returning, and access to the server clock.
//!
//! ```rust,ignore
//! use tasklane_redis::{RedisConfig, RedisService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // REDIS_HOST / REDIS_PORT / REDIS_USERNAME / REDIS_PASSWORD
//!     let redis = RedisService::new(RedisConfig::from_env().build()).await?;
//!
//!     let now = redis.server_time().await?;
//!     println!("server clock: {}", now.secs);
//!     Ok(())
//! }
//! ```

mod clock;
mod config;
mod error;
mod pool;
mod service;

pub use clock::{ServerTime, server_time};
pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{OwnedConnection, RedisConnection, RedisPool, RedisPoolBuilder};
pub use service::RedisService;

// Re-export redis crate for convenience
pub use redis;

pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::service::RedisService;
    pub use redis::AsyncCommands;
}
