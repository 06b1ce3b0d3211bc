// tasklane - a coordinator-free task queue over Redis
//
// Producers enqueue tasks under a topic; workers on any number of hosts claim
// them through optimistic Redis transactions, report liveness and progress,
// and release them when done.

// Re-export the queue
pub use tasklane_queue::*;

// Re-export supporting crates
pub use tasklane_log;
pub use tasklane_redis;

pub use tasklane_redis::{RedisConfig, RedisService};

// Prelude for common imports
pub mod prelude {
    pub use crate::RedisConfig;
    pub use tasklane_queue::prelude::*;
}
