//! Storage seam for the queue protocol.
//!
//! The protocol needs a small slice of Redis: lists, sets, hashes, a server
//! clock and optimistic transactions (WATCH, MULTI, EXEC). [`TaskStore`] hands
//! out sessions that own that state for the length of one operation.
//!
//! Two stores ship with the crate:
//!
//! - [`RedisStore`]: the production store, one pooled connection per session
//! - [`MemoryStore`]: an in-process store with the same watch semantics, used
//!   by tests and local tooling

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::QueueResult;

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Source of sessions.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Open a session with no watched keys.
    async fn session(&self) -> QueueResult<Box<dyn StoreSession>>;
}

/// One caller's view of the store.
///
/// Watches belong to the session. A transaction passed to [`exec`] commits
/// only if no watched key changed since it was watched; either way the
/// session ends up watching nothing.
///
/// [`exec`]: StoreSession::exec
#[async_trait]
pub trait StoreSession: Send {
    async fn watch(&mut self, key: &str) -> QueueResult<()>;

    async fn unwatch(&mut self) -> QueueResult<()>;

    /// Inclusive range with Redis index rules: negative indices count from
    /// the tail and out-of-range bounds are clamped.
    async fn list_range(&mut self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>>;

    async fn list_len(&mut self, key: &str) -> QueueResult<usize>;

    /// All fields of a hash. A missing key reads as an empty map.
    async fn hash_get_all(&mut self, key: &str) -> QueueResult<HashMap<String, String>>;

    async fn set_contains(&mut self, key: &str, member: &str) -> QueueResult<bool>;

    async fn set_members(&mut self, key: &str) -> QueueResult<Vec<String>>;

    async fn set_len(&mut self, key: &str) -> QueueResult<usize>;

    /// Store clock in whole epoch seconds.
    async fn server_time(&mut self) -> QueueResult<i64>;

    /// Apply `tx` atomically. Returns `false` if a watched key changed and
    /// nothing was applied.
    async fn exec(&mut self, tx: Transaction) -> QueueResult<bool>;
}

/// A single write inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// HSET: set fields, creating the hash if needed.
    HashSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// RPUSH
    ListPush { key: String, value: String },
    /// LPOP
    ListPopFront { key: String },
    /// LREM with count 1: drop the first occurrence.
    ListRemove { key: String, value: String },
    /// SADD
    SetAdd { key: String, member: String },
    /// SREM
    SetRemove { key: String, member: String },
}

/// Writes queued for one MULTI/EXEC block, applied in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    ops: Vec<Op>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a hash write. An empty field list queues nothing.
    pub fn hash_set<I>(&mut self, key: impl Into<String>, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let fields: Vec<_> = fields.into_iter().collect();
        if !fields.is_empty() {
            self.ops.push(Op::HashSet {
                key: key.into(),
                fields,
            });
        }
        self
    }

    pub fn list_push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.ops.push(Op::ListPush {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn list_pop_front(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(Op::ListPopFront { key: key.into() });
        self
    }

    pub fn list_remove(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.ops.push(Op::ListRemove {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn set_add(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(Op::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn set_remove(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(Op::SetRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_order() {
        let mut tx = Transaction::new();
        tx.list_pop_front("p")
            .set_add("w", "a")
            .hash_set("m", vec![("k".to_string(), "v".to_string())]);

        assert_eq!(tx.len(), 3);
        assert_eq!(tx.ops()[0], Op::ListPopFront { key: "p".into() });
        assert_eq!(
            tx.ops()[1],
            Op::SetAdd {
                key: "w".into(),
                member: "a".into()
            }
        );
    }

    #[test]
    fn empty_hash_set_is_dropped() {
        let mut tx = Transaction::new();
        tx.hash_set("m", Vec::new());
        assert!(tx.is_empty());
    }
}
