//! Task identifiers and the records stored for each task.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::QueueError;
use crate::recorder::fields;

/// String parameters attached to a task by its producer, and the shape of
/// progress records passed to `update`.
pub type TaskParams = HashMap<String, String>;

/// Task identifier: 8 random bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Random bytes per id.
    pub const BYTES: usize = 8;

    /// Generate a fresh id from the thread-local CSPRNG.
    ///
    /// Ids are not checked for uniqueness; at 64 bits collisions are not a
    /// practical concern.
    pub fn generate() -> Self {
        let bytes: [u8; Self::BYTES] = rand::rng().random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether this id has the shape produced by [`TaskId::generate`].
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == Self::BYTES * 2
            && self.0.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TaskId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(QueueError::InvalidArgument("task id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A task claimed by `acquire`. The holder owns it until `release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquiredTask {
    pub tid: TaskId,
    pub params: TaskParams,
}

/// Pending and working counts for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub topic: String,
    pub pending: usize,
    pub working: usize,
}

/// Read-only view of a task's metrics hash.
///
/// Well-known fields get typed accessors; everything a worker merged in
/// through `update` stays available by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TaskMetrics {
    fields: BTreeMap<String, String>,
}

impl TaskMetrics {
    pub fn from_fields(raw: HashMap<String, String>) -> Self {
        Self {
            fields: raw.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn timestamp(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    /// Server time of the last acquire or update, in epoch seconds.
    pub fn heartbeat(&self) -> Option<i64> {
        self.timestamp(fields::HEARTBEAT)
    }

    pub fn last_acquired(&self) -> Option<i64> {
        self.timestamp(fields::LAST_ACQUIRED)
    }

    pub fn last_released(&self) -> Option<i64> {
        self.timestamp(fields::LAST_RELEASED)
    }

    pub fn hostname(&self) -> Option<&str> {
        self.get(fields::HOSTNAME)
    }

    pub fn pid(&self) -> Option<u32> {
        self.get(fields::PID).and_then(|v| v.parse().ok())
    }

    /// Seconds since the last heartbeat, measured against `now` (which
    /// should itself come from the store clock).
    pub fn heartbeat_age(&self, now: i64) -> Option<i64> {
        self.heartbeat().map(|hb| now - hb)
    }

    /// All fields, well-known ones included, sorted by name.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Fields other than the ones the queue itself writes.
    pub fn extra(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter(|(k, _)| !fields::WELL_KNOWN.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
