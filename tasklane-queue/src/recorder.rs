//! Heartbeat and ownership bookkeeping.
//!
//! The recorder never talks to the store itself. It appends metrics writes to
//! the transaction of the operation that triggered them, so a claim and its
//! stamp commit or abort together. Timestamps are passed in by the caller and
//! always come from the store clock.

use crate::identity::WorkerIdentity;
use crate::store::Transaction;
use crate::task::TaskParams;

/// Field names written into a task's metrics hash.
pub mod fields {
    pub const HEARTBEAT: &str = "heartbeat";
    pub const LAST_ACQUIRED: &str = "last-acquired";
    pub const LAST_RELEASED: &str = "last-released";
    pub const HOSTNAME: &str = "hostname";
    pub const PID: &str = "pid";
    /// Written by the worker runner when a handler fails.
    pub const LAST_ERROR: &str = "last-error";

    pub const WELL_KNOWN: [&str; 6] = [
        HEARTBEAT,
        LAST_ACQUIRED,
        LAST_RELEASED,
        HOSTNAME,
        PID,
        LAST_ERROR,
    ];
}

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    identity: WorkerIdentity,
}

impl MetricsRecorder {
    pub fn new(identity: WorkerIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Stamp a fresh claim: heartbeat, acquire time and the claiming worker.
    pub fn acquired(&self, tx: &mut Transaction, metrics_key: &str, now: i64) {
        let now = now.to_string();
        tx.hash_set(
            metrics_key,
            vec![
                (fields::HEARTBEAT.to_string(), now.clone()),
                (fields::LAST_ACQUIRED.to_string(), now),
                (fields::HOSTNAME.to_string(), self.identity.hostname.clone()),
                (fields::PID.to_string(), self.identity.pid.to_string()),
            ],
        );
    }

    /// Refresh the heartbeat and merge caller records.
    ///
    /// Records are applied after the heartbeat, so a record named
    /// `heartbeat` wins.
    pub fn heartbeat(&self, tx: &mut Transaction, metrics_key: &str, now: i64, records: TaskParams) {
        let mut entries = Vec::with_capacity(records.len() + 1);
        entries.push((fields::HEARTBEAT.to_string(), now.to_string()));
        entries.extend(records);
        tx.hash_set(metrics_key, entries);
    }

    pub fn released(&self, tx: &mut Transaction, metrics_key: &str, now: i64) {
        tx.hash_set(
            metrics_key,
            vec![(fields::LAST_RELEASED.to_string(), now.to_string())],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Op;

    fn recorder() -> MetricsRecorder {
        MetricsRecorder::new(WorkerIdentity::new("node-7", 31))
    }

    fn single_hash_set(tx: &Transaction) -> (&str, &[(String, String)]) {
        match tx.ops() {
            [Op::HashSet { key, fields }] => (key.as_str(), fields.as_slice()),
            other => panic!("expected one HSET, got {:?}", other),
        }
    }

    #[test]
    fn acquire_stamp() {
        let mut tx = Transaction::new();
        recorder().acquired(&mut tx, "t:metrics:x", 1000);

        let (key, written) = single_hash_set(&tx);
        assert_eq!(key, "t:metrics:x");
        assert_eq!(
            written,
            &[
                ("heartbeat".to_string(), "1000".to_string()),
                ("last-acquired".to_string(), "1000".to_string()),
                ("hostname".to_string(), "node-7".to_string()),
                ("pid".to_string(), "31".to_string()),
            ]
        );
    }

    #[test]
    fn caller_heartbeat_record_wins() {
        let mut tx = Transaction::new();
        let mut records = TaskParams::new();
        records.insert("heartbeat".into(), "override".into());
        recorder().heartbeat(&mut tx, "k", 5, records);

        let (_, written) = single_hash_set(&tx);
        assert_eq!(written.first().unwrap(), &("heartbeat".to_string(), "5".to_string()));
        assert_eq!(written.last().unwrap(), &("heartbeat".to_string(), "override".to_string()));
    }

    #[test]
    fn release_stamp_leaves_heartbeat_alone() {
        let mut tx = Transaction::new();
        recorder().released(&mut tx, "k", 9);

        let (_, written) = single_hash_set(&tx);
        assert_eq!(written, &[("last-released".to_string(), "9".to_string())]);
    }
}
