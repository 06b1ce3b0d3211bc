//! Key names for a topic.
//!
//! Every key a topic touches is derived here, so two topics never share a
//! key and external tools can find a task's records from its topic and id.

use crate::task::TaskId;

/// The store keys belonging to one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicKeys {
    topic: String,
    pending: String,
    working: String,
}

impl TopicKeys {
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            pending: format!("{}:pending", topic),
            working: format!("{}:working", topic),
            topic,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// FIFO list of task ids awaiting a worker.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Set of task ids currently held by a worker.
    pub fn working(&self) -> &str {
        &self.working
    }

    /// Hash holding the parameters a task was created with.
    pub fn listing(&self, tid: &TaskId) -> String {
        format!("{}:listing:{}", self.topic, tid)
    }

    /// Hash holding heartbeat, ownership and progress fields.
    pub fn metrics(&self, tid: &TaskId) -> String {
        format!("{}:metrics:{}", self.topic, tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates() {
        let keys = TopicKeys::new("thumbs");
        let tid = TaskId::from("00ff00ff00ff00ff");

        assert_eq!(keys.pending(), "thumbs:pending");
        assert_eq!(keys.working(), "thumbs:working");
        assert_eq!(keys.listing(&tid), "thumbs:listing:00ff00ff00ff00ff");
        assert_eq!(keys.metrics(&tid), "thumbs:metrics:00ff00ff00ff00ff");
    }

    #[test]
    fn topics_are_disjoint() {
        let a = TopicKeys::new("a");
        let b = TopicKeys::new("b");
        let tid = TaskId::from("0123456789abcdef");

        assert_ne!(a.pending(), b.pending());
        assert_ne!(a.working(), b.working());
        assert_ne!(a.listing(&tid), b.listing(&tid));
        assert_ne!(a.metrics(&tid), b.metrics(&tid));
    }
}
