//! The queued message envelope with lease and retry metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{MessageStatus, Priority};
use crate::ids::MessageId;
use crate::progress::ProgressUpdate;

/// One message on the priority queue.
///
/// The envelope is persisted in the broker as JSON and carries everything
/// the claim/ack protocol needs: the lease deadline while `Processing`
/// and the retry count incremented on every lease expiry or negative
/// acknowledgement. Exactly one consumer owns a `Processing` message;
/// ownership reverts when the lease deadline passes unacknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique message identifier.
    pub id: MessageId,

    /// Topic the message is published under.
    pub topic: String,

    /// Delivery priority.
    pub priority: Priority,

    /// Current lifecycle status.
    pub status: MessageStatus,

    /// The progress update being delivered.
    pub payload: ProgressUpdate,

    /// When the message was durably enqueued.
    pub enqueued_at: DateTime<Utc>,

    /// Lease deadline while `Processing`; `None` otherwise.
    pub lease_deadline: Option<DateTime<Utc>>,

    /// Number of times the message has been re-claimed after a lease
    /// expiry or requeued by a negative acknowledgement.
    pub retry_count: u32,
}

impl QueueMessage {
    /// Create a fresh `Pending` message for `payload` at `priority`.
    ///
    /// The topic is taken from the payload; the enqueue timestamp is now.
    pub fn new(payload: ProgressUpdate, priority: Priority) -> Self {
        Self {
            id: MessageId::new(),
            topic: payload.topic.clone(),
            priority,
            status: MessageStatus::Pending,
            payload,
            enqueued_at: Utc::now(),
            lease_deadline: None,
            retry_count: 0,
        }
    }

    /// Whether the `Processing` lease has expired as of `now`.
    ///
    /// Always `false` for messages that are not `Processing`.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == MessageStatus::Processing
            && self.lease_deadline.is_some_and(|deadline| deadline <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TaskId;

    fn update() -> ProgressUpdate {
        ProgressUpdate::new(TaskId::new(), 10, "start")
    }

    #[test]
    fn new_message_is_pending_with_zero_retries() {
        let msg = QueueMessage::new(update(), Priority::High);
        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.retry_count, 0);
        assert!(msg.lease_deadline.is_none());
    }

    #[test]
    fn topic_comes_from_payload() {
        let payload = update().with_topic("task-1");
        let msg = QueueMessage::new(payload, Priority::Normal);
        assert_eq!(msg.topic, "task-1");
    }

    #[test]
    fn lease_expiry_requires_processing_status() {
        let mut msg = QueueMessage::new(update(), Priority::Normal);
        let past = Utc::now() - chrono::Duration::seconds(5);
        msg.lease_deadline = Some(past);

        // Pending messages never report an expired lease.
        assert!(!msg.lease_expired(Utc::now()));

        msg.status = MessageStatus::Processing;
        assert!(msg.lease_expired(Utc::now()));
    }
}
