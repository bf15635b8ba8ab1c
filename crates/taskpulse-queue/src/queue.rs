//! The queue client and claim/ack protocol.
//!
//! # Broker Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{prefix}:queue:{topic}:pending` | ZSET | Claimable message ids, scored by priority band + enqueue time |
//! | `{prefix}:queue:{topic}:processing` | ZSET | Claimed message ids, scored by lease deadline |
//! | `{prefix}:queue:{topic}:failed` | LIST | Ids that exhausted their retries |
//! | `{prefix}:queue:msg:{id}` | JSON | Full message envelope |
//!
//! Claims use individual broker commands rather than server-side
//! scripts; between the reclaim sweep and the pop another consumer may
//! win a message, which is within the at-least-once contract.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use fred::prelude::*;
use fred::types::Expiration;
use serde::Serialize;
use taskpulse_types::{MessageId, MessageStatus, Priority, ProgressUpdate, QueueMessage};

use crate::error::QueueError;

/// Width of one priority band in the pending-set score, in
/// milliseconds. Large enough that enqueue timestamps (unix epoch
/// millis) never cross into the next band, and small enough that
/// `rank * BAND + millis` stays exactly representable in an `f64`.
const PRIORITY_BAND_MS: u64 = 10_000_000_000_000;

/// Retention for terminal message bodies, so operators can inspect
/// delivered/failed envelopes for a while after the fact.
const TERMINAL_RETENTION: Duration = Duration::from_secs(3600);

/// Configuration for the queue client.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis-compatible URL of the durable broker.
    pub broker_url: String,
    /// Key prefix namespacing all broker keys.
    pub key_prefix: String,
    /// Retry ceiling after which a message is marked failed or expired.
    pub max_retries: u32,
}

impl QueueConfig {
    /// Create a configuration for the broker at `url` with the default
    /// prefix and retry ceiling.
    pub fn new(url: &str) -> Self {
        Self {
            broker_url: url.to_owned(),
            key_prefix: "taskpulse".to_owned(),
            max_retries: 3,
        }
    }

    /// Set the key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_owned();
        self
    }

    /// Set the retry ceiling.
    #[must_use]
    pub const fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }
}

/// Pending/processing backlog sizes for one topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    /// Messages eligible for claiming.
    pub pending: u64,
    /// Messages currently under a lease.
    pub processing: u64,
}

/// Client for the priority queue on the durable broker.
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct PriorityQueue {
    client: Client,
    prefix: String,
    max_retries: u32,
}

impl PriorityQueue {
    /// Connect to the broker.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Config`] if the URL cannot be parsed, or
    /// [`QueueError::Connectivity`] if the connection fails.
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let broker_config = Config::from_url(&config.broker_url)
            .map_err(|e| QueueError::Config(format!("Invalid broker URL: {e}")))?;

        let client = Builder::from_config(broker_config).build()?;
        client
            .init()
            .await
            .map_err(|e| QueueError::Connectivity(e.to_string()))?;

        tracing::info!(prefix = %config.key_prefix, "Connected to message broker");
        Ok(Self {
            client,
            prefix: config.key_prefix.clone(),
            max_retries: config.max_retries,
        })
    }

    fn pending_key(&self, topic: &str) -> String {
        format!("{}:queue:{topic}:pending", self.prefix)
    }

    fn processing_key(&self, topic: &str) -> String {
        format!("{}:queue:{topic}:processing", self.prefix)
    }

    fn failed_key(&self, topic: &str) -> String {
        format!("{}:queue:{topic}:failed", self.prefix)
    }

    fn message_key(&self, id: MessageId) -> String {
        format!("{}:queue:msg:{id}", self.prefix)
    }

    // -----------------------------------------------------------------------
    // Enqueue
    // -----------------------------------------------------------------------

    /// Durably enqueue `payload` under the payload's topic.
    ///
    /// The message body is persisted before the id enters the pending
    /// set; once this returns the message will not be lost.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if serialization or a broker write fails.
    pub async fn enqueue(
        &self,
        payload: ProgressUpdate,
        priority: Priority,
    ) -> Result<MessageId, QueueError> {
        let message = QueueMessage::new(payload, priority);
        let score = pending_score(priority, message.enqueued_at);

        self.save_message(&message, None).await?;
        let _: () = self
            .client
            .zadd(
                self.pending_key(&message.topic),
                None,
                None,
                false,
                false,
                (score, message.id.to_string()),
            )
            .await?;

        tracing::debug!(
            id = %message.id,
            topic = %message.topic,
            priority = ?priority,
            "Enqueued message"
        );
        Ok(message.id)
    }

    // -----------------------------------------------------------------------
    // Claim / lease
    // -----------------------------------------------------------------------

    /// Claim the highest-priority, oldest-eligible pending message.
    ///
    /// Expired leases on the topic are reclaimed first. A claimed
    /// message is marked `Processing` with a lease of
    /// `visibility_timeout`; if nobody acknowledges before the lease
    /// deadline it becomes claimable again with its retry count
    /// incremented.
    ///
    /// Returns `Ok(None)` when the topic has no claimable message.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if a broker operation fails.
    pub async fn dequeue(
        &self,
        topic: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        self.reclaim_expired(topic).await?;

        loop {
            let popped: Vec<(String, f64)> = self
                .client
                .zpopmin(self.pending_key(topic), Some(1))
                .await?;
            let Some((id_str, _score)) = popped.into_iter().next() else {
                return Ok(None);
            };

            let Ok(id) = id_str.parse::<MessageId>() else {
                tracing::warn!(id = %id_str, topic, "Dropping unparseable id from pending set");
                continue;
            };

            let Some(mut message) = self.load_message(id).await? else {
                // The body expired or was purged; skip to the next id.
                tracing::warn!(%id, topic, "Pending id had no message body");
                continue;
            };

            let deadline = Utc::now()
                .checked_add_signed(to_delta(visibility_timeout))
                .unwrap_or_else(Utc::now);
            message.status = MessageStatus::Processing;
            message.lease_deadline = Some(deadline);
            self.save_message(&message, None).await?;

            let _: () = self
                .client
                .zadd(
                    self.processing_key(topic),
                    None,
                    None,
                    false,
                    false,
                    (millis_score(deadline), id.to_string()),
                )
                .await?;

            tracing::debug!(%id, topic, "Claimed message");
            return Ok(Some(message));
        }
    }

    /// Move expired leases back to the pending set.
    ///
    /// Each reclaimed message keeps its original priority/enqueue score
    /// (so it does not lose its FIFO position) and gains one retry.
    /// Messages past the retry ceiling are marked `Expired` instead.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if a broker operation fails.
    pub async fn reclaim_expired(&self, topic: &str) -> Result<u64, QueueError> {
        let now = Utc::now();
        let expired: Vec<String> = self
            .client
            .zrangebyscore(
                self.processing_key(topic),
                f64::NEG_INFINITY,
                millis_score(now),
                false,
                None,
            )
            .await?;

        let mut reclaimed = 0u64;
        for id_str in expired {
            let _: u64 = self
                .client
                .zrem(self.processing_key(topic), id_str.as_str())
                .await?;

            let Ok(id) = id_str.parse::<MessageId>() else {
                continue;
            };
            let Some(mut message) = self.load_message(id).await? else {
                continue;
            };

            message.retry_count = message.retry_count.saturating_add(1);
            message.lease_deadline = None;

            if message.retry_count > self.max_retries {
                message.status = MessageStatus::Expired;
                self.save_message(&message, Some(TERMINAL_RETENTION)).await?;
                let _: u64 = self
                    .client
                    .rpush(self.failed_key(topic), id_str.as_str())
                    .await?;
                tracing::warn!(%id, topic, retries = message.retry_count, "Message expired past retry ceiling");
                continue;
            }

            message.status = MessageStatus::Pending;
            self.save_message(&message, None).await?;
            let score = pending_score(message.priority, message.enqueued_at);
            let _: () = self
                .client
                .zadd(
                    self.pending_key(topic),
                    None,
                    None,
                    false,
                    false,
                    (score, id_str.as_str()),
                )
                .await?;
            reclaimed = reclaimed.saturating_add(1);
            tracing::debug!(%id, topic, retries = message.retry_count, "Reclaimed expired lease");
        }
        Ok(reclaimed)
    }

    // -----------------------------------------------------------------------
    // Acknowledge
    // -----------------------------------------------------------------------

    /// Mark a claimed message `Delivered` and remove it from future
    /// claims.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the message body is gone,
    /// or [`QueueError`] if a broker operation fails.
    pub async fn ack(&self, topic: &str, id: MessageId) -> Result<(), QueueError> {
        let _: u64 = self
            .client
            .zrem(self.processing_key(topic), id.to_string())
            .await?;

        let mut message = self
            .load_message(id)
            .await?
            .ok_or(QueueError::NotFound(id))?;
        message.status = MessageStatus::Delivered;
        message.lease_deadline = None;
        self.save_message(&message, Some(TERMINAL_RETENTION)).await?;

        tracing::debug!(%id, topic, "Acknowledged message");
        Ok(())
    }

    /// Negatively acknowledge a claimed message.
    ///
    /// With `retry = true` and retries remaining, the message is
    /// requeued with its retry count incremented; otherwise it is
    /// marked `Failed` and recorded on the topic's failed list.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the message body is gone,
    /// or [`QueueError`] if a broker operation fails.
    pub async fn nack(&self, topic: &str, id: MessageId, retry: bool) -> Result<(), QueueError> {
        let _: u64 = self
            .client
            .zrem(self.processing_key(topic), id.to_string())
            .await?;

        let mut message = self
            .load_message(id)
            .await?
            .ok_or(QueueError::NotFound(id))?;
        message.lease_deadline = None;

        if retry && message.retry_count < self.max_retries {
            message.retry_count = message.retry_count.saturating_add(1);
            message.status = MessageStatus::Pending;
            self.save_message(&message, None).await?;
            let score = pending_score(message.priority, message.enqueued_at);
            let _: () = self
                .client
                .zadd(
                    self.pending_key(topic),
                    None,
                    None,
                    false,
                    false,
                    (score, id.to_string()),
                )
                .await?;
            tracing::debug!(%id, topic, retries = message.retry_count, "Requeued message");
        } else {
            message.status = MessageStatus::Failed;
            self.save_message(&message, Some(TERMINAL_RETENTION)).await?;
            let _: u64 = self
                .client
                .rpush(self.failed_key(topic), id.to_string())
                .await?;
            tracing::warn!(%id, topic, "Message marked failed");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Pending backlog size for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the broker read fails.
    pub async fn depth(&self, topic: &str) -> Result<u64, QueueError> {
        let n: u64 = self.client.zcard(self.pending_key(topic)).await?;
        Ok(n)
    }

    /// Pending and processing backlog sizes for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if a broker read fails.
    pub async fn depths(&self, topic: &str) -> Result<QueueDepths, QueueError> {
        let pending: u64 = self.client.zcard(self.pending_key(topic)).await?;
        let processing: u64 = self.client.zcard(self.processing_key(topic)).await?;
        Ok(QueueDepths {
            pending,
            processing,
        })
    }

    /// Load a message envelope by id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the read or deserialization fails.
    pub async fn load_message(&self, id: MessageId) -> Result<Option<QueueMessage>, QueueError> {
        let raw: Option<String> = self.client.get(self.message_key(id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_message(
        &self,
        message: &QueueMessage,
        retention: Option<Duration>,
    ) -> Result<(), QueueError> {
        let json = serde_json::to_string(message)?;
        let expire = retention
            .map(|d| Expiration::EX(i64::try_from(d.as_secs().max(1)).unwrap_or(i64::MAX)));
        let _: () = self
            .client
            .set(self.message_key(message.id), json.as_str(), expire, None, false)
            .await?;
        Ok(())
    }

    /// Delete every broker key for `topic`.
    ///
    /// **WARNING:** Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if a broker delete fails.
    pub async fn purge_topic(&self, topic: &str) -> Result<(), QueueError> {
        let _: u32 = self.client.del(self.pending_key(topic)).await?;
        let _: u32 = self.client.del(self.processing_key(topic)).await?;
        let _: u32 = self.client.del(self.failed_key(topic)).await?;
        Ok(())
    }
}

/// Score a pending message: priority band first, enqueue time within
/// the band. Lower scores pop first. Enqueue times carry millisecond
/// precision; equal-priority messages enqueued in the same millisecond
/// tie and are served in id order.
fn pending_score(priority: Priority, enqueued_at: DateTime<Utc>) -> f64 {
    let band = u64::from(priority.rank()).saturating_mul(PRIORITY_BAND_MS);
    to_f64(band.saturating_add(epoch_millis(enqueued_at)))
}

/// Score a processing entry by its lease deadline.
fn millis_score(at: DateTime<Utc>) -> f64 {
    to_f64(epoch_millis(at))
}

fn epoch_millis(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or(0)
}

// Scores stay well below 2^53, so the conversion is exact.
#[allow(clippy::cast_precision_loss)]
fn to_f64(v: u64) -> f64 {
    v as f64
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpulse_types::TaskId;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
    }

    #[test]
    fn higher_priority_always_scores_lower() {
        // B(High, t=1) must pop before A(Low, t=0) despite enqueueing later.
        let a = pending_score(Priority::Low, at(0));
        let b = pending_score(Priority::High, at(1));
        assert!(b < a);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let b = pending_score(Priority::High, at(1));
        let c = pending_score(Priority::High, at(2));
        assert!(b < c);
    }

    #[test]
    fn spec_scenario_order_is_b_c_a() {
        let a = pending_score(Priority::Low, at(0));
        let b = pending_score(Priority::High, at(1));
        let c = pending_score(Priority::High, at(2));
        let mut scores = [(a, "A"), (b, "B"), (c, "C")];
        scores.sort_by(|(x, _), (y, _)| x.total_cmp(y));
        let order: Vec<&str> = scores.iter().map(|(_, name)| *name).collect();
        assert_eq!(order, vec!["B", "C", "A"]);
    }

    #[test]
    fn urgent_beats_everything() {
        let now = Utc::now();
        let urgent = pending_score(Priority::Urgent, now);
        for p in [Priority::High, Priority::Normal, Priority::Low] {
            assert!(urgent < pending_score(p, at(0)));
        }
    }

    #[test]
    fn scores_are_exact_in_f64() {
        // rank 3 band + a far-future timestamp still sits below 2^53.
        let max_score = 3u64
            .saturating_mul(PRIORITY_BAND_MS)
            .saturating_add(PRIORITY_BAND_MS);
        assert!(max_score < (1u64 << 53));
    }

    #[test]
    fn queue_config_builder() {
        let config = QueueConfig::new("redis://localhost:6379/1")
            .with_key_prefix("progress")
            .with_max_retries(5);
        assert_eq!(config.key_prefix, "progress");
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn new_message_scores_with_its_own_enqueue_time() {
        let payload = ProgressUpdate::new(TaskId::new(), 5, "start");
        let message = QueueMessage::new(payload, Priority::Normal);
        let score = pending_score(message.priority, message.enqueued_at);
        assert!(score >= to_f64(2u64.saturating_mul(PRIORITY_BAND_MS)));
        assert!(score < to_f64(3u64.saturating_mul(PRIORITY_BAND_MS)));
    }
}
