//! The progress-update payload submitted by producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TaskId;

/// A single progress report for a long-running task.
///
/// Producers in the domain layer submit these through the priority queue;
/// the fan-out manager pushes them verbatim to every observer subscribed
/// to the update's topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// The task this update describes.
    pub task_id: TaskId,

    /// Fan-out topic the update is published under (typically the task
    /// id, but producers may group related tasks under one topic).
    pub topic: String,

    /// Completion in whole percent, clamped to `0..=100` by the producer.
    pub percent: u8,

    /// Short human-readable stage label (e.g. `"indexing"`).
    pub stage: String,

    /// Free-form structured detail attached by the producer.
    #[serde(default)]
    pub detail: serde_json::Value,

    /// When the producer created this update.
    pub created_at: DateTime<Utc>,
}

impl ProgressUpdate {
    /// Create an update for `task_id` published under the task's own topic.
    pub fn new(task_id: TaskId, percent: u8, stage: &str) -> Self {
        Self {
            task_id,
            topic: task_id.to_string(),
            percent: percent.min(100),
            stage: stage.to_owned(),
            detail: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Publish this update under an explicit topic instead of the task id.
    #[must_use]
    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = topic.to_owned();
        self
    }

    /// Attach structured detail to this update.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    /// Whether this update reports completion.
    pub const fn is_complete(&self) -> bool {
        self.percent >= 100
    }
}
