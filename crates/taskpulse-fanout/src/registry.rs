//! The topic-to-subscriber table with ordered, isolated delivery.
//!
//! The table maps each topic to the list of subscribed sessions in
//! stable registration order; fan-out walks that list and failure on
//! one session never blocks or fails its siblings. Subscriber order is
//! an invocation hint only, not a real-time guarantee.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use taskpulse_types::{ServerFrame, SessionId, SessionState};
use tokio::sync::RwLock;

use crate::session::{PushOutcome, SessionHandle};

/// Point-in-time fan-out statistics for the performance monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutStats {
    /// Sessions currently registered.
    pub open_sessions: usize,
    /// Topics with at least one subscriber.
    pub subscribed_topics: usize,
    /// Frames buffered for delivery since start.
    pub frames_delivered: u64,
    /// Frames dropped by per-session overflow since start.
    pub frames_dropped: u64,
    /// Pushes that found a dead session.
    pub delivery_failures: u64,
    /// Sessions accepted since start.
    pub sessions_opened: u64,
    /// Sessions removed since start (disconnect or reap).
    pub sessions_closed: u64,
    /// Sessions force-closed by the idle reaper since start.
    pub sessions_reaped: u64,
}

/// Serializable description of one live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// The session id.
    pub id: SessionId,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Subscribed topics, sorted.
    pub topics: Vec<String>,
    /// Frames waiting in the outbound buffer.
    pub buffered: usize,
    /// Frames dropped by the overflow policy.
    pub dropped: u64,
    /// Milliseconds since the last heartbeat.
    pub idle_ms: u64,
}

/// Registry of live sessions and their topic subscriptions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    topic_table: RwLock<HashMap<String, Vec<SessionId>>>,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
    delivery_failures: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    sessions_reaped: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and mark it open.
    pub async fn register(&self, session: Arc<SessionHandle>) {
        session.touch();
        session.set_state(SessionState::Open);
        let id = session.id();
        self.sessions.write().await.insert(id, session);
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = %id, "Session registered");
    }

    /// Look up a session by id.
    pub async fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Subscribe a session to `topics`, returning its full subscription
    /// set after the change.
    ///
    /// New subscribers are appended, so invocation order during fan-out
    /// is stable registration order.
    pub async fn subscribe(&self, id: SessionId, topics: &[String]) -> Vec<String> {
        let Some(session) = self.get(id).await else {
            return Vec::new();
        };
        let after = session.add_topics(topics);

        let mut table = self.topic_table.write().await;
        for topic in topics {
            let subscribers = table.entry(topic.clone()).or_default();
            if !subscribers.contains(&id) {
                subscribers.push(id);
            }
        }
        after
    }

    /// Unsubscribe a session from `topics`, returning its full
    /// subscription set after the change.
    pub async fn unsubscribe(&self, id: SessionId, topics: &[String]) -> Vec<String> {
        let Some(session) = self.get(id).await else {
            return Vec::new();
        };
        let after = session.remove_topics(topics);

        let mut table = self.topic_table.write().await;
        for topic in topics {
            if let Some(subscribers) = table.get_mut(topic) {
                subscribers.retain(|s| *s != id);
                if subscribers.is_empty() {
                    table.remove(topic);
                }
            }
        }
        after
    }

    /// Remove a session entirely: close it, drop it from the session
    /// map, and release every topic subscription.
    pub async fn remove(&self, id: SessionId) {
        let session = self.sessions.write().await.remove(&id);
        let Some(session) = session else {
            return;
        };
        session.close();

        let topics = session.topics();
        let mut table = self.topic_table.write().await;
        for topic in &topics {
            if let Some(subscribers) = table.get_mut(topic) {
                subscribers.retain(|s| *s != id);
                if subscribers.is_empty() {
                    table.remove(topic);
                }
            }
        }
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = %id, "Session removed");
    }

    /// Topics that currently have at least one subscriber.
    pub async fn topics(&self) -> Vec<String> {
        self.topic_table.read().await.keys().cloned().collect()
    }

    /// Push `frame` to every open subscriber of `topic`, in stable
    /// registration order.
    ///
    /// Returns the number of sessions the frame was buffered for. A
    /// closed session is removed from the registry; overflow drops are
    /// counted but still count as a delivery attempt. One session's
    /// failure never affects the others.
    pub async fn fanout(&self, topic: &str, frame: &ServerFrame) -> usize {
        let subscriber_ids: Vec<SessionId> = {
            let table = self.topic_table.read().await;
            table.get(topic).cloned().unwrap_or_default()
        };
        if subscriber_ids.is_empty() {
            return 0;
        }

        let mut delivered = 0usize;
        let mut dead: Vec<SessionId> = Vec::new();
        for id in subscriber_ids {
            let Some(session) = self.get(id).await else {
                continue;
            };
            match session.push(frame.clone()) {
                PushOutcome::Delivered => {
                    delivered = delivered.saturating_add(1);
                    self.frames_delivered.fetch_add(1, Ordering::Relaxed);
                }
                PushOutcome::DeliveredWithDrop => {
                    delivered = delivered.saturating_add(1);
                    self.frames_delivered.fetch_add(1, Ordering::Relaxed);
                    self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
                PushOutcome::SessionClosed => {
                    self.delivery_failures.fetch_add(1, Ordering::Relaxed);
                    dead.push(id);
                }
            }
        }

        for id in dead {
            self.remove(id).await;
        }
        delivered
    }

    /// Force-close every session whose heartbeat silence exceeds
    /// `idle_timeout`, releasing its subscriptions. Returns the reaped
    /// session ids.
    pub async fn reap_idle(&self, idle_timeout: Duration) -> Vec<SessionId> {
        let idle: Vec<SessionId> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.idle_for() > idle_timeout)
                .map(|s| s.id())
                .collect()
        };

        for id in &idle {
            tracing::info!(session = %id, "Reaping idle session");
            self.remove(*id).await;
            self.sessions_reaped.fetch_add(1, Ordering::Relaxed);
        }
        idle
    }

    /// Snapshot fan-out statistics.
    pub async fn stats(&self) -> FanoutStats {
        FanoutStats {
            open_sessions: self.sessions.read().await.len(),
            subscribed_topics: self.topic_table.read().await.len(),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_reaped: self.sessions_reaped.load(Ordering::Relaxed),
        }
    }

    /// Describe every live session for the stats endpoint.
    pub async fn session_details(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut details: Vec<SessionInfo> = sessions
            .values()
            .map(|s| SessionInfo {
                id: s.id(),
                state: s.state(),
                topics: s.topics(),
                buffered: s.buffered(),
                dropped: s.dropped_frames(),
                idle_ms: u64::try_from(s.idle_for().as_millis()).unwrap_or(u64::MAX),
            })
            .collect();
        details.sort_by_key(|d| d.id);
        details
    }
}
