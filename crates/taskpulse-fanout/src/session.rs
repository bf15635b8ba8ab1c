//! One observer session: state machine, heartbeats, and the bounded
//! drop-oldest outbound buffer.
//!
//! The buffer is the backpressure boundary: pushes never block the
//! fan-out loop. When the buffer is full the oldest frame is dropped
//! and counted, trading completeness for liveness on slow consumers.
//! Frames within one session are delivered strictly in push order.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use taskpulse_types::{ServerFrame, SessionId, SessionState};
use tokio::sync::Notify;

/// Result of pushing a frame into a session buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The frame was buffered.
    Delivered,
    /// The frame was buffered and the oldest buffered frame was dropped
    /// to make room.
    DeliveredWithDrop,
    /// The session is closed; the frame was discarded.
    SessionClosed,
}

/// One connected observer session.
///
/// Created by the `WebSocket` handler in the `Connecting` state and
/// owned by the registry for its connected lifetime; destroyed on
/// disconnect or idle timeout.
pub struct SessionHandle {
    id: SessionId,
    state: Mutex<SessionState>,
    topics: Mutex<BTreeSet<String>>,
    last_heartbeat: Mutex<Instant>,
    buffer: Mutex<VecDeque<ServerFrame>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl SessionHandle {
    /// Create a session with a bounded outbound buffer of `capacity`
    /// frames.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(),
            state: Mutex::new(SessionState::Connecting),
            topics: Mutex::new(BTreeSet::new()),
            last_heartbeat: Mutex::new(Instant::now()),
            buffer: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session's unique id.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *Self::lock(&self.state)
    }

    /// Advance the lifecycle state.
    pub fn set_state(&self, state: SessionState) {
        *Self::lock(&self.state) = state;
    }

    // -----------------------------------------------------------------------
    // Heartbeats
    // -----------------------------------------------------------------------

    /// Reset the idle clock. Called on every heartbeat (and on connect).
    pub fn touch(&self) {
        *Self::lock(&self.last_heartbeat) = Instant::now();
    }

    /// Time since the last heartbeat.
    pub fn idle_for(&self) -> Duration {
        Self::lock(&self.last_heartbeat).elapsed()
    }

    // -----------------------------------------------------------------------
    // Subscriptions (the authoritative set lives here; the registry
    // keeps the inverted topic table in sync)
    // -----------------------------------------------------------------------

    /// Add topics to the subscription set, returning the full set after
    /// the change.
    pub fn add_topics(&self, topics: &[String]) -> Vec<String> {
        let mut guard = Self::lock(&self.topics);
        for topic in topics {
            guard.insert(topic.clone());
        }
        guard.iter().cloned().collect()
    }

    /// Remove topics from the subscription set, returning the full set
    /// after the change.
    pub fn remove_topics(&self, topics: &[String]) -> Vec<String> {
        let mut guard = Self::lock(&self.topics);
        for topic in topics {
            guard.remove(topic);
        }
        guard.iter().cloned().collect()
    }

    /// The session's current topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        Self::lock(&self.topics).iter().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Outbound buffer
    // -----------------------------------------------------------------------

    /// Buffer a frame for delivery, dropping the oldest frame when the
    /// buffer is full. Never blocks.
    pub fn push(&self, frame: ServerFrame) -> PushOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::SessionClosed;
        }
        let outcome = {
            let mut buffer = Self::lock(&self.buffer);
            if buffer.len() >= self.capacity {
                buffer.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                buffer.push_back(frame);
                PushOutcome::DeliveredWithDrop
            } else {
                buffer.push_back(frame);
                PushOutcome::Delivered
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Wait for the next buffered frame.
    ///
    /// Returns `None` once the session is closed and the buffer is
    /// drained.
    pub async fn pop(&self) -> Option<ServerFrame> {
        loop {
            let notified = self.notify.notified();
            {
                let mut buffer = Self::lock(&self.buffer);
                if let Some(frame) = buffer.pop_front() {
                    return Some(frame);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Frames currently buffered.
    pub fn buffered(&self) -> usize {
        Self::lock(&self.buffer).len()
    }

    /// Frames dropped by the overflow policy.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Close the session: no further pushes are accepted and a pending
    /// [`pop`](Self::pop) wakes up to observe the drain.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.set_state(SessionState::Closed);
        self.notify.notify_one();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("buffered", &self.buffered())
            .field("dropped", &self.dropped_frames())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_frame(percent: u8) -> ServerFrame {
        use taskpulse_types::{ProgressUpdate, TaskId};
        ServerFrame::Progress {
            payload: ProgressUpdate::new(TaskId::new(), percent, "stage"),
        }
    }

    #[test]
    fn push_and_drain_preserves_order() {
        let session = SessionHandle::new(8);
        assert_eq!(session.push(progress_frame(1)), PushOutcome::Delivered);
        assert_eq!(session.push(progress_frame(2)), PushOutcome::Delivered);
        assert_eq!(session.buffered(), 2);
    }

    #[test]
    fn overflow_drops_the_oldest_frame() {
        let session = SessionHandle::new(2);
        session.push(progress_frame(1));
        session.push(progress_frame(2));
        let outcome = session.push(progress_frame(3));

        assert_eq!(outcome, PushOutcome::DeliveredWithDrop);
        assert_eq!(session.buffered(), 2);
        assert_eq!(session.dropped_frames(), 1);
    }

    #[tokio::test]
    async fn pop_yields_frames_in_push_order() {
        let session = SessionHandle::new(4);
        session.push(progress_frame(1));
        session.push(progress_frame(2));

        let first = session.pop().await;
        let second = session.pop().await;
        match (first, second) {
            (
                Some(ServerFrame::Progress { payload: a }),
                Some(ServerFrame::Progress { payload: b }),
            ) => {
                assert_eq!(a.percent, 1);
                assert_eq!(b.percent, 2);
            }
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[tokio::test]
    async fn pop_drains_then_reports_closed() {
        let session = SessionHandle::new(4);
        session.push(progress_frame(1));
        session.close();

        // The buffered frame is still delivered, then the drain shows.
        assert!(session.pop().await.is_some());
        assert!(session.pop().await.is_none());
    }

    #[test]
    fn closed_session_rejects_pushes() {
        let session = SessionHandle::new(4);
        session.close();
        assert_eq!(session.push(progress_frame(1)), PushOutcome::SessionClosed);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn topic_set_changes_return_the_full_set() {
        let session = SessionHandle::new(4);
        let after = session.add_topics(&["b".to_owned(), "a".to_owned()]);
        assert_eq!(after, vec!["a".to_owned(), "b".to_owned()]);

        let after = session.remove_topics(&["a".to_owned()]);
        assert_eq!(after, vec!["b".to_owned()]);
    }

    #[test]
    fn touch_resets_the_idle_clock() {
        let session = SessionHandle::new(4);
        session.touch();
        assert!(session.idle_for() < Duration::from_secs(1));
    }
}
