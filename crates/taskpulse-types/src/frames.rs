//! `WebSocket` wire frames exchanged with observer sessions.
//!
//! Frames are JSON objects tagged with a `type` field. Observers send
//! [`ClientFrame`] control messages; the fan-out manager pushes
//! [`ServerFrame`] messages. Example push frame:
//!
//! ```json
//! {"type":"progress","payload":{"task_id":"...","percent":40,...}}
//! ```

use serde::{Deserialize, Serialize};

use crate::progress::ProgressUpdate;

/// Control frames sent by an observer over its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Subscribe the session to the given topics.
    Subscribe {
        /// Topics to add to the session's subscription set.
        topics: Vec<String>,
    },

    /// Unsubscribe the session from the given topics.
    Unsubscribe {
        /// Topics to remove from the session's subscription set.
        topics: Vec<String>,
    },

    /// Keep-alive; resets the session's idle clock.
    Heartbeat,
}

/// Push frames delivered to an observer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A progress update for one of the session's subscribed topics.
    Progress {
        /// The delivered update.
        payload: ProgressUpdate,
    },

    /// Acknowledges a [`ClientFrame::Heartbeat`].
    HeartbeatAck,

    /// Acknowledges a subscribe/unsubscribe; carries the session's full
    /// subscription set after the change.
    SubscriptionAck {
        /// The session's current topics, sorted.
        topics: Vec<String>,
    },

    /// A non-fatal protocol error (e.g. an unparseable client frame).
    Error {
        /// Human-readable description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TaskId;

    #[test]
    fn client_frames_are_type_tagged() {
        let frame = ClientFrame::Subscribe {
            topics: vec!["task-1".to_owned()],
        };
        let json = serde_json::to_value(&frame).ok();
        assert_eq!(
            json.as_ref().and_then(|v| v.get("type")).and_then(|t| t.as_str()),
            Some("subscribe")
        );
    }

    #[test]
    fn heartbeat_round_trip() {
        let parsed = serde_json::from_str::<ClientFrame>(r#"{"type":"heartbeat"}"#).ok();
        assert_eq!(parsed, Some(ClientFrame::Heartbeat));
    }

    #[test]
    fn progress_frame_carries_payload() {
        let update = ProgressUpdate::new(TaskId::new(), 55, "compacting");
        let frame = ServerFrame::Progress {
            payload: update.clone(),
        };
        let json = serde_json::to_string(&frame).ok();
        let back = json.and_then(|j| serde_json::from_str::<ServerFrame>(&j).ok());
        assert_eq!(back, Some(ServerFrame::Progress { payload: update }));
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let parsed = serde_json::from_str::<ClientFrame>(r#"{"type":"shout"}"#);
        assert!(parsed.is_err());
    }
}
