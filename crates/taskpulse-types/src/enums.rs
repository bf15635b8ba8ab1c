//! Enumeration types shared across the core components.
//!
//! The serde representations here are wire-visible: priorities and
//! statuses are stored in the broker as `snake_case` strings, and the
//! session state appears in the fan-out stats endpoint.

use serde::{Deserialize, Serialize};

/// Delivery priority of a queued message.
///
/// The derived [`Ord`] follows declaration order, so
/// `Low < Normal < High < Urgent`. Across priorities a strictly higher
/// priority is always served first, even if enqueued later; within one
/// priority messages are served oldest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background updates; may starve under sustained higher-priority load.
    Low,
    /// Routine progress updates.
    #[default]
    Normal,
    /// Updates that should preempt the routine stream.
    High,
    /// Terminal or operator-facing updates; always served first.
    Urgent,
}

impl Priority {
    /// Claim rank of this priority: 0 is claimed first, 3 last.
    ///
    /// The rank is the inverse of the [`Ord`] ordering and is what the
    /// queue encodes into broker sort scores (lowest score pops first).
    pub const fn rank(self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }

    /// All priorities in claim order (served-first first).
    pub const ALL: [Self; 4] = [Self::Urgent, Self::High, Self::Normal, Self::Low];
}

/// Lifecycle status of a queued message.
///
/// Transitions: `Pending -> Processing -> {Delivered, Failed, Expired}`.
/// A `Processing` message whose lease expires reverts to `Pending` until
/// its retry ceiling is reached, after which it becomes `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Durably enqueued, eligible for claiming.
    Pending,
    /// Claimed by exactly one consumer under a lease.
    Processing,
    /// Acknowledged by a consumer; removed from future claims.
    Delivered,
    /// Negatively acknowledged past the retry ceiling.
    Failed,
    /// Lease expired past the retry ceiling without acknowledgement.
    Expired,
}

impl MessageStatus {
    /// Whether this status is terminal (no further transitions).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Expired)
    }
}

/// State machine of an observer session in the fan-out manager.
///
/// `Connecting -> Open -> {Closing -> Closed}`, or straight to `Closed`
/// on an abrupt disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The transport handshake is in flight.
    Connecting,
    /// The session accepts control frames and receives pushes.
    Open,
    /// A close has been initiated; no further pushes are buffered.
    Closing,
    /// The session is gone and its subscriptions are released.
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_total_order() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Urgent);
    }

    #[test]
    fn rank_inverts_ordering() {
        assert_eq!(Priority::Urgent.rank(), 0);
        assert_eq!(Priority::Low.rank(), 3);
        assert!(Priority::Urgent.rank() < Priority::Low.rank());
    }

    #[test]
    fn claim_order_is_served_first_first() {
        let ranks: Vec<u8> = Priority::ALL.iter().map(|p| p.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn status_terminality() {
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(!MessageStatus::Processing.is_terminal());
        assert!(MessageStatus::Delivered.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
        assert!(MessageStatus::Expired.is_terminal());
    }

    #[test]
    fn priority_serde_is_snake_case() {
        let json = serde_json::to_string(&Priority::Urgent);
        assert_eq!(json.ok().as_deref(), Some("\"urgent\""));
    }
}
