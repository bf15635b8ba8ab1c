//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every entity handled by the core has a strongly-typed ID to prevent
//! accidental mixing of identifiers at compile time. All IDs use UUID v7
//! (time-ordered) so broker keys and database indexes stay roughly
//! insertion-ordered.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl core::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse::<Uuid>()?))
            }
        }
    };
}

define_id! {
    /// Unique identifier for a tracked long-running task.
    TaskId
}

define_id! {
    /// Unique identifier for a message on the priority queue.
    MessageId
}

define_id! {
    /// Unique identifier for a connected observer session.
    SessionId
}

define_id! {
    /// Unique identifier for a raised monitoring alert.
    AlertId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_matches_inner_uuid() {
        let id = SessionId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }

    #[test]
    fn round_trip_through_str() {
        let id = TaskId::new();
        let parsed = id.to_string().parse::<TaskId>();
        assert_eq!(parsed.ok(), Some(id));
    }

    #[test]
    fn v7_ids_are_time_ordered() {
        // UUID v7 embeds a millisecond timestamp in the high bits, so two
        // IDs created in sequence never sort backwards.
        let a = MessageId::new();
        let b = MessageId::new();
        assert!(a <= b);
    }
}
