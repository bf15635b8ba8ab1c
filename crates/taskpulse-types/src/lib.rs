//! Shared type definitions for the Taskpulse core.
//!
//! This crate is the single source of truth for the types that cross
//! component boundaries: identifiers, priority and status enums, the
//! progress-update payload, the queued message envelope, and the
//! `WebSocket` wire frames exchanged with observers. The serde JSON
//! encoding of these types is the wire contract.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Priority, message status, and session state enums
//! - [`progress`] -- The progress-update payload submitted by producers
//! - [`message`] -- The queued message envelope with lease metadata
//! - [`frames`] -- Client/server `WebSocket` control and push frames

pub mod enums;
pub mod frames;
pub mod ids;
pub mod message;
pub mod progress;

// Re-export all public types at crate root for convenience.
pub use enums::{MessageStatus, Priority, SessionState};
pub use frames::{ClientFrame, ServerFrame};
pub use ids::{AlertId, MessageId, SessionId, TaskId};
pub use message::QueueMessage;
pub use progress::ProgressUpdate;
