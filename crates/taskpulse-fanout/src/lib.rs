//! Real-time connection (fan-out) manager for the Taskpulse core.
//!
//! Holds one long-lived `WebSocket` session per connected observer,
//! tracks its topic subscriptions, and delivers queue messages matching
//! those topics. Delivery is fan-out, not point-to-point: one message
//! for topic T is pushed to every currently-open session subscribed to
//! T. Per-session delivery is best effort and at most once -- a send
//! failure closes only that session and never un-acks the broker-side
//! message.
//!
//! # Modules
//!
//! - [`session`] -- One observer session: state machine, heartbeats,
//!   bounded drop-oldest outbound buffer
//! - [`registry`] -- The topic-to-subscriber table with ordered,
//!   isolated delivery
//! - [`ws`] -- The `WebSocket` upgrade handler and session loop
//! - [`dispatcher`] -- Queue-to-fan-out pump and the idle-session reaper
//! - [`state`] -- Shared Axum application state
//! - [`handlers`] -- Health and stats endpoints
//! - [`router`] -- Axum router assembly
//! - [`server`] -- HTTP server lifecycle
//! - [`error`] -- Shared error types

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use dispatcher::{DispatcherConfig, TaskHandle, spawn_dispatcher, spawn_reaper};
pub use error::FanoutError;
pub use registry::{FanoutStats, SessionInfo, SessionRegistry};
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use session::{PushOutcome, SessionHandle};
pub use state::AppState;
