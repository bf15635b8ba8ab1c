//! Shared application state for the fan-out HTTP server.

use std::sync::Arc;

use crate::registry::SessionRegistry;

/// Default per-session outbound buffer size, in frames.
const DEFAULT_SESSION_BUFFER: usize = 256;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor. The
/// registry is the live session/subscription table; the buffer size is
/// applied to every newly accepted session.
#[derive(Clone)]
pub struct AppState {
    /// The live session and subscription registry.
    pub registry: Arc<SessionRegistry>,
    /// Bounded outbound buffer size for new sessions, in frames.
    pub session_buffer: usize,
}

impl AppState {
    /// Create state with a fresh registry and the default buffer size.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            session_buffer: DEFAULT_SESSION_BUFFER,
        }
    }

    /// Create state over an existing registry (shared with the
    /// dispatcher and reaper).
    pub fn with_registry(registry: Arc<SessionRegistry>, session_buffer: usize) -> Self {
        Self {
            registry,
            session_buffer: session_buffer.max(1),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
