//! `WebSocket` handler for real-time progress update streaming.
//!
//! Observers connect to `GET /ws/updates`, subscribe to topics with
//! [`ClientFrame::Subscribe`], and receive a [`ServerFrame`] for every
//! queue message fanned out to a subscribed topic. Heartbeats keep the
//! session alive past the idle reaper.
//!
//! Acks for control frames travel through the same outbound buffer as
//! progress pushes, so each session sees its frames strictly in order.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use taskpulse_types::{ClientFrame, ServerFrame, SessionState};
use tracing::{debug, warn};

use crate::session::SessionHandle;
use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` session and register it
/// with the fan-out manager.
///
/// # Route
///
/// `GET /ws/updates`
pub async fn ws_updates(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Drive one session: forward buffered frames to the socket and apply
/// control frames from the observer.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let session = SessionHandle::new(state.session_buffer);
    state.registry.register(Arc::clone(&session)).await;
    debug!(session = %session.id(), "WebSocket observer connected");

    loop {
        tokio::select! {
            // Deliver the next buffered frame.
            frame = session.pop() => {
                match frame {
                    Some(frame) => {
                        let json = match serde_json::to_string(&frame) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!(session = %session.id(), "Failed to serialize frame: {e}");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            debug!(session = %session.id(), "Observer disconnected (send failed)");
                            break;
                        }
                    }
                    None => {
                        // Closed out from under us (reaper or shutdown).
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            // Apply a control frame or notice the disconnect.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&state, &session, text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(session = %session.id(), "Observer disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        session.set_state(SessionState::Closing);
                        debug!(session = %session.id(), "Observer disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(session = %session.id(), "WebSocket error: {e}");
                        break;
                    }
                    _ => {
                        // Ignore binary frames from observers.
                    }
                }
            }
        }
    }

    state.registry.remove(session.id()).await;
}

/// Parse and apply one control frame from the observer.
async fn handle_client_frame(state: &Arc<AppState>, session: &Arc<SessionHandle>, text: &str) {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Subscribe { topics }) => {
            let after = state.registry.subscribe(session.id(), &topics).await;
            debug!(session = %session.id(), ?topics, "Subscribed");
            session.push(ServerFrame::SubscriptionAck { topics: after });
        }
        Ok(ClientFrame::Unsubscribe { topics }) => {
            let after = state.registry.unsubscribe(session.id(), &topics).await;
            debug!(session = %session.id(), ?topics, "Unsubscribed");
            session.push(ServerFrame::SubscriptionAck { topics: after });
        }
        Ok(ClientFrame::Heartbeat) => {
            session.touch();
            session.push(ServerFrame::HeartbeatAck);
        }
        Err(e) => {
            session.push(ServerFrame::Error {
                message: format!("unparseable frame: {e}"),
            });
        }
    }
}
