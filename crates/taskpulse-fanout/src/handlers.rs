//! Health and stats endpoints for the fan-out server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/healthz` | Liveness plus fan-out gauges |
//! | `GET` | `/api/sessions` | Per-session detail and totals |
//!
//! Degraded states are reported as structured JSON with a 200 status;
//! operational tooling inspects the body, not the status code.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{Html, IntoResponse};

use crate::error::FanoutError;
use crate::state::AppState;

/// Serve a minimal HTML page showing fan-out status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.registry.stats().await;

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Taskpulse Fan-out</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        code {{ background: #161b22; padding: 0.15rem 0.4rem; border-radius: 4px; }}
    </style>
</head>
<body>
    <h1>Taskpulse Fan-out</h1>
    <p class="subtitle">live progress delivery</p>
    <p>{open} open session(s), {topics} subscribed topic(s),
       {delivered} frame(s) delivered, {dropped} dropped.</p>
    <p>Connect an observer at <code>/ws/updates</code>, inspect
       <code>/api/sessions</code>, probe <code>/healthz</code>.</p>
</body>
</html>"#,
        open = stats.open_sessions,
        topics = stats.subscribed_topics,
        delivered = stats.frames_delivered,
        dropped = stats.frames_dropped,
    ))
}

/// `GET /healthz` -- liveness plus fan-out gauges.
pub async fn healthz(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, FanoutError> {
    let stats = state.registry.stats().await;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "fanout": stats,
    })))
}

/// `GET /api/sessions` -- per-session detail and totals.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, FanoutError> {
    let sessions = state.registry.session_details().await;
    let stats = state.registry.stats().await;
    Ok(Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
        "totals": stats,
    })))
}
