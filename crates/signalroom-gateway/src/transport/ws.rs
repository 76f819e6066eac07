//! WebSocket upgrade endpoint.
//!
//! Responsibilities:
//! - Fixed-window handshake limit per client (origin is checked earlier by
//!   the CORS guard)
//! - Upgrade HTTP -> WS with the configured inbound frame limit
//! - Hand the socket to `serve_connection`

use std::net::SocketAddr;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use signalroom_core::error::{ClientCode, SignalError};

use crate::app_state::AppState;
use crate::transport::{handshake, session};

/// Render a pre-upgrade rejection.
pub fn reject(err: &SignalError) -> Response {
    if !err.is_client_fault() {
        tracing::warn!(error = %err, code = %err.client_code(), "handshake failed server-side");
    }
    let status = match err.client_code() {
        ClientCode::BadRequest => StatusCode::BAD_REQUEST,
        ClientCode::NotAllowed => StatusCode::FORBIDDEN,
        ClientCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ClientCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ClientCode::UnsupportedVersion | ClientCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let body = match err {
        SignalError::NotAllowed(msg) => msg.clone(),
        SignalError::RateLimited => "rate limit exceeded".to_string(),
        other => other.to_string(),
    };
    (status, body).into_response()
}

pub async fn ws_upgrade(
    State(app): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let rl = &app.cfg().rate_limit;
    let client = handshake::client_key(&headers, peer, rl.trust_forwarded_headers);

    if let Err(e) = app.limiter().check(&client) {
        app.metrics()
            .handshake_rejections
            .inc(&[("reason", "rate_limit")]);
        tracing::debug!(client = %client, "handshake rate limited");
        return reject(&e);
    }

    app.metrics().ws_upgrades.inc(&[]);

    let hub = app.hub();
    let metrics = app.metrics_arc();
    let settings = session::SessionSettings::from_config(&app.cfg().gateway);
    let max = app.cfg().gateway.max_message_bytes;

    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| session::serve_connection(hub, socket, settings, metrics))
}
